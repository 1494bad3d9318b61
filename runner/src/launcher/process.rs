use super::{LaunchError, LaunchOptions, Launcher, LauncherConfig, Outcome};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Spawns the external computation as a child process and waits for it
///
/// The child inherits stdout and stderr so its progress shows up in the
/// worker's own log stream.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exec: PathBuf,
    interpreter: Option<OsString>,
    input_flag: String,
    output_flag: String,
    model_dir_flag: String,
    params: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(exec: PathBuf, interpreter: Option<String>, config: &LauncherConfig) -> Self {
        Self {
            exec,
            interpreter: interpreter.map(OsString::from),
            input_flag: config.input_flag.clone(),
            output_flag: config.output_flag.clone(),
            model_dir_flag: config.model_dir_flag.clone(),
            params: config.params.clone(),
        }
    }

    /// build the command for a single unit without running it
    pub fn command(&self, input: &Path, output: &Path, options: &LaunchOptions) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&self.exec);
                command
            }
            None => Command::new(&self.exec),
        };

        command
            .arg(&self.input_flag)
            .arg(input)
            .arg(&self.output_flag)
            .arg(output);

        if let Some(model_dir) = &options.model_dir {
            command.arg(&self.model_dir_flag).arg(model_dir);
        }

        command.args(&self.params);

        command
    }
}

impl Launcher for ProcessLauncher {
    fn invoke(
        &self,
        input: &Path,
        output: &Path,
        options: &LaunchOptions,
    ) -> Result<Outcome, LaunchError> {
        let mut command = self.command(input, output, options);
        let program = command.get_program().to_string_lossy().into_owned();
        debug!("Launching {command:?}");

        let mut child = command
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn { program, source })?;

        let status = match options.timeout {
            None => child.wait().map_err(LaunchError::Wait)?,
            Some(timeout) => match child.wait_timeout(timeout).map_err(LaunchError::Wait)? {
                Some(status) => status,
                None => {
                    warn!(
                        pid = child.id(),
                        timeout = ?timeout,
                        "Child exceeded its timeout, killing it"
                    );
                    // the child may exit between the timeout and the kill
                    if let Err(error) = child.kill() {
                        debug!("Failed to kill child: {error}");
                    }
                    child.wait().map_err(LaunchError::Wait)?;

                    return Ok(Outcome::TimedOut);
                }
            },
        };

        debug!("Child exit status: {status:?}");

        Ok(outcome(status))
    }
}

fn outcome(status: ExitStatus) -> Outcome {
    if status.success() {
        Outcome::Success
    } else {
        Outcome::Failure {
            code: status.code(),
        }
    }
}
