use super::{process::ProcessLauncher, LaunchError, LaunchOptions, Launcher, Outcome};
use crate::completion::DRY_RUN_MARKER;
use std::{fs, path::Path};
use tracing::info;

/// Stand-in for the external computation, used to test partitioning and file handling
///
/// Creates the output directory with a marker file and always succeeds.
#[derive(Debug, Clone, Default)]
pub struct DryRunLauncher {
    // only used to log the command that would have been run
    preview: Option<ProcessLauncher>,
}

impl DryRunLauncher {
    pub fn new(preview: Option<ProcessLauncher>) -> Self {
        Self { preview }
    }
}

impl Launcher for DryRunLauncher {
    fn invoke(
        &self,
        input: &Path,
        output: &Path,
        options: &LaunchOptions,
    ) -> Result<Outcome, LaunchError> {
        let marker = output.join(DRY_RUN_MARKER);

        fs::create_dir_all(output)
            .and_then(|_| fs::write(&marker, "Out data"))
            .map_err(|source| LaunchError::DryRun {
                path: marker.clone(),
                source,
            })?;

        match &self.preview {
            Some(launcher) => info!(
                "Testing, command: {:?}",
                launcher.command(input, output, options)
            ),
            None => info!(input = ?input, output = ?output, "Testing, no command configured"),
        }

        Ok(Outcome::Success)
    }
}
