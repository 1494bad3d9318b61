pub mod dry_run;
pub mod process;

use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("Failed to wait for a child process: {0}")]
    Wait(io::Error),
    #[error("Failed to write dry run output {path}: {source}")]
    DryRun { path: PathBuf, source: io::Error },
}

/// How a single invocation of the external computation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// non-zero exit, `code` is `None` if the child was terminated by a signal
    Failure { code: Option<i32> },
    TimedOut,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// per-run options passed along with every invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// cache/config directory of the external computation
    pub model_dir: Option<PathBuf>,
    /// `None` waits for the child for as long as it takes
    pub timeout: Option<Duration>,
}

/// Runs the external computation for one staged input
///
/// Implementations block until the computation has finished.
pub trait Launcher {
    fn invoke(
        &self,
        input: &Path,
        output: &Path,
        options: &LaunchOptions,
    ) -> Result<Outcome, LaunchError>;
}

impl<L: Launcher + ?Sized> Launcher for &L {
    fn invoke(
        &self,
        input: &Path,
        output: &Path,
        options: &LaunchOptions,
    ) -> Result<Outcome, LaunchError> {
        (**self).invoke(input, output, options)
    }
}

/// All launcher variants selectable from the command line
#[derive(Debug, Clone)]
pub enum Launchers {
    Process(process::ProcessLauncher),
    DryRun(dry_run::DryRunLauncher),
}

impl Launcher for Launchers {
    fn invoke(
        &self,
        input: &Path,
        output: &Path,
        options: &LaunchOptions,
    ) -> Result<Outcome, LaunchError> {
        match self {
            Self::Process(launcher) => launcher.invoke(input, output, options),
            Self::DryRun(launcher) => launcher.invoke(input, output, options),
        }
    }
}

/// Command line layout of the external computation
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    // entry point of the computation, overridden by `--exec`
    pub exec: Option<PathBuf>,
    // program used to run `exec`, e.g., `python`
    pub interpreter: Option<String>,
    #[serde(default = "default_input_flag")]
    pub input_flag: String,
    #[serde(default = "default_output_flag")]
    pub output_flag: String,
    #[serde(default = "default_model_dir_flag")]
    pub model_dir_flag: String,
    pub model_dir: Option<PathBuf>,
    // fixed parameters appended to every invocation
    #[serde(default)]
    pub params: Vec<String>,
    // in seconds
    pub timeout: Option<u64>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            exec: None,
            interpreter: None,
            input_flag: default_input_flag(),
            output_flag: default_output_flag(),
            model_dir_flag: default_model_dir_flag(),
            model_dir: None,
            params: Vec::new(),
            timeout: None,
        }
    }
}

fn default_input_flag() -> String {
    "--fasta".into()
}

fn default_output_flag() -> String {
    "-o".into()
}

fn default_model_dir_flag() -> String {
    "--model-dir".into()
}
