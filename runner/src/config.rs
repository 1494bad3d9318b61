use crate::{
    collector::{CatalogError, Collector},
    launcher::{
        dry_run::DryRunLauncher, process::ProcessLauncher, LaunchOptions, LauncherConfig,
        Launchers,
    },
    rank::{RankError, TopologyConfig},
};
use clap::Args;
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// file name of the external computation looked up next to the running binary
pub const DEFAULT_EXEC_NAME: &str = "run_pretrained_esmfold.py";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Failed to read config file {path}: {source}")]
    ReadConfig { path: PathBuf, source: Error },
    #[error("Config file is invalid")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Unable to locate the default entry point, please pass --exec")]
    NoDefaultExec,
    #[error("Rank could not be determined: {0}")]
    Rank(#[from] RankError),
    #[error("Source could not be loaded: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Preflight checks failed")]
    PreflightFailed,
}

/// Arguments of the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory of fastas or single fasta file
    #[arg(short, long)]
    pub fasta: PathBuf,
    /// Path to output directory
    #[arg(short, long = "out-dir", alias = "out_dir")]
    pub out_dir: PathBuf,
    /// Glob pattern to search directory for fasta files
    #[arg(short, long = "glob-pattern", alias = "glob_pattern", default_value = "*.fasta")]
    pub glob_pattern: String,
    /// Entry point of the folding program (defaults to run_pretrained_esmfold.py next to this binary)
    #[arg(short, long)]
    pub exec: Option<PathBuf>,
    /// Program used to run the entry point (defaults to python for .py files)
    #[arg(long)]
    pub interpreter: Option<String>,
    /// Model cache directory handed to the folding program
    #[arg(short, long = "model-dir")]
    pub model_dir: Option<PathBuf>,
    /// Kill a unit's computation after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Write marker files instead of running the folding program
    #[arg(short, long)]
    pub test: bool,
    /// Optional YAML file with launcher and topology settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Contents of the optional YAML config file
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Fully resolved settings of a run, command line values win over the config file
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub source: PathBuf,
    pub out_dir: PathBuf,
    pub glob: String,
    pub exec: PathBuf,
    pub interpreter: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub test: bool,
    pub launcher: LauncherConfig,
    pub topology: TopologyConfig,
}

impl RunnerConfig {
    pub fn load(args: RunArgs) -> Result<Self, ConfigErrors> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let exec = match args.exec.or_else(|| file.launcher.exec.clone()) {
            Some(exec) => exec,
            None => default_exec()?,
        };
        let interpreter = args
            .interpreter
            .or_else(|| file.launcher.interpreter.clone())
            .or_else(|| default_interpreter(&exec));

        debug!(exec = ?exec, interpreter = ?interpreter, "Resolved entry point");

        Ok(Self {
            source: args.fasta,
            out_dir: args.out_dir,
            glob: args.glob_pattern,
            exec,
            interpreter,
            model_dir: args.model_dir.or_else(|| file.launcher.model_dir.clone()),
            timeout: args.timeout.or(file.launcher.timeout),
            test: args.test,
            launcher: file.launcher,
            topology: file.topology,
        })
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            model_dir: self.model_dir.clone(),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }

    pub fn launcher(&self) -> Launchers {
        let process = ProcessLauncher::new(self.exec.clone(), self.interpreter.clone(), &self.launcher);

        if self.test {
            Launchers::DryRun(DryRunLauncher::new(Some(process)))
        } else {
            Launchers::Process(process)
        }
    }

    pub fn collector(&self) -> Result<Collector, ConfigErrors> {
        Ok(Collector::load(&self.source, &self.glob)?)
    }

    /// check everything that can be checked before touching any unit
    /// returns true if any error was found, every error is logged
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if !self.source.exists() {
            error!(
                "Source {} is neither a file nor a directory",
                self.source.to_string_lossy()
            );
            contains_error = true;
        } else if self.source.is_dir() {
            if let Err(e) = GlobBuilder::new(&self.glob).build() {
                error!("Glob pattern '{}' is invalid: {e}", self.glob);
                contains_error = true;
            }
        }

        if self.out_dir.is_file() {
            error!(
                "Output directory {} is an existing file",
                self.out_dir.to_string_lossy()
            );
            contains_error = true;
        }

        if let Some(model_dir) = &self.model_dir {
            if !model_dir.is_dir() {
                error!(
                    "Model directory {} is not a directory",
                    model_dir.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if self.timeout == Some(0) {
            error!("Timeout cannot be 0, leave it unset to wait indefinitely");
            contains_error = true;
        }

        if self.test {
            // the entry point is never run in test mode
            if !self.exec.is_file() {
                warn!(
                    "Entry point {} not found, ignored in test mode",
                    self.exec.to_string_lossy()
                );
            }
        } else if self.interpreter.is_some() {
            if !self.exec.is_file() {
                error!(
                    "Failed to find entry point. Either not a file or not found at {}",
                    self.exec.to_string_lossy()
                );
                contains_error = true;
            }
        } else {
            match check_executable(&self.exec) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "Entry point {} is not executable, pass --interpreter to run it",
                        self.exec.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if the entry point ({}) is an executable: {e}",
                        self.exec.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        contains_error
    }
}

fn default_exec() -> Result<PathBuf, ConfigErrors> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_EXEC_NAME)))
        .ok_or(ConfigErrors::NoDefaultExec)
}

fn default_interpreter(exec: &Path) -> Option<String> {
    match exec.extension().and_then(|extension| extension.to_str()) {
        Some("py") => Some("python".into()),
        _ => None,
    }
}
