pub mod local;

use crate::launcher::Outcome;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to prepare directory {path}: {source}")]
    Prepare { path: PathBuf, source: io::Error },
}

/// name of the directory under the output root that holds staged inputs
pub fn staging_dir_name(extension: &str) -> String {
    format!("tmp_{extension}")
}

/// Where results and staged inputs live
///
/// * `root/<tag>/`: output of a unit, its existence marks the unit as done
/// * `root/tmp_<extension>/<tag>.<extension>`: staged input of a unit
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    staging: PathBuf,
    extension: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        let root = root.into();

        Self {
            staging: root.join(staging_dir_name(extension)),
            root,
            extension: extension.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    pub fn unit_output(&self, tag: &str) -> PathBuf {
        self.root.join(tag)
    }

    pub fn staged_input(&self, tag: &str) -> PathBuf {
        self.staging.join(format!("{tag}.{}", self.extension))
    }

    /// create the output root and staging directory, both may already exist
    pub fn prepare(&self) -> Result<(), ExecutorError> {
        for path in [&self.root, &self.staging] {
            fs::create_dir_all(path).map_err(|source| ExecutorError::Prepare {
                path: path.clone(),
                source,
            })?;
            debug!(path = ?path, "Prepared directory");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Finished(Outcome),
    /// the input couldn't be written, the computation never ran
    StagingFailed(String),
    /// the computation couldn't be started or waited on
    LaunchFailed(String),
}

/// Result of processing a single unit, only kept for the summary of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub tag: String,
    pub status: UnitStatus,
    pub output: PathBuf,
}

impl ExecutionRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, UnitStatus::Finished(Outcome::Success))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub records: Vec<ExecutionRecord>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|record| record.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded()
    }

    pub fn failed_tags(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|record| !record.succeeded())
            .map(|record| record.tag.as_str())
    }
}
