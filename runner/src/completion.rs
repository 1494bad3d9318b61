use itertools::Itertools;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// name of the file written instead of running the computation in test mode
pub const DRY_RUN_MARKER: &str = "test_out.out";

/// Decides whether a unit was already processed by an earlier run
pub trait CompletionOracle {
    fn is_complete(&self, tag: &str) -> bool;
}

/// A unit counts as complete as soon as `root/<tag>` is a directory
///
/// The contents are not inspected: a directory left behind by a killed run
/// reads as complete as well. `prune` removes the directories that are known
/// to hold no real results.
#[derive(Debug, Clone)]
pub struct DirectoryOracle {
    root: PathBuf,
}

impl DirectoryOracle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn output_location(&self, tag: &str) -> PathBuf {
        self.root.join(tag)
    }
}

impl CompletionOracle for DirectoryOracle {
    fn is_complete(&self, tag: &str) -> bool {
        self.output_location(tag).is_dir()
    }
}

/// directories that only hold log/marker output (`*.out`) but no structure (`*.pdb`) and no input (`*.fasta`)
pub fn find_incomplete(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut incomplete = Vec::new();

    for entry in fs::read_dir(root)? {
        let path = entry?.path();

        if !path.is_dir() {
            continue;
        }

        let files = match fs::read_dir(&path) {
            Ok(files) => files,
            Err(error) => {
                warn!(path = ?path, error = %error, "Failed to read output directory, skipping");
                continue;
            }
        };

        let (mut logs, mut structures, mut inputs) = (0usize, 0usize, 0usize);

        for file in files {
            let file = match file {
                Ok(file) => file.path(),
                Err(error) => {
                    warn!(path = ?path, error = %error, "Failed to read output directory entry");
                    continue;
                }
            };

            match file.extension().and_then(|extension| extension.to_str()) {
                Some("out") => logs += 1,
                Some("pdb") => structures += 1,
                Some("fasta") => inputs += 1,
                _ => {}
            }
        }

        debug!(
            path = ?path,
            logs, structures, inputs, "Inspected output directory"
        );

        if logs > 0 && structures == 0 && inputs == 0 {
            incomplete.push(path);
        }
    }

    Ok(incomplete.into_iter().sorted().collect_vec())
}

/// remove all directories reported by `find_incomplete`, returns the affected paths
///
/// With `dry_run` set nothing is deleted. Failing to delete a single directory
/// is logged and does not stop the others from being removed.
pub fn prune(root: &Path, dry_run: bool) -> io::Result<Vec<PathBuf>> {
    let incomplete = find_incomplete(root)?;
    let mut removed = Vec::with_capacity(incomplete.len());

    for path in incomplete {
        if dry_run {
            info!(path = ?path, "Would remove incomplete output");
            removed.push(path);
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(path = ?path, "Removed incomplete output");
                removed.push(path);
            }
            Err(error) => warn!(path = ?path, error = %error, "Failed to remove incomplete output"),
        }
    }

    Ok(removed)
}
