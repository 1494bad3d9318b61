use crate::{
    completion::CompletionOracle,
    executors::staging_dir_name,
    unit::{FormatError, RecordFormat, Unit},
};
use globset::{GlobBuilder, GlobMatcher};
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Source {0} is neither a file nor a directory")]
    MissingSource(PathBuf),
    #[error("Glob was invalid")]
    InvalidGlob(#[from] globset::Error),
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: FormatError },
}

#[derive(Debug, Clone)]
/// All possible sources of units
/// These should be initialized from `Collector::load`
pub enum Collector {
    /// a single file, every record is a unit
    File { path: PathBuf },
    /// a directory searched with a glob, the first record of each matching file is a unit
    Directory { root: PathBuf, glob: GlobMatcher },
}

impl Collector {
    pub fn load(source: &Path, pattern: &str) -> Result<Self, CatalogError> {
        if source.is_file() {
            Ok(Self::File {
                path: source.to_path_buf(),
            })
        } else if source.is_dir() {
            // `*` must not cross directory boundaries, `**` is needed to descend
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()?
                .compile_matcher();

            debug!("Filtering with glob: {glob:?}");

            Ok(Self::Directory {
                root: source.to_path_buf(),
                glob,
            })
        } else {
            Err(CatalogError::MissingSource(source.to_path_buf()))
        }
    }

    /// files backing this collector, in a stable order
    ///
    /// Every worker lists the same source independently, so the order must
    /// not depend on the file system's enumeration order.
    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            Self::File { path } => vec![path.clone()],
            Self::Directory { root, glob } => WalkBuilder::new(root)
                .standard_filters(false)
                .follow_links(true)
                .sort_by_file_name(|left, right| left.cmp(right))
                .build()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(error) => {
                        warn!("Failed to search for units: {error}");
                        None
                    }
                })
                .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
                .map(DirEntry::into_path)
                .filter(|path| {
                    path.strip_prefix(root)
                        .map_or(false, |relative| glob.is_match(relative))
                })
                .collect_vec(),
        }
    }

    /// every candidate unit, in discovery order
    ///
    /// Unreadable or unparsable files are skipped with a warning. Tags that
    /// can't name a directory, the staging directory's name and repeated tags
    /// are dropped, the first occurrence of a tag wins.
    pub fn candidates<F>(&self, format: &F) -> Vec<Unit>
    where
        F: RecordFormat + ?Sized,
    {
        let mut units = Vec::new();

        for path in self.files() {
            let records = match read_records(&path, format) {
                Ok(records) => records,
                Err(error) => {
                    warn!("{error}, skipping");
                    continue;
                }
            };

            match self {
                Self::File { .. } => units.extend(records),
                Self::Directory { .. } => {
                    let count = records.len();

                    match records.into_iter().next() {
                        Some(unit) => {
                            if count > 1 {
                                debug!(path = ?path, count, "Only the first record of the file is used");
                            }
                            units.push(unit);
                        }
                        None => warn!(path = ?path, "File contains no records, skipping"),
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        let staging = staging_dir_name(format.extension());

        units
            .into_iter()
            .filter(|unit| {
                if !unit.has_path_safe_tag() {
                    warn!(tag = ?unit.tag, "Tag can't be used as a directory name, skipping");
                    false
                } else if unit.tag == staging {
                    warn!(tag = %unit.tag, "Tag collides with the staging directory, skipping");
                    false
                } else if !seen.insert(unit.tag.clone()) {
                    warn!(tag = %unit.tag, "Duplicate tag, keeping the first occurrence");
                    false
                } else {
                    true
                }
            })
            .collect_vec()
    }

    /// candidates that `oracle` doesn't consider complete, order is preserved
    pub fn pending<F, O>(&self, format: &F, oracle: &O) -> Vec<Unit>
    where
        F: RecordFormat + ?Sized,
        O: CompletionOracle + ?Sized,
    {
        let candidates = self.candidates(format);
        let total = candidates.len();

        let pending = candidates
            .into_iter()
            .filter(|unit| {
                let done = oracle.is_complete(&unit.tag);
                if done {
                    debug!(tag = %unit.tag, "Already completed, skipping");
                }
                !done
            })
            .collect_vec();

        info!(
            total,
            completed = total - pending.len(),
            pending = pending.len(),
            "Collected units"
        );

        pending
    }
}

fn read_records<F>(path: &Path, format: &F) -> Result<Vec<Unit>, CatalogError>
where
    F: RecordFormat + ?Sized,
{
    let bytes = fs::read(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    format.parse(&bytes).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{CatalogError, Collector};
    use crate::{
        completion::DirectoryOracle,
        unit::{fasta::Fasta, Unit},
    };
    use std::fs;
    use tempfile::TempDir;

    fn tags(units: &[Unit]) -> Vec<&str> {
        units.iter().map(|unit| unit.tag.as_str()).collect()
    }

    fn fasta_dir(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();

        for name in names {
            fs::write(
                dir.path().join(format!("{name}.fasta")),
                format!(">{name}\nMKV\n"),
            )
            .unwrap();
        }

        dir
    }

    #[test]
    fn single_file_yields_every_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.fasta");
        fs::write(&path, ">a\nMK\n>b\nVL\n>c\nGG\n").unwrap();

        let collector = Collector::load(&path, "*.fasta").unwrap();

        assert_eq!(tags(&collector.candidates(&Fasta)), vec!["a", "b", "c"]);
    }

    #[test]
    fn directory_uses_first_record_of_each_file() {
        let dir = fasta_dir(&["b", "a"]);
        fs::write(dir.path().join("multi.fasta"), ">m1\nAA\n>m2\nCC\n").unwrap();

        let collector = Collector::load(dir.path(), "*.fasta").unwrap();

        assert_eq!(tags(&collector.candidates(&Fasta)), vec!["a", "b", "m1"]);
    }

    #[test]
    fn directory_respects_glob() {
        let dir = fasta_dir(&["keep"]);
        fs::write(dir.path().join("other.fa"), ">other\nAA\n").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.fasta"), ">deep\nAA\n").unwrap();

        let flat = Collector::load(dir.path(), "*.fasta").unwrap();
        assert_eq!(tags(&flat.candidates(&Fasta)), vec!["keep"]);

        let recursive = Collector::load(dir.path(), "**/*.{fasta,fa}").unwrap();
        assert_eq!(
            tags(&recursive.candidates(&Fasta)),
            vec!["keep", "deep", "other"]
        );
    }

    #[test]
    fn enumeration_is_deterministic() {
        let dir = fasta_dir(&["q", "c", "x", "a", "m", "k"]);
        let collector = Collector::load(dir.path(), "*.fasta").unwrap();

        let first = collector.candidates(&Fasta);
        let second = Collector::load(dir.path(), "*.fasta")
            .unwrap()
            .candidates(&Fasta);

        assert_eq!(first, second);
        assert_eq!(tags(&first), vec!["a", "c", "k", "m", "q", "x"]);
    }

    #[test]
    fn pending_skips_completed_units() {
        let dir = fasta_dir(&["a", "b", "c"]);
        let out = TempDir::new().unwrap();
        let collector = Collector::load(dir.path(), "*.fasta").unwrap();
        let oracle = DirectoryOracle::new(out.path());

        assert_eq!(tags(&collector.pending(&Fasta, &oracle)), vec!["a", "b", "c"]);

        fs::create_dir(out.path().join("a")).unwrap();

        assert_eq!(tags(&collector.pending(&Fasta, &oracle)), vec!["b", "c"]);
    }

    #[test]
    fn duplicate_and_unsafe_tags_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.fasta");
        fs::write(&path, ">a\nMK\n>../escape\nVL\n>a\nGG\n>b\nCC\n").unwrap();

        let units = Collector::load(&path, "*.fasta").unwrap().candidates(&Fasta);

        assert_eq!(units, vec![Unit::new("a", "MK"), Unit::new("b", "CC")]);
    }

    #[test]
    fn staging_directory_name_is_not_a_tag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.fasta");
        fs::write(&path, ">tmp_fasta\nMK\n>b\nCC\n").unwrap();

        let collector = Collector::load(&path, "*.fasta").unwrap();

        assert_eq!(tags(&collector.candidates(&Fasta)), vec!["b"]);
    }

    #[test]
    fn unparsable_source_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.fasta");
        fs::write(&path, [0xffu8, 0xfe, 0xfd]).unwrap();

        let collector = Collector::load(&path, "*.fasta").unwrap();

        assert!(collector.candidates(&Fasta).is_empty());
    }

    #[test]
    fn files_without_records_are_skipped() {
        let dir = fasta_dir(&["a"]);
        fs::write(dir.path().join("empty.fasta"), "").unwrap();

        let collector = Collector::load(dir.path(), "*.fasta").unwrap();

        assert_eq!(tags(&collector.candidates(&Fasta)), vec!["a"]);
    }

    #[test]
    fn missing_source_fails() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            Collector::load(&dir.path().join("nope"), "*.fasta"),
            Err(CatalogError::MissingSource(_))
        ));
    }

    #[test]
    fn invalid_glob_fails() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            Collector::load(dir.path(), "[unclosed"),
            Err(CatalogError::InvalidGlob(_))
        ));
    }
}
