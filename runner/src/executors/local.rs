use super::{ExecutionRecord, OutputLayout, RunSummary, UnitStatus};
use crate::{
    launcher::{LaunchOptions, Launcher, Outcome},
    unit::{RecordFormat, Unit},
};
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    slice,
};
use tracing::{debug, error, info, instrument, warn};

/// Executor that works through a shard one unit at a time
///
/// A unit failing in any way is logged and recorded, the executor always
/// moves on to the next unit.
pub struct LocalExecutor<'a, L, F>
where
    L: Launcher,
    F: RecordFormat + ?Sized,
{
    launcher: L,
    format: &'a F,
    layout: &'a OutputLayout,
    options: LaunchOptions,
}

impl<'a, L, F> LocalExecutor<'a, L, F>
where
    L: Launcher,
    F: RecordFormat + ?Sized,
{
    pub fn new(launcher: L, format: &'a F, layout: &'a OutputLayout, options: LaunchOptions) -> Self {
        Self {
            launcher,
            format,
            layout,
            options,
        }
    }

    /// execute all units in order, blocking on each invocation
    #[instrument(skip_all, fields(units = shard.len()), level = "info")]
    pub fn execute(&self, shard: &[Unit]) -> RunSummary {
        let total = shard.len();
        let mut summary = RunSummary::default();

        for (index, unit) in shard.iter().enumerate() {
            let record = self.execute_unit(unit);

            if record.succeeded() {
                debug!(tag = %record.tag, "Finished unit");
            }

            summary.records.push(record);
            info!("Done with {}/{total}", index + 1);
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Done with processing"
        );

        summary
    }

    fn execute_unit(&self, unit: &Unit) -> ExecutionRecord {
        let output = self.layout.unit_output(&unit.tag);

        let status = match self.stage(unit) {
            Err(error) => {
                error!(tag = %unit.tag, error = %error, "Failed to stage input... continuing");

                UnitStatus::StagingFailed(error.to_string())
            }
            Ok(input) => match self.launcher.invoke(&input, &output, &self.options) {
                Ok(Outcome::Success) => UnitStatus::Finished(Outcome::Success),
                Ok(outcome @ Outcome::Failure { code }) => {
                    error!(tag = %unit.tag, code = ?code, "Error running {}... continuing", input.display());

                    UnitStatus::Finished(outcome)
                }
                Ok(Outcome::TimedOut) => {
                    error!(tag = %unit.tag, "Timeout running {}... continuing", input.display());

                    UnitStatus::Finished(Outcome::TimedOut)
                }
                Err(error) => {
                    error!(tag = %unit.tag, error = %error, "Failed to launch {}... continuing", input.display());

                    UnitStatus::LaunchFailed(error.to_string())
                }
            },
        };

        ExecutionRecord {
            tag: unit.tag.clone(),
            status,
            output,
        }
    }

    /// write the unit's input file unless an earlier run already did
    ///
    /// The file is written under a temporary name and renamed into place, so a
    /// crash can't leave a truncated input behind that later runs would reuse.
    pub fn stage(&self, unit: &Unit) -> io::Result<PathBuf> {
        let path = self.layout.staged_input(&unit.tag);

        if path.is_file() {
            debug!(path = ?path, "Reusing staged input");
            return Ok(path);
        }

        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        if let Err(error) = self.write_partial(unit, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(error);
        }

        if let Err(error) = fs::rename(&partial, &path) {
            warn!(path = ?partial, "Failed to move staged input into place");
            let _ = fs::remove_file(&partial);
            return Err(error);
        }

        Ok(path)
    }

    fn write_partial(&self, unit: &Unit, partial: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(partial)?);
        self.format
            .write(slice::from_ref(unit), &mut writer)
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::LocalExecutor;
    use crate::{
        executors::{OutputLayout, UnitStatus},
        launcher::{dry_run::DryRunLauncher, LaunchError, LaunchOptions, Launcher, Outcome},
        unit::{fasta::Fasta, FormatError, RecordFormat, Unit},
    };
    use std::{cell::RefCell, fs, io::Write, path::Path};
    use tempfile::TempDir;

    /// launcher answering with a fixed outcome per tag and remembering its calls
    struct Scripted {
        failing: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl Launcher for Scripted {
        fn invoke(
            &self,
            input: &Path,
            output: &Path,
            _options: &LaunchOptions,
        ) -> Result<Outcome, LaunchError> {
            assert!(input.is_file());
            let tag = output.file_name().unwrap().to_string_lossy().into_owned();
            self.calls.borrow_mut().push(tag.clone());

            if tag == "unlaunchable" {
                return Err(LaunchError::Wait(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "boom",
                )));
            }

            if self.failing.contains(&tag.as_str()) {
                Ok(Outcome::Failure { code: Some(1) })
            } else {
                Ok(Outcome::Success)
            }
        }
    }

    fn units(tags: &[&str]) -> Vec<Unit> {
        tags.iter().map(|tag| Unit::new(*tag, "MKV")).collect()
    }

    #[test]
    fn failures_do_not_stop_the_shard() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path(), "fasta");
        layout.prepare().unwrap();
        let launcher = Scripted {
            failing: vec!["b"],
            calls: RefCell::new(Vec::new()),
        };

        let executor = LocalExecutor::new(&launcher, &Fasta, &layout, LaunchOptions::default());
        let summary = executor.execute(&units(&["a", "b", "unlaunchable", "c"]));

        assert_eq!(*launcher.calls.borrow(), vec!["a", "b", "unlaunchable", "c"]);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.failed_tags().collect::<Vec<_>>(), vec!["b", "unlaunchable"]);
        assert_eq!(
            summary.records[1].status,
            UnitStatus::Finished(Outcome::Failure { code: Some(1) })
        );
        assert!(matches!(summary.records[2].status, UnitStatus::LaunchFailed(_)));
    }

    #[test]
    fn stages_input_once() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path(), "fasta");
        layout.prepare().unwrap();
        let executor =
            LocalExecutor::new(DryRunLauncher::default(), &Fasta, &layout, LaunchOptions::default());

        let path = executor.stage(&Unit::new("a", "MKV")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), ">a\nMKV\n");

        // a staged input from an earlier run is kept as is
        fs::write(&path, ">a\nOLD\n").unwrap();
        executor.stage(&Unit::new("a", "MKV")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), ">a\nOLD\n");
    }

    /// format that starts writing and then gives up
    struct Truncating;

    impl RecordFormat for Truncating {
        fn extension(&self) -> &str {
            "fasta"
        }

        fn parse(&self, _bytes: &[u8]) -> Result<Vec<Unit>, FormatError> {
            Ok(Vec::new())
        }

        fn write(&self, _units: &[Unit], writer: &mut dyn Write) -> Result<(), FormatError> {
            writer.write_all(b">a\n")?;
            Err(FormatError::Write(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    #[test]
    fn failed_staging_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path(), "fasta");
        layout.prepare().unwrap();
        let executor = LocalExecutor::new(
            DryRunLauncher::default(),
            &Truncating,
            &layout,
            LaunchOptions::default(),
        );

        assert!(executor.stage(&Unit::new("a", "MKV")).is_err());
        assert_eq!(fs::read_dir(layout.staging()).unwrap().count(), 0);
    }

    #[test]
    fn staging_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        // staging directory is never created
        let layout = OutputLayout::new(dir.path(), "fasta");
        let executor =
            LocalExecutor::new(DryRunLauncher::default(), &Fasta, &layout, LaunchOptions::default());

        let summary = executor.execute(&units(&["a", "b"]));

        assert_eq!(summary.records.len(), 2);
        assert!(summary
            .records
            .iter()
            .all(|record| matches!(record.status, UnitStatus::StagingFailed(_))));
    }

    #[test]
    fn dry_run_marks_units_complete() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path(), "fasta");
        layout.prepare().unwrap();
        let executor =
            LocalExecutor::new(DryRunLauncher::default(), &Fasta, &layout, LaunchOptions::default());

        let summary = executor.execute(&units(&["a", "b"]));

        assert_eq!(summary.succeeded(), 2);
        assert!(layout.unit_output("a").is_dir());
        assert!(layout.staged_input("b").is_file());
    }
}
