pub mod fasta;

use std::{io::Write, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Record data is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Failed to write records")]
    Write(#[from] std::io::Error),
}

/// A single item of work, e.g., one sequence to be folded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// unique within a batch, names both the output directory and the staged input
    pub tag: String,
    /// handed to the external computation as-is
    pub payload: String,
}

impl Unit {
    pub fn new(tag: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: payload.into(),
        }
    }

    /// check if the tag can be used as a single path component
    pub fn has_path_safe_tag(&self) -> bool {
        let tag = self.tag.as_str();

        !tag.is_empty()
            && tag != "."
            && tag != ".."
            && !tag.contains(['/', '\\', '\0'])
            && Path::new(tag).file_name().is_some()
    }
}

/// Serialization collaborator for units, this keeps the catalog and executor
/// independent of the concrete file format
pub trait RecordFormat {
    /// file extension used for staged inputs (without the leading dot)
    fn extension(&self) -> &str;

    /// parse all records contained in `bytes`, in order of appearance
    fn parse(&self, bytes: &[u8]) -> Result<Vec<Unit>, FormatError>;

    fn write(&self, units: &[Unit], writer: &mut dyn Write) -> Result<(), FormatError>;
}
