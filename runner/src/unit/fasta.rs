use super::{FormatError, RecordFormat, Unit};
use std::io::Write;

/// FASTA records: a `>tag` header line followed by any number of payload lines
///
/// Payload lines are concatenated without line breaks. Lines before the first
/// header are ignored and a header without a tag (a lone `>`) is dropped, its
/// payload lines stay with the preceding record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fasta;

impl RecordFormat for Fasta {
    fn extension(&self) -> &str {
        "fasta"
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<Unit>, FormatError> {
        let text = std::str::from_utf8(bytes)?;
        let mut units = Vec::new();
        let mut current: Option<Unit> = None;

        for line in text.lines().map(str::trim) {
            if let Some(header) = line.strip_prefix('>') {
                let tag = header.trim();

                if tag.is_empty() {
                    continue;
                }

                units.extend(current.take());
                current = Some(Unit::new(tag, String::new()));
            } else if let Some(unit) = current.as_mut() {
                unit.payload.push_str(line);
            }
        }

        units.extend(current);

        Ok(units)
    }

    fn write(&self, units: &[Unit], writer: &mut dyn Write) -> Result<(), FormatError> {
        for unit in units {
            writeln!(writer, ">{}\n{}", unit.tag, unit.payload)?;
        }

        Ok(())
    }
}
