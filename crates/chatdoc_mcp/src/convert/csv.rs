//! CSV serialization of extracted rows.
//!
//! The only place cells cross into a spreadsheet-readable format, so the
//! only place [`sanitize_row`] runs. Each cell is sanitized exactly once.

use chatdoc_render::Rows;
use chatdoc_security::sanitize_row;

pub fn write_csv(rows: &Rows) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(sanitize_row(row))?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}
