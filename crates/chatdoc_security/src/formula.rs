//! Spreadsheet formula-injection protection for CSV cells.
//!
//! Cells beginning with `=`, `+`, `-` or `@` are evaluated as formulas by
//! Excel, LibreOffice and Google Sheets. Such cells get a leading tab so
//! the application treats them as text.
//!
//! CSV writers accept [`SanitizedCell`] rather than raw strings; the only
//! way to build one is [`SanitizedCell::new`], which applies the prefix
//! exactly once.

use std::borrow::Cow;

/// Leading characters that make a spreadsheet evaluate a cell
pub const FORMULA_TRIGGERS: [char; 4] = ['=', '+', '-', '@'];

/// Character prepended to neutralize a trigger
pub const NEUTRALIZING_PREFIX: char = '\t';

/// True if a spreadsheet would evaluate `cell` as a formula
pub fn is_formula(cell: &str) -> bool {
    cell.starts_with(FORMULA_TRIGGERS)
}

/// Neutralize a single cell.
///
/// Cells that do not start with a trigger are returned unchanged. An
/// already neutralized cell starts with the prefix, not a trigger, so
/// applying this twice never stacks prefixes.
pub fn sanitize_cell(cell: &str) -> Cow<'_, str> {
    if is_formula(cell) {
        let mut out = String::with_capacity(cell.len() + 1);
        out.push(NEUTRALIZING_PREFIX);
        out.push_str(cell);
        Cow::Owned(out)
    } else {
        Cow::Borrowed(cell)
    }
}

/// A cell that has been through [`sanitize_cell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedCell(String);

impl SanitizedCell {
    pub fn new(raw: &str) -> Self {
        Self(sanitize_cell(raw).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<[u8]> for SanitizedCell {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Sanitize every cell of a row
pub fn sanitize_row<S: AsRef<str>>(row: &[S]) -> Vec<SanitizedCell> {
    row.iter().map(|cell| SanitizedCell::new(cell.as_ref())).collect()
}
