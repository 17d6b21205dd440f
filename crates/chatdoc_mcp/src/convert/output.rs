//! Publishing generated bytes under a fresh name.
//!
//! Bytes are written to a hidden temp file in the destination directory,
//! then linked into place under the first free `{slug}_{NN}.{ext}` name.
//! The no-clobber persist is the claim on the name, so two concurrent
//! writers never share one and an existing file is never replaced. A
//! failed publish drops the temp file.

use super::ConversionError;
use chatdoc_protocol::naming::candidate_file_names;
use chatdoc_protocol::OutputFormat;
use chatdoc_security::{CanonicalPath, PathGuard};
use std::io::{self, Write};
use tracing::{debug, error};

const TEMP_PREFIX: &str = ".chatdoc-";
const TEMP_SUFFIX: &str = ".part";

pub fn publish(
    guard: &PathGuard,
    dir: &CanonicalPath,
    title: &str,
    format: OutputFormat,
    bytes: &[u8],
) -> Result<CanonicalPath, ConversionError> {
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir.as_path())
        .map_err(write_failed)?;
    temp.write_all(bytes).map_err(write_failed)?;
    temp.as_file().sync_all().map_err(write_failed)?;

    for name in candidate_file_names(title, format) {
        let target = guard.validate(dir.as_path().join(&name))?;
        match temp.persist_noclobber(target.as_path()) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(name = %name, "Name taken, trying next");
                temp = e.file;
            }
            Err(e) => return Err(write_failed(e.error)),
        }
    }

    error!(format = %format, "Every candidate file name is taken");
    Err(ConversionError::NamesExhausted)
}

fn write_failed(e: io::Error) -> ConversionError {
    error!(error = %e, "Failed to write output file");
    ConversionError::WriteFailed(e)
}
