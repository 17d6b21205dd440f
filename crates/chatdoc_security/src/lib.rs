//! Trust boundary for chat-a-doc.
//!
//! Untrusted input enters the filesystem and generated spreadsheets only
//! through this crate:
//!
//! - [`PathGuard`]: every read and write path is canonicalized and proven to
//!   lie under the allowed root before use
//! - [`formula`]: CSV cells are neutralized against formula injection

pub mod formula;
pub mod path_guard;

pub use formula::{sanitize_cell, sanitize_row, SanitizedCell, NEUTRALIZING_PREFIX};
pub use path_guard::{CanonicalPath, PathGuard, PathViolation, RootError, ViolationReason};
