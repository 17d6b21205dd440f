//! Output file naming.

use crate::format::OutputFormat;

/// Maximum length of a title slug
pub const MAX_SLUG_LEN: usize = 50;

/// Highest sequence number tried before giving up on a name
pub const MAX_SEQUENCE: u32 = 999;

const FALLBACK_SLUG: &str = "document";

/// Turn a document title into a filesystem-safe stem.
///
/// Keeps ASCII alphanumerics; runs of whitespace or `-` become a single
/// `_`; everything else is dropped. The result is lowercase, never empty,
/// and at most [`MAX_SLUG_LEN`] characters.
pub fn title_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_sep = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    slug.truncate(MAX_SLUG_LEN);
    let trimmed = slug.trim_end_matches('_');
    trimmed.to_string()
}

/// File name for the `sequence`-th attempt at a title: `{slug}_{NN}.{ext}`.
pub fn sequenced_file_name(slug: &str, format: OutputFormat, sequence: u32) -> String {
    format!("{}_{:02}.{}", slug, sequence, format.extension())
}

/// Candidate names in the order they should be tried.
pub fn candidate_file_names(title: &str, format: OutputFormat) -> impl Iterator<Item = String> {
    let slug = title_slug(title);
    (0..=MAX_SEQUENCE).map(move |n| sequenced_file_name(&slug, format, n))
}
