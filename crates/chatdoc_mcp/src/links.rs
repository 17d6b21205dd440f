//! Link Resolver
//!
//! Turns a generated file into the reference shown to the client. Pure; no
//! filesystem access.

use crate::config::LinkMode;
use chatdoc_security::CanonicalPath;

/// Client-facing reference to a generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// Path or URL shown as the generated file
    pub display: String,
    /// Clickable form of `display`
    pub link: String,
    /// Whether `link` is served by this process
    pub is_http: bool,
}

impl FileReference {
    /// How the user should open the file
    pub fn open_hint(&self) -> &'static str {
        if self.is_http {
            "Click the link above to download the file."
        } else {
            "Copy the path above and open it in your file browser, or use the file:// link in an application that supports it."
        }
    }
}

pub fn resolve(file: &CanonicalPath, mode: &LinkMode) -> FileReference {
    let segments: Vec<String> = file
        .relative()
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    match mode {
        LinkMode::Http { base_url } => {
            let encoded: Vec<String> = segments
                .iter()
                .map(|s| urlencoding::encode(s).into_owned())
                .collect();
            let url = format!(
                "{}/files/{}",
                base_url.trim_end_matches('/'),
                encoded.join("/")
            );
            FileReference {
                display: url.clone(),
                link: url,
                is_http: true,
            }
        }
        LinkMode::Share { root } => {
            let path = share_path(root, &segments);
            let link = if path.starts_with("smb://") || path.starts_with(r"\\") {
                path.clone()
            } else {
                format!("file://{}", path)
            };
            FileReference {
                display: path,
                link,
                is_http: false,
            }
        }
        LinkMode::Local => {
            let path = file.as_path().to_string_lossy().into_owned();
            FileReference {
                link: format!("file://{}", path),
                display: path,
                is_http: false,
            }
        }
    }
}

/// Join `segments` onto a share root using the share's own separator.
fn share_path(root: &str, segments: &[String]) -> String {
    if root.starts_with(r"\\") {
        let mut path = root.trim_end_matches('\\').to_string();
        for segment in segments {
            path.push('\\');
            path.push_str(segment);
        }
        path
    } else {
        let mut path = root.trim_end_matches('/').to_string();
        for segment in segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }
}
