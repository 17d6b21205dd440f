//! File Server - read-only `GET /files/{*path}`
//!
//! Every request path is re-validated through the guard before anything is
//! opened, even though links are generated internally. All failures look
//! the same to the client: `404` with an empty body.

use crate::http::AppState;
use axum::body::Body;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chatdoc_security::{CanonicalPath, PathGuard};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Extensions served as downloads rather than displayed inline
const ATTACHMENT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "html", "htm", "csv", "pdf", "docx", "doc",
];

pub async fn serve_file(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    let Ok(Path(requested)) = path else {
        return not_found();
    };
    match open(&state.guard, &requested).await {
        Some(response) => response,
        None => not_found(),
    }
}

fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

async fn open(guard: &PathGuard, requested: &str) -> Option<Response> {
    if requested.is_empty() || requested.split(['/', '\\']).any(|s| s.starts_with('.')) {
        debug!("Refusing hidden or empty path");
        return None;
    }

    let path = match guard.validate_existing(requested) {
        Ok(path) => path,
        Err(_) => {
            warn!(path = %requested, "File request outside the allowed root");
            return None;
        }
    };

    let metadata = tokio::fs::metadata(path.as_path()).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    let file = tokio::fs::File::open(path.as_path()).await.ok()?;
    debug!(file = %path.relative().display(), bytes = metadata.len(), "Serving file");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type(&path))
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CONTENT_DISPOSITION, content_disposition(&path))
        .header(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"))
        .body(Body::from_stream(ReaderStream::new(file)))
        .ok()
}

fn content_type(path: &CanonicalPath) -> HeaderValue {
    let mime = mime_guess::from_path(path.as_path()).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

fn content_disposition(path: &CanonicalPath) -> HeaderValue {
    let name: String = path
        .as_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| (c.is_ascii_graphic() || *c == ' ') && *c != '"' && *c != '\\')
        .collect();
    let extension = path
        .as_path()
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let disposition = if ATTACHMENT_EXTENSIONS.contains(&extension.as_str()) {
        "attachment"
    } else {
        "inline"
    };
    HeaderValue::from_str(&format!("{}; filename=\"{}\"", disposition, name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
