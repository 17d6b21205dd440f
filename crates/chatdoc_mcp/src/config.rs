//! Server configuration.
//!
//! [`Settings`] holds the raw values as they arrive from flags or the
//! environment; [`ServerConfig::new`] validates them once at startup. Any
//! failure here is fatal.

use chatdoc_security::{PathGuard, RootError};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Default cap on a single `POST /` body
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Startup configuration failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Root(#[from] RootError),

    #[error("USE_HTTP_LINKS is enabled but HTTP_BASE_URL is not set")]
    MissingBaseUrl,

    #[error("HTTP_BASE_URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),
}

/// What to do when a docx/pdf request names no template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Use the only template implicitly; ask for a choice when there are several
    #[default]
    Single,
    /// Always require a choice
    Explicit,
    /// Use the first template in listing order
    First,
}

impl SelectionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Explicit => "explicit",
            Self::First => "first",
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown template selection policy '{0}'. Expected one of: single, explicit, first")]
pub struct UnknownPolicy(pub String);

impl FromStr for SelectionPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "explicit" => Ok(Self::Explicit),
            "first" => Ok(Self::First),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// How generated files are referenced in tool results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMode {
    /// URLs served by the file server under `{base_url}/files/`
    Http { base_url: String },
    /// Paths on a network share (`smb://`, UNC, or a mounted path)
    Share { root: String },
    /// Absolute paths on this machine
    Local,
}

/// Raw settings, before validation
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub allowed_root: Option<PathBuf>,
    pub use_http_links: bool,
    pub http_base_url: Option<String>,
    pub link_root: Option<String>,
    pub template_selection: SelectionPolicy,
    pub max_request_bytes: Option<usize>,
}

/// Validated server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name (reported in initialize)
    pub server_name: String,

    /// Server version (reported in initialize)
    pub server_version: String,

    /// Guard over the allowed root
    pub guard: PathGuard,

    pub links: LinkMode,

    pub template_selection: SelectionPolicy,

    /// Maximum accepted request body in bytes
    pub max_request_bytes: usize,
}

impl ServerConfig {
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        let root = settings.allowed_root.unwrap_or_default();
        let guard = PathGuard::new(root)?;

        let base_url = settings
            .http_base_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        if let Some(url) = &base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidBaseUrl(url.clone()));
            }
        }

        let link_root = settings
            .link_root
            .map(|root| root.trim().to_string())
            .filter(|root| !root.is_empty());

        let links = if settings.use_http_links {
            let base_url = base_url.ok_or(ConfigError::MissingBaseUrl)?;
            if link_root.is_some() {
                warn!("Both USE_HTTP_LINKS and LINK_ROOT are set; using HTTP links");
            }
            LinkMode::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
            }
        } else if let Some(root) = link_root {
            LinkMode::Share { root }
        } else {
            LinkMode::Local
        };

        Ok(Self {
            server_name: "chat-a-doc".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            guard,
            links,
            template_selection: settings.template_selection,
            max_request_bytes: settings
                .max_request_bytes
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
        })
    }
}
