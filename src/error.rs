//! Error types for harchiver
//!
//! This module provides the error type hierarchy using `thiserror`,
//! covering browser control, capture sessions, and archive handling.

use thiserror::Error;

/// The main error type for harchiver operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Capture session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// HAR archive errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Failed to connect to a remote debugging endpoint
    #[error("Failed to connect to CDP endpoint {endpoint}: {message}")]
    ConnectFailed {
        /// The websocket endpoint that refused us
        endpoint: String,
        /// Underlying error message
        message: String,
    },

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// No launch or connect option was provided
    #[error("No browser specified: provide a CDP endpoint, an executable path, or both")]
    NoBrowser,
}

/// Capture session errors (target lifecycle management)
#[derive(Error, Debug)]
pub enum SessionError {
    /// The auto-attach directive could not be set; the session cannot start
    #[error("Failed to set target auto-attach: {0}")]
    AutoAttach(String),

    /// Subscribing to target lifecycle events failed
    #[error("Failed to subscribe to target events: {0}")]
    TargetEvents(String),

    /// No page-type target was available to capture from
    #[error("No listenable page target exists")]
    NoTarget,

    /// Enabling network tracking on a target failed
    #[error("Failed to enable network tracking on target {target_id}: {message}")]
    NetworkEnable {
        /// The target that refused tracking
        target_id: String,
        /// Underlying error message
        message: String,
    },
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed for {url}: {message}")]
    LoadFailed {
        /// The URL that failed to load
        url: String,
        /// Underlying error message
        message: String,
    },
}

/// HAR archive read/write errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Reading an archive file failed
    #[error("Failed to read archive {path}: {message}")]
    ReadFailed {
        /// Path of the offending file
        path: String,
        /// Underlying error message
        message: String,
    },

    /// Archive JSON did not parse
    #[error("Failed to parse archive: {0}")]
    ParseFailed(String),

    /// Writing an archive failed
    #[error("Failed to write archive: {0}")]
    WriteFailed(String),
}

/// Result type alias for harchiver operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Browser(BrowserError::LaunchFailed("no chrome".to_string()));
        assert!(err.to_string().contains("Failed to launch browser"));
        assert!(err.to_string().contains("no chrome"));
    }

    #[test]
    fn test_session_error() {
        let err = SessionError::AutoAttach("connection reset".to_string());
        assert!(err.to_string().contains("auto-attach"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_network_enable_error() {
        let err = SessionError::NetworkEnable {
            target_id: "ABC123".to_string(),
            message: "target closed".to_string(),
        };
        assert!(err.to_string().contains("ABC123"));
        assert!(err.to_string().contains("target closed"));
    }

    #[test]
    fn test_navigation_error() {
        let err = NavigationError::LoadFailed {
            url: "https://example.com".to_string(),
            message: "net::ERR_FAILED".to_string(),
        };
        assert!(err.to_string().contains("https://example.com"));
        assert!(err.to_string().contains("net::ERR_FAILED"));
    }

    #[test]
    fn test_archive_error() {
        let err = ArchiveError::ParseFailed("unexpected EOF".to_string());
        assert!(err.to_string().contains("unexpected EOF"));
    }

    #[test]
    fn test_generic_error() {
        let err = Error::generic("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }
}
