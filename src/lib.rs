//! harchiver - HTTP Archive capture over the Chrome DevTools Protocol
//!
//! This crate drives a browser's remote debugging interface to record the
//! network traffic of one or more page loads and emit a HAR 1.2 archive.
//!
//! # Architecture
//!
//! ```text
//! Browser (CDP) ──▶ Session ──▶ NetworkRecorder ──▶ HAR entries
//!                      │              ▲
//!                      │  attach/detach per target
//!                      ▼              │
//!               target lifecycle   network events
//!               (created/destroyed)  (per request id)
//! ```
//!
//! The [`capture::Session`] discovers browser targets and keeps a
//! [`capture::NetworkRecorder`] listening on each; the recorder correlates
//! the per-request event fragments into finalized [`har::Entry`] records in
//! completion order. [`capture::run`] sequences navigations and assembles
//! the final [`har::Har`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use harchiver::browser::{BrowserConfig, BrowserController};
//! use harchiver::capture::{self, CaptureOptions, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = BrowserController::launch(BrowserConfig::default()).await?;
//!
//!     let session = Session::new(controller.browser());
//!     session.start().await?;
//!
//!     let options = CaptureOptions {
//!         urls: vec!["https://example.com".to_string()],
//!         ..Default::default()
//!     };
//!     let archive = capture::run(&session, &options).await?;
//!
//!     harchiver::har::io::write(&archive, std::io::stdout())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod capture;
pub mod error;
pub mod har;

// Re-exports for convenience
pub use browser::BrowserController;
pub use capture::{NetworkRecorder, Session};
pub use error::{Error, Result};
pub use har::Har;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
