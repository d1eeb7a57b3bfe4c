//! Capture engine: network event recording, target lifecycle, orchestration
//!
//! [`NetworkRecorder`] folds raw CDP network notifications into finalized HAR
//! entries, [`Session`] keeps it attached to every live page target, and
//! [`run`] drives a list of navigations and assembles the archive.

pub mod recorder;
pub mod session;

pub use recorder::{
    FinishedRequest, LoadingFailed, LoadingFinished, NetworkEvent, NetworkRecorder,
    RequestWillBeSent, ResponseReceived,
};
pub use session::Session;

use crate::browser::PageNavigator;
use crate::error::{Error, Result, SessionError};
use crate::har::Har;
use chromiumoxide::cdp::browser_protocol::network::EnableParams;
use std::time::Duration;
use tracing::{info, instrument};

/// Options for a navigation-driven capture run
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// URLs to visit, in order
    pub urls: Vec<String>,
    /// Per-navigation timeout
    pub timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Drive a sequence of navigations on the session's top-level target and
/// assemble the archive.
///
/// The session must already be started so listeners are in place before the
/// first navigation. A navigation failure aborts the remaining sequence and
/// surfaces to the caller; entries captured up to that point stay available
/// through [`Session::archive`] for a best-effort flush.
#[instrument(skip(session, options), fields(urls = options.urls.len()))]
pub async fn run(session: &Session, options: &CaptureOptions) -> Result<Har> {
    let pages = session
        .browser()
        .pages()
        .await
        .map_err(|e| Error::cdp(e.to_string()))?;
    let page = pages.into_iter().next().ok_or(SessionError::NoTarget)?;

    // Idempotent re-enable; the ordering that matters is that listeners were
    // attached before any navigation below.
    page.execute(EnableParams::default())
        .await
        .map_err(|e| SessionError::NetworkEnable {
            target_id: page.target_id().inner().clone(),
            message: e.to_string(),
        })?;

    for url in &options.urls {
        PageNavigator::goto(&page, url, options.timeout).await?;
    }

    info!(
        entries = session.entries().len(),
        "navigation sequence complete"
    );
    Ok(session.archive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_options_default() {
        let opts = CaptureOptions::default();
        assert!(opts.urls.is_empty());
        assert_eq!(opts.timeout, Duration::from_secs(30));
    }
}
