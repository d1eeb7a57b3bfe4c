//! Page navigation
//!
//! URL validation, navigation with a timeout, and the document-body readiness
//! wait the capture orchestrator relies on before moving to the next URL.

use crate::error::{Error, NavigationError, Result};
use chromiumoxide::Page;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Check that a string is an absolute URL with a scheme.
///
/// Navigation accepts whatever the browser accepts; this only rejects input
/// that cannot be a URL at all, so a bad argument fails before a browser is
/// ever started.
pub fn validate_url(raw: &str) -> Result<()> {
    match url::Url::parse(raw) {
        Ok(_) => Ok(()),
        Err(e) => Err(NavigationError::InvalidUrl(format!("{raw}: {e}")).into()),
    }
}

/// Drives navigations on a page
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate to a URL and wait until the document body exists.
    #[instrument(skip(page))]
    pub async fn goto(page: &Page, url: &str, timeout: Duration) -> Result<()> {
        info!(url, "navigating");

        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| NavigationError::LoadFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Self::wait_ready(page, timeout).await?;
        debug!(url, "navigation complete");
        Ok(())
    }

    /// Resolve once `document.body` is present.
    async fn wait_ready(page: &Page, timeout: Duration) -> Result<()> {
        let script = r#"
            new Promise(resolve => {
                function check() {
                    if (document.body) {
                        resolve(true);
                    } else {
                        requestAnimationFrame(check);
                    }
                }
                check();
            })
        "#;

        tokio::time::timeout(timeout, page.evaluate(script))
            .await
            .map_err(|_| NavigationError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| Error::cdp(e.to_string()))?;

        Ok(())
    }
}
