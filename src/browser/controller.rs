//! Browser lifecycle management
//!
//! Launching a local Chrome or connecting to a running one over its remote
//! debugging websocket, plus shutdown.

use crate::error::{BrowserError, Error, Result};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Enable sandbox (default: true)
    pub sandbox: bool,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Suppress the most common automation fingerprints (default: false)
    pub stealth: bool,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chrome_path: None,
            stealth: false,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Create a new config builder
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }
}

/// Builder for BrowserConfig
#[derive(Default)]
pub struct BrowserConfigBuilder {
    config: BrowserConfig,
}

impl BrowserConfigBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Enable/disable stealth flags
    pub fn stealth(mut self, stealth: bool) -> Self {
        self.config.stealth = stealth;
        self
    }

    /// Add extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    /// Build the config
    pub fn build(self) -> BrowserConfig {
        self.config
    }
}

/// A running browser connection and its CDP event drive task
#[derive(Debug)]
pub struct BrowserController {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

impl BrowserController {
    /// Launch a local Chrome instance.
    #[instrument(skip(config))]
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        info!(headless = config.headless, "launching browser");

        let mut builder = CdpBrowserConfig::builder();

        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.arg("--no-sandbox");
        }
        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if config.stealth {
            builder = builder.arg("--disable-blink-features=AutomationControlled");
        }
        for arg in &config.extra_args {
            builder = builder.arg(arg.as_str());
        }

        let cdp_config = builder
            .build()
            .map_err(|e| BrowserError::ConfigError(e.to_string()))?;

        let (browser, handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        Ok(Self::drive(browser, handler))
    }

    /// Connect to a running browser's remote debugging websocket endpoint.
    #[instrument]
    pub async fn connect(endpoint: &str) -> Result<Self> {
        info!(endpoint, "connecting to browser");

        let (browser, handler) = Browser::connect(endpoint)
            .await
            .map_err(|e| BrowserError::ConnectFailed {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::drive(browser, handler))
    }

    /// Connect to `endpoint` when given, falling back to a local launch when
    /// the config names an executable. With neither, there is no browser.
    pub async fn connect_or_launch(
        endpoint: Option<&str>,
        config: BrowserConfig,
    ) -> Result<Self> {
        match endpoint {
            Some(endpoint) => match Self::connect(endpoint).await {
                Ok(controller) => Ok(controller),
                Err(e) if config.chrome_path.is_some() => {
                    warn!(error = %e, "CDP connect failed, falling back to local browser");
                    Self::launch(config).await
                }
                Err(e) => Err(e),
            },
            None if config.chrome_path.is_some() => Self::launch(config).await,
            None => Err(BrowserError::NoBrowser.into()),
        }
    }

    fn drive(browser: Browser, mut handler: chromiumoxide::Handler) -> Self {
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("browser handler event error");
                    break;
                }
            }
            debug!("browser handler finished");
        });

        Self {
            browser: Arc::new(browser),
            handler: handler_task,
        }
    }

    /// Shared handle to the underlying browser connection
    pub fn browser(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    /// Create a new page/tab
    #[instrument(skip(self))]
    pub async fn new_page(&self, url: &str) -> Result<Page> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;
        debug!("created new page");
        Ok(page)
    }

    /// Close the browser.
    ///
    /// Graceful close needs exclusive ownership of the connection; callers
    /// must drop session handles first. A still-shared connection is left to
    /// its drop cleanup.
    #[instrument(skip(self))]
    pub async fn close(self) -> Result<()> {
        info!("closing browser");

        match Arc::try_unwrap(self.browser) {
            Ok(mut browser) => {
                browser
                    .close()
                    .await
                    .map_err(|e| Error::cdp(e.to_string()))?;
            }
            Err(_) => warn!("browser connection still shared, skipping graceful close"),
        }

        let _ = tokio::time::timeout(Duration::from_secs(5), self.handler).await;

        info!("browser closed");
        Ok(())
    }
}
