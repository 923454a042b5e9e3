// src/browser/session.rs
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::browser::page::ChromePage;
use crate::utils::error::BrowserError;

// Desktop UA; the default headless one gets served a stripped page.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// How to start Chrome.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Show the browser window instead of running headless.
    pub headed: bool,
    /// Chrome binary; falls back to `CHROME_PATH`, then chromiumoxide's lookup.
    pub chrome_path: Option<PathBuf>,
    /// Per-command DevTools timeout.
    pub request_timeout: Option<Duration>,
}

/// One live Chrome process with a single tab. Owned by the run for its whole
/// lifetime and released through [`BrowserSession::close`].
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: ChromePage,
}

impl BrowserSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let config = build_config(options)?;
        tracing::info!("Launching Chrome (headed: {})", options.headed);

        let (browser, mut handler) = Browser::launch(config).await?;

        // The handler must be polled for any CDP traffic to flow
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("CDP handler event error: {}", e);
                }
            }
            tracing::debug!("CDP handler stream ended");
        });

        let page = browser.new_page("about:blank").await?;
        tracing::debug!("Opened blank tab");

        Ok(Self {
            browser,
            handler,
            page: ChromePage::new(page),
        })
    }

    pub fn page(&self) -> &ChromePage {
        &self.page
    }

    /// Closes Chrome and waits for the process and handler task to finish.
    pub async fn close(self) -> Result<(), BrowserError> {
        let BrowserSession { mut browser, mut handler, page } = self;
        drop(page);

        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            tracing::warn!("Waiting for Chrome to exit failed: {}", e);
        }
        if tokio::time::timeout(Duration::from_secs(5), &mut handler).await.is_err() {
            tracing::warn!("CDP handler did not stop; aborting it");
            handler.abort();
        }

        closed?;
        tracing::info!("Browser closed");
        Ok(())
    }
}

fn build_config(options: &LaunchOptions) -> Result<BrowserConfig, BrowserError> {
    let mut builder = BrowserConfig::builder()
        .window_size(WINDOW_SIZE.0, WINDOW_SIZE.1)
        .no_sandbox()
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--blink-settings=imagesEnabled=false")
        .arg(format!("--user-agent={}", USER_AGENT));

    if options.headed {
        builder = builder.with_head();
    }

    let chrome_path = options
        .chrome_path
        .clone()
        .or_else(|| std::env::var("CHROME_PATH").ok().map(PathBuf::from));
    if let Some(path) = chrome_path {
        tracing::debug!("Using Chrome binary at {}", path.display());
        builder = builder.chrome_executable(path);
    }

    if let Some(timeout) = options.request_timeout {
        builder = builder.request_timeout(timeout);
    }

    builder.build().map_err(BrowserError::Launch)
}
