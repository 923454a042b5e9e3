// src/browser/mod.rs
pub mod page;
pub mod session;

use std::time::Duration;

use crate::utils::error::{BrowserError, ExtractError};
pub use page::PageHandle;
pub use session::{BrowserSession, LaunchOptions};

/// Fixed-budget retry for page loads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub backoff: Duration,
    pub load_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(5),
            load_timeout: Duration::from_secs(30),
        }
    }
}

/// Navigates to `url`, retrying failed or timed-out loads with a fixed
/// backoff. Surfaces `NavigationFailure` once the budget is spent.
pub async fn goto_with_retry<P: PageHandle + ?Sized>(
    page: &P,
    url: &str,
    policy: &RetryPolicy,
) -> Result<(), ExtractError> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        tracing::info!("Navigating to URL (attempt {}/{}): {}", attempt, attempts, url);

        let outcome = match tokio::time::timeout(policy.load_timeout, page.goto(url)).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(policy.load_timeout)),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!("Page loaded: {}", url);
                return Ok(());
            }
            Err(e) if attempt < attempts => {
                tracing::warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, e, policy.backoff);
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => {
                tracing::error!("Attempt {} failed: {}", attempt, e);
            }
        }
    }

    Err(ExtractError::NavigationFailure {
        url: url.to_string(),
        attempts,
    })
}
