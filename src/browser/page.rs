// src/browser/page.rs
use async_trait::async_trait;
use chromiumoxide::Page;
use crate::utils::error::BrowserError;

/// The handful of page operations extraction needs. Implemented for a live
/// Chrome tab and for in-memory fakes in tests.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigates to `url` and waits for the load event.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Current `document.body.scrollHeight`.
    async fn scroll_height(&self) -> Result<f64, BrowserError>;

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    /// Whether `selector` matches anything in the live DOM.
    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Serialized markup of the current document.
    async fn content(&self) -> Result<String, BrowserError>;
}

/// A tab in the session's Chrome instance.
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, expression: &str) -> Result<T, BrowserError> {
        let result = self.page.evaluate(expression).await?;
        result
            .into_value::<T>()
            .map_err(|e| BrowserError::Script(format!("`{}` returned unexpected value: {}", expression, e)))
    }
}

#[async_trait]
impl PageHandle for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn scroll_height(&self) -> Result<f64, BrowserError> {
        self.eval::<f64>("document.body ? document.body.scrollHeight : 0").await
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight); true")
            .await?;
        Ok(())
    }

    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        let expression = format!("document.querySelector({}) !== null", quoted);
        self.eval::<bool>(&expression).await
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.page.content().await?)
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory page used by extractor and pipeline tests.
    use super::*;
    use scraper::{Html, Selector};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakePage {
        routes: HashMap<String, String>,
        fallback: String,
        current: Mutex<String>,
        /// Markup served (once each) before falling back to routes.
        queued: Mutex<VecDeque<String>>,
        heights: Mutex<VecDeque<f64>>,
        failing_gotos: AtomicUsize,
        pub goto_calls: AtomicUsize,
        pub content_calls: AtomicUsize,
        pub scroll_calls: AtomicUsize,
        pub visited: Mutex<Vec<String>>,
    }

    impl FakePage {
        /// Serves `html` for every URL.
        pub fn with_html(html: &str) -> Self {
            Self { fallback: html.to_string(), ..Self::default() }
        }

        pub fn route(mut self, url: &str, html: &str) -> Self {
            self.routes.insert(url.to_string(), html.to_string());
            self
        }

        pub fn queue(self, html: &str) -> Self {
            self.queued.lock().unwrap().push_back(html.to_string());
            self
        }

        pub fn heights(self, heights: &[f64]) -> Self {
            self.heights.lock().unwrap().extend(heights.iter().copied());
            self
        }

        pub fn fail_gotos(self, count: usize) -> Self {
            self.failing_gotos.store(count, Ordering::SeqCst);
            self
        }

        pub fn calls(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }

        fn visible_html(&self) -> String {
            if let Some(html) = self.queued.lock().unwrap().front() {
                return html.clone();
            }
            let current = self.current.lock().unwrap();
            self.routes.get(current.as_str()).cloned().unwrap_or_else(|| self.fallback.clone())
        }
    }

    #[async_trait]
    impl PageHandle for FakePage {
        async fn goto(&self, url: &str) -> Result<(), BrowserError> {
            self.goto_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failing_gotos.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_gotos.store(remaining - 1, Ordering::SeqCst);
                return Err(BrowserError::Launch("simulated navigation failure".to_string()));
            }
            *self.current.lock().unwrap() = url.to_string();
            self.visited.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn scroll_height(&self) -> Result<f64, BrowserError> {
            let mut heights = self.heights.lock().unwrap();
            // The last height sticks once the script runs out.
            if heights.len() > 1 {
                Ok(heights.pop_front().unwrap_or_default())
            } else {
                Ok(heights.front().copied().unwrap_or(1000.0))
            }
        }

        async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
            self.scroll_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
            let selector = Selector::parse(selector)
                .map_err(|e| BrowserError::Script(format!("bad selector {selector}: {e:?}")))?;
            let document = Html::parse_document(&self.visible_html());
            let found = document.select(&selector).next().is_some();
            Ok(found)
        }

        async fn content(&self) -> Result<String, BrowserError> {
            self.content_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(html) = self.queued.lock().unwrap().pop_front() {
                return Ok(html);
            }
            Ok(self.visible_html())
        }
    }
}
