// src/extractors/table.rs

// --- Imports ---
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::browser::PageHandle;
use crate::extractors::rows::{self, ExtractionResult, RowShape};
use crate::utils::error::{BrowserError, ExtractError};

// --- Constants ---
/// Header text used for the synthetic row-number column.
pub const RANK_PLACEHOLDER: &str = "#";
/// Extraction attempts when the header row comes back blank.
pub const MAX_ATTEMPTS: usize = 2;
/// How many leading headers must be blank before the page counts as still loading.
const BLANK_HEADER_PROBE: usize = 3;

pub const DEFAULT_CONTAINER_CLASS: &str = "table-scroll";
pub const DEFAULT_READY_SELECTOR: &str = "table.table-stats tbody tr, table#leadersTable tbody tr";
pub const DEFAULT_TABLE_FALLBACKS: [&str; 2] = ["table.table-stats", "table#leadersTable"];

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table").expect("Failed to compile TABLE_SELECTOR")
});

static HEADER_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("thead th").expect("Failed to compile HEADER_SELECTOR")
});

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("tbody tr").expect("Failed to compile ROW_SELECTOR")
});

static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("td, th").expect("Failed to compile CELL_SELECTOR")
});

// --- Data Structures ---

/// Where the leaderboard lives on a page.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    /// Class of the element wrapping the table.
    pub container_class: String,
    /// Selector whose presence means rows have rendered.
    pub ready_selector: String,
    /// Tried in order when the container is absent.
    pub table_fallbacks: Vec<String>,
    /// Debug cap on body rows processed per table.
    pub row_cap: Option<usize>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            ready_selector: DEFAULT_READY_SELECTOR.to_string(),
            table_fallbacks: DEFAULT_TABLE_FALLBACKS.iter().map(|s| s.to_string()).collect(),
            row_cap: None,
        }
    }
}

impl LocatorConfig {
    pub fn container_selector(&self) -> String {
        format!(".{}", self.container_class)
    }

    /// Either the container or rendered rows is enough to start parsing.
    fn readiness_selector(&self) -> String {
        format!("{}, {}", self.container_selector(), self.ready_selector)
    }
}

/// Timing knobs for the scroll and wait phases.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub scroll_attempts: usize,
    pub scroll_settle: Duration,
    /// Height delta below which the page is considered done growing.
    pub height_threshold: f64,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            scroll_attempts: 3,
            scroll_settle: Duration::from_secs(3),
            height_threshold: 200.0,
            ready_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

// --- Main Extractor Structure ---
#[derive(Debug, Clone, Default)]
pub struct TableExtractor {
    settings: ExtractorSettings,
}

impl TableExtractor {
    pub fn new(settings: ExtractorSettings) -> Self {
        Self { settings }
    }

    /// Extracts the leaderboard from an already-navigated page.
    ///
    /// A blank header row usually means the table is still rendering, so
    /// the whole sequence (scroll, wait, parse) runs again once before
    /// giving up with `HeadersEmpty`.
    pub async fn extract<P: PageHandle + ?Sized>(
        &self,
        page: &P,
        locator: &LocatorConfig,
    ) -> Result<ExtractionResult, ExtractError> {
        for attempt in 1..=MAX_ATTEMPTS {
            self.scroll_until_stable(page).await?;
            self.wait_until_ready(page, locator).await?;

            let html = page.content().await?;
            match parse_table(&html, locator) {
                Err(ExtractError::HeadersEmpty { .. }) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!("Headers blank on attempt {}; page likely still loading, retrying", attempt);
                }
                Err(ExtractError::HeadersEmpty { .. }) => {
                    return Err(ExtractError::HeadersEmpty { attempts: attempt });
                }
                other => return other,
            }
        }

        Err(ExtractError::HeadersEmpty { attempts: MAX_ATTEMPTS })
    }

    /// Scrolls to the bottom to trigger lazy loading, stopping once the
    /// page height stops growing.
    async fn scroll_until_stable<P: PageHandle + ?Sized>(&self, page: &P) -> Result<(), BrowserError> {
        let mut last_height = page.scroll_height().await?;
        for i in 0..self.settings.scroll_attempts {
            tracing::debug!("Scrolling down, attempt {}", i + 1);
            page.scroll_to_bottom().await?;
            tokio::time::sleep(self.settings.scroll_settle).await;

            let new_height = page.scroll_height().await?;
            if (new_height - last_height).abs() < self.settings.height_threshold {
                tracing::debug!("Page height settled at {}", new_height);
                break;
            }
            last_height = new_height;
        }
        Ok(())
    }

    async fn wait_until_ready<P: PageHandle + ?Sized>(
        &self,
        page: &P,
        locator: &LocatorConfig,
    ) -> Result<(), ExtractError> {
        let selector = locator.readiness_selector();
        let started = Instant::now();
        tracing::info!("Waiting for {} to appear...", selector);

        loop {
            if page.has_element(&selector).await? {
                tracing::debug!("Content ready after {:?}", started.elapsed());
                return Ok(());
            }
            if started.elapsed() >= self.settings.ready_timeout {
                return Err(ExtractError::ReadinessTimeout {
                    selector,
                    waited: self.settings.ready_timeout,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

/// Parses the leaderboard out of serialized page markup.
pub fn parse_table(html: &str, locator: &LocatorConfig) -> Result<ExtractionResult, ExtractError> {
    let document = Html::parse_document(html);
    let table = find_table(&document, locator)?;

    let headers = read_headers(table);
    if headers_unusable(&headers) {
        tracing::warn!("Unusable header row: {:?}", headers);
        return Err(ExtractError::HeadersEmpty { attempts: 1 });
    }
    tracing::info!("Headers found: {:?}", headers);

    let row_limit = locator.row_cap.unwrap_or(usize::MAX);
    if let Some(cap) = locator.row_cap {
        tracing::warn!("Row cap active: processing at most {} rows", cap);
    }

    let mut records = Vec::new();
    let mut malformed = 0usize;
    let mut unnamed = 0usize;
    for row in table.select(&ROW_SELECTOR).take(row_limit) {
        let cells: Vec<String> = row.select(&CELL_SELECTOR).map(cell_text).collect();

        match rows::classify_row(&cells, headers.len()) {
            RowShape::Malformed => {
                tracing::trace!("Dropping short row ({} cells): {:?}", cells.len(), cells);
                malformed += 1;
            }
            RowShape::Aligned(offset) => {
                let record = rows::build_record(&headers, &cells, offset);
                if rows::has_name(&record) {
                    records.push(record);
                } else {
                    unnamed += 1;
                }
            }
        }
    }

    tracing::info!(
        "Found {} data rows ({} short, {} without a name)",
        records.len(),
        malformed,
        unnamed
    );
    Ok(ExtractionResult { headers, records })
}

/// Outer markup of the table `parse_table` would use, for debug artifacts.
pub fn locate_table_html(html: &str, locator: &LocatorConfig) -> Option<String> {
    let document = Html::parse_document(html);
    find_table(&document, locator).ok().map(|table| table.html())
}

fn find_table<'a>(document: &'a Html, locator: &LocatorConfig) -> Result<ElementRef<'a>, ExtractError> {
    let container_selector = locator.container_selector();
    let container = Selector::parse(&container_selector)
        .map_err(|e| ExtractError::TableNotFound(format!("invalid container selector {}: {:?}", container_selector, e)))?;

    if let Some(container) = document.select(&container).next() {
        tracing::debug!("Found {}", container_selector);
        return container
            .select(&TABLE_SELECTOR)
            .next()
            .ok_or_else(|| ExtractError::TableNotFound(format!("no <table> inside {}", container_selector)));
    }

    for fallback in &locator.table_fallbacks {
        let Ok(selector) = Selector::parse(fallback) else {
            tracing::warn!("Skipping invalid fallback selector: {}", fallback);
            continue;
        };
        if let Some(table) = document.select(&selector).next() {
            tracing::debug!("No {} container; using fallback {}", container_selector, fallback);
            return Ok(table);
        }
    }

    Err(ExtractError::TableNotFound(format!(
        "no {} container and no fallback table ({})",
        container_selector,
        locator.table_fallbacks.join(", ")
    )))
}

fn read_headers(table: ElementRef) -> Vec<String> {
    table
        .select(&HEADER_SELECTOR)
        .map(cell_text)
        .filter(|text| text != RANK_PLACEHOLDER)
        .collect()
}

fn headers_unusable(headers: &[String]) -> bool {
    headers.is_empty() || headers.iter().take(BLANK_HEADER_PROBE).all(|h| h.is_empty())
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}
