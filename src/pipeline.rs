// src/pipeline.rs
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use crate::browser::{goto_with_retry, PageHandle, RetryPolicy};
use crate::config::{Destination, Target};
use crate::extractors::table::locate_table_html;
use crate::extractors::{ExtractionResult, ExtractorSettings, LocatorConfig, TableExtractor};
use crate::storage::{ExportInfo, SheetsClient, StorageManager, Table};
use crate::utils::error::ExtractError;
use crate::utils::{html_debug, AppError};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub extractor: ExtractorSettings,
    pub retry: RetryPolicy,
    /// Applies to every target when set; overrides per-target caps.
    pub row_cap: Option<usize>,
    /// Save annotated page markup for every extraction.
    pub debug: bool,
    /// Random pause between targets, inclusive bounds.
    pub delay_range: (Duration, Duration),
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            extractor: ExtractorSettings::default(),
            retry: RetryPolicy::default(),
            row_cap: None,
            debug: false,
            delay_range: (Duration::from_secs(2), Duration::from_secs(4)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    Exported { rows: usize },
    /// Nothing scraped; the destination was left alone.
    Empty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Pages and source URLs gathered for one target.
#[derive(Debug, Default)]
pub struct Collected {
    pub pages: Vec<ExtractionResult>,
    pub urls: Vec<String>,
}

impl Collected {
    pub fn record_count(&self) -> usize {
        self.pages.iter().map(|p| p.records.len()).sum()
    }
}

/// Runs extraction and export for each configured target against one page.
pub struct Pipeline<'a, P: PageHandle + ?Sized> {
    page: &'a P,
    storage: &'a StorageManager,
    sheets: Option<&'a SheetsClient>,
    extractor: TableExtractor,
    options: PipelineOptions,
}

impl<'a, P: PageHandle + ?Sized> Pipeline<'a, P> {
    pub fn new(
        page: &'a P,
        storage: &'a StorageManager,
        sheets: Option<&'a SheetsClient>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            page,
            storage,
            sheets,
            extractor: TableExtractor::new(options.extractor.clone()),
            options,
        }
    }

    /// Processes every target in order. A failing target is logged and
    /// skipped; it never stops the run.
    pub async fn run(&self, targets: &[Target]) -> RunSummary {
        let mut summary = RunSummary::default();

        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            tracing::info!("Processing {} ({})...", target.name, target.destination);

            match self.run_target(target).await {
                Ok(TargetOutcome::Exported { rows }) => {
                    tracing::info!("Finished {}: {} rows exported", target.name, rows);
                    summary.succeeded += 1;
                }
                Ok(TargetOutcome::Empty) => {
                    tracing::warn!("No data rows found for {}. Skipping...", target.name);
                    summary.empty += 1;
                }
                Err(e) => {
                    tracing::error!("Target {} failed at {} stage: {}", target.name, e.stage(), e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    pub async fn run_target(&self, target: &Target) -> Result<TargetOutcome, AppError> {
        self.check_destination(target)?;

        let collected = self.collect(target).await?;
        let mut table = Table::from_pages(&collected.pages);
        if table.is_empty() {
            return Ok(TargetOutcome::Empty);
        }

        table.sort_by_team_and_name();
        self.export(target, &table, &collected).await?;
        Ok(TargetOutcome::Exported { rows: table.rows.len() })
    }

    /// Extracts a single page, or walks `{page}` from 1 until a page comes
    /// back empty.
    pub async fn collect(&self, target: &Target) -> Result<Collected, AppError> {
        let locator = target.locator(self.options.row_cap);
        let mut collected = Collected::default();

        if !target.is_paginated() {
            let url = target.url_for_page(None)?;
            let result = self.extract_url(target, &url, &locator, true).await?;
            collected.pages.push(result);
            collected.urls.push(url);
            return Ok(collected);
        }

        let max_pages = target.max_pages();
        for page in 1..=max_pages {
            let url = target.url_for_page(Some(page))?;
            match self.extract_url(target, &url, &locator, page == 1).await {
                Ok(result) if result.is_empty() => {
                    tracing::info!("Page {} of {} is empty; assuming past the last page", page, target.name);
                    return Ok(collected);
                }
                Ok(result) => {
                    collected.pages.push(result);
                    collected.urls.push(url);
                    tracing::info!("Page {} complete, total records: {}", page, collected.record_count());
                }
                // Past the last page the site renders no rows at all.
                Err(ExtractError::ReadinessTimeout { .. }) if page > 1 => {
                    tracing::info!("No rows rendered on page {} of {}; assuming past the last page", page, target.name);
                    return Ok(collected);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!("Stopped {} at the {} page limit", target.name, max_pages);
        Ok(collected)
    }

    async fn extract_url(
        &self,
        target: &Target,
        url: &str,
        locator: &LocatorConfig,
        expect_rows: bool,
    ) -> Result<ExtractionResult, ExtractError> {
        goto_with_retry(self.page, url, &self.options.retry).await?;
        let outcome = self.extractor.extract(self.page, locator).await;

        if self.options.debug {
            self.save_annotated_page(target, locator).await;
        }
        match &outcome {
            // A timeout past the first page ends pagination; nothing to debug.
            Err(ExtractError::ReadinessTimeout { .. }) if !expect_rows => {}
            Err(e @ (ExtractError::ReadinessTimeout { .. } | ExtractError::TableNotFound(_))) => {
                tracing::error!("{} on {}: {}", target.name, url, e);
                self.save_page_markup(target).await;
            }
            Err(e @ ExtractError::HeadersEmpty { .. }) => {
                tracing::error!("{} on {}: {}", target.name, url, e);
                self.save_table_markup(target, locator).await;
            }
            Ok(result) if result.is_empty() && expect_rows => {
                self.save_table_markup(target, locator).await;
            }
            _ => {}
        }

        outcome
    }

    fn check_destination(&self, target: &Target) -> Result<(), AppError> {
        if matches!(target.destination, Destination::Sheet { .. }) && self.sheets.is_none() {
            return Err(AppError::Config(format!(
                "{} exports to Google Sheets but no token was given (--sheets-token / GOOGLE_SHEETS_TOKEN)",
                target.name
            )));
        }
        Ok(())
    }

    async fn export(&self, target: &Target, table: &Table, collected: &Collected) -> Result<(), AppError> {
        match &target.destination {
            Destination::Csv { file } => {
                self.storage.save_csv(file, table)?;
                let info = ExportInfo {
                    target: &target.name,
                    source_urls: &collected.urls,
                    pages: collected.pages.len(),
                };
                if let Err(e) = self.storage.save_metadata(file, table, &info) {
                    tracing::error!("Failed to save metadata for {}: {}", target.name, e);
                }
            }
            Destination::Sheet { spreadsheet, tab } => {
                let sheets = self.sheets.ok_or_else(|| {
                    AppError::Config(format!("{} needs a Sheets client", target.name))
                })?;
                sheets.replace_tab(spreadsheet, tab, table).await?;
            }
        }
        Ok(())
    }

    async fn pause(&self) {
        let (min, max) = self.options.delay_range;
        let delay = if max > min {
            Duration::from_secs_f64(rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64()))
        } else {
            min
        };
        if !delay.is_zero() {
            tracing::debug!("Sleeping {:?} before next target", delay);
            tokio::time::sleep(delay).await;
        }
    }

    fn debug_dir(&self, target: &Target) -> PathBuf {
        self.storage.base_dir().join("debug").join(file_safe(&target.name))
    }

    async fn save_page_markup(&self, target: &Target) {
        match self.page.content().await {
            Ok(html) => {
                if let Err(e) = html_debug::write_artifact(&self.debug_dir(target), html_debug::PAGE_DEBUG_FILE, &html) {
                    tracing::warn!("Could not save page markup for {}: {}", target.name, e);
                }
            }
            Err(e) => tracing::warn!("Could not read page markup for {}: {}", target.name, e),
        }
    }

    async fn save_table_markup(&self, target: &Target, locator: &LocatorConfig) {
        let html = match self.page.content().await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Could not read page markup for {}: {}", target.name, e);
                return;
            }
        };
        let table_html = locate_table_html(&html, locator).unwrap_or(html);
        if let Err(e) = html_debug::write_artifact(&self.debug_dir(target), html_debug::TABLE_DEBUG_FILE, &table_html) {
            tracing::warn!("Could not save table markup for {}: {}", target.name, e);
        }
    }

    async fn save_annotated_page(&self, target: &Target, locator: &LocatorConfig) {
        let html = match self.page.content().await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Could not read page markup for {}: {}", target.name, e);
                return;
            }
        };
        let path = self.debug_dir(target).join(html_debug::ANNOTATED_DEBUG_FILE);
        let patterns = html_debug::table_patterns(&locator.container_class);
        if let Err(e) = html_debug::create_debug_html(&html, &path, &patterns) {
            tracing::warn!("Failed to create debug HTML for {}: {}", target.name, e);
        }
    }
}

/// Target names double as directory names for debug output.
fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "target".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::page::fake::FakePage;
    use std::collections::BTreeMap;
    use std::fs;

    const BASE: &str = "https://example.test/leaders?page={page}";

    fn leaderboard(rows: &[(&str, &str, &str)]) -> String {
        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, (name, team, hr))| {
                format!("<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>", i + 1, name, team, hr)
            })
            .collect();
        format!(
            r#"<html><body><div class="table-scroll"><table>
            <thead><tr><th>#</th><th>Name</th><th>Team</th><th>HR</th></tr></thead>
            <tbody>{}</tbody></table></div></body></html>"#,
            body
        )
    }

    fn page_url(n: u32) -> String {
        BASE.replace("{page}", &n.to_string())
    }

    fn target(name: &str, url: &str, destination: Destination) -> Target {
        Target {
            name: name.to_string(),
            url: url.to_string(),
            params: BTreeMap::new(),
            destination,
            container_class: "table-scroll".to_string(),
            ready_selector: None,
            row_cap: None,
            max_pages: None,
        }
    }

    fn csv(file: &str) -> Destination {
        Destination::Csv { file: file.to_string() }
    }

    fn fast_options() -> PipelineOptions {
        PipelineOptions {
            extractor: ExtractorSettings {
                scroll_attempts: 1,
                scroll_settle: Duration::ZERO,
                height_threshold: 200.0,
                ready_timeout: Duration::from_millis(30),
                poll_interval: Duration::from_millis(5),
            },
            retry: RetryPolicy {
                attempts: 2,
                backoff: Duration::ZERO,
                load_timeout: Duration::from_secs(1),
            },
            row_cap: None,
            debug: false,
            delay_range: (Duration::ZERO, Duration::ZERO),
        }
    }

    #[tokio::test]
    async fn paginates_until_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html(&leaderboard(&[]))
            .route(&page_url(1), &leaderboard(&[("Z. Last", "SEA", "5"), ("A. First", "ATL", "9")]))
            .route(&page_url(2), &leaderboard(&[("B. Second", "ATL", "20")]))
            .route(&page_url(3), &leaderboard(&[("C. Third", "BOS", "1"), ("D. Fourth", "BOS", "2")]));
        let pipeline = Pipeline::new(&page, &storage, None, fast_options());

        let t = target("hitters", BASE, csv("hitters.csv"));
        let outcome = pipeline.run_target(&t).await.unwrap();

        assert_eq!(outcome, TargetOutcome::Exported { rows: 5 });
        assert_eq!(page.visited.lock().unwrap().len(), 4);

        let out = fs::read_to_string(dir.path().join("hitters.csv")).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Name,Team,HR");
        assert_eq!(
            &lines[1..],
            &[
                "A. First,ATL,9",
                "B. Second,ATL,20",
                "C. Third,BOS,1",
                "D. Fourth,BOS,2",
                "Z. Last,SEA,5",
            ]
        );

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("hitters_meta.json")).unwrap()).unwrap();
        assert_eq!(meta["pages"], 3);
        assert_eq!(meta["row_count"], 5);
        // The empty final page is expected, not a debug case.
        assert!(!dir.path().join("debug").exists());
    }

    #[tokio::test]
    async fn readiness_timeout_after_first_page_ends_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html("<html><body>No results</body></html>")
            .route(&page_url(1), &leaderboard(&[("A", "ATL", "1")]));
        let pipeline = Pipeline::new(&page, &storage, None, fast_options());

        let collected = pipeline.collect(&target("t", BASE, csv("t.csv"))).await.unwrap();
        assert_eq!(collected.pages.len(), 1);
        assert_eq!(collected.urls, vec![page_url(1)]);
        assert!(!dir.path().join("debug").exists());
    }

    #[tokio::test]
    async fn readiness_timeout_on_first_page_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html("<html><body>No results</body></html>");
        let pipeline = Pipeline::new(&page, &storage, None, fast_options());

        let err = pipeline.collect(&target("t", BASE, csv("t.csv"))).await.unwrap_err();
        assert!(matches!(err, AppError::Extraction(ExtractError::ReadinessTimeout { .. })));
        assert!(dir.path().join("debug/t").join(html_debug::PAGE_DEBUG_FILE).exists());
    }

    #[tokio::test]
    async fn page_limit_bounds_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html(&leaderboard(&[("A", "ATL", "1")]));
        let pipeline = Pipeline::new(&page, &storage, None, fast_options());

        let mut t = target("t", BASE, csv("t.csv"));
        t.max_pages = Some(3);
        let collected = pipeline.collect(&t).await.unwrap();
        assert_eq!(collected.pages.len(), 3);
        assert_eq!(collected.record_count(), 3);
    }

    #[tokio::test]
    async fn failing_target_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html(&leaderboard(&[("A", "ATL", "1")]))
            .route("https://example.test/broken", r#"<html><body><table id="other"></table></body></html>"#);
        let pipeline = Pipeline::new(&page, &storage, None, fast_options());

        let targets = vec![
            target("broken", "https://example.test/broken", csv("broken.csv")),
            target("good", "https://example.test/good", csv("good.csv")),
        ];
        let summary = pipeline.run(&targets).await;

        assert_eq!(summary, RunSummary { succeeded: 1, empty: 0, failed: 1 });
        assert!(!dir.path().join("broken.csv").exists());
        assert!(dir.path().join("good.csv").exists());
        // No .table-scroll and no fallback table: the whole page is kept.
        let debug = fs::read_to_string(dir.path().join("debug/broken").join(html_debug::PAGE_DEBUG_FILE)).unwrap();
        assert!(debug.contains(r#"id="other""#));
    }

    #[tokio::test]
    async fn empty_single_page_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        fs::write(dir.path().join("splits.csv"), "previous\n").unwrap();
        let page = FakePage::with_html(&leaderboard(&[]));
        let pipeline = Pipeline::new(&page, &storage, None, fast_options());

        let outcome = pipeline
            .run_target(&target("splits", "https://example.test/splits", csv("splits.csv")))
            .await
            .unwrap();

        assert_eq!(outcome, TargetOutcome::Empty);
        assert_eq!(fs::read_to_string(dir.path().join("splits.csv")).unwrap(), "previous\n");
        let table = fs::read_to_string(dir.path().join("debug/splits").join(html_debug::TABLE_DEBUG_FILE)).unwrap();
        assert!(table.starts_with("<table"));
    }

    #[tokio::test]
    async fn sheet_target_without_token_fails_before_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html(&leaderboard(&[("A", "ATL", "1")]));
        let pipeline = Pipeline::new(&page, &storage, None, fast_options());

        let t = target(
            "(B) Pitch Val / 100",
            "https://example.test/pv",
            Destination::Sheet { spreadsheet: "MLB Stats".into(), tab: "(B) Pitch Val / 100".into() },
        );
        let err = pipeline.run_target(&t).await.unwrap_err();

        assert_eq!(err.stage(), "config");
        assert_eq!(FakePage::calls(&page.goto_calls), 0);
    }

    #[tokio::test]
    async fn row_cap_from_options_applies_to_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html(&leaderboard(&[("A", "X", "1"), ("B", "X", "2"), ("C", "X", "3")]));
        let options = PipelineOptions { row_cap: Some(2), ..fast_options() };
        let pipeline = Pipeline::new(&page, &storage, None, options);

        let collected = pipeline
            .collect(&target("capped", "https://example.test/c", csv("c.csv")))
            .await
            .unwrap();
        assert_eq!(collected.record_count(), 2);
    }

    #[tokio::test]
    async fn debug_mode_writes_annotated_page() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let page = FakePage::with_html(&leaderboard(&[("A", "X", "1")]));
        let options = PipelineOptions { debug: true, ..fast_options() };
        let pipeline = Pipeline::new(&page, &storage, None, options);

        pipeline
            .run_target(&target("dbg", "https://example.test/d", csv("d.csv")))
            .await
            .unwrap();
        let annotated = fs::read_to_string(dir.path().join("debug/dbg").join(html_debug::ANNOTATED_DEBUG_FILE)).unwrap();
        assert!(annotated.contains(r#"<span class="highlight-table""#));
    }

    #[test]
    fn target_names_become_safe_directory_names() {
        assert_eq!(file_safe("(B) Pitch Val / 100"), "B__Pitch_Val___100");
        assert_eq!(file_safe("batter_pitch_type_splits"), "batter_pitch_type_splits");
    }
}
