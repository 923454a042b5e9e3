// src/config.rs
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extractors::table::{LocatorConfig, DEFAULT_CONTAINER_CLASS, DEFAULT_READY_SELECTOR};
use crate::utils::AppError;

/// Template parameter filled in by the pagination loop.
pub const PAGE_PARAM: &str = "page";
const DEFAULT_MAX_PAGES: u32 = 50;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Failed to compile PLACEHOLDER_RE")
});

const LEADERS_URL: &str = "https://www.fangraphs.com/leaders/major-league?\
    stats={stats}&lg=all&type={type_id}&season={season}&month=0\
    &season1={season}&ind=0&rost=&age=&filter=&players=0&team=0\
    &pageitems=100&pos=np&qual=10&page={page}";

/// Where a target's table ends up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Destination {
    /// CSV file, relative to the output directory.
    Csv { file: String },
    /// A tab in a Google spreadsheet, looked up by title.
    Sheet { spreadsheet: String, tab: String },
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Csv { file } => write!(f, "csv:{}", file),
            Destination::Sheet { spreadsheet, tab } => write!(f, "sheet:{} -> {}", spreadsheet, tab),
        }
    }
}

fn default_container_class() -> String {
    DEFAULT_CONTAINER_CLASS.to_string()
}

/// One extraction-and-export cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// URL template; `{key}` placeholders come from `params`, `{page}` from pagination.
    pub url: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub destination: Destination,
    #[serde(default = "default_container_class")]
    pub container_class: String,
    #[serde(default)]
    pub ready_selector: Option<String>,
    /// Debug cap on rows processed per page.
    #[serde(default)]
    pub row_cap: Option<usize>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl Target {
    pub fn is_paginated(&self) -> bool {
        template_keys(&self.url).any(|key| key == PAGE_PARAM)
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1)
    }

    /// Resolves the URL template, with `page` bound when the target paginates.
    pub fn url_for_page(&self, page: Option<u32>) -> Result<String, AppError> {
        let mut values = self.params.clone();
        if let Some(page) = page {
            values.insert(PAGE_PARAM.to_string(), page.to_string());
        }
        expand_template(&self.url, &values)
    }

    /// Locator for this target; a CLI row cap wins over the configured one.
    pub fn locator(&self, row_cap_override: Option<usize>) -> LocatorConfig {
        LocatorConfig {
            container_class: self.container_class.clone(),
            ready_selector: self
                .ready_selector
                .clone()
                .unwrap_or_else(|| DEFAULT_READY_SELECTOR.to_string()),
            row_cap: row_cap_override.or(self.row_cap),
            ..LocatorConfig::default()
        }
    }
}

fn template_keys(template: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Replaces every `{key}` in `template`. Unknown keys are a config error.
pub fn expand_template(template: &str, values: &BTreeMap<String, String>) -> Result<String, AppError> {
    let missing: Vec<&str> = template_keys(template)
        .filter(|key| !values.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Config(format!(
            "URL template has no value for: {}",
            missing.join(", ")
        )));
    }

    let expanded = PLACEHOLDER_RE.replace_all(template, |caps: &regex::Captures| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(expanded.into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub targets: Vec<Target>,
}

impl RunConfig {
    /// Reads a `{ "targets": [...] }` JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::info!("Loaded {} targets from {}", config.targets.len(), path.display());
        Ok(config)
    }

    /// The leaderboards the tool was built for.
    pub fn defaults() -> Self {
        let split = |name: &str, stats: &str| Target {
            name: name.to_string(),
            url: LEADERS_URL.to_string(),
            params: BTreeMap::from([
                ("stats".to_string(), stats.to_string()),
                ("type_id".to_string(), "7".to_string()),
                ("season".to_string(), "2025".to_string()),
            ]),
            destination: Destination::Csv { file: format!("{}_2025.csv", name) },
            container_class: default_container_class(),
            ready_selector: None,
            row_cap: None,
            max_pages: None,
        };

        let sheet_tab = |tab: &str, url: &str| Target {
            name: tab.to_string(),
            url: url.to_string(),
            params: BTreeMap::new(),
            destination: Destination::Sheet {
                spreadsheet: "MLB Stats".to_string(),
                tab: tab.to_string(),
            },
            container_class: default_container_class(),
            ready_selector: None,
            row_cap: None,
            max_pages: None,
        };

        Self {
            targets: vec![
                split("batter_pitch_type_splits", "bat"),
                split("pitcher_pitch_type_splits", "pit"),
                sheet_tab(
                    "(B) Pitch Val / 100",
                    "https://www.fangraphs.com/leaders/major-league?stats=bat&lg=all&type=14&season=2025&month=0&season1=2025&ind=0&rost=&age=&filter=&players=0&team=0&pageitems=2000000000&pos=np&qual=10",
                ),
                sheet_tab(
                    "(B) Standard vs LHP",
                    "https://www.fangraphs.com/leaders/major-league?stats=bat&lg=all&season=2025&season1=2025&ind=0&rost=&filter=&players=0&team=0&pageitems=2000000000&pos=np&qual=10&type=0&month=13",
                ),
                sheet_tab(
                    "(B) Standard vs RHP",
                    "https://www.fangraphs.com/leaders/major-league?stats=bat&lg=all&season=2025&season1=2025&ind=0&rost=&filter=&players=0&team=0&pageitems=2000000000&pos=np&qual=10&type=0&month=14",
                ),
                sheet_tab(
                    "(P) Pitch Splits",
                    "https://www.fangraphs.com/leaders/major-league?stats=pit&lg=all&type=9&season=2025&season1=2025&ind=0&rost=&age=&filter=&players=0&team=0&pageitems=2000000000&pos=all&qual=10&month=0",
                ),
                sheet_tab(
                    "(P) Pitch Val / 100",
                    "https://www.fangraphs.com/leaders/major-league?stats=pit&lg=all&type=13&season=2025&season1=2025&ind=0&rost=&age=&filter=&players=0&team=0&pageitems=2000000000&pos=all&qual=10&month=0",
                ),
            ],
        }
    }

    /// Checks names are unique and every template resolves.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(AppError::Config("Target with empty name".to_string()));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(AppError::Config(format!("Duplicate target name: {}", target.name)));
            }
            let page = target.is_paginated().then_some(1);
            target.url_for_page(page).map_err(|e| {
                AppError::Config(format!("Target {}: {}", target.name, e))
            })?;
        }
        Ok(())
    }

    /// Keeps only the named targets, in config order. Empty `only` keeps everything.
    pub fn select(mut self, only: &[String]) -> Result<Self, AppError> {
        if only.is_empty() {
            return Ok(self);
        }
        let unknown: Vec<&String> = only
            .iter()
            .filter(|name| !self.targets.iter().any(|t| &t.name == *name))
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::Config(format!("Unknown target(s): {:?}", unknown)));
        }
        self.targets.retain(|t| only.contains(&t.name));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_params_and_page() {
        let target = &RunConfig::defaults().targets[0];
        assert!(target.is_paginated());

        let url = target.url_for_page(Some(3)).unwrap();
        assert!(url.contains("stats=bat"));
        assert!(url.contains("type=7"));
        assert!(url.contains("season=2025&month=0&season1=2025"));
        assert!(url.ends_with("&page=3"));
        assert!(!url.contains('{'));
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let values = BTreeMap::from([("a".to_string(), "1".to_string())]);
        assert_eq!(expand_template("x?a={a}", &values).unwrap(), "x?a=1");

        let err = expand_template("x?a={a}&b={b}", &values).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains('b')));
    }

    #[test]
    fn paginated_target_without_page_is_an_error() {
        let target = &RunConfig::defaults().targets[0];
        assert!(target.url_for_page(None).is_err());
    }

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::defaults();
        config.validate().unwrap();
        assert_eq!(config.targets.len(), 7);
        assert!(!config.targets[2].is_paginated());
    }

    #[test]
    fn parses_json_targets_with_defaults() {
        let raw = r#"{
            "targets": [
                {
                    "name": "hitters",
                    "url": "https://example.test/leaders?season={season}&page={page}",
                    "params": { "season": "2024" },
                    "destination": { "kind": "csv", "file": "hitters.csv" },
                    "max_pages": 4
                },
                {
                    "name": "vs-lhp",
                    "url": "https://example.test/splits",
                    "destination": { "kind": "sheet", "spreadsheet": "MLB Stats", "tab": "vs LHP" },
                    "container_class": "grid-wrap",
                    "row_cap": 5
                }
            ]
        }"#;
        let config: RunConfig = serde_json::from_str(raw).unwrap();
        config.validate().unwrap();

        let hitters = &config.targets[0];
        assert_eq!(hitters.container_class, "table-scroll");
        assert_eq!(hitters.max_pages(), 4);
        assert_eq!(
            hitters.url_for_page(Some(1)).unwrap(),
            "https://example.test/leaders?season=2024&page=1"
        );

        let splits = &config.targets[1];
        assert_eq!(
            splits.destination,
            Destination::Sheet { spreadsheet: "MLB Stats".into(), tab: "vs LHP".into() }
        );
        let locator = splits.locator(None);
        assert_eq!(locator.container_class, "grid-wrap");
        assert_eq!(locator.row_cap, Some(5));
        assert_eq!(splits.locator(Some(2)).row_cap, Some(2));
    }

    #[test]
    fn rejects_unknown_destination_kind() {
        let raw = r#"{"targets":[{"name":"a","url":"u","destination":{"kind":"ftp"}}]}"#;
        assert!(serde_json::from_str::<RunConfig>(raw).is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut config = RunConfig::defaults();
        let copy = config.targets[0].clone();
        config.targets.push(copy);
        assert!(config.validate().is_err());
    }

    #[test]
    fn select_filters_by_name() {
        let config = RunConfig::defaults()
            .select(&["(P) Pitch Splits".to_string()])
            .unwrap();
        assert_eq!(config.targets.len(), 1);
        assert!(RunConfig::defaults().select(&["nope".to_string()]).is_err());
    }
}
