// src/storage/table.rs
use crate::extractors::ExtractionResult;

/// Sort keys, most significant first.
const SORT_COLUMNS: [&str; 2] = ["Team", "Name"];

/// Rectangular export form of one target's records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Merges pages into one table. Headers are the union in first-seen
    /// order, one column per distinct name; cells a page did not produce are
    /// left empty. A repeated header reads the value its record kept.
    pub fn from_pages(pages: &[ExtractionResult]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for page in pages {
            for header in &page.headers {
                if !headers.contains(header) {
                    headers.push(header.clone());
                }
            }
        }

        let rows = pages
            .iter()
            .flat_map(|page| page.records.iter())
            .map(|record| {
                headers
                    .iter()
                    .map(|h| record.get(h).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Stable sort by (Team, Name), using whichever of the two exist.
    pub fn sort_by_team_and_name(&mut self) {
        let keys: Vec<usize> = SORT_COLUMNS
            .iter()
            .filter_map(|col| self.column_index(col))
            .collect();
        if keys.is_empty() {
            tracing::debug!("No Team/Name columns; leaving row order as scraped");
            return;
        }
        self.rows.sort_by(|a, b| {
            keys.iter()
                .map(|&k| a[k].cmp(&b[k]))
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}
