// src/extractors/rows.rs
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Column whose emptiness marks a decorative or separator row.
pub const NAME_COLUMN: &str = "Name";

/// One leaderboard row, keyed by header name in header order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == column)
            .map(|(_, value)| value.as_str())
    }

    /// Sets `column`, keeping the position of its first occurrence. A repeated
    /// header therefore holds the value of its last cell.
    pub fn insert(&mut self, column: &str, value: String) {
        match self.fields.iter_mut().find(|(key, _)| key == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut record = Record::default();
        for (column, value) in iter {
            record.insert(&column, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Records from one page load plus the headers they were built from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractionResult {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How a body row lines up with the header list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// Cells align to headers starting at this index.
    Aligned(usize),
    /// Too few cells for the header list.
    Malformed,
}

/// A purely numeric leading cell is the synthetic rank column.
pub fn is_rank_cell(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

pub fn classify_row(cells: &[String], header_count: usize) -> RowShape {
    if cells.len() < header_count {
        return RowShape::Malformed;
    }
    match cells.first() {
        Some(first) if is_rank_cell(first) => RowShape::Aligned(1),
        _ => RowShape::Aligned(0),
    }
}

/// Zips `cells[offset..]` onto `headers`. Headers past the last cell map to "".
/// Duplicate headers collapse into one column holding the later cell.
pub fn build_record(headers: &[String], cells: &[String], offset: usize) -> Record {
    let mut record = Record::default();
    for (i, header) in headers.iter().enumerate() {
        let value = cells.get(offset + i).cloned().unwrap_or_default();
        record.insert(header, value);
    }
    record
}

/// False for rows whose `Name` cell is blank, when the table has a `Name` column.
pub fn has_name(record: &Record) -> bool {
    record.get(NAME_COLUMN).map_or(true, |name| !name.is_empty())
}
