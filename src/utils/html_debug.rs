// src/utils/html_debug.rs
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::utils::error::AppError;

/// Raw page markup, written when the container or table never showed up.
pub const PAGE_DEBUG_FILE: &str = "page_debug.html";
/// Outer markup of the located table, written when it had no usable headers or rows.
pub const TABLE_DEBUG_FILE: &str = "table_debug.html";
/// Page markup with the table structure highlighted (debug mode only).
pub const ANNOTATED_DEBUG_FILE: &str = "page_annotated.html";

/// Writes a debug artifact into `dir`, creating the directory if needed.
pub fn write_artifact(dir: &Path, filename: &str, contents: &str) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, contents)?;
    tracing::info!("Saved debug artifact to {}", path.display());
    Ok(path)
}

/// Saves a HTML snippet to a file with debug highlights
pub fn save_debug_html(html: &str, path: &Path, highlights: &[(usize, usize, &str)]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;

    // Add debug styling in head
    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");

    // CSS for highlight colors
    debug_html.push_str(".highlight-container { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-table { background-color: #FFA500; }\n");
    debug_html.push_str(".highlight-thead { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-tbody { background-color: #ADD8E6; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut last_pos = 0;
    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0); // Sort by position

    for (start, end, highlight_type) in sorted_highlights {
        // Overlapping matches would duplicate markup
        if start < last_pos {
            continue;
        }
        debug_html.push_str(&html[last_pos..start]);

        let css_class = match highlight_type {
            "container" => "highlight-container",
            "table" => "highlight-table",
            "thead" => "highlight-thead",
            "tbody" => "highlight-tbody",
            _ => "highlight-custom",
        };

        debug_html.push_str(&format!("<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type));
        debug_html.push_str(&html[start..end]);
        debug_html.push_str("</span>");

        last_pos = end;
    }

    if last_pos < html.len() {
        debug_html.push_str(&html[last_pos..]);
    }

    debug_html.push_str("\n</body>\n</html>");

    file.write_all(debug_html.as_bytes())?;

    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

/// Creates a debug version of an HTML document with locations of specified regex patterns highlighted
pub fn create_debug_html(html: &str, path: &Path, patterns: &[(String, &str)]) -> Result<(), AppError> {
    use regex::Regex;

    let mut highlights = Vec::new();

    for (pattern, highlight_type) in patterns {
        let re = Regex::new(pattern).map_err(|e| {
            AppError::Config(format!("Invalid regex pattern '{}': {}", pattern, e))
        })?;

        for mat in re.find_iter(html) {
            highlights.push((mat.start(), mat.end(), *highlight_type));
        }
    }

    save_debug_html(html, path, &highlights)
}

/// Opening-tag patterns for the leaderboard structure inside a page.
pub fn table_patterns(container_class: &str) -> Vec<(String, &'static str)> {
    vec![
        (
            format!(r#"(?i)<div[^>]*class=["'][^"']*\b{}\b[^"']*["'][^>]*>"#, regex::escape(container_class)),
            "container",
        ),
        (r"(?i)<table\b[^>]*>".to_string(), "table"),
        (r"(?i)<thead\b[^>]*>".to_string(), "thead"),
        (r"(?i)<tbody\b[^>]*>".to_string(), "tbody"),
    ]
}
