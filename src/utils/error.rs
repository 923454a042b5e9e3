// src/utils/error.rs
use std::time::Duration;
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("DevTools protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError), // Automatically convert chromiumoxide errors

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected script result: {0}")]
    Script(String),
}

/// Stage-level failures of a single extraction. All of them are recoverable
/// by skipping the current target.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Content never appeared (waited {waited:?} for {selector})")]
    ReadinessTimeout { selector: String, waited: Duration },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("No usable header row after {attempts} attempt(s)")]
    HeadersEmpty { attempts: usize },

    #[error("Failed to load {url} after {attempts} attempt(s)")]
    NavigationFailure { url: String, attempts: usize },

    #[error("Browser interaction failed: {0}")]
    Browser(#[from] BrowserError),
}

impl ExtractError {
    /// Short stage label used in failure logs.
    pub fn stage(&self) -> &'static str {
        match self {
            ExtractError::ReadinessTimeout { .. } => "wait",
            ExtractError::TableNotFound(_) => "locate",
            ExtractError::HeadersEmpty { .. } => "headers",
            ExtractError::NavigationFailure { .. } => "navigate",
            ExtractError::Browser(_) => "browser",
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Sheets API returned {status}: {body}")]
    SheetsApi { status: reqwest::StatusCode, body: String },

    #[error("Unexpected Sheets response: {0}")]
    SheetsParse(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Browser session failed: {0}")]
    Browser(#[from] BrowserError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}

impl AppError {
    /// Pipeline stage a failure belongs to, for the per-target log line.
    pub fn stage(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Browser(_) => "browser",
            AppError::Extraction(e) => e.stage(),
            AppError::Storage(_) => "export",
            AppError::Processing(_) => "process",
        }
    }
}
