// src/extractors/mod.rs
pub mod rows;
pub mod table;

// Re-export key extraction types for convenience
pub use rows::ExtractionResult;
pub use table::{ExtractorSettings, LocatorConfig, TableExtractor};
