//! PDF workspace operations
//!
//! Load PDFs into a session, curate pages, and merge what remains; extract
//! question pages and check that the question numbering is complete; keep
//! the pages matching a regex; run any of these over a batch of files and
//! package the outcome as ZIP, CSV or text reports.
//!
//! All PDF access goes through the [`PdfRenderer`] trait. [`LopdfRenderer`]
//! is the lopdf-backed implementation.

pub mod batch;
pub mod command;
pub mod config;
pub mod error;
pub mod merge;
pub mod naming;
pub mod questions;
pub mod regex_search;
pub mod renderer;
pub mod report;
pub mod sequence;
pub mod workspace;

#[cfg(test)]
mod fixtures;

pub use batch::{BatchItemResult, BatchOperationResult, BatchRunner, Status};
pub use command::{execute, ProcessMetrics, ProcessResult, SuiteCommand};
pub use config::SuiteConfig;
pub use error::{Result, SuiteError};
pub use merge::{merge_pages, MergeResult};
pub use questions::{extract_questions, ExtractionResult};
pub use regex_search::{extract_matching_pages, RegexOptions, RegexSearchResult};
pub use renderer::{LopdfRenderer, PdfRenderer};
pub use sequence::{validate_pdf, validate_sequence, ValidationResult};
pub use workspace::{DocumentId, PageReference, PageStore, Session, SourceDocument};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize> {
    LopdfRenderer.page_count(bytes)
}
