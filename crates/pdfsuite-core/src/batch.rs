//! Batch processing
//!
//! Runs one operation over many documents. Items are processed in input
//! order, one at a time, and each runs inside its own failure boundary: an
//! error or a panic while handling one document becomes an `Error` item and
//! the remaining documents are still processed.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::questions::extract_questions;
use crate::regex_search::{extract_matching_pages, RegexOptions};
use crate::renderer::PdfRenderer;
use crate::sequence::validate_pdf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Warning => "warning",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl OperationMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(u64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::Int(value as u64)
    }
}

impl From<u32> for MetricValue {
    fn from(value: u32) -> Self {
        MetricValue::Int(u64::from(value))
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Named metrics of a batch item, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics(Vec<(String, MetricValue)>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<MetricValue>) -> Self {
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name.to_string(), value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Metrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub source_name: String,
    pub status: Status,
    pub messages: Vec<OperationMessage>,
    pub metrics: Metrics,
    pub artifact_name: Option<String>,
    #[serde(skip)]
    pub artifact_bytes: Option<Vec<u8>>,
}

impl BatchItemResult {
    fn failed(source_name: &str, reason: String) -> Self {
        Self {
            source_name: source_name.to_string(),
            status: Status::Error,
            messages: vec![OperationMessage::error(reason)],
            metrics: Metrics::new(),
            artifact_name: None,
            artifact_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOperationResult {
    pub items: Vec<BatchItemResult>,
}

impl BatchOperationResult {
    pub fn success_count(&self) -> usize {
        self.count(Status::Success)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Status::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count(Status::Error)
    }

    fn count(&self, status: Status) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Called after each item with `(current, total, source_name)`
pub type ProgressCallback<'a> = Box<dyn FnMut(usize, usize, &str) + 'a>;

pub struct BatchRunner<'a, R: PdfRenderer> {
    renderer: &'a R,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a, R: PdfRenderer> BatchRunner<'a, R> {
    pub fn new(renderer: &'a R) -> Self {
        Self {
            renderer,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: impl FnMut(usize, usize, &str) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Question extraction for every file; artifacts are the extracted PDFs
    pub fn run_extraction_batch<N, B>(&mut self, files: &[(N, B)]) -> BatchOperationResult
    where
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let renderer = self.renderer;
        self.run("extraction", files, |name, bytes| {
            let result = extract_questions(renderer, name, bytes)?;
            let validation = &result.validation;

            let mut messages = vec![OperationMessage::info(format!(
                "Found {} questions.",
                result.found_questions.len()
            ))];
            if !validation.is_valid {
                messages.push(OperationMessage::warning(format!(
                    "Missing questions: {:?}",
                    validation.missing_questions
                )));
            }

            Ok(BatchItemResult {
                source_name: name.to_string(),
                status: status_for(validation.is_valid),
                messages,
                metrics: Metrics::new()
                    .with("original_pages", result.original_page_count)
                    .with("extracted_pages", result.extracted_page_count)
                    .with("max_question", validation.max_question),
                artifact_name: Some(result.output_name),
                artifact_bytes: Some(result.output_pdf),
            })
        })
    }

    /// Sequence validation for every file; no artifacts
    pub fn run_validation_batch<N, B>(&mut self, files: &[(N, B)]) -> BatchOperationResult
    where
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let renderer = self.renderer;
        self.run("validation", files, |name, bytes| {
            let result = validate_pdf(renderer, bytes)?;

            let missing = if result.missing_questions.is_empty() {
                "None".to_string()
            } else {
                join_numbers(&result.missing_questions)
            };
            let message = if result.max_question == 0 {
                "No questions found (valid by rule).".to_string()
            } else {
                format!("Max question: {}; Missing: {}", result.max_question, missing)
            };

            Ok(BatchItemResult {
                source_name: name.to_string(),
                status: status_for(result.is_valid),
                messages: vec![OperationMessage::info(message)],
                metrics: Metrics::new()
                    .with("max_question", result.max_question)
                    .with("missing_questions", missing)
                    .with("found_questions", join_numbers(&result.found_questions)),
                artifact_name: None,
                artifact_bytes: None,
            })
        })
    }

    /// Regex extraction for every file; artifacts are the extracted PDFs
    pub fn run_regex_batch<N, B>(
        &mut self,
        files: &[(N, B)],
        options: &RegexOptions,
    ) -> BatchOperationResult
    where
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let renderer = self.renderer;
        self.run("regex", files, |name, bytes| {
            let result = extract_matching_pages(renderer, name, bytes, options)?;
            let matched = !result.matched_pages.is_empty();

            let mut messages = vec![OperationMessage::info(format!(
                "Matched {} page(s); extracted {} page(s).",
                result.matched_pages.len(),
                result.extracted_page_count
            ))];
            if !matched && options.keep_first_page {
                messages.push(OperationMessage::warning(
                    "No regex match found; output includes first page only.",
                ));
            }

            Ok(BatchItemResult {
                source_name: name.to_string(),
                status: status_for(matched),
                messages,
                metrics: Metrics::new()
                    .with("original_pages", result.original_page_count)
                    .with("matched_pages", result.matched_pages.len())
                    .with("extracted_pages", result.extracted_page_count),
                artifact_name: Some(result.output_name),
                artifact_bytes: Some(result.output_pdf),
            })
        })
    }

    fn run<N, B, F>(&mut self, kind: &str, files: &[(N, B)], op: F) -> BatchOperationResult
    where
        N: AsRef<str>,
        B: AsRef<[u8]>,
        F: Fn(&str, &[u8]) -> Result<BatchItemResult>,
    {
        let total = files.len();
        tracing::info!(kind, total, "starting batch");

        let mut items = Vec::with_capacity(total);
        for (index, (name, bytes)) in files.iter().enumerate() {
            let name = name.as_ref();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| op(name, bytes.as_ref())));

            let item = match outcome {
                Ok(Ok(item)) => item,
                Ok(Err(err)) => {
                    tracing::warn!(kind, source = name, error = %err, "batch item failed");
                    BatchItemResult::failed(name, err.to_string())
                }
                Err(payload) => {
                    let reason = panic_reason(payload.as_ref());
                    tracing::warn!(kind, source = name, reason = %reason, "batch item panicked");
                    BatchItemResult::failed(name, reason)
                }
            };

            tracing::info!(
                kind,
                current = index + 1,
                total,
                source = name,
                status = %item.status,
                "batch item finished"
            );
            items.push(item);

            if let Some(progress) = self.progress.as_mut() {
                progress(index + 1, total, name);
            }
        }

        BatchOperationResult { items }
    }
}

fn status_for(ok: bool) -> Status {
    if ok {
        Status::Success
    } else {
        Status::Warning
    }
}

fn join_numbers(numbers: &[u32]) -> String {
    numbers
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Unexpected failure: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Unexpected failure: {}", message)
    } else {
        "Unexpected failure while processing document".to_string()
    }
}
