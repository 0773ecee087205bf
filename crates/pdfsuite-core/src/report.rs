//! Batch report artifacts: a ZIP of extracted documents, and CSV and plain
//! text summaries of a validation batch.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::batch::BatchOperationResult;
use crate::error::{Result, SuiteError};
use crate::naming::{safe_artifact_name, UniqueNames};

pub const DEFAULT_ZIP_NAME: &str = "batch_extraction_outputs.zip";
pub const VALIDATION_CSV_NAME: &str = "validation_batch_report.csv";
pub const VALIDATION_SUMMARY_NAME: &str = "validation_batch_report.txt";

const CSV_HEADER: [&str; 6] = [
    "source_name",
    "status",
    "max_question",
    "missing_questions",
    "found_questions",
    "messages",
];

/// Pack every item that carries an artifact into a deflated ZIP archive.
/// Entry names are sanitized and made unique.
pub fn build_zip(result: &BatchOperationResult) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut names = UniqueNames::new();

    for item in &result.items {
        let (Some(name), Some(bytes)) = (&item.artifact_name, &item.artifact_bytes) else {
            continue;
        };
        if bytes.is_empty() {
            continue;
        }

        let entry = names.claim(&safe_artifact_name(name));
        tracing::debug!(entry = %entry, bytes = bytes.len(), "adding archive entry");
        writer
            .start_file(entry, options)
            .map_err(|e| SuiteError::Report(e.to_string()))?;
        writer
            .write_all(bytes)
            .map_err(|e| SuiteError::Report(e.to_string()))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| SuiteError::Report(e.to_string()))?;
    Ok(cursor.into_inner())
}

pub fn build_validation_csv(result: &BatchOperationResult) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| SuiteError::Report(e.to_string()))?;

    for item in &result.items {
        let metric = |key: &str| {
            item.metrics
                .get(key)
                .map(|value| value.to_string())
                .unwrap_or_default()
        };
        let messages = item
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join(" | ");

        writer
            .write_record([
                item.source_name.clone(),
                item.status.to_string(),
                metric("max_question"),
                metric("missing_questions"),
                metric("found_questions"),
                messages,
            ])
            .map_err(|e| SuiteError::Report(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| SuiteError::Report(e.to_string()))
}

pub fn build_validation_text_summary(result: &BatchOperationResult) -> String {
    let mut lines = vec![
        "Validation Batch Summary".to_string(),
        format!(
            "success={} warning={} error={}",
            result.success_count(),
            result.warning_count(),
            result.error_count()
        ),
        String::new(),
    ];

    for item in &result.items {
        lines.push(format!(
            "[{}] {}",
            item.status.as_str().to_uppercase(),
            item.source_name
        ));
        if !item.metrics.is_empty() {
            let metrics = item
                .metrics
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("metrics: {}", metrics));
        }
        lines.extend(item.messages.iter().map(|m| format!("- {}", m.text)));
        lines.push(String::new());
    }

    let mut summary = lines.join("\n").trim_end().to_string();
    summary.push('\n');
    summary
}
