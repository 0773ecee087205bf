use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::config::SuiteConfig;
use crate::error::{Result, SuiteError};
use crate::merge::merge_pages;
use crate::questions::extract_questions;
use crate::regex_search::{extract_matching_pages, RegexOptions};
use crate::renderer::PdfRenderer;
use crate::sequence::validate_pdf;
use crate::workspace::{PageStore, Session};

#[derive(Debug, Clone, Deserialize)]
pub struct NamedFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Pages to leave out of a merge: a 1-based range spec for one named file
#[derive(Debug, Clone, Deserialize)]
pub struct PageDrop {
    pub name: String,
    pub ranges: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SuiteCommand {
    Merge {
        files: Vec<NamedFile>,
        #[serde(default)]
        drop: Vec<PageDrop>,
    },
    ExtractQuestions {
        file: NamedFile,
    },
    Validate {
        file: NamedFile,
    },
    RegexExtract {
        file: NamedFile,
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default = "default_true")]
        keep_first_page: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    pub output_name: Option<String>,
    /// Base64-encoded PDF data
    pub data: Option<String>,
    /// Operation-specific outcome (validation result, regex matches, ...)
    pub details: Option<serde_json::Value>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: usize,
    pub processing_time_ms: u64,
}

struct Outcome {
    output_name: Option<String>,
    output: Option<Vec<u8>>,
    details: serde_json::Value,
    page_count: usize,
}

/// Run one command to completion. Failures are reported in the result.
pub fn execute<R: PdfRenderer>(
    renderer: &R,
    config: &SuiteConfig,
    command: SuiteCommand,
) -> ProcessResult {
    let started = Instant::now();
    let input_size_bytes = input_size(&command);

    match run(renderer, config, command) {
        Ok(outcome) => ProcessResult {
            success: true,
            metrics: Some(ProcessMetrics {
                input_size_bytes,
                output_size_bytes: outcome.output.as_ref().map_or(0, Vec::len),
                page_count: outcome.page_count,
                processing_time_ms: started.elapsed().as_millis() as u64,
            }),
            output_name: outcome.output_name,
            data: outcome.output.map(|bytes| BASE64.encode(bytes)),
            details: Some(outcome.details),
            error: None,
        },
        Err(err) => {
            tracing::warn!(error = %err, "command failed");
            ProcessResult {
                success: false,
                output_name: None,
                data: None,
                details: None,
                error: Some(err.to_string()),
                metrics: None,
            }
        }
    }
}

fn input_size(command: &SuiteCommand) -> usize {
    match command {
        SuiteCommand::Merge { files, .. } => files.iter().map(|f| f.data.len()).sum(),
        SuiteCommand::ExtractQuestions { file }
        | SuiteCommand::Validate { file }
        | SuiteCommand::RegexExtract { file, .. } => file.data.len(),
    }
}

fn run<R: PdfRenderer>(renderer: &R, config: &SuiteConfig, command: SuiteCommand) -> Result<Outcome> {
    match command {
        SuiteCommand::Merge { files, drop } => {
            let uploads = files.into_iter().map(|f| (f.name, f.data)).collect();
            let loaded = PageStore::new(renderer, *config).load(uploads)?;
            let mut session = Session::new().add_documents(loaded);

            for page_drop in &drop {
                let id = session
                    .documents()
                    .iter()
                    .find(|doc| doc.name == page_drop.name)
                    .map(|doc| doc.id.clone())
                    .ok_or_else(|| {
                        SuiteError::validation(format!("No loaded file named {}", page_drop.name))
                    })?;
                session = session.remove_page_ranges(&id, &page_drop.ranges)?;
            }

            let result = merge_pages(renderer, session.documents(), session.page_refs())?;
            Ok(Outcome {
                details: to_details(&result)?,
                output_name: Some(result.output_name),
                page_count: result.merged_pages,
                output: Some(result.output_pdf),
            })
        }
        SuiteCommand::ExtractQuestions { file } => {
            config.check_uploads(&[(&file.name, &file.data)])?;
            let result = extract_questions(renderer, &file.name, &file.data)?;
            Ok(Outcome {
                details: to_details(&result)?,
                output_name: Some(result.output_name),
                page_count: result.extracted_page_count,
                output: Some(result.output_pdf),
            })
        }
        SuiteCommand::Validate { file } => {
            config.check_uploads(&[(&file.name, &file.data)])?;
            let page_count = renderer.page_count(&file.data)?;
            let result = validate_pdf(renderer, &file.data)?;
            Ok(Outcome {
                details: to_details(&result)?,
                output_name: None,
                page_count,
                output: None,
            })
        }
        SuiteCommand::RegexExtract {
            file,
            pattern,
            case_sensitive,
            keep_first_page,
        } => {
            config.check_uploads(&[(&file.name, &file.data)])?;
            let options = RegexOptions {
                pattern,
                case_sensitive,
                keep_first_page,
            };
            let result = extract_matching_pages(renderer, &file.name, &file.data, &options)?;
            Ok(Outcome {
                details: to_details(&result)?,
                output_name: Some(result.output_name),
                page_count: result.extracted_page_count,
                output: Some(result.output_pdf),
            })
        }
    }
}

fn to_details<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| SuiteError::Report(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{question_pdf, text_pdf};
    use crate::renderer::LopdfRenderer;
    use pretty_assertions::assert_eq;

    fn named(name: &str, data: Vec<u8>) -> NamedFile {
        NamedFile {
            name: name.to_string(),
            data,
        }
    }

    fn decode(result: &ProcessResult) -> Vec<u8> {
        BASE64.decode(result.data.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn test_command_deserializes_merge() {
        let json = r#"{"type":"Merge","files":[{"name":"a.pdf","data":[37,80]}]}"#;
        let cmd: SuiteCommand = serde_json::from_str(json).unwrap();
        match cmd {
            SuiteCommand::Merge { files, drop } => {
                assert_eq!(files[0].name, "a.pdf");
                assert!(drop.is_empty());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_command_deserializes_regex_defaults() {
        let json = r#"{"type":"RegexExtract","file":{"name":"a.pdf","data":[]},"pattern":"x"}"#;
        let cmd: SuiteCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(
            cmd,
            SuiteCommand::RegexExtract {
                case_sensitive: false,
                keep_first_page: true,
                ..
            }
        ));
    }

    #[test]
    fn test_execute_merge_with_drop() {
        let command = SuiteCommand::Merge {
            files: vec![named("a.pdf", text_pdf(4, "A")), named("b.pdf", text_pdf(2, "B"))],
            drop: vec![PageDrop {
                name: "a.pdf".to_string(),
                ranges: "2-3".to_string(),
            }],
        };

        let result = execute(&LopdfRenderer, &SuiteConfig::default(), command);

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output_name.as_deref(), Some("merged_output.pdf"));
        let texts: Vec<String> = LopdfRenderer
            .extract_text_per_page(&decode(&result))
            .unwrap()
            .into_iter()
            .map(|t| t.trim().to_string())
            .collect();
        assert_eq!(texts, vec!["A-Page-1", "A-Page-4", "B-Page-1", "B-Page-2"]);
        assert_eq!(result.metrics.unwrap().page_count, 4);
    }

    #[test]
    fn test_execute_merge_drop_everything_fails() {
        let command = SuiteCommand::Merge {
            files: vec![named("a.pdf", text_pdf(2, "A"))],
            drop: vec![PageDrop {
                name: "a.pdf".to_string(),
                ranges: "1-2".to_string(),
            }],
        };
        let result = execute(&LopdfRenderer, &SuiteConfig::default(), command);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Cannot merge when no pages remain."));
    }

    #[test]
    fn test_execute_rejects_non_pdf_name() {
        let command = SuiteCommand::Validate {
            file: named("notes.txt", question_pdf()),
        };
        let result = execute(&LopdfRenderer, &SuiteConfig::default(), command);
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Invalid file type for notes.txt. Only PDF files are allowed.")
        );
    }

    #[test]
    fn test_execute_validate_details() {
        let command = SuiteCommand::Validate {
            file: named("exam.pdf", question_pdf()),
        };
        let result = execute(&LopdfRenderer, &SuiteConfig::default(), command);

        assert!(result.success);
        assert!(result.data.is_none());
        let details = result.details.unwrap();
        assert_eq!(details["missing_questions"], serde_json::json!([3]));
        assert_eq!(details["is_valid"], serde_json::json!(false));
        assert_eq!(result.metrics.unwrap().page_count, 3);
    }

    #[test]
    fn test_execute_regex_extract() {
        let command = SuiteCommand::RegexExtract {
            file: named("sample.pdf", question_pdf()),
            pattern: "question".to_string(),
            case_sensitive: false,
            keep_first_page: false,
        };
        let result = execute(&LopdfRenderer, &SuiteConfig::default(), command);

        assert!(result.success);
        assert_eq!(
            result.output_name.as_deref(),
            Some("sample_regex_extract_question.pdf")
        );
        assert_eq!(LopdfRenderer.page_count(&decode(&result)).unwrap(), 2);
        assert_eq!(result.details.unwrap()["matched_pages"], serde_json::json!([2, 3]));
    }
}
