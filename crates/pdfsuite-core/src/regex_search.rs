//! Regex page search
//!
//! Keeps every page whose text matches a user pattern, optionally together
//! with the first page, and reports a snippet around the first hit on each
//! matched page.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::{Result, SuiteError};
use crate::merge::extract_pages;
use crate::naming::regex_output_name;
use crate::renderer::PdfRenderer;

/// Characters of context kept on each side of a match
const SNIPPET_RADIUS: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegexPageMatch {
    /// 1-based
    pub page_number: usize,
    pub match_count: usize,
    pub snippet: String,
    pub matched_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegexSearchResult {
    pub output_name: String,
    #[serde(skip)]
    pub output_pdf: Vec<u8>,
    pub original_page_count: usize,
    pub extracted_page_count: usize,
    /// 1-based, ascending
    pub matched_pages: Vec<usize>,
    pub matches: Vec<RegexPageMatch>,
}

/// Options for a regex extraction
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct RegexOptions {
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_keep_first_page")]
    pub keep_first_page: bool,
}

fn default_keep_first_page() -> bool {
    true
}

impl RegexOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: false,
            keep_first_page: true,
        }
    }
}

/// Compile a user pattern. Multi-line always; case-insensitive unless asked.
pub fn compile_pattern(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    let cleaned = pattern.trim();
    if cleaned.is_empty() {
        return Err(SuiteError::validation("Enter a regex pattern."));
    }

    RegexBuilder::new(cleaned)
        .multi_line(true)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| SuiteError::validation(format!("Invalid regex pattern: {}", e)))
}

pub fn extract_matching_pages<R: PdfRenderer>(
    renderer: &R,
    input_name: &str,
    bytes: &[u8],
    options: &RegexOptions,
) -> Result<RegexSearchResult> {
    let regex = compile_pattern(&options.pattern, options.case_sensitive)?;
    let texts = renderer.extract_text_per_page(bytes)?;

    let mut retained = Vec::new();
    let mut matches = Vec::new();
    for (index, text) in texts.iter().enumerate() {
        let mut hits = regex.find_iter(text);
        match hits.next() {
            Some(first) => {
                matches.push(RegexPageMatch {
                    page_number: index + 1,
                    match_count: 1 + hits.count(),
                    snippet: build_snippet(text, first.start(), first.end()),
                    matched_text: first.as_str().to_string(),
                });
                retained.push(index);
            }
            None if index == 0 && options.keep_first_page => retained.push(index),
            None => {}
        }
    }

    if retained.is_empty() {
        return Err(SuiteError::validation("No pages matched the regex pattern."));
    }

    tracing::debug!(
        input = input_name,
        matched = matches.len(),
        retained = retained.len(),
        "extracting regex matches"
    );

    let output_pdf = extract_pages(renderer, bytes, &retained)?;

    Ok(RegexSearchResult {
        output_name: regex_output_name(input_name, &options.pattern),
        output_pdf,
        original_page_count: texts.len(),
        extracted_page_count: retained.len(),
        matched_pages: matches.iter().map(|m| m.page_number).collect(),
        matches,
    })
}

/// Context around the byte range `start..end`, whitespace collapsed, with
/// "..." marking a cut on either side
fn build_snippet(text: &str, start: usize, end: usize) -> String {
    let window_start = text[..start]
        .char_indices()
        .rev()
        .nth(SNIPPET_RADIUS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window_end = text[end..]
        .char_indices()
        .nth(SNIPPET_RADIUS)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let normalized = text[window_start..window_end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let prefix = if window_start > 0 { "..." } else { "" };
    let suffix = if window_end < text.len() { "..." } else { "" };
    format!("{}{}{}", prefix, normalized, suffix)
}
