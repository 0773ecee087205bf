//! Question extraction
//!
//! Keeps the pages that carry a "Question N" marker, plus the first page so
//! the output still has its cover, and names the result after the exam
//! session found in the file name.

use serde::Serialize;

use crate::error::Result;
use crate::merge::extract_pages;
use crate::naming::infer_smart_output_name;
use crate::renderer::PdfRenderer;
use crate::sequence::{find_question_numbers, ValidationResult};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub output_name: String,
    #[serde(skip)]
    pub output_pdf: Vec<u8>,
    pub original_page_count: usize,
    pub extracted_page_count: usize,
    /// Sorted, unique
    pub found_questions: Vec<u32>,
    /// Computed over every marker in the whole document
    pub validation: ValidationResult,
}

pub fn extract_questions<R: PdfRenderer>(
    renderer: &R,
    input_name: &str,
    bytes: &[u8],
) -> Result<ExtractionResult> {
    let texts = renderer.extract_text_per_page(bytes)?;

    let mut retained = Vec::new();
    let mut found = Vec::new();
    for (index, text) in texts.iter().enumerate() {
        let numbers = find_question_numbers(text);
        if index == 0 || !numbers.is_empty() {
            retained.push(index);
        }
        found.extend(numbers);
    }

    let validation = ValidationResult::from_found(&found);
    tracing::debug!(
        input = input_name,
        pages = texts.len(),
        retained = retained.len(),
        max_question = validation.max_question,
        "extracting question pages"
    );

    let output_pdf = extract_pages(renderer, bytes, &retained)?;

    Ok(ExtractionResult {
        output_name: infer_smart_output_name(input_name),
        output_pdf,
        original_page_count: texts.len(),
        extracted_page_count: retained.len(),
        found_questions: validation.found_questions.clone(),
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{pdf_with_pages, question_pdf, RecordingRenderer};
    use crate::renderer::LopdfRenderer;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_questions_keeps_marked_pages_and_cover() {
        let result =
            extract_questions(&LopdfRenderer, "math_january_2025_test.pdf", &question_pdf())
                .unwrap();

        assert_eq!(result.found_questions, vec![1, 2, 4]);
        assert_eq!(result.validation.missing_questions, vec![3]);
        assert!(!result.validation.is_valid);
        assert_eq!(result.original_page_count, 3);
        assert_eq!(result.extracted_page_count, 3);
        assert_eq!(result.output_name, "January 2025 solutions.pdf");
        assert_eq!(LopdfRenderer.page_count(&result.output_pdf).unwrap(), 3);
    }

    #[test]
    fn test_extract_questions_drops_unmarked_pages() {
        let pdf = pdf_with_pages(&["Cover", "Intro", "Question 1", "Notes", "Question 2"]);
        let renderer = RecordingRenderer::default();
        let result = extract_questions(&renderer, "worksheet.pdf", &pdf).unwrap();

        assert_eq!(result.extracted_page_count, 3);
        assert!(result.validation.is_valid);
        assert_eq!(result.output_name, "worksheet_solutions.pdf");
        assert_eq!(
            *renderer.copies.borrow(),
            vec![
                ("Cover".to_string(), 0, 0),
                ("Cover".to_string(), 2, 2),
                ("Cover".to_string(), 4, 4),
            ]
        );
    }

    #[test]
    fn test_extract_questions_without_markers_keeps_first_page() {
        let pdf = pdf_with_pages(&["Title", "Body"]);
        let result = extract_questions(&LopdfRenderer, "notes.pdf", &pdf).unwrap();
        assert_eq!(result.extracted_page_count, 1);
        assert!(result.found_questions.is_empty());
        assert!(result.validation.is_valid);
    }

    #[test]
    fn test_extract_questions_corrupt_input() {
        let err = extract_questions(&LopdfRenderer, "bad.pdf", b"garbage bytes").unwrap_err();
        assert!(!err.is_validation());
    }
}
