//! Question sequence validation
//!
//! A document is complete when the question numbers found in it cover
//! `1..=max` without gaps. A document with no question markers at all is
//! valid by rule. Numbers above [`MAX_QUESTION_NUMBER`] are not question
//! numbers (years, ids, page references) and are ignored.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::renderer::PdfRenderer;

/// Largest number accepted as a question number
pub const MAX_QUESTION_NUMBER: u32 = 10_000;

lazy_static! {
    static ref QUESTION_MARKER: Regex =
        Regex::new(r"(?i)\bquestion\s+(\d+)\b").expect("question marker pattern is valid");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceCheck {
    pub is_valid: bool,
    pub max_number: u32,
    /// Ascending
    pub missing: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Sorted, unique
    pub found_questions: Vec<u32>,
    pub max_question: u32,
    pub missing_questions: Vec<u32>,
    pub is_valid: bool,
}

impl ValidationResult {
    pub fn from_found(found: &[u32]) -> Self {
        let check = validate_sequence(found);
        let unique: BTreeSet<u32> = found
            .iter()
            .copied()
            .filter(|&number| number <= MAX_QUESTION_NUMBER)
            .collect();
        Self {
            found_questions: unique.into_iter().collect(),
            max_question: check.max_number,
            missing_questions: check.missing,
            is_valid: check.is_valid,
        }
    }
}

/// Every "question N" marker in `text`, in text order
pub fn find_question_numbers(text: &str) -> Vec<u32> {
    QUESTION_MARKER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|digits| digits.as_str().parse::<u32>().ok())
        .filter(|&number| number <= MAX_QUESTION_NUMBER)
        .collect()
}

pub fn validate_sequence(found: &[u32]) -> SequenceCheck {
    let unique: BTreeSet<u32> = found
        .iter()
        .copied()
        .filter(|&number| number <= MAX_QUESTION_NUMBER)
        .collect();
    let Some(&max_number) = unique.iter().next_back() else {
        return SequenceCheck {
            is_valid: true,
            max_number: 0,
            missing: Vec::new(),
        };
    };

    let missing: Vec<u32> = (1..=max_number).filter(|n| !unique.contains(n)).collect();
    SequenceCheck {
        is_valid: missing.is_empty(),
        max_number,
        missing,
    }
}

/// Scan every page of a document for question markers and validate them
pub fn validate_pdf<R: PdfRenderer>(renderer: &R, bytes: &[u8]) -> Result<ValidationResult> {
    let texts = renderer.extract_text_per_page(bytes)?;
    let found: Vec<u32> = texts
        .iter()
        .flat_map(|text| find_question_numbers(text))
        .collect();
    Ok(ValidationResult::from_found(&found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        pdf_with_operations, pdf_with_pages, question_pdf, set_font, set_matrix, show,
    };
    use crate::renderer::LopdfRenderer;
    use lopdf::content::Operation;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_find_question_numbers_case_insensitive() {
        let text = "question 1, Question 2, QUESTION 5";
        assert_eq!(find_question_numbers(text), vec![1, 2, 5]);
    }

    #[test]
    fn test_find_question_numbers_needs_whole_words() {
        assert!(find_question_numbers("questions 3").is_empty());
        assert!(find_question_numbers("subquestion 3").is_empty());
        assert!(find_question_numbers("Question 3a").is_empty());
        assert_eq!(find_question_numbers("Question\n  7."), vec![7]);
    }

    #[test]
    fn test_find_question_numbers_ignores_huge_numbers() {
        let text = "Question 4000000000, Question 20000, Question 99999999999, Question 3";
        assert_eq!(find_question_numbers(text), vec![3]);
        assert_eq!(find_question_numbers("Question 10000"), vec![MAX_QUESTION_NUMBER]);
    }

    #[test]
    fn test_validate_sequence_ignores_huge_numbers() {
        let check = validate_sequence(&[1, 2, 4_000_000_000]);
        assert_eq!(
            check,
            SequenceCheck {
                is_valid: true,
                max_number: 2,
                missing: vec![],
            }
        );
    }

    #[test]
    fn test_validate_detects_missing() {
        assert_eq!(
            validate_sequence(&[1, 2, 4, 4]),
            SequenceCheck {
                is_valid: false,
                max_number: 4,
                missing: vec![3],
            }
        );
    }

    #[test]
    fn test_validate_empty_is_valid() {
        assert_eq!(
            validate_sequence(&[]),
            SequenceCheck {
                is_valid: true,
                max_number: 0,
                missing: vec![],
            }
        );
    }

    #[test]
    fn test_validate_out_of_order_and_duplicates() {
        let check = validate_sequence(&[3, 1, 2, 3, 1]);
        assert!(check.is_valid);
        assert_eq!(check.max_number, 3);
    }

    #[test]
    fn test_validate_zero_only() {
        // "Question 0" yields an expected range of nothing
        let check = validate_sequence(&[0]);
        assert!(check.is_valid);
        assert_eq!(check.max_number, 0);
    }

    #[test]
    fn test_validate_pdf_scans_all_pages() {
        let result = validate_pdf(&LopdfRenderer, &question_pdf()).unwrap();
        assert_eq!(result.found_questions, vec![1, 2, 4]);
        assert_eq!(result.max_question, 4);
        assert_eq!(result.missing_questions, vec![3]);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_validate_pdf_with_huge_question_number() {
        let pdf = pdf_with_pages(&["Question 1", "Question 4000000000"]);
        let result = validate_pdf(&LopdfRenderer, &pdf).unwrap();
        assert_eq!(result.found_questions, vec![1]);
        assert_eq!(result.max_question, 1);
        assert!(result.is_valid);
    }

    #[test]
    fn test_validate_pdf_reads_text_placed_by_matrix() {
        let pdf = pdf_with_operations(
            vec![vec![
                Operation::new("BT", vec![]),
                set_font(),
                set_matrix(72, 720),
                show("Question 1"),
                set_matrix(72, 700),
                show("Question 2"),
                Operation::new("ET", vec![]),
            ]],
            None,
        );
        let result = validate_pdf(&LopdfRenderer, &pdf).unwrap();
        assert_eq!(result.found_questions, vec![1, 2]);
        assert!(result.is_valid);
    }

    #[test]
    fn test_validate_pdf_without_markers() {
        let pdf = pdf_with_pages(&["Title", "Notes"]);
        let result = validate_pdf(&LopdfRenderer, &pdf).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.max_question, 0);
        assert!(result.found_questions.is_empty());
    }

    proptest! {
        #[test]
        fn prop_missing_is_set_difference(found in proptest::collection::vec(1u32..60, 1..40)) {
            let check = validate_sequence(&found);
            let unique: BTreeSet<u32> = found.iter().copied().collect();
            let max = *unique.iter().max().unwrap();

            let expected: Vec<u32> = (1..=max).filter(|n| !unique.contains(n)).collect();
            prop_assert_eq!(check.max_number, max);
            prop_assert_eq!(&check.missing, &expected);
            prop_assert_eq!(check.is_valid, expected.is_empty());
            prop_assert!(check.missing.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
