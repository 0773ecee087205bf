//! Output file naming
//!
//! Best-effort names for generated documents, plus the sanitizing rules
//! applied before a name is written into an archive.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UNSAFE_CHARS: Regex =
        Regex::new(r"[^A-Za-z0-9._() -]").expect("unsafe character pattern is valid");
    static ref ESCAPE_SEQUENCE: Regex =
        Regex::new(r"\\.").expect("escape sequence pattern is valid");
    static ref WORD: Regex = Regex::new(r"[A-Za-z0-9]+").expect("word pattern is valid");
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const MAX_SUFFIX_LEN: usize = 32;

/// Name the extracted solutions document after the month and year found in
/// the input name, falling back to `{stem}_solutions.pdf`.
///
/// ```
/// use pdfsuite_core::naming::infer_smart_output_name;
///
/// assert_eq!(infer_smart_output_name("math_january_2025_test.pdf"), "January 2025 solutions.pdf");
/// assert_eq!(infer_smart_output_name("quiz-jan25.pdf"), "January 2025 solutions.pdf");
/// assert_eq!(infer_smart_output_name("worksheet.pdf"), "worksheet_solutions.pdf");
/// ```
pub fn infer_smart_output_name(input_name: &str) -> String {
    let stem = match input_name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => input_name,
    };

    let lowered = stem.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();

    let (month, year) = find_month_and_year(&tokens);
    match (month, year) {
        (Some(month), Some(year)) => format!("{} {} solutions.pdf", title_case(month), year),
        (Some(month), None) => format!("{} solutions.pdf", title_case(month)),
        (None, Some(year)) => format!("{} solutions.pdf", year),
        (None, None) => format!("{}_solutions.pdf", stem),
    }
}

fn find_month_and_year(tokens: &[&str]) -> (Option<&'static str>, Option<String>) {
    // month next to a year token, either order
    for (i, token) in tokens.iter().enumerate() {
        let Some(month) = month_of(token) else {
            continue;
        };
        let after = tokens.get(i + 1);
        let before = i.checked_sub(1).and_then(|j| tokens.get(j));
        for neighbour in [after, before].into_iter().flatten() {
            if let Some(year) = full_year(neighbour, true) {
                return (Some(month), Some(year));
            }
        }
    }

    // compact forms: jan25, 25jan, january2025
    for token in tokens {
        if let Some((month, year)) = compact_month_year(token) {
            return (Some(month), Some(year));
        }
    }

    let month = tokens.iter().find_map(|token| month_of(token));
    let year = tokens.iter().find_map(|token| full_year(token, false));
    (month, year)
}

fn month_of(token: &str) -> Option<&'static str> {
    if token == "sept" {
        return Some(MONTHS[8]);
    }
    MONTHS
        .iter()
        .find(|month| **month == token || (token.len() == 3 && month.starts_with(token)))
        .copied()
}

fn full_year(token: &str, allow_short: bool) -> Option<String> {
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match token.len() {
        4 if token.starts_with("20") => Some(token.to_string()),
        2 if allow_short => Some(format!("20{}", token)),
        _ => None,
    }
}

fn compact_month_year(token: &str) -> Option<(&'static str, String)> {
    let split = token.find(|c: char| c.is_ascii_digit())?;
    if split == 0 {
        let alpha = token.find(|c: char| c.is_ascii_alphabetic())?;
        let (digits, letters) = token.split_at(alpha);
        return Some((month_of(letters)?, full_year(digits, true)?));
    }
    let (letters, digits) = token.split_at(split);
    Some((month_of(letters)?, full_year(digits, true)?))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Replace characters outside `[A-Za-z0-9._() -]` with `_` and trim
pub fn sanitize_component(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, "_").trim().to_string()
}

/// Output name for a regex extraction: `{stem}_regex_extract[_{word}].pdf`
pub fn regex_output_name(input_name: &str, pattern: &str) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut safe_stem = sanitize_component(&stem);
    if safe_stem.is_empty() {
        safe_stem = "output".to_string();
    }

    match pattern_word(pattern) {
        Some(word) => format!("{}_regex_extract_{}.pdf", safe_stem, word),
        None => format!("{}_regex_extract.pdf", safe_stem),
    }
}

/// First plain word of a pattern, escape sequences such as `\b` or `\d` removed
fn pattern_word(pattern: &str) -> Option<String> {
    let without_escapes = ESCAPE_SEQUENCE.replace_all(pattern, " ");
    let word = WORD.find(&without_escapes)?.as_str().to_lowercase();
    Some(word.chars().take(MAX_SUFFIX_LEN).collect())
}

/// Strip directory components and unsafe characters from an artifact name
pub fn safe_artifact_name(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    let last = normalized.rsplit('/').next().unwrap_or_default();
    let clean = sanitize_component(last);
    if clean.is_empty() {
        "artifact.pdf".to_string()
    } else {
        clean
    }
}

/// Hands out collision-free names: "X.pdf", "X (2).pdf", "X (3).pdf", ...
#[derive(Debug, Default)]
pub struct UniqueNames {
    seen: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: &str) -> String {
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
            _ => (name, String::new()),
        };

        let counter = self.seen.entry(name.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = if *counter == 1 {
                name.to_string()
            } else {
                format!("{} ({}){}", stem, counter, extension)
            };
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
