//! Upload limits
//!
//! Limits come from the environment with safe fallbacks. A value that is
//! missing, unparseable, or not positive falls back to the default.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SuiteError};

pub const MAX_PDF_ENV: &str = "PDF_SUITE_MAX_PDF_MB";
pub const MAX_BATCH_ENV: &str = "PDF_SUITE_MAX_BATCH_MB";

pub const DEFAULT_MAX_PDF_MB: u64 = 50;
pub const DEFAULT_MAX_BATCH_MB: u64 = 100;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Per-file ceiling in megabytes
    pub max_pdf_size_mb: u64,
    /// Ceiling for the combined size of one upload batch, in megabytes
    pub max_batch_size_mb: u64,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            max_pdf_size_mb: DEFAULT_MAX_PDF_MB,
            max_batch_size_mb: DEFAULT_MAX_BATCH_MB,
        }
    }
}

impl SuiteConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (environment, tests, config files)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            max_pdf_size_mb: parse_positive(lookup(MAX_PDF_ENV), DEFAULT_MAX_PDF_MB),
            max_batch_size_mb: parse_positive(lookup(MAX_BATCH_ENV), DEFAULT_MAX_BATCH_MB),
        }
    }

    /// Apply explicit limits (command-line flags) on top of this config.
    /// A zero override is ignored the same way a zero environment value is.
    pub fn with_overrides(self, max_pdf_mb: Option<u64>, max_batch_mb: Option<u64>) -> Self {
        Self {
            max_pdf_size_mb: positive_or(max_pdf_mb, self.max_pdf_size_mb),
            max_batch_size_mb: positive_or(max_batch_mb, self.max_batch_size_mb),
        }
    }

    pub fn max_pdf_size_bytes(&self) -> u64 {
        self.max_pdf_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn max_batch_size_bytes(&self) -> u64 {
        self.max_batch_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Check aggregate size, then each file's extension and size.
    pub fn check_uploads<N, B>(&self, files: &[(N, B)]) -> Result<()>
    where
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let total: u64 = files.iter().map(|(_, bytes)| bytes.as_ref().len() as u64).sum();
        if total > self.max_batch_size_bytes() {
            return Err(SuiteError::validation(format!(
                "Batch size exceeds limit of {} MB",
                self.max_batch_size_mb
            )));
        }

        for (name, bytes) in files {
            let name = name.as_ref();
            if !has_pdf_extension(name) {
                return Err(SuiteError::validation(format!(
                    "Invalid file type for {}. Only PDF files are allowed.",
                    name
                )));
            }
            if bytes.as_ref().len() as u64 > self.max_pdf_size_bytes() {
                return Err(SuiteError::validation(format!(
                    "{} exceeds per-file limit of {} MB",
                    name, self.max_pdf_size_mb
                )));
            }
        }

        Ok(())
    }
}

pub fn has_pdf_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

fn parse_positive(value: Option<String>, default: u64) -> u64 {
    match value.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(parsed) if parsed > 0 => parsed as u64,
        _ => default,
    }
}

fn positive_or(value: Option<u64>, current: u64) -> u64 {
    value.filter(|&mb| mb > 0).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SuiteConfig::from_lookup(|_| None);
        assert_eq!(config, SuiteConfig::default());
        assert_eq!(config.max_pdf_size_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn test_reads_positive_values() {
        let config = SuiteConfig::from_lookup(lookup_from(&[
            (MAX_PDF_ENV, "5"),
            (MAX_BATCH_ENV, " 12 "),
        ]));
        assert_eq!(config.max_pdf_size_mb, 5);
        assert_eq!(config.max_batch_size_mb, 12);
    }

    #[test]
    fn test_invalid_and_non_positive_fall_back() {
        let config = SuiteConfig::from_lookup(lookup_from(&[
            (MAX_PDF_ENV, "lots"),
            (MAX_BATCH_ENV, "-3"),
        ]));
        assert_eq!(config.max_pdf_size_mb, DEFAULT_MAX_PDF_MB);
        assert_eq!(config.max_batch_size_mb, DEFAULT_MAX_BATCH_MB);

        let zero = SuiteConfig::from_lookup(lookup_from(&[(MAX_PDF_ENV, "0")]));
        assert_eq!(zero.max_pdf_size_mb, DEFAULT_MAX_PDF_MB);
    }

    #[test]
    fn test_overrides_replace_positive_limits() {
        let config = SuiteConfig::from_lookup(lookup_from(&[(MAX_PDF_ENV, "5")]))
            .with_overrides(Some(7), None);
        assert_eq!(config.max_pdf_size_mb, 7);
        assert_eq!(config.max_batch_size_mb, DEFAULT_MAX_BATCH_MB);
    }

    #[test]
    fn test_zero_overrides_are_ignored() {
        let config = SuiteConfig::from_lookup(lookup_from(&[(MAX_PDF_ENV, "5")]))
            .with_overrides(Some(0), Some(0));
        assert_eq!(config.max_pdf_size_mb, 5);
        assert_eq!(config.max_batch_size_mb, DEFAULT_MAX_BATCH_MB);

        // a zero limit would otherwise reject every non-empty upload
        assert!(config.check_uploads(&[("a.pdf", vec![0u8; 4])]).is_ok());
    }

    #[test]
    fn test_check_uploads_rejects_extension() {
        let config = SuiteConfig::default();
        let err = config
            .check_uploads(&[("notes.txt", vec![0u8; 4])])
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("notes.txt"));
    }

    #[test]
    fn test_check_uploads_extension_is_case_insensitive() {
        let config = SuiteConfig::default();
        assert!(config.check_uploads(&[("SCAN.PDF", vec![0u8; 4])]).is_ok());
    }

    #[test]
    fn test_check_uploads_rejects_large_file() {
        let config = SuiteConfig {
            max_pdf_size_mb: 1,
            max_batch_size_mb: 10,
        };
        let big = vec![0u8; 1024 * 1024 + 1];
        let err = config.check_uploads(&[("big.pdf", big)]).unwrap_err();
        assert_eq!(err.to_string(), "big.pdf exceeds per-file limit of 1 MB");
    }

    #[test]
    fn test_check_uploads_rejects_large_batch() {
        let config = SuiteConfig {
            max_pdf_size_mb: 1,
            max_batch_size_mb: 1,
        };
        let half = vec![0u8; 600 * 1024];
        let err = config
            .check_uploads(&[("a.pdf", half.clone()), ("b.pdf", half)])
            .unwrap_err();
        assert!(err.to_string().contains("Batch size exceeds limit of 1 MB"));
    }
}
