// ==============================================================================
// error.rs - Loader Error Kinds
// ==============================================================================
// Description: Fatal and non-fatal error kinds shared by parsers, linkers and loader
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-20
// Version: 1.1.0
// ==============================================================================
// Propagation:
//   - Per-line decode failures become SkippedLine warnings (never Err)
//   - Identity and pedigree failures abort the current file / case only
// ==============================================================================

use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that abort the current load unit (one file or one case)
#[derive(Error, Debug)]
pub enum LoadError {
    /// Header missing or unreadable; column order cannot be known
    #[error("Malformed {source_name} source: {reason}")]
    MalformedSource { source_name: String, reason: String },

    /// Two HGNC entries share the same hgnc_id
    #[error("Duplicate HGNC identifier: {hgnc_id}")]
    DuplicateIdentifier { hgnc_id: u32 },

    /// An individual of the case has no genotype column in the VCF
    #[error("Individual {individual_id} of case {case_id} is missing from the VCF samples")]
    MissingIndividual { case_id: String, individual_id: String },

    #[error("Invalid pedigree: {0}")]
    InvalidPedigree(String),

    #[error("Unknown genome build: {0} (must be 37 or 38)")]
    UnknownBuild(String),

    #[error("Invalid case config: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LoadError {
    pub fn malformed(source_name: &str, reason: impl Into<String>) -> Self {
        LoadError::MalformedSource {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A data line that could not be decoded and was dropped
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    /// 1-based line number in the source
    pub line: usize,
    pub reason: String,
}

impl SkippedLine {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LoadError::malformed("hgnc", "header not found");
        assert_eq!(err.to_string(), "Malformed hgnc source: header not found");

        let err = LoadError::DuplicateIdentifier { hgnc_id: 5 };
        assert_eq!(err.to_string(), "Duplicate HGNC identifier: 5");
    }

    #[test]
    fn test_skipped_line_display() {
        let skipped = SkippedLine::new(12, "expected 6 columns, found 4");
        assert_eq!(skipped.to_string(), "line 12: expected 6 columns, found 4");
    }
}
