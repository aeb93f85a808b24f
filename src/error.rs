//! Error types for the WS-Security Layout validator.

use crate::results::OperationId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason attached to a Layout assertion that failed validation.
pub const LAYOUT_MISMATCH_REASON: &str = "Layout does not match the requirements";

/// Layout validator errors.
///
/// Only the outer surfaces (configuration, results documents, I/O) fail with
/// an error. The layout checks themselves report [`Violation`]s.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid operation pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Signed result references unknown operation {0}")]
    UnknownOperation(OperationId),

    #[error("Operation {0} appears more than once")]
    DuplicateOperation(OperationId),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Violation codes for Layout policy failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationCode {
    /// No security operations were processed
    NoSecurityResults,
    /// Timestamp is not the first element of the security header
    TimestampNotFirst,
    /// Timestamp is not the last element of the security header
    TimestampNotLast,
    /// A header token covered by a signature appears after that signature
    SignedTokenAfterSignature,
    /// The token that produced a signature appears after the signature
    SigningTokenAfterSignature,
    /// A signature appears after the signature that endorses it
    EndorsedSignatureAfterEndorsing,
}

impl ViolationCode {
    /// Get the string code for this violation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSecurityResults => "NO_SECURITY_RESULTS",
            Self::TimestampNotFirst => "TIMESTAMP_NOT_FIRST",
            Self::TimestampNotLast => "TIMESTAMP_NOT_LAST",
            Self::SignedTokenAfterSignature => "SIGNED_TOKEN_AFTER_SIGNATURE",
            Self::SigningTokenAfterSignature => "SIGNING_TOKEN_AFTER_SIGNATURE",
            Self::EndorsedSignatureAfterEndorsing => "ENDORSED_SIGNATURE_AFTER_ENDORSING",
        }
    }
}

/// A Layout rule violation detected in a processed security header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation code
    pub code: ViolationCode,
    /// Human-readable message
    pub message: String,
    /// Operation the violation was detected on (if any)
    pub operation: Option<OperationId>,
}

impl Violation {
    /// Create a new violation.
    pub fn new(code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            operation: None,
        }
    }

    /// Create a violation pointing at a specific operation.
    pub fn at(code: ViolationCode, message: impl Into<String>, operation: OperationId) -> Self {
        Self {
            code,
            message: message.into(),
            operation: Some(operation),
        }
    }
}
