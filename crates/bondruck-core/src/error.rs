// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bondruck.
//
// All errors are local to one request. Nothing here is retried by the agent;
// `ErrorKind` tells the caller what kind of fix (if any) applies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::LogicalPrinter;

/// Top-level error type for all Bondruck operations.
#[derive(Debug, Error)]
pub enum BondruckError {
    // -- Request errors --
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no printer configured for logical printer '{0}'")]
    Unconfigured(LogicalPrinter),

    #[error("printer '{requested}' not found and no default printer is available")]
    PrinterNotFound { requested: String },

    // -- Render errors --
    #[error("document failed to load: {0}")]
    LoadFailed(String),

    #[error("{stage} timed out after {after_ms} ms")]
    Timeout { stage: &'static str, after_ms: u64 },

    // -- Dispatch errors --
    #[error("print failed: {0}")]
    PrintFailed(String),

    #[error("printer enumeration failed: {0}")]
    Enumeration(String),

    // -- Configuration / persistence --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Resend a correct request.
    BadRequest,
    /// Fix the configuration; never retried.
    Unconfigured,
    PrinterNotFound,
    LoadFailed,
    /// Distinct so callers may choose to retry.
    Timeout,
    PrintFailed,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unconfigured => "unconfigured",
            Self::PrinterNotFound => "printer_not_found",
            Self::LoadFailed => "load_failed",
            Self::Timeout => "timeout",
            Self::PrintFailed => "print_failed",
            Self::Internal => "internal",
        }
    }
}

impl BondruckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Unconfigured(_) => ErrorKind::Unconfigured,
            Self::PrinterNotFound { .. } => ErrorKind::PrinterNotFound,
            Self::LoadFailed(_) => ErrorKind::LoadFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::PrintFailed(_) => ErrorKind::PrintFailed,
            Self::Enumeration(_) | Self::Config(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Human-readable reason for an outcome. Print failures carry the
    /// backend's own wording without the variant prefix.
    pub fn reason(&self) -> String {
        match self {
            Self::PrintFailed(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BondruckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_not_found_names_requested_printer() {
        let err = BondruckError::PrinterNotFound {
            requested: "Kitchen-TM88".into(),
        };
        assert_eq!(err.kind(), ErrorKind::PrinterNotFound);
        assert!(err.to_string().contains("Kitchen-TM88"));
    }

    #[test]
    fn io_errors_are_internal() {
        let err: BondruckError = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn timeout_message_carries_stage() {
        let err = BondruckError::Timeout {
            stage: "print request",
            after_ms: 15_000,
        };
        assert_eq!(err.to_string(), "print request timed out after 15000 ms");
        assert_eq!(err.kind().code(), "timeout");
        assert_eq!(err.reason(), err.to_string());
    }

    #[test]
    fn print_failure_reason_is_the_backend_wording() {
        let err = BondruckError::PrintFailed("printer is out of paper".into());
        assert_eq!(err.kind(), ErrorKind::PrintFailed);
        assert_eq!(err.reason(), "printer is out of paper");
        assert_eq!(err.to_string(), "print failed: printer is out of paper");
    }
}
