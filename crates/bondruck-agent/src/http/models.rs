// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire types of the local HTTP API.

use serde::{Deserialize, Serialize};

use bondruck_core::types::{LogicalPrinter, PrintOutcome, PrintRequest, PrinterDescriptor};
use bondruck_core::error::{BondruckError, Result};

/// Body of `POST /print` and `POST /print/kitchen`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Base64 PDF, optionally as a `data:application/pdf;base64,` URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
}

impl PrintBody {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            pdf: None,
        }
    }

    /// Turn the body into a print request for `printer`.
    ///
    /// A body without content still becomes a request so that the
    /// orchestrator reports it; a body with both kinds is rejected here.
    pub fn into_request(self, printer: LogicalPrinter) -> Result<PrintRequest> {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        match (non_empty(self.html), non_empty(self.pdf)) {
            (Some(_), Some(_)) => Err(BondruckError::BadRequest(
                "send either html or pdf, not both".into(),
            )),
            (None, Some(pdf)) => Ok(PrintRequest::pdf(pdf, printer)),
            (Some(html), None) => Ok(PrintRequest::html(html, printer)),
            (None, None) => Ok(PrintRequest::html(String::new(), printer)),
        }
    }
}

/// Response of the print endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub duration_ms: u64,
}

impl From<&PrintOutcome> for PrintResponse {
    fn from(outcome: &PrintOutcome) -> Self {
        if outcome.succeeded {
            Self {
                success: true,
                message: Some(match &outcome.printer_name {
                    Some(name) => format!("printed on {name}"),
                    None => "printed".to_owned(),
                }),
                error: None,
                printer: outcome.printer_name.clone(),
                code: None,
                duration_ms: outcome.duration_ms,
            }
        } else {
            Self {
                success: false,
                message: None,
                error: outcome.failure_reason.clone(),
                printer: outcome.printer_name.clone(),
                code: outcome.failure_kind.map(|k| k.code().to_owned()),
                duration_ms: outcome.duration_ms,
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrintersResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub printers: Vec<PrinterDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
