// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Bondruck print agent.
//
// Every value here is request-scoped: created when a print request arrives
// and discarded when its outcome is returned.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BondruckError, ErrorKind};

/// Millimetres per CSS pixel at the 96 px/in reference resolution.
pub const MM_PER_PX: f64 = 25.4 / 96.0;

/// PostScript points per millimetre (72 pt/in).
pub const PT_PER_MM: f64 = 72.0 / 25.4;

/// Unique identifier for one render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named print role mapped to a concrete device in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalPrinter {
    /// Customer receipts.
    Main,
    /// Kitchen tickets.
    Kitchen,
}

impl LogicalPrinter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Kitchen => "kitchen",
        }
    }
}

impl std::fmt::Display for LogicalPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported input document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Html,
    Pdf,
}

impl DocumentKind {
    /// MIME type handed to the print backend.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Pdf => "application/pdf",
        }
    }

    /// File extension used when the document is materialized on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

/// One incoming print request. Immutable once received.
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub kind: DocumentKind,
    /// HTML markup, or the transport-encoded (base64) PDF.
    pub payload: String,
    pub logical_printer: LogicalPrinter,
}

impl PrintRequest {
    pub fn html(payload: impl Into<String>, logical_printer: LogicalPrinter) -> Self {
        Self {
            kind: DocumentKind::Html,
            payload: payload.into(),
            logical_printer,
        }
    }

    pub fn pdf(encoded: impl Into<String>, logical_printer: LogicalPrinter) -> Self {
        Self {
            kind: DocumentKind::Pdf,
            payload: encoded.into(),
            logical_printer,
        }
    }

    /// Whether the request carries a usable document body.
    pub fn has_payload(&self) -> bool {
        !self.payload.trim().is_empty()
    }
}

/// Device state as reported by the OS printing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Idle,
    Printing,
    Disabled,
    Unknown,
}

/// A printer known to the OS. Produced fresh on every enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDescriptor {
    pub name: String,
    pub display_name: String,
    pub is_default: bool,
    pub status: PrinterStatus,
}

impl PrinterDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            is_default: false,
            status: PrinterStatus::Unknown,
        }
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_status(mut self, status: PrinterStatus) -> Self {
        self.status = status;
        self
    }
}

/// Why a particular device was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionReason {
    ExactMatch,
    DefaultFallback,
}

/// A concrete device selected for one request.
///
/// Only the printer directory builds these, and only from a non-empty
/// candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub descriptor: PrinterDescriptor,
    pub reason: ResolutionReason,
}

impl ResolvedTarget {
    pub fn new(descriptor: PrinterDescriptor, reason: ResolutionReason) -> Self {
        Self { descriptor, reason }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Vertical offsets applied to a roll medium, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MarginOffsets {
    pub top_mm: f64,
    pub bottom_mm: f64,
}

/// Physical paper geometry for a receipt-style device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediumProfile {
    pub total_width_mm: f64,
    pub printable_width_mm: f64,
    #[serde(default)]
    pub margin_offsets: MarginOffsets,
    pub minimum_height_mm: f64,
    /// Measure the rendered content and size the page to fit it.
    #[serde(default = "default_true")]
    pub dynamic_height: bool,
}

fn default_true() -> bool {
    true
}

impl MediumProfile {
    /// 80 mm thermal roll with a 72 mm printable area.
    pub const ROLL_80MM: Self = Self {
        total_width_mm: 80.0,
        printable_width_mm: 72.0,
        margin_offsets: MarginOffsets {
            top_mm: 0.0,
            bottom_mm: 0.0,
        },
        minimum_height_mm: 100.0,
        dynamic_height: true,
    };

    /// 58 mm thermal roll with a 48 mm printable area.
    pub const ROLL_58MM: Self = Self {
        total_width_mm: 58.0,
        printable_width_mm: 48.0,
        margin_offsets: MarginOffsets {
            top_mm: 0.0,
            bottom_mm: 0.0,
        },
        minimum_height_mm: 80.0,
        dynamic_height: true,
    };

    /// Symmetric side margin when the printable area is centred.
    pub fn side_margin_mm(&self) -> f64 {
        ((self.total_width_mm - self.printable_width_mm) / 2.0).max(0.0)
    }
}

/// Physical page size handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    /// CUPS custom media keyword, e.g. `Custom.80x143mm`.
    pub fn cups_media(&self) -> String {
        format!(
            "Custom.{}x{}mm",
            self.width_mm.round() as u32,
            self.height_mm.ceil() as u32
        )
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Margins {
    pub top_mm: f64,
    pub right_mm: f64,
    pub bottom_mm: f64,
    pub left_mm: f64,
}

impl Margins {
    pub const ZERO: Self = Self {
        top_mm: 0.0,
        right_mm: 0.0,
        bottom_mm: 0.0,
        left_mm: 0.0,
    };
}

/// Options attached to one print submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Never show an interactive dialog.
    pub silent: bool,
    pub device_name: String,
    /// Receipts rely on rendered backgrounds and borders.
    pub print_background: bool,
    pub color: bool,
    /// `None` lets the device driver apply its own margins.
    pub margins: Option<Margins>,
    pub page_size: Option<PageSize>,
    pub job_title: String,
}

impl JobOptions {
    pub fn for_device(device_name: impl Into<String>, job_title: impl Into<String>) -> Self {
        Self {
            silent: true,
            device_name: device_name.into(),
            print_background: true,
            color: false,
            margins: None,
            page_size: None,
            job_title: job_title.into(),
        }
    }
}

/// Terminal result of one print request. Never retried internally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOutcome {
    pub succeeded: bool,
    pub printer_name: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<ErrorKind>,
    #[serde(skip)]
    pub session_id: Option<SessionId>,
}

impl PrintOutcome {
    pub fn success(printer_name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            succeeded: true,
            printer_name: Some(printer_name.into()),
            duration_ms,
            failure_reason: None,
            failure_kind: None,
            session_id: None,
        }
    }

    pub fn failure(
        kind: ErrorKind,
        reason: impl Into<String>,
        printer_name: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            succeeded: false,
            printer_name,
            duration_ms,
            failure_reason: Some(reason.into()),
            failure_kind: Some(kind),
            session_id: None,
        }
    }

    /// Failed outcome classified and worded by `err`.
    pub fn from_error(err: &BondruckError, printer_name: Option<String>, duration_ms: u64) -> Self {
        Self::failure(err.kind(), err.reason(), printer_name, duration_ms)
    }

    pub fn with_session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }
}
