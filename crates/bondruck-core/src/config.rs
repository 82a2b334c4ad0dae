// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agent configuration.
//
// The settings window owns writes to this file; the print pipeline only ever
// sees an immutable snapshot taken at the start of a request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{LogicalPrinter, MediumProfile};

/// Default HTTP port for the agent.
pub const DEFAULT_PORT: u16 = 3030;

/// Persistent agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Port for the local HTTP API.
    pub port: u16,
    /// Device name for customer receipts.
    pub printer_name: String,
    /// Device name for kitchen tickets.
    pub kitchen_printer_name: Option<String>,
    /// Horizontal shift of the printable area, positive to the right.
    pub horizontal_offset_mm: Option<f64>,
    /// Resource and dynamic-graphic wait bounds.
    pub stabilization: StabilizationConfig,
    /// Wall-clock budget for one whole print request.
    pub request_timeout_ms: u64,
    /// How jobs reach the OS printing system.
    pub print_backend: PrintBackendKind,
    /// Program used to submit jobs when `print_backend` is `lp`.
    pub lp_command: String,
    /// Program used to enumerate printers.
    pub lpstat_command: String,
    /// Base URI of the CUPS server when `print_backend` is `ipp`.
    pub cups_uri: String,
    /// HTML to PDF converter run before dispatch. HTML requests fail
    /// without one.
    pub html_converter: Option<ConverterConfig>,
    /// Paper geometry of the receipt printer; `None` lets the driver decide.
    pub main_medium: Option<MediumProfile>,
    /// Paper geometry of the kitchen printer.
    pub kitchen_medium: Option<MediumProfile>,
    /// Value of `Access-Control-Allow-Origin` on API responses.
    pub allowed_origin: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            printer_name: String::new(),
            kitchen_printer_name: None,
            horizontal_offset_mm: None,
            stabilization: StabilizationConfig::default(),
            request_timeout_ms: 15_000,
            print_backend: PrintBackendKind::Lp,
            lp_command: "lp".into(),
            lpstat_command: "lpstat".into(),
            cups_uri: "ipp://localhost:631".into(),
            html_converter: None,
            main_medium: Some(MediumProfile::ROLL_80MM),
            kitchen_medium: Some(MediumProfile::ROLL_80MM),
            allowed_origin: "*".into(),
        }
    }
}

impl AgentConfig {
    /// Configured device name for a logical printer, if any.
    ///
    /// Blank names count as unconfigured.
    pub fn printer_for(&self, logical: LogicalPrinter) -> Option<&str> {
        let name = match logical {
            LogicalPrinter::Main => Some(self.printer_name.as_str()),
            LogicalPrinter::Kitchen => self.kitchen_printer_name.as_deref(),
        };
        name.map(str::trim).filter(|n| !n.is_empty())
    }

    /// Medium profile for a logical printer, if it is a known roll.
    pub fn medium_for(&self, logical: LogicalPrinter) -> Option<MediumProfile> {
        match logical {
            LogicalPrinter::Main => self.main_medium,
            LogicalPrinter::Kitchen => self.kitchen_medium,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn horizontal_offset(&self) -> f64 {
        self.horizontal_offset_mm.unwrap_or(0.0)
    }
}

/// Bounds on waiting for asynchronous rendering inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StabilizationConfig {
    /// Per-resource fetch and decode budget (images, fonts, stylesheets).
    pub resource_timeout_ms: u64,
    /// Interval between dynamic-graphic readiness checks.
    pub graphic_poll_interval_ms: u64,
    /// Maximum number of readiness checks per dynamic graphic.
    pub graphic_poll_attempts: u32,
    /// Fixed delay after everything settled, for the final layout pass.
    pub settle_delay_ms: u64,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            resource_timeout_ms: 5_000,
            graphic_poll_interval_ms: 100,
            graphic_poll_attempts: 20,
            settle_delay_ms: 150,
        }
    }
}

impl StabilizationConfig {
    pub fn resource_timeout(&self) -> Duration {
        Duration::from_millis(self.resource_timeout_ms)
    }

    pub fn graphic_poll_interval(&self) -> Duration {
        Duration::from_millis(self.graphic_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Zero waits everywhere; useful in tests.
    pub fn immediate() -> Self {
        Self {
            resource_timeout_ms: 1_000,
            graphic_poll_interval_ms: 5,
            graphic_poll_attempts: 20,
            settle_delay_ms: 0,
        }
    }
}

/// Transport used to hand jobs to the OS printing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrintBackendKind {
    /// Shell out to the `lp` command.
    #[default]
    Lp,
    /// Send an IPP Print-Job to the local CUPS server.
    Ipp,
}

/// External HTML to PDF converter command template.
///
/// `args` may contain `{input}`, `{output}`, `{widthMm}` and `{heightMm}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterConfig {
    pub program: String,
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_printer_name_is_unconfigured() {
        let config = AgentConfig {
            printer_name: "   ".into(),
            ..Default::default()
        };
        assert_eq!(config.printer_for(LogicalPrinter::Main), None);
        assert_eq!(config.printer_for(LogicalPrinter::Kitchen), None);
    }

    #[test]
    fn parses_camel_case_surface_with_defaults() {
        let json = r#"{"port":4000,"printerName":"TM-T20","kitchenPrinterName":"TM-T88","horizontalOffsetMm":1.5}"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.printer_for(LogicalPrinter::Main), Some("TM-T20"));
        assert_eq!(config.printer_for(LogicalPrinter::Kitchen), Some("TM-T88"));
        assert_eq!(config.horizontal_offset(), 1.5);
        assert_eq!(config.print_backend, PrintBackendKind::Lp);
        assert_eq!(config.main_medium, Some(MediumProfile::ROLL_80MM));
    }

    #[test]
    fn stabilization_bounds_are_configurable() {
        let json = r#"{"stabilization":{"graphicPollIntervalMs":50,"graphicPollAttempts":4}}"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.stabilization.graphic_poll_attempts, 4);
        assert_eq!(
            config.stabilization.graphic_poll_interval(),
            Duration::from_millis(50)
        );
        assert_eq!(config.stabilization.settle_delay_ms, 150);
    }
}
