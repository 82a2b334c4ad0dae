// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer directory: maps a configured printer name onto a concrete device.
//
// Devices are enumerated fresh from the OS printing system on every request
// (`lpstat` on CUPS hosts). Resolution itself is pure: an exact name match
// wins, otherwise the OS default printer is used.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{PrinterDescriptor, PrinterStatus, ResolutionReason, ResolvedTarget};

/// Pick the device for `logical_name` among `candidates`.
///
/// With several devices flagged as default the first in enumeration order
/// is used.
pub fn resolve(logical_name: &str, candidates: &[PrinterDescriptor]) -> Result<ResolvedTarget> {
    if let Some(exact) = candidates.iter().find(|p| p.name == logical_name) {
        return Ok(ResolvedTarget::new(exact.clone(), ResolutionReason::ExactMatch));
    }

    let mut defaults = candidates.iter().filter(|p| p.is_default);
    match defaults.next() {
        Some(first) => {
            let others: Vec<&str> = defaults.map(|p| p.name.as_str()).collect();
            if !others.is_empty() {
                warn!(
                    chosen = %first.name,
                    also_default = ?others,
                    "several printers are flagged as default; using the first"
                );
            }
            Ok(ResolvedTarget::new(
                first.clone(),
                ResolutionReason::DefaultFallback,
            ))
        }
        None => Err(BondruckError::PrinterNotFound {
            requested: logical_name.to_owned(),
        }),
    }
}

/// Something that can list the printers currently known to the OS.
#[async_trait]
pub trait PrinterSource: Send + Sync {
    async fn list_printers(&self) -> Result<Vec<PrinterDescriptor>>;
}

/// Enumerates CUPS destinations with `lpstat`.
#[derive(Debug, Clone)]
pub struct LpstatSource {
    program: String,
}

impl LpstatSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.program)
            .args(args)
            // Parsing relies on untranslated messages.
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BondruckError::Enumeration(format!("cannot run {}: {e}", self.program)))
    }
}

#[async_trait]
impl PrinterSource for LpstatSource {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn list_printers(&self) -> Result<Vec<PrinterDescriptor>> {
        let listing = self.run(&["-l", "-p"]).await?;
        let stdout = String::from_utf8_lossy(&listing.stdout);
        let stderr = String::from_utf8_lossy(&listing.stderr);

        if !listing.status.success() {
            if stderr.contains("No destinations") {
                info!("no printers installed");
                return Ok(Vec::new());
            }
            return Err(BondruckError::Enumeration(format!(
                "{} -l -p exited with {}: {}",
                self.program,
                listing.status,
                stderr.trim()
            )));
        }

        let default = match self.run(&["-d"]).await {
            Ok(out) => parse_default(&String::from_utf8_lossy(&out.stdout)),
            Err(err) => {
                warn!(%err, "could not query the default printer");
                None
            }
        };

        let printers = parse_printers(&stdout, default.as_deref());
        debug!(count = printers.len(), default = ?default, "printers enumerated");
        Ok(printers)
    }
}

/// A fixed device list, for headless setups and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    printers: Vec<PrinterDescriptor>,
}

impl StaticSource {
    pub fn new(printers: Vec<PrinterDescriptor>) -> Self {
        Self { printers }
    }
}

#[async_trait]
impl PrinterSource for StaticSource {
    async fn list_printers(&self) -> Result<Vec<PrinterDescriptor>> {
        Ok(self.printers.clone())
    }
}

/// Parse `lpstat -d` output.
fn parse_default(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("system default destination:")
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
    })
}

/// Parse `lpstat -l -p` output.
///
/// Each device starts with a `printer NAME ...` line; indented lines that
/// follow describe it.
fn parse_printers(output: &str, default: Option<&str>) -> Vec<PrinterDescriptor> {
    let mut printers: Vec<PrinterDescriptor> = Vec::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("printer ") {
            let mut words = rest.split_whitespace();
            let Some(name) = words.next() else { continue };
            let state = words.collect::<Vec<_>>().join(" ");
            let status = if state.starts_with("is idle") {
                PrinterStatus::Idle
            } else if state.starts_with("now printing") {
                PrinterStatus::Printing
            } else if state.starts_with("disabled") {
                PrinterStatus::Disabled
            } else {
                PrinterStatus::Unknown
            };
            printers.push(
                PrinterDescriptor::new(name)
                    .with_status(status)
                    .with_default(default == Some(name)),
            );
        } else if let Some(description) = line.trim().strip_prefix("Description:")
            && let Some(current) = printers.last_mut()
        {
            let description = description.trim();
            if !description.is_empty() {
                current.display_name = description.to_owned();
            }
        }
    }
    printers
}
