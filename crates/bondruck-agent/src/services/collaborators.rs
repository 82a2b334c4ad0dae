// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Side-effecting helpers exposed to the operator: a synthetic test print
// through the running agent, and opening the log directory.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{info, warn};

use bondruck_core::error::BondruckError;
use bondruck_core::types::LogicalPrinter;

use crate::error::AgentError;
use crate::http::models::{PrintBody, PrintResponse};

/// Synthetic receipt used by `bondruck test-print`.
pub const TEST_RECEIPT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Bondruck test print</title>
<style>
  body { font-family: monospace; font-size: 12px; }
  h1 { font-size: 16px; text-align: center; margin: 0 0 4px; }
  table { width: 100%; border-collapse: collapse; }
  td.amount { text-align: right; }
  .total td { border-top: 1px dashed #000; font-weight: bold; }
  .code { text-align: center; margin-top: 8px; }
</style>
</head>
<body>
  <h1>BONDRUCK</h1>
  <p>Test print</p>
  <hr>
  <table>
    <tr><td>1x Espresso</td><td class="amount">2.40</td></tr>
    <tr><td>2x Croissant</td><td class="amount">5.80</td></tr>
    <tr><td>1x Orange juice</td><td class="amount">3.50</td></tr>
    <tr class="total"><td>Total</td><td class="amount">11.70</td></tr>
  </table>
  <div class="code" data-barcode="BONDRUCK-TEST" data-barcode-height="60" data-barcode-text="true"></div>
  <p>If this slip is centred and uncut text fits the roll, the agent works.</p>
</body>
</html>
"#;

/// Endpoint for a logical printer on the local agent.
pub fn print_url(port: u16, printer: LogicalPrinter) -> String {
    match printer {
        LogicalPrinter::Main => format!("http://127.0.0.1:{port}/print"),
        LogicalPrinter::Kitchen => format!("http://127.0.0.1:{port}/print/kitchen"),
    }
}

/// Send the synthetic receipt through the agent's own `/print` path.
pub async fn trigger_test_print(
    port: u16,
    printer: LogicalPrinter,
) -> Result<PrintResponse, AgentError> {
    let url = print_url(port, printer);
    info!(%url, "sending test print");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let response = client
        .post(&url)
        .json(&PrintBody::html(TEST_RECEIPT_HTML))
        .send()
        .await?;
    let status = response.status();
    let reply: PrintResponse = response.json().await?;
    if reply.success {
        info!(%status, printer = ?reply.printer, "test print accepted");
    } else {
        warn!(%status, error = ?reply.error, "test print failed");
    }
    Ok(reply)
}

/// Platform command that opens a directory in the desktop file manager.
pub fn opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    }
}

/// Open `dir` with the platform opener. Best effort; the opener runs detached.
pub fn open_logs(dir: &Path) -> Result<(), AgentError> {
    if !dir.is_dir() {
        let reason = format!("log directory {} does not exist", dir.display());
        return Err(BondruckError::Config(reason).into());
    }
    let program = opener();
    std::process::Command::new(program)
        .arg(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| BondruckError::Io(std::io::Error::new(e.kind(), format!("{program}: {e}"))))?;
    info!(path = %dir.display(), %program, "opened log directory");
    Ok(())
}
