// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTML to PDF conversion through an external program.
//
// CUPS ships no HTML filter, so HTML payloads only print through a configured
// converter. The session hands the dispatcher the PDF it writes at the
// computed page size.

use std::path::Path;
use std::process::Stdio;

use bondruck_core::config::ConverterConfig;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::PageSize;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Runs a configured converter command template.
#[derive(Debug, Clone)]
pub struct HtmlConverter {
    config: ConverterConfig,
}

impl HtmlConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Expand the argument template for one conversion.
    fn arguments(&self, input: &Path, output: &Path, page: Option<PageSize>) -> Vec<String> {
        let width = page.map(|p| format!("{:.1}", p.width_mm)).unwrap_or_default();
        let height = page.map(|p| format!("{:.1}", p.height_mm)).unwrap_or_default();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.display().to_string())
                    .replace("{output}", &output.display().to_string())
                    .replace("{widthMm}", &width)
                    .replace("{heightMm}", &height)
            })
            .collect()
    }

    /// Convert `input` (HTML) into `output` (PDF).
    ///
    /// The child is killed if the caller stops waiting.
    #[instrument(skip_all, fields(program = %self.config.program))]
    pub async fn convert(&self, input: &Path, output: &Path, page: Option<PageSize>) -> Result<()> {
        let args = self.arguments(input, output, page);
        debug!(?args, "running HTML converter");

        let result = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                let program = &self.config.program;
                BondruckError::LoadFailed(format!("cannot run converter '{program}': {e}"))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(BondruckError::LoadFailed(format!(
                "converter exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(BondruckError::LoadFailed(
                "converter produced no output file".into(),
            ));
        }

        info!(output = %output.display(), "HTML converted to PDF");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn converter(program: &str, args: &[&str]) -> HtmlConverter {
        HtmlConverter::new(ConverterConfig {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }

    #[test]
    fn template_is_expanded() {
        let c = converter("wkhtmltopdf", &["--page-width", "{widthMm}mm", "{input}", "{output}"]);
        let args = c.arguments(
            Path::new("/tmp/in.html"),
            Path::new("/tmp/out.pdf"),
            Some(PageSize {
                width_mm: 80.0,
                height_mm: 123.45,
            }),
        );
        assert_eq!(args, vec!["--page-width", "80.0mm", "/tmp/in.html", "/tmp/out.pdf"]);
    }

    #[tokio::test]
    async fn successful_converter_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.html");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, "<p>x</p>").unwrap();

        converter("cp", &["{input}", "{output}"])
            .convert(&input, &output, None)
            .await
            .unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn failing_converter_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = converter("false", &[])
            .convert(&dir.path().join("in.html"), &dir.path().join("out.pdf"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), bondruck_core::ErrorKind::LoadFailed);
    }
}
