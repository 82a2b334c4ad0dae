// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print dispatcher: hands a stabilized document to the OS printing system.
//
// Backends are callback style: `submit` starts the job and later finishes the
// `Completion` it was given. A `Completion` can be finished only once, so
// every submission yields exactly one result. The dispatcher never retries.
//
// Two backends exist:
//   - `LpBackend`  runs the CUPS `lp` command against the materialized file
//   - `IppBackend` sends an IPP Print-Job to the local CUPS server

use std::io::Cursor;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use ipp::prelude::*;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use bondruck_core::config::{AgentConfig, PrintBackendKind};
use bondruck_core::error::BondruckError;
use bondruck_core::types::{JobOptions, PT_PER_MM, PrintOutcome, ResolvedTarget, SessionId};
use bondruck_render::{MaterializedDocument, RenderSession};

/// Reason used when a backend reports failure without saying why.
pub const GENERIC_FAILURE: &str = "print failed";

/// Everything a backend needs to print one document.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub session_id: SessionId,
    pub document: MaterializedDocument,
    pub options: JobOptions,
}

/// Result delivered through a [`Completion`]. `Err(None)` is a failure
/// without a stated reason.
pub type JobResult = std::result::Result<(), Option<String>>;

/// One-shot completion callback for a single submission.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<JobResult>,
}

impl Completion {
    pub fn channel() -> (Self, oneshot::Receiver<JobResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn succeed(self) {
        self.finish(Ok(()));
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.finish(Err(Some(reason.into())));
    }

    pub fn finish(self, result: JobResult) {
        if self.tx.send(result).is_err() {
            debug!("print result arrived after the caller stopped waiting");
        }
    }

    /// Resolves once nobody is waiting for the result any more.
    pub async fn abandoned(&mut self) {
        self.tx.closed().await;
    }
}

/// A way of getting jobs to the OS printing system.
pub trait PrintBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start printing `job` and finish `completion` when done.
    fn submit(&self, job: PrintJob, completion: Completion);
}

/// Build the backend selected in configuration.
pub fn backend_for(config: &AgentConfig) -> Arc<dyn PrintBackend> {
    match config.print_backend {
        PrintBackendKind::Lp => Arc::new(LpBackend::new(config.lp_command.clone())),
        PrintBackendKind::Ipp => Arc::new(IppBackend::new(config.cups_uri.clone())),
    }
}

fn normalize_reason(reason: Option<String>) -> String {
    reason
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE.to_owned())
}

/// Submits stabilized sessions and maps backend results to outcomes.
#[derive(Clone)]
pub struct PrintDispatcher {
    backend: Arc<dyn PrintBackend>,
}

impl std::fmt::Debug for PrintDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintDispatcher")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl PrintDispatcher {
    pub fn new(backend: Arc<dyn PrintBackend>) -> Self {
        Self { backend }
    }

    /// Print the session's document on `target`.
    ///
    /// Always returns an outcome; failures carry a non-empty reason.
    #[instrument(
        skip_all,
        fields(session = %session.id(), printer = %target.name(), backend = self.backend.name())
    )]
    pub async fn submit(
        &self,
        session: &mut RenderSession,
        target: &ResolvedTarget,
        options: JobOptions,
    ) -> PrintOutcome {
        let started = Instant::now();
        let printer = target.name().to_owned();

        let document = match session.materialize().await {
            Ok(document) => document,
            Err(err) => {
                warn!(%err, "document could not be materialized");
                return PrintOutcome::from_error(&err, Some(printer), elapsed_ms(started));
            }
        };

        let job = PrintJob {
            session_id: session.id(),
            document,
            options,
        };
        let (completion, rx) = Completion::channel();
        self.backend.submit(job, completion);

        let failure = match rx.await {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(BondruckError::PrintFailed(normalize_reason(reason))),
            // Backend dropped the completion without finishing it.
            Err(_) => Some(BondruckError::PrintFailed(GENERIC_FAILURE.to_owned())),
        };
        let outcome = match failure {
            None => PrintOutcome::success(printer, elapsed_ms(started)),
            Some(err) => PrintOutcome::from_error(&err, Some(printer), elapsed_ms(started)),
        };
        if outcome.succeeded {
            info!(duration_ms = outcome.duration_ms, "job handed to printer");
        } else {
            warn!(reason = ?outcome.failure_reason, "job failed");
        }
        outcome
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// lp
// ---------------------------------------------------------------------------

/// Prints by running the CUPS `lp` command.
#[derive(Debug, Clone)]
pub struct LpBackend {
    program: String,
}

impl LpBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn points(mm: f64) -> i64 {
    (mm * PT_PER_MM).round() as i64
}

/// Command-line arguments for one `lp` invocation.
pub fn lp_arguments(job: &PrintJob) -> Vec<String> {
    let options = &job.options;
    let mut args = vec![
        "-d".to_owned(),
        options.device_name.clone(),
        "-t".to_owned(),
        options.job_title.clone(),
    ];
    if let Some(page) = options.page_size {
        args.push("-o".into());
        args.push(format!("media={}", page.cups_media()));
    }
    if let Some(margins) = options.margins {
        for (name, mm) in [
            ("page-top", margins.top_mm),
            ("page-right", margins.right_mm),
            ("page-bottom", margins.bottom_mm),
            ("page-left", margins.left_mm),
        ] {
            args.push("-o".into());
            args.push(format!("{name}={}", points(mm)));
        }
    }
    if !options.color {
        args.push("-o".into());
        args.push("print-color-mode=monochrome".into());
    }
    args.push("--".into());
    args.push(job.document.path.display().to_string());
    args
}

/// `request id is Counter-42 (1 file(s))` → `Counter-42`.
fn parse_request_id(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("request id is "))
        .and_then(|rest| rest.split_whitespace().next())
}

impl PrintBackend for LpBackend {
    fn name(&self) -> &'static str {
        "lp"
    }

    fn submit(&self, job: PrintJob, mut completion: Completion) {
        let program = self.program.clone();
        let args = lp_arguments(&job);
        tokio::spawn(async move {
            debug!(session = %job.session_id, ?args, "running lp");
            let child = Command::new(&program)
                .args(&args)
                .env("LC_ALL", "C")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output();

            let output = tokio::select! {
                output = child => output,
                _ = completion.abandoned() => {
                    warn!(session = %job.session_id, "caller gave up; lp killed");
                    return;
                }
            };

            match output {
                Ok(out) if out.status.success() => {
                    let stdout = String::from_utf8_lossy(&out.stdout);
                    info!(
                        session = %job.session_id,
                        request_id = parse_request_id(&stdout).unwrap_or("?"),
                        "lp accepted job"
                    );
                    completion.succeed();
                }
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_owned();
                    error!(status = %out.status, %stderr, "lp failed");
                    completion.finish(Err(Some(stderr)));
                }
                Err(err) => completion.fail(format!("cannot run {program}: {err}")),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// IPP
// ---------------------------------------------------------------------------

/// Prints by sending an IPP Print-Job to the CUPS server.
#[derive(Debug, Clone)]
pub struct IppBackend {
    cups_uri: String,
}

impl IppBackend {
    pub fn new(cups_uri: impl Into<String>) -> Self {
        Self {
            cups_uri: cups_uri.into(),
        }
    }

    /// Queue URI of a CUPS printer.
    pub fn printer_uri(&self, printer: &str) -> String {
        format!("{}/printers/{}", self.cups_uri.trim_end_matches('/'), printer)
    }
}

fn keyword(name: &str, value: &str) -> std::result::Result<IppAttribute, String> {
    let value = value
        .try_into()
        .map_err(|_| format!("{name} value '{value}' is not a valid IPP keyword"))?;
    Ok(IppAttribute::new(name, IppValue::Keyword(value)))
}

async fn send_print_job(uri: String, job: PrintJob) -> std::result::Result<Option<i32>, String> {
    let parsed: Uri = uri
        .parse()
        .map_err(|e| format!("invalid printer URI '{uri}': {e}"))?;
    let bytes = tokio::fs::read(&job.document.path)
        .await
        .map_err(|e| format!("cannot read {}: {e}", job.document.path.display()))?;

    let payload = IppPayload::new(Cursor::new(bytes));
    let mut builder = IppOperationBuilder::print_job(parsed.clone(), payload)
        .job_title(job.options.job_title.as_str())
        .document_format(job.document.mime_type());
    if let Some(page) = job.options.page_size {
        builder = builder.attribute(keyword("media", &page.cups_media())?);
    }
    if !job.options.color {
        builder = builder.attribute(keyword("print-color-mode", "monochrome")?);
    }
    let operation = builder.build();

    let client = AsyncIppClient::new(parsed);
    let response = client
        .send(operation)
        .await
        .map_err(|e| format!("Print-Job: {e}"))?;

    let code = response.header().status_code();
    if !code.is_success() {
        return Err(format!("Print-Job returned status {code:?}"));
    }

    let job_id = response
        .attributes()
        .groups_of(DelimiterTag::JobAttributes)
        .find_map(|group| match group.attributes().get("job-id").map(|a| a.value()) {
            Some(IppValue::Integer(id)) => Some(*id),
            _ => None,
        });
    Ok(job_id)
}

impl PrintBackend for IppBackend {
    fn name(&self) -> &'static str {
        "ipp"
    }

    fn submit(&self, job: PrintJob, mut completion: Completion) {
        let uri = self.printer_uri(&job.options.device_name);
        tokio::spawn(async move {
            let session = job.session_id;
            info!(%session, %uri, mime = job.document.mime_type(), "sending Print-Job");
            let result = tokio::select! {
                result = send_print_job(uri, job) => result,
                _ = completion.abandoned() => {
                    warn!(%session, "caller gave up; Print-Job abandoned");
                    return;
                }
            };
            match result {
                Ok(job_id) => {
                    info!(%session, ?job_id, "print job accepted by CUPS");
                    completion.succeed();
                }
                Err(reason) => {
                    error!(%session, %reason, "Print-Job failed");
                    completion.fail(reason);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bondruck_core::config::{ConverterConfig, StabilizationConfig};
    use bondruck_core::error::ErrorKind;
    use bondruck_core::types::{
        DocumentKind, LogicalPrinter, Margins, PageSize, PrintRequest, PrinterDescriptor,
        ResolutionReason,
    };
    use bondruck_render::{NO_HTML_CONVERTER, RenderSettings, Renderer};

    fn job(options: JobOptions) -> PrintJob {
        PrintJob {
            session_id: SessionId::new(),
            document: MaterializedDocument {
                path: "/tmp/receipt.pdf".into(),
                kind: DocumentKind::Pdf,
            },
            options,
        }
    }

    fn target(name: &str) -> ResolvedTarget {
        ResolvedTarget::new(PrinterDescriptor::new(name), ResolutionReason::ExactMatch)
    }

    async fn stable_session(renderer: &Renderer) -> RenderSession {
        let settings = RenderSettings {
            stabilization: StabilizationConfig::immediate(),
            converter: Some(ConverterConfig {
                program: "cp".into(),
                args: vec!["{input}".into(), "{output}".into()],
            }),
            ..RenderSettings::default()
        };
        let receipt = PrintRequest::html("<p>Total 3.00</p>", LogicalPrinter::Main);
        let mut session = renderer.open(&receipt, settings).await.unwrap();
        session.await_stable(None).await.unwrap();
        session
    }

    /// Backend that counts submissions and succeeds.
    #[derive(Default)]
    struct Counting(std::sync::atomic::AtomicUsize);

    impl PrintBackend for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn submit(&self, _job: PrintJob, completion: Completion) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            completion.succeed();
        }
    }

    /// Backend that finishes with a fixed result, or drops the completion.
    struct Fixed(Option<JobResult>);

    impl PrintBackend for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn submit(&self, _job: PrintJob, completion: Completion) {
            if let Some(result) = self.0.clone() {
                completion.finish(result);
            }
        }
    }

    #[test]
    fn lp_arguments_for_sized_receipt() {
        let mut options = JobOptions::for_device("Counter", "bondruck main");
        options.page_size = Some(PageSize {
            width_mm: 80.0,
            height_mm: 142.3,
        });
        options.margins = Some(Margins::ZERO);
        let args = lp_arguments(&job(options));
        assert_eq!(
            args,
            vec![
                "-d",
                "Counter",
                "-t",
                "bondruck main",
                "-o",
                "media=Custom.80x143mm",
                "-o",
                "page-top=0",
                "-o",
                "page-right=0",
                "-o",
                "page-bottom=0",
                "-o",
                "page-left=0",
                "-o",
                "print-color-mode=monochrome",
                "--",
                "/tmp/receipt.pdf",
            ]
        );
    }

    #[test]
    fn lp_arguments_leave_driver_defaults_alone() {
        let args = lp_arguments(&job(JobOptions::for_device("Office", "t")));
        assert!(!args.iter().any(|a| a.starts_with("media=") || a.starts_with("page-")));
    }

    #[test]
    fn request_id_is_parsed() {
        assert_eq!(
            parse_request_id("request id is Counter-42 (1 file(s))\n"),
            Some("Counter-42")
        );
        assert_eq!(parse_request_id(""), None);
    }

    #[test]
    fn cups_printer_uri() {
        let backend = IppBackend::new("ipp://localhost:631/");
        assert_eq!(
            backend.printer_uri("Counter"),
            "ipp://localhost:631/printers/Counter"
        );
    }

    #[test]
    fn backend_follows_configuration() {
        let mut config = AgentConfig::default();
        assert_eq!(backend_for(&config).name(), "lp");
        config.print_backend = PrintBackendKind::Ipp;
        assert_eq!(backend_for(&config).name(), "ipp");
    }

    #[tokio::test]
    async fn reasonless_failure_is_normalized() {
        let renderer = Renderer::new();
        let mut session = stable_session(&renderer).await;
        let dispatcher = PrintDispatcher::new(Arc::new(Fixed(Some(Err(Some("  ".into()))))));
        let outcome = dispatcher
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failure_reason.as_deref(), Some(GENERIC_FAILURE));
        assert_eq!(outcome.failure_kind, Some(ErrorKind::PrintFailed));
        assert_eq!(outcome.printer_name.as_deref(), Some("Counter"));
    }

    #[tokio::test]
    async fn html_is_never_sent_raw_to_the_printer() {
        let settings = RenderSettings {
            stabilization: StabilizationConfig::immediate(),
            ..RenderSettings::default()
        };
        let receipt = PrintRequest::html("<p>Total 3.00</p>", LogicalPrinter::Main);
        let mut session = Renderer::new().open(&receipt, settings).await.unwrap();
        session.await_stable(None).await.unwrap();

        let backend = Arc::new(Counting::default());
        let outcome = PrintDispatcher::new(backend.clone())
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failure_kind, Some(ErrorKind::PrintFailed));
        assert_eq!(outcome.failure_reason.as_deref(), Some(NO_HTML_CONVERTER));
        assert_eq!(backend.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn converted_document_reaches_the_backend_as_pdf() {
        let renderer = Renderer::new();
        let mut session = stable_session(&renderer).await;
        let backend = Arc::new(Counting::default());
        let outcome = PrintDispatcher::new(backend.clone())
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert!(outcome.succeeded, "{outcome:?}");
        assert_eq!(backend.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        let document = session.materialize().await.unwrap();
        assert_eq!(document.mime_type(), "application/pdf");
    }

    #[tokio::test]
    async fn dropped_completion_is_a_failure() {
        let renderer = Renderer::new();
        let mut session = stable_session(&renderer).await;
        let dispatcher = PrintDispatcher::new(Arc::new(Fixed(None)));
        let outcome = dispatcher
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert_eq!(outcome.failure_reason.as_deref(), Some(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn success_names_the_printer() {
        let renderer = Renderer::new();
        let mut session = stable_session(&renderer).await;
        let dispatcher = PrintDispatcher::new(Arc::new(Fixed(Some(Ok(())))));
        let outcome = dispatcher
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.printer_name.as_deref(), Some("Counter"));
        assert_eq!(outcome.failure_reason, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn lp_exit_status_decides_outcome() {
        let renderer = Renderer::new();
        let mut session = stable_session(&renderer).await;

        let ok = PrintDispatcher::new(Arc::new(LpBackend::new("true")))
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert!(ok.succeeded);

        let failed = PrintDispatcher::new(Arc::new(LpBackend::new("false")))
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert!(!failed.succeeded);
        assert_eq!(failed.failure_reason.as_deref(), Some(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn missing_lp_program_reports_why() {
        let renderer = Renderer::new();
        let mut session = stable_session(&renderer).await;
        let outcome = PrintDispatcher::new(Arc::new(LpBackend::new("/definitely/not/lp")))
            .submit(&mut session, &target("Counter"), JobOptions::for_device("Counter", "t"))
            .await;
        assert!(
            outcome
                .failure_reason
                .as_deref()
                .is_some_and(|r| r.starts_with("cannot run /definitely/not/lp"))
        );
    }
}
