// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print orchestrator: runs one print request end to end.
//
// validate → resolve printer → open session → stabilize → dispatch → close
//
// Every request gets its own render session, so concurrent requests never
// share layout state. The session is closed on every exit path, including
// the overall request timeout.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use bondruck_core::config::AgentConfig;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{
    DocumentKind, JobOptions, PrintOutcome, PrintRequest, PrinterDescriptor, ResolutionReason,
};
use bondruck_render::{RenderSession, RenderSettings, Renderer};

use crate::directory::{self, PrinterSource};
use crate::dispatcher::PrintDispatcher;

/// Sequences directory, renderer and dispatcher for each request.
#[derive(Clone)]
pub struct PrintOrchestrator {
    source: Arc<dyn PrinterSource>,
    renderer: Arc<Renderer>,
    dispatcher: PrintDispatcher,
}

/// State shared between the request pipeline and its timeout guard.
#[derive(Default)]
struct Attempt {
    session: Option<RenderSession>,
    printer: Option<String>,
}

impl PrintOrchestrator {
    pub fn new(
        source: Arc<dyn PrinterSource>,
        renderer: Renderer,
        dispatcher: PrintDispatcher,
    ) -> Self {
        Self {
            source,
            renderer: Arc::new(renderer),
            dispatcher,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Printers currently known to the OS.
    pub async fn list_printers(&self) -> Result<Vec<PrinterDescriptor>> {
        self.source.list_printers().await
    }

    /// Handle one print request. Always returns an outcome.
    #[instrument(skip_all, fields(printer = %request.logical_printer, kind = ?request.kind))]
    pub async fn handle_print_request(
        &self,
        request: PrintRequest,
        config: &AgentConfig,
    ) -> PrintOutcome {
        let started = Instant::now();
        let mut attempt = Attempt::default();

        let pipeline = self.run(&request, config, &mut attempt);
        let result = match tokio::time::timeout(config.request_timeout(), pipeline).await {
            Ok(result) => result,
            Err(_) => Err(BondruckError::Timeout {
                stage: "print request",
                after_ms: config.request_timeout_ms,
            }),
        };

        let session_id = attempt.session.as_ref().map(RenderSession::id);
        if let Some(mut session) = attempt.session.take() {
            session.close();
        }
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => PrintOutcome::from_error(&err, attempt.printer.clone(), duration_ms),
        };
        outcome.duration_ms = duration_ms;
        let outcome = outcome.with_session(session_id);

        if outcome.succeeded {
            info!(
                session = ?outcome.session_id,
                device = ?outcome.printer_name,
                duration_ms,
                "print request completed"
            );
        } else {
            warn!(
                session = ?outcome.session_id,
                device = ?outcome.printer_name,
                kind = ?outcome.failure_kind,
                reason = ?outcome.failure_reason,
                duration_ms,
                "print request failed"
            );
        }
        outcome
    }

    async fn run(
        &self,
        request: &PrintRequest,
        config: &AgentConfig,
        attempt: &mut Attempt,
    ) -> Result<PrintOutcome> {
        if !request.has_payload() {
            return Err(BondruckError::BadRequest(
                "request carries neither HTML nor PDF content".into(),
            ));
        }
        let logical = config
            .printer_for(request.logical_printer)
            .ok_or(BondruckError::Unconfigured(request.logical_printer))?;

        let candidates = self.source.list_printers().await?;
        let target = directory::resolve(logical, &candidates)?;
        if target.reason == ResolutionReason::DefaultFallback {
            warn!(
                configured = logical,
                using = target.name(),
                "configured printer not found; using the system default"
            );
        }
        attempt.printer = Some(target.name().to_owned());

        let session = self
            .renderer
            .open(request, RenderSettings::from_config(config))
            .await?;
        let session = attempt.session.insert(session);

        let profile = match request.kind {
            DocumentKind::Html => config.medium_for(request.logical_printer),
            DocumentKind::Pdf => None,
        };
        session.await_stable(profile.as_ref()).await?;

        let mut options = JobOptions::for_device(
            target.name(),
            format!("bondruck {} {}", request.logical_printer, session.id()),
        );
        options.page_size = session.page_size();
        options.margins = session.margins();

        Ok(self.dispatcher.submit(session, &target, options).await)
    }
}
