// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Render sessions: one isolated rendering context per print request.
//
// A session owns its payload, a private scratch directory and everything it
// fetched or generated. Nothing is shared between sessions. The scratch
// directory is removed on `close` and again on drop, so every exit path
// (success, error, an abandoned future after a timeout) releases it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bondruck_core::config::{AgentConfig, ConverterConfig, StabilizationConfig};
use bondruck_core::digest::short_fingerprint;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{
    DocumentKind, MM_PER_PX, Margins, MediumProfile, PageSize, PrintRequest, SessionId,
};
use futures::future::join_all;
use reqwest::Url;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::convert::HtmlConverter;
use crate::graphics::{GraphicOutcome, await_graphic, spawn_graphic};
use crate::html::{self, Composition};
use crate::measure::{MeasureInputs, estimate_height_mm};
use crate::overlay::LayoutOverlay;
use crate::pdf::{PdfShell, decode_transport};
use crate::resources::{FetchError, FontSettlement, ImageSettlement, ResourceLoader};

/// Failure reason for HTML payloads when no converter is configured.
pub const NO_HTML_CONVERTER: &str =
    "no HTML renderer configured; set htmlConverter to a program that writes PDF";

/// Per-request rendering settings, taken from the configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct RenderSettings {
    pub stabilization: StabilizationConfig,
    pub horizontal_offset_mm: f64,
    pub converter: Option<ConverterConfig>,
}

impl RenderSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            stabilization: config.stabilization,
            horizontal_offset_mm: config.horizontal_offset(),
            converter: config.html_converter.clone(),
        }
    }
}

/// Opens render sessions.
#[derive(Debug, Default)]
pub struct Renderer {
    scratch_root: Option<PathBuf>,
    opened: AtomicU64,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create session scratch directories under `root` instead of the
    /// system temp directory.
    pub fn with_scratch_root(root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: Some(root.into()),
            opened: AtomicU64::new(0),
        }
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Materialize `request` into a fresh, isolated session.
    ///
    /// HTML is kept byte for byte in memory. PDF is decoded from its
    /// transport encoding and written into the session scratch directory.
    #[instrument(skip_all, fields(kind = ?request.kind, printer = %request.logical_printer))]
    pub async fn open(
        &self,
        request: &PrintRequest,
        settings: RenderSettings,
    ) -> Result<RenderSession> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bondruck-session-");
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let source = match request.kind {
            DocumentKind::Html => Source::Html(request.payload.clone()),
            DocumentKind::Pdf => {
                let bytes = decode_transport(&request.payload)?;
                let path = scratch
                    .path()
                    .join(format!("document.{}", DocumentKind::Pdf.extension()));
                tokio::fs::write(&path, &bytes).await?;
                Source::Pdf(path)
            }
        };

        let loader = ResourceLoader::new(settings.stabilization.resource_timeout())?;
        let session = RenderSession {
            id: SessionId::new(),
            kind: request.kind,
            source,
            scratch: Some(scratch),
            loader,
            settings,
            overlay: None,
            settled: None,
            page_size: None,
            materialized: None,
            closed: false,
        };
        self.opened.fetch_add(1, Ordering::Relaxed);

        info!(
            session = %session.id,
            fingerprint = %short_fingerprint(request.payload.as_bytes()),
            bytes = request.payload.len(),
            "render session opened"
        );
        Ok(session)
    }
}

#[derive(Debug)]
enum Source {
    Html(String),
    Pdf(PathBuf),
}

/// Everything fetched or generated while stabilizing an HTML payload.
#[derive(Debug, Default)]
struct Settled {
    images: HashMap<String, String>,
    image_sizes: HashMap<String, (u32, u32)>,
    /// `href` → CSS with every `url(...)` made absolute or inlined.
    stylesheets: HashMap<String, String>,
    style_urls: HashMap<String, String>,
    graphics: Vec<Option<String>>,
}

/// Replacement for a `url(...)` target in CSS that is about to be inlined:
/// a settled font becomes its `data:` URI, anything else resolvable becomes
/// absolute so it no longer depends on where the document is written.
fn css_url_replacement(
    target: &str,
    base: Option<&Url>,
    fonts: &HashMap<String, String>,
) -> Option<String> {
    if target.starts_with('#') {
        return None;
    }
    let url = ResourceLoader::resolve(base, target).ok()?;
    if url.scheme() == "data" {
        return None;
    }
    Some(fonts.get(url.as_str()).cloned().unwrap_or_else(|| url.to_string()))
}

/// A file ready to hand to the OS printing system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedDocument {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

impl MaterializedDocument {
    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }
}

/// One exclusive rendering context.
#[derive(Debug)]
pub struct RenderSession {
    id: SessionId,
    kind: DocumentKind,
    source: Source,
    scratch: Option<TempDir>,
    loader: ResourceLoader,
    settings: RenderSettings,
    overlay: Option<LayoutOverlay>,
    settled: Option<Settled>,
    page_size: Option<PageSize>,
    materialized: Option<MaterializedDocument>,
    closed: bool,
}

impl RenderSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    pub fn overlay(&self) -> Option<&LayoutOverlay> {
        self.overlay.as_ref()
    }

    /// Apply the medium layout overlay. PDF payloads are left alone.
    pub fn apply_profile(&mut self, profile: &MediumProfile) {
        if self.kind == DocumentKind::Pdf {
            debug!(session = %self.id, "medium profile ignored for PDF payload");
            return;
        }
        let overlay = LayoutOverlay::for_profile(profile, self.settings.horizontal_offset_mm);
        debug!(
            session = %self.id,
            left_mm = overlay.left_margin_mm(),
            right_mm = overlay.right_margin_mm(),
            "layout overlay applied"
        );
        self.overlay = Some(overlay);
        self.materialized = None;
    }

    /// Drop the layout overlay; the payload is untouched by it.
    pub fn remove_overlay(&mut self) {
        if self.overlay.take().is_some() {
            debug!(session = %self.id, "layout overlay removed");
            self.page_size = None;
            self.materialized = None;
        }
    }

    /// Wait until every embedded resource has settled.
    ///
    /// With a `profile` the layout overlay is applied first and, after
    /// settling, the content height is measured to size the page.
    #[instrument(skip_all, fields(session = %self.id, kind = ?self.kind))]
    pub async fn await_stable(&mut self, profile: Option<&MediumProfile>) -> Result<()> {
        self.ensure_open()?;
        if let Some(profile) = profile {
            self.apply_profile(profile);
        }

        match &self.source {
            Source::Pdf(path) => {
                let path = path.clone();
                let shell = tokio::task::spawn_blocking(move || PdfShell::open(path))
                    .await
                    .map_err(|e| BondruckError::LoadFailed(format!("PDF inspection task: {e}")))??;
                info!(
                    pages = shell.page_count,
                    first_page_mm = ?shell.first_page_mm,
                    "PDF payload loaded"
                );
            }
            Source::Html(payload) => {
                let payload = payload.clone();
                let settled = self.settle_html(&payload).await?;
                let delay = self.settings.stabilization.settle_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Some(overlay) = &self.overlay {
                    let profile = *overlay.profile();
                    let height_mm = if profile.dynamic_height {
                        let inputs = MeasureInputs {
                            image_sizes: settled.image_sizes.clone(),
                        };
                        estimate_height_mm(&payload, &profile, &inputs)?
                    } else {
                        profile.minimum_height_mm
                    };
                    self.page_size = Some(PageSize {
                        width_mm: profile.total_width_mm,
                        height_mm,
                    });
                    debug!(height_mm, "content measured");
                }
                self.settled = Some(settled);
            }
        }
        self.materialized = None;
        Ok(())
    }

    async fn settle_html(&self, payload: &str) -> Result<Settled> {
        let scanned = html::scan(payload)?;
        let base = match scanned.base_href.as_deref() {
            Some(href) => Some(Url::parse(href.trim()).map_err(|e| {
                BondruckError::LoadFailed(format!("invalid <base href=\"{href}\">: {e}"))
            })?),
            None => None,
        };
        let base = base.as_ref();
        let stab = self.settings.stabilization;

        // Stylesheets are part of the document shell and block rendering.
        let sheets = join_all(scanned.stylesheets.iter().map(|href| async move {
            let url = ResourceLoader::resolve(base, href)
                .map_err(|e| BondruckError::LoadFailed(format!("stylesheet {href}: {e}")))?;
            match self.loader.load_stylesheet(&url).await {
                Ok(css) => Ok((href.clone(), url, css)),
                Err(FetchError::TimedOut) => Err(BondruckError::Timeout {
                    stage: "stylesheet load",
                    after_ms: stab.resource_timeout_ms,
                }),
                Err(e) => Err(BondruckError::LoadFailed(format!("stylesheet {href}: {e}"))),
            }
        }))
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        let mut font_refs: Vec<(Option<Url>, String)> = html::font_urls(&scanned.inline_css)
            .into_iter()
            .map(|u| (base.cloned(), u))
            .collect();
        for (_, sheet_url, css) in &sheets {
            font_refs.extend(
                html::font_urls(css)
                    .into_iter()
                    .map(|u| (Some(sheet_url.clone()), u)),
            );
        }

        let images = join_all(scanned.images.iter().map(|src| async move {
            let settlement = match ResourceLoader::resolve(base, src) {
                Ok(url) => self.loader.load_image(&url).await,
                Err(e) => ImageSettlement::Errored(e.to_string()),
            };
            (src.clone(), settlement)
        }));

        let fonts = join_all(font_refs.iter().map(|(font_base, src)| async move {
            match ResourceLoader::resolve(font_base.as_ref(), src) {
                Ok(url) => {
                    let settlement = self.loader.load_font(&url).await;
                    (url.to_string(), settlement)
                }
                Err(e) => (src.clone(), FontSettlement::Errored(e.to_string())),
            }
        }));

        let max_graphic_px = self
            .overlay
            .as_ref()
            .map_or(0.0, |o| o.profile().printable_width_mm / MM_PER_PX);
        let graphics = join_all(scanned.graphics.iter().map(|spec| {
            let rx = spawn_graphic(spec.clone(), max_graphic_px);
            await_graphic(
                rx,
                stab.graphic_poll_interval(),
                stab.graphic_poll_attempts,
            )
        }));

        let (images, fonts, graphics) = tokio::join!(images, fonts, graphics);

        // Absolute font URL → data URI.
        let mut font_uris = HashMap::new();
        for (font, settlement) in fonts {
            match settlement {
                FontSettlement::Ready(loaded) => {
                    font_uris.insert(font, loaded.data_uri());
                }
                FontSettlement::Errored(reason) => {
                    let font: String = font.chars().take(80).collect();
                    warn!(%font, %reason, "font did not load");
                }
            }
        }

        let mut settled = Settled {
            stylesheets: sheets
                .into_iter()
                .map(|(href, sheet_url, css)| {
                    let css = html::rewrite_css_urls(&css, |target| {
                        css_url_replacement(target, Some(&sheet_url), &font_uris)
                    });
                    (href, css)
                })
                .collect(),
            style_urls: html::css_urls(&scanned.inline_css)
                .into_iter()
                .filter_map(|target| {
                    let replacement = css_url_replacement(&target, base, &font_uris)?;
                    Some((target, replacement))
                })
                .collect(),
            ..Settled::default()
        };
        for (src, settlement) in images {
            match settlement {
                ImageSettlement::Decoded(image) => {
                    settled
                        .image_sizes
                        .insert(src.clone(), (image.width, image.height));
                    settled.images.insert(src, image.data_uri());
                }
                ImageSettlement::Errored(reason) => {
                    let src: String = src.chars().take(80).collect();
                    warn!(%src, %reason, "image did not load");
                }
            }
        }
        for (spec, outcome) in scanned.graphics.iter().zip(graphics) {
            settled.graphics.push(match outcome {
                GraphicOutcome::Rendered(svg) => Some(svg),
                GraphicOutcome::Failed(reason) => {
                    warn!(value = %spec.value, %reason, "barcode generation failed");
                    None
                }
                GraphicOutcome::NotRendered => {
                    warn!(value = %spec.value, "barcode not ready in time; placeholder left as is");
                    None
                }
            });
        }

        debug!(
            images = settled.images.len(),
            fonts = font_uris.len(),
            stylesheets = settled.stylesheets.len(),
            graphics = settled.graphics.iter().filter(|g| g.is_some()).count(),
            "resources settled"
        );
        Ok(settled)
    }

    /// Computed page size, when a medium profile drove sizing.
    pub fn page_size(&self) -> Option<PageSize> {
        self.page_size
    }

    /// Zero margins when the overlay already positions the content,
    /// otherwise `None` so the driver applies its own.
    pub fn margins(&self) -> Option<Margins> {
        self.page_size.map(|_| Margins::ZERO)
    }

    /// Current document markup: payload plus settled resources and overlay.
    pub fn document_html(&self) -> Result<String> {
        let Source::Html(payload) = &self.source else {
            return Err(BondruckError::LoadFailed("PDF payload has no markup".into()));
        };
        let empty = Settled::default();
        let settled = self.settled.as_ref().unwrap_or(&empty);
        let style = self.overlay.as_ref().map(LayoutOverlay::style_element);
        html::compose(
            payload,
            &Composition {
                overlay: style.as_deref(),
                images: &settled.images,
                stylesheets: &settled.stylesheets,
                style_urls: &settled.style_urls,
                graphics: &settled.graphics,
            },
        )
    }

    /// Write the printable document into the scratch directory.
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn materialize(&mut self) -> Result<MaterializedDocument> {
        self.ensure_open()?;
        if let Some(done) = &self.materialized {
            return Ok(done.clone());
        }
        let scratch = self
            .scratch_dir()
            .map(Path::to_path_buf)
            .ok_or_else(|| BondruckError::LoadFailed("session scratch directory is gone".into()))?;

        let document = match &self.source {
            Source::Pdf(path) => MaterializedDocument {
                path: path.clone(),
                kind: DocumentKind::Pdf,
            },
            Source::Html(_) => {
                // CUPS has no HTML filter; the markup would print as text.
                let Some(config) = &self.settings.converter else {
                    return Err(BondruckError::PrintFailed(NO_HTML_CONVERTER.into()));
                };
                let path = scratch.join(format!("document.{}", DocumentKind::Html.extension()));
                tokio::fs::write(&path, self.document_html()?).await?;
                let output = scratch.join(format!("document.{}", DocumentKind::Pdf.extension()));
                HtmlConverter::new(config.clone())
                    .convert(&path, &output, self.page_size)
                    .await?;
                MaterializedDocument {
                    path: output,
                    kind: DocumentKind::Pdf,
                }
            }
        };
        debug!(path = %document.path.display(), "document materialized");
        self.materialized = Some(document.clone());
        Ok(document)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the overlay, settled resources and scratch directory.
    ///
    /// Safe to call more than once. Cleanup failures are logged.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.overlay = None;
        self.settled = None;
        self.materialized = None;
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(err) = scratch.close() {
                warn!(session = %self.id, path = %path.display(), %err, "scratch cleanup failed");
                // Last resort; the TempDir guard is already consumed.
                if let Err(err) = std::fs::remove_dir_all(&path)
                    && err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(session = %self.id, %err, "scratch directory left behind");
                }
            }
        }
        debug!(session = %self.id, "render session closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(BondruckError::LoadFailed("render session already closed".into()))
        } else {
            Ok(())
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bondruck_core::ErrorKind;
    use bondruck_core::types::LogicalPrinter;

    use super::*;
    use crate::pdf::reader::tests::receipt_pdf;
    use crate::resources::tests::PIXEL_PNG_BASE64;

    fn settings() -> RenderSettings {
        RenderSettings {
            stabilization: StabilizationConfig::immediate(),
            ..RenderSettings::default()
        }
    }

    /// Converter that copies the composed markup to the output path, so the
    /// materialized file shows exactly what a real converter would be given.
    fn copying_settings() -> RenderSettings {
        RenderSettings {
            converter: Some(ConverterConfig {
                program: "cp".into(),
                args: vec!["{input}".into(), "{output}".into()],
            }),
            ..settings()
        }
    }

    fn html(payload: &str) -> PrintRequest {
        PrintRequest::html(payload, LogicalPrinter::Main)
    }

    #[tokio::test]
    async fn resource_free_document_stabilizes_immediately() {
        let renderer = Renderer::new();
        let mut session = renderer
            .open(&html("<html><body><p>Total 9.50</p></body></html>"), settings())
            .await
            .unwrap();

        let started = Instant::now();
        session
            .await_stable(Some(&MediumProfile::ROLL_80MM))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(
            session.page_size(),
            Some(PageSize {
                width_mm: 80.0,
                height_mm: 100.0
            })
        );
        assert_eq!(session.margins(), Some(Margins::ZERO));
        assert_eq!(renderer.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn html_without_profile_leaves_sizing_to_driver() {
        let mut session = Renderer::new()
            .open(&html("<p>hi</p>"), settings())
            .await
            .unwrap();
        session.await_stable(None).await.unwrap();
        assert_eq!(session.page_size(), None);
        assert_eq!(session.margins(), None);
        assert_eq!(session.document_html().unwrap(), "<p>hi</p>");
    }

    #[tokio::test]
    async fn overlay_is_removable_without_touching_payload() {
        let payload = "<html><head></head><body><p>x</p></body></html>";
        let mut session = Renderer::new().open(&html(payload), settings()).await.unwrap();
        session
            .await_stable(Some(&MediumProfile::ROLL_80MM))
            .await
            .unwrap();
        assert!(session.document_html().unwrap().contains("bondruck-layout-overlay"));

        session.remove_overlay();
        assert_eq!(session.document_html().unwrap(), payload);
        assert_eq!(session.margins(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn materialized_html_is_resource_complete() {
        let payload = format!(
            r#"<html><head></head><body><img src="data:image/png;base64,{PIXEL_PNG_BASE64}">
            <div data-barcode="R-1"></div></body></html>"#
        );
        let mut session = Renderer::new()
            .open(&html(&payload), copying_settings())
            .await
            .unwrap();
        session
            .await_stable(Some(&MediumProfile::ROLL_58MM))
            .await
            .unwrap();

        let document = session.materialize().await.unwrap();
        assert_eq!(document.kind, DocumentKind::Pdf);
        let written = std::fs::read_to_string(&document.path).unwrap();
        assert!(written.contains("<svg"));
        assert!(written.contains("data:image/png;base64,"));
        assert!(written.contains("width:58mm"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stylesheet_fonts_travel_with_the_document() {
        let assets = tempfile::tempdir().unwrap();
        std::fs::write(assets.path().join("mono.woff"), b"wOFF\0\0\0\x01").unwrap();
        std::fs::write(
            assets.path().join("receipt.css"),
            r#"@font-face{font-family:Mono;src:url("mono.woff") format("woff")}
body{font-family:Mono;background:url(paper.png)}"#,
        )
        .unwrap();
        let sheet = Url::from_file_path(assets.path().join("receipt.css")).unwrap();
        let payload = format!(
            r#"<html><head><link rel="stylesheet" href="{sheet}"></head><body>x</body></html>"#
        );

        let mut session = Renderer::new()
            .open(&html(&payload), copying_settings())
            .await
            .unwrap();
        session
            .await_stable(Some(&MediumProfile::ROLL_80MM))
            .await
            .unwrap();
        let document = session.materialize().await.unwrap();
        let written = std::fs::read_to_string(&document.path).unwrap();

        let encoded = STANDARD.encode(b"wOFF\0\0\0\x01");
        let font = format!("url(\"data:font/woff;base64,{encoded}\")");
        assert!(written.contains(&font), "{written}");
        assert!(!written.contains("url(\"mono.woff\")"));
        let paper = sheet.join("paper.png").unwrap();
        assert!(written.contains(&format!("url(\"{paper}\")")));
    }

    #[tokio::test]
    async fn inline_style_references_resolve_against_base() {
        let payload = r#"<html><head><base href="https://pos.example/r/">
<style>body{background:url(paper.png)}</style></head><body>x</body></html>"#;
        let mut session = Renderer::new().open(&html(payload), settings()).await.unwrap();
        session.await_stable(None).await.unwrap();
        let composed = session.document_html().unwrap();
        assert!(composed.contains(r#"url("https://pos.example/r/paper.png")"#));
    }

    #[tokio::test]
    async fn html_without_converter_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Renderer::with_scratch_root(root.path());
        let mut session = renderer.open(&html("<p>x</p>"), settings()).await.unwrap();
        session
            .await_stable(Some(&MediumProfile::ROLL_80MM))
            .await
            .unwrap();

        let err = session.materialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PrintFailed);
        assert_eq!(err.reason(), NO_HTML_CONVERTER);
        let scratch = session.scratch_dir().unwrap();
        assert_eq!(std::fs::read_dir(scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn broken_images_do_not_block() {
        let mut session = Renderer::new()
            .open(
                &html(r#"<img src="file:///no/such/logo.png"><img src="relative.png">"#),
                settings(),
            )
            .await
            .unwrap();
        session.await_stable(None).await.unwrap();
    }

    #[tokio::test]
    async fn missing_stylesheet_fails_to_load() {
        let mut session = Renderer::new()
            .open(
                &html(r#"<link rel="stylesheet" href="file:///no/such/receipt.css"><p>x</p>"#),
                settings(),
            )
            .await
            .unwrap();
        let err = session.await_stable(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadFailed);
        assert!(err.to_string().contains("receipt.css"));
    }

    #[tokio::test]
    async fn inlined_stylesheet_replaces_link() {
        let css = STANDARD.encode("p{font-weight:bold}");
        let payload =
            format!(r#"<link rel="stylesheet" href="data:text/css;base64,{css}"><p>x</p>"#);
        let mut session = Renderer::new()
            .open(&html(&payload), settings())
            .await
            .unwrap();
        session.await_stable(None).await.unwrap();
        assert_eq!(
            session.document_html().unwrap(),
            "<style>p{font-weight:bold}</style><p>x</p>"
        );
    }

    #[tokio::test]
    async fn pdf_session_validates_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Renderer::with_scratch_root(root.path());
        let request = PrintRequest::pdf(STANDARD.encode(receipt_pdf()), LogicalPrinter::Kitchen);

        let mut session = renderer.open(&request, settings()).await.unwrap();
        session
            .await_stable(Some(&MediumProfile::ROLL_80MM))
            .await
            .unwrap();
        assert!(session.overlay().is_none());
        assert_eq!(session.page_size(), None);
        assert_eq!(session.margins(), None);

        let document = session.materialize().await.unwrap();
        assert_eq!(document.mime_type(), "application/pdf");
        assert!(document.path.exists());

        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(!document.path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn invalid_pdf_fails_to_load() {
        let request =
            PrintRequest::pdf(STANDARD.encode(b"%PDF-1.4 garbage"), LogicalPrinter::Main);
        let mut session = Renderer::new().open(&request, settings()).await.unwrap();
        let err = session.await_stable(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadFailed);
    }

    #[tokio::test]
    async fn undecodable_pdf_is_rejected_at_open() {
        let renderer = Renderer::new();
        let request = PrintRequest::pdf("@@@", LogicalPrinter::Main);
        let err = renderer.open(&request, settings()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(renderer.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn dropping_a_session_removes_scratch() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Renderer::with_scratch_root(root.path());
        let session = renderer.open(&html("<p>x</p>"), settings()).await.unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
        drop(session);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn closed_session_refuses_work() {
        let mut session = Renderer::new().open(&html("<p>x</p>"), settings()).await.unwrap();
        session.close();
        assert!(session.await_stable(None).await.is_err());
        assert!(session.materialize().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_sessions_are_isolated() {
        let renderer = Renderer::new();
        let (first, second) = (html("<p>a</p>"), html("<p>b</p>"));
        let (a, b) = tokio::join!(
            renderer.open(&first, settings()),
            renderer.open(&second, settings())
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.id(), b.id());
        assert_ne!(a.scratch_dir(), b.scratch_dir());
        assert_eq!(renderer.sessions_opened(), 2);
    }
}
