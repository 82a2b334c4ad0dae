// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dynamic graphics: barcodes generated from placeholder elements.
//
// Each placeholder gets its own generator task which reports completion over
// a `watch` channel. Waiting on that signal is bounded by a configured poll
// interval and attempt count; a generator that never produces visible content
// is given up on and the placeholder is printed as-is.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Bar/space widths for Code 128 values 0..=105.
const PATTERNS: [&str; 106] = [
    "212222", "222122", "222221", "121223", "121322", "131222", "122213", "122312", "132212",
    "221213", "221312", "231212", "112232", "122132", "122231", "113222", "123122", "123221",
    "223211", "221132", "221231", "213212", "223112", "312131", "311222", "321122", "321221",
    "312212", "322112", "322211", "212123", "212321", "232121", "111323", "131123", "131321",
    "112313", "132113", "132311", "211313", "231113", "231311", "112133", "112331", "132131",
    "113123", "113321", "133121", "313121", "211331", "231131", "213113", "213311", "213131",
    "311123", "311321", "331121", "312113", "312311", "332111", "314111", "221411", "431111",
    "111224", "111422", "121124", "121421", "141122", "141221", "112214", "112412", "122114",
    "122411", "142112", "142211", "241211", "221114", "413111", "241112", "134111", "111242",
    "121142", "121241", "114212", "124112", "124211", "411212", "421112", "421211", "212141",
    "214121", "412121", "111143", "111341", "131141", "114113", "114311", "411113", "411311",
    "113141", "114131", "311141", "411131", "211412", "211214", "211232",
];

const START_B: usize = 104;
const STOP: &str = "2331112";
/// Quiet zone on each side, in modules.
const QUIET_MODULES: usize = 10;

/// Attribute names of a barcode placeholder.
pub const PLACEHOLDER_ATTRIBUTES: [&str; 2] = ["data-barcode", "jsbarcode-value"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicError {
    #[error("empty barcode value")]
    Empty,
    #[error("character {0:?} cannot be encoded in Code 128-B")]
    Unencodable(char),
    #[error("unsupported barcode format '{0}'")]
    UnsupportedFormat(String),
}

/// Parameters read from a placeholder element.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeSpec {
    pub value: String,
    /// Width of the narrowest bar in px.
    pub module_px: f64,
    /// Height of the bars in px.
    pub height_px: f64,
    pub show_text: bool,
    pub font_px: f64,
    /// Requested symbology, if the placeholder named one.
    pub format: Option<String>,
}

impl BarcodeSpec {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            module_px: 2.0,
            height_px: 100.0,
            show_text: true,
            font_px: 20.0,
            format: None,
        }
    }

    /// Read a placeholder from its attributes.
    ///
    /// Accepts `data-barcode="…"` with `data-barcode-height`, `-width`,
    /// `-text`, `-font-size`, or the JsBarcode spelling `jsbarcode-value="…"`
    /// with `jsbarcode-height`, `-width`, `-displayvalue`, `-fontsize`,
    /// `-format`. Returns `None` for elements that are not placeholders.
    pub fn from_attributes(attr: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let (prefix, value) = if let Some(v) = attr("data-barcode") {
            ("data-barcode-", v)
        } else {
            ("jsbarcode-", attr("jsbarcode-value")?)
        };
        let number = |name: &str| {
            attr(&format!("{prefix}{name}"))
                .and_then(|v| v.trim().trim_end_matches("px").parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0)
        };
        let flag = |name: &str| {
            attr(&format!("{prefix}{name}")).map(|v| !v.trim().eq_ignore_ascii_case("false"))
        };

        let mut spec = Self::new(value);
        if let Some(h) = number("height") {
            spec.height_px = h;
        }
        if let Some(w) = number("width") {
            spec.module_px = w;
        }
        if prefix == "jsbarcode-" {
            spec.show_text = flag("displayvalue").unwrap_or(true);
            spec.font_px = number("fontsize").unwrap_or(spec.font_px);
            spec.format = attr("jsbarcode-format").map(|f| f.trim().to_owned());
        } else {
            spec.show_text = flag("text").unwrap_or(true);
            spec.font_px = number("font-size").unwrap_or(spec.font_px);
        }
        Some(spec)
    }

    /// Height of the generated graphic including the caption line.
    pub fn rendered_height_px(&self) -> f64 {
        if self.show_text {
            self.height_px + self.font_px + 2.0
        } else {
            self.height_px
        }
    }
}

/// Code 128-B symbol values for `value`: start code, data, checksum.
fn encode_b(value: &str) -> Result<Vec<usize>, GraphicError> {
    if value.is_empty() {
        return Err(GraphicError::Empty);
    }
    let mut codes = Vec::with_capacity(value.len() + 2);
    codes.push(START_B);
    for c in value.chars() {
        if !(' '..='~').contains(&c) {
            return Err(GraphicError::Unencodable(c));
        }
        codes.push(c as usize - 32);
    }
    let checksum = codes
        .iter()
        .enumerate()
        .map(|(pos, code)| pos.max(1) * code)
        .sum::<usize>()
        % 103;
    codes.push(checksum);
    Ok(codes)
}

/// Render a Code 128-B barcode as a standalone SVG.
///
/// The module width is reduced so the whole symbol fits `max_width_px`.
pub fn code128_svg(spec: &BarcodeSpec, max_width_px: f64) -> Result<String, GraphicError> {
    if let Some(format) = spec.format.as_deref()
        && !format.to_ascii_uppercase().starts_with("CODE128")
    {
        return Err(GraphicError::UnsupportedFormat(format.to_owned()));
    }
    let codes = encode_b(&spec.value)?;

    let mut widths: Vec<u8> = Vec::with_capacity(codes.len() * 6 + 7);
    for code in &codes {
        widths.extend(PATTERNS[*code].bytes().map(|b| b - b'0'));
    }
    widths.extend(STOP.bytes().map(|b| b - b'0'));

    let modules: usize = widths.iter().map(|w| *w as usize).sum::<usize>() + 2 * QUIET_MODULES;
    let module = if max_width_px > 0.0 {
        spec.module_px.min(max_width_px / modules as f64)
    } else {
        spec.module_px
    };
    let width = module * modules as f64;
    let height = spec.rendered_height_px();

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" class=\"bondruck-barcode\" \
         width=\"{width:.2}\" height=\"{height:.2}\" viewBox=\"0 0 {width:.2} {height:.2}\">\
         <rect x=\"0\" y=\"0\" width=\"{width:.2}\" height=\"{height:.2}\" fill=\"#fff\"/>"
    );
    let mut x = QUIET_MODULES as f64 * module;
    for (i, w) in widths.iter().enumerate() {
        let w = *w as f64 * module;
        // Even positions are bars, odd positions spaces.
        if i % 2 == 0 {
            svg.push_str(&format!(
                "<rect x=\"{x:.2}\" y=\"0\" width=\"{w:.2}\" height=\"{:.2}\" fill=\"#000\"/>",
                spec.height_px
            ));
        }
        x += w;
    }
    if spec.show_text {
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" font-family=\"monospace\" font-size=\"{:.0}\" \
             text-anchor=\"middle\">{}</text>",
            width / 2.0,
            spec.height_px + spec.font_px,
            spec.font_px,
            escape_text(&spec.value)
        ));
    }
    svg.push_str("</svg>");
    Ok(svg)
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Progress of one generator.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicState {
    Pending,
    Rendered(String),
    Failed(String),
}

/// How waiting on a generator ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicOutcome {
    Rendered(String),
    Failed(String),
    /// No visible content within the poll bound.
    NotRendered,
}

/// Start generating a barcode off the async runtime.
pub fn spawn_graphic(spec: BarcodeSpec, max_width_px: f64) -> watch::Receiver<GraphicState> {
    let (tx, rx) = watch::channel(GraphicState::Pending);
    tokio::task::spawn_blocking(move || {
        let state = match code128_svg(&spec, max_width_px) {
            Ok(svg) => GraphicState::Rendered(svg),
            Err(e) => GraphicState::Failed(e.to_string()),
        };
        // The session may have been closed already.
        let _ = tx.send(state);
    });
    rx
}

/// A graphic counts as visible once it has at least one drawn element.
fn is_visible(svg: &str) -> bool {
    svg.contains("<rect")
}

/// Wait for a generator, checking at most `attempts` times `interval` apart.
///
/// Returns early on the completion signal.
pub async fn await_graphic(
    mut rx: watch::Receiver<GraphicState>,
    interval: Duration,
    attempts: u32,
) -> GraphicOutcome {
    for attempt in 0..attempts.max(1) {
        let current = rx.borrow_and_update().clone();
        match current {
            GraphicState::Rendered(svg) if is_visible(&svg) => return GraphicOutcome::Rendered(svg),
            GraphicState::Failed(reason) => return GraphicOutcome::Failed(reason),
            GraphicState::Rendered(_) | GraphicState::Pending => {
                debug!(attempt, "graphic not visible yet");
            }
        }
        if tokio::time::timeout(interval, rx.changed()).await.is_ok_and(|r| r.is_err()) {
            // Generator gone; whatever it left is final.
            let last = rx.borrow().clone();
            return match last {
                GraphicState::Rendered(svg) if is_visible(&svg) => GraphicOutcome::Rendered(svg),
                GraphicState::Failed(reason) => GraphicOutcome::Failed(reason),
                _ => GraphicOutcome::NotRendered,
            };
        }
    }
    if let GraphicState::Rendered(svg) = &*rx.borrow()
        && is_visible(svg)
    {
        return GraphicOutcome::Rendered(svg.clone());
    }
    warn!(
        attempts,
        interval_ms = interval.as_millis() as u64,
        "graphic produced no visible content"
    );
    GraphicOutcome::NotRendered
}
