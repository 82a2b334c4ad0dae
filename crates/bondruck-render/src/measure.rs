// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content height estimation for dynamically sized roll media.
//
// A block-flow model: text is wrapped at the printable width with a fixed
// advance per character, images keep their aspect ratio scaled down to fit,
// and generated graphics contribute their configured height. The result is
// converted at 96 px/in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{MM_PER_PX, MediumProfile};
use lol_html::{RewriteStrSettings, doc_text, element, rewrite_str};

use crate::html::placeholder_spec;

const BASE_FONT_PX: f64 = 12.0;
const LINE_HEIGHT: f64 = 1.2;
/// Average glyph advance as a fraction of the font size.
const CHAR_ADVANCE_EM: f64 = 0.5;
const RULE_PX: f64 = 9.0;

/// Elements whose content never reaches paper.
const HIDDEN: &[&str] = &["head", "script", "style", "template", "noscript", "title"];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead", "tr", "ul",
];

/// Settled sizes the model needs besides the markup.
#[derive(Debug, Clone, Default)]
pub struct MeasureInputs {
    /// Image `src` → decoded (width, height) in px.
    pub image_sizes: HashMap<String, (u32, u32)>,
}

#[derive(Debug, Default)]
struct Flow {
    height_px: f64,
    pending_chars: usize,
    font_px: f64,
    printable_px: f64,
}

impl Flow {
    fn flush(&mut self) {
        if self.pending_chars > 0 {
            let per_line =
                ((self.printable_px / (self.font_px * CHAR_ADVANCE_EM)).floor() as usize).max(1);
            let lines = self.pending_chars.div_ceil(per_line);
            self.height_px += lines as f64 * self.font_px * LINE_HEIGHT;
            self.pending_chars = 0;
        }
        self.font_px = BASE_FONT_PX;
    }

    fn push_text(&mut self, text: &str) {
        let mut last_space = self.pending_chars == 0;
        for c in text.chars() {
            if c.is_whitespace() {
                if !last_space {
                    self.pending_chars += 1;
                    last_space = true;
                }
            } else {
                self.pending_chars += 1;
                last_space = false;
            }
        }
    }
}

fn heading_scale(tag: &str) -> Option<f64> {
    match tag {
        "h1" => Some(2.0),
        "h2" => Some(1.5),
        "h3" => Some(1.17),
        "h4" => Some(1.0),
        "h5" => Some(0.83),
        "h6" => Some(0.67),
        _ => None,
    }
}

fn attr_px(value: Option<String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().trim_end_matches("px").parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Estimate the printed height of `html` on `profile`, in millimetres.
///
/// Never returns less than the profile minimum.
pub fn estimate_height_mm(
    html: &str,
    profile: &MediumProfile,
    inputs: &MeasureInputs,
) -> Result<f64> {
    let rewrite_error =
        |e: lol_html::errors::RewritingError| BondruckError::LoadFailed(format!("measure: {e}"));

    let visible = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: HIDDEN
                .iter()
                .map(|tag| {
                    element!(*tag, |el| {
                        el.remove();
                        Ok(())
                    })
                })
                .collect(),
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)?;

    let printable_px = profile.printable_width_mm / MM_PER_PX;
    let flow = Rc::new(RefCell::new(Flow {
        font_px: BASE_FONT_PX,
        printable_px,
        ..Flow::default()
    }));

    rewrite_str(
        &visible,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("*", {
                    let flow = Rc::clone(&flow);
                    move |el| {
                        let tag = el.tag_name();
                        let mut flow = flow.borrow_mut();
                        if BLOCKS.contains(&tag.as_str()) || tag == "br" {
                            flow.flush();
                        }
                        if let Some(scale) = heading_scale(&tag) {
                            flow.font_px = BASE_FONT_PX * scale;
                        }
                        if tag == "hr" {
                            flow.flush();
                            flow.height_px += RULE_PX;
                        }
                        if let Some(spec) = placeholder_spec(el) {
                            flow.flush();
                            flow.height_px += spec.rendered_height_px();
                        }
                        Ok(())
                    }
                }),
                element!("img", {
                    let flow = Rc::clone(&flow);
                    let sizes = &inputs.image_sizes;
                    move |el| {
                        let natural = el
                            .get_attribute("src")
                            .and_then(|src| sizes.get(&src).copied())
                            .map(|(w, h)| (w as f64, h as f64));
                        let attr_w = attr_px(el.get_attribute("width"));
                        let attr_h = attr_px(el.get_attribute("height"));
                        let (w, h) = match (attr_w, attr_h, natural) {
                            (Some(w), Some(h), _) => (w, h),
                            (Some(w), None, Some((nw, nh))) if nw > 0.0 => (w, w * nh / nw),
                            (None, Some(h), Some((nw, nh))) if nh > 0.0 => (h * nw / nh, h),
                            (_, _, Some(n)) => n,
                            _ => (0.0, 0.0),
                        };
                        let mut flow = flow.borrow_mut();
                        flow.flush();
                        let scale = if w > flow.printable_px { flow.printable_px / w } else { 1.0 };
                        flow.height_px += h * scale;
                        Ok(())
                    }
                }),
            ],
            document_content_handlers: vec![doc_text!({
                let flow = Rc::clone(&flow);
                move |chunk| {
                    flow.borrow_mut().push_text(chunk.as_str());
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)?;

    let mut flow = flow.borrow_mut();
    flow.flush();
    let content_mm = flow.height_px * MM_PER_PX
        + profile.margin_offsets.top_mm
        + profile.margin_offsets.bottom_mm;
    Ok(content_mm.max(profile.minimum_height_mm))
}
