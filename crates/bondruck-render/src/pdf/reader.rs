// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF shell inspection using the `lopdf` crate.
//
// A PDF payload is self-contained, so "loading" it means checking that the
// document parses and has at least one page. Nothing is rewritten.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::PT_PER_MM;
use lopdf::{Document, Object};
use tracing::{debug, instrument};

const DATA_URI_PREFIX: &str = "data:application/pdf;base64,";

/// Decode a base64 PDF payload, with or without a `data:` URI prefix.
pub fn decode_transport(encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    let body = trimmed.strip_prefix(DATA_URI_PREFIX).unwrap_or(trimmed);
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(BondruckError::BadRequest("empty PDF payload".into()));
    }
    STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|err| BondruckError::BadRequest(format!("PDF payload is not valid base64: {err}")))
}

/// Summary of a parsed PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfShell {
    pub page_count: usize,
    /// First page MediaBox as (width, height) in millimetres, if declared.
    pub first_page_mm: Option<(f64, f64)>,
}

impl PdfShell {
    /// Parse the file at `path`. Blocking; run off the async runtime.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref)
            .map_err(|err| BondruckError::LoadFailed(format!("PDF does not parse: {err}")))?;
        Self::inspect(&document)
    }

    fn inspect(document: &Document) -> Result<Self> {
        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(BondruckError::LoadFailed("PDF has no pages".into()));
        }

        let first_page_mm = pages
            .values()
            .next()
            .and_then(|id| match document.get_object(*id) {
                Ok(Object::Dictionary(dict)) => dict.get(b"MediaBox").ok().and_then(media_box_mm),
                _ => None,
            });

        debug!(pages = pages.len(), ?first_page_mm, "PDF shell parsed");
        Ok(Self {
            page_count: pages.len(),
            first_page_mm,
        })
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn media_box_mm(object: &Object) -> Option<(f64, f64)> {
    let Object::Array(values) = object else {
        return None;
    };
    let coords: Vec<f64> = values.iter().filter_map(number).collect();
    if coords.len() != 4 {
        return None;
    }
    Some((
        (coords[2] - coords[0]).abs() / PT_PER_MM,
        (coords[3] - coords[1]).abs() / PT_PER_MM,
    ))
}
