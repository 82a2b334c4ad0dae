// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming HTML passes over a payload.
//
// `scan` collects everything the session has to wait for; `compose` writes the
// settled results (inlined images and stylesheets, generated graphics, the
// layout overlay) back into a copy of the payload.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use bondruck_core::error::{BondruckError, Result};
use lol_html::html_content::{ContentType, Element};
use lol_html::{RewriteStrSettings, element, rewrite_str, text};

use crate::graphics::{BarcodeSpec, PLACEHOLDER_ATTRIBUTES};

/// Resources and placeholders referenced by a payload, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScannedDocument {
    pub base_href: Option<String>,
    pub images: Vec<String>,
    pub stylesheets: Vec<String>,
    /// Concatenated text of inline `<style>` elements.
    pub inline_css: String,
    pub graphics: Vec<BarcodeSpec>,
}

/// Settled results to write back into the payload.
#[derive(Debug, Clone, Copy)]
pub struct Composition<'a> {
    /// `<style>` element appended to the head.
    pub overlay: Option<&'a str>,
    /// Image `src` → inline `data:` URI.
    pub images: &'a HashMap<String, String>,
    /// Stylesheet `href` → CSS text.
    pub stylesheets: &'a HashMap<String, String>,
    /// `url(...)` target inside inline `<style>` → replacement URL.
    pub style_urls: &'a HashMap<String, String>,
    /// Generated SVG per placeholder, indexed like `ScannedDocument::graphics`.
    pub graphics: &'a [Option<String>],
}

fn rewrite_error(e: lol_html::errors::RewritingError) -> BondruckError {
    BondruckError::LoadFailed(format!("HTML rewrite: {e}"))
}

fn is_stylesheet(el: &Element) -> bool {
    el.get_attribute("rel").is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    })
}

/// Placeholder spec for an element, checking both attribute spellings once.
pub(crate) fn placeholder_spec(el: &Element) -> Option<BarcodeSpec> {
    BarcodeSpec::from_attributes(|name| el.get_attribute(name))
}

/// Selector for placeholder elements carrying the given attribute.
fn placeholder_selector(attribute: &str) -> String {
    format!("[{attribute}]")
}

/// True when the handler for `attribute` owns this element. An element with
/// both spellings is handled by the first.
fn owns_placeholder(el: &Element, attribute: &str) -> bool {
    attribute == PLACEHOLDER_ATTRIBUTES[0] || !el.has_attribute(PLACEHOLDER_ATTRIBUTES[0])
}

/// Collect `<base href>`, image sources, stylesheet links, inline CSS and
/// graphic placeholders.
pub fn scan(html: &str) -> Result<ScannedDocument> {
    let state = Rc::new(RefCell::new(ScannedDocument::default()));

    let mut handlers = vec![
        element!("base[href]", {
            let state = Rc::clone(&state);
            move |el| {
                let mut state = state.borrow_mut();
                if state.base_href.is_none() {
                    state.base_href = el.get_attribute("href");
                }
                Ok(())
            }
        }),
        element!("img[src]", {
            let state = Rc::clone(&state);
            move |el| {
                if let Some(src) = el.get_attribute("src") {
                    let mut state = state.borrow_mut();
                    if !src.trim().is_empty() && !state.images.contains(&src) {
                        state.images.push(src);
                    }
                }
                Ok(())
            }
        }),
        element!("link[href]", {
            let state = Rc::clone(&state);
            move |el| {
                if is_stylesheet(el)
                    && let Some(href) = el.get_attribute("href")
                {
                    let mut state = state.borrow_mut();
                    if !state.stylesheets.contains(&href) {
                        state.stylesheets.push(href);
                    }
                }
                Ok(())
            }
        }),
        text!("style", {
            let state = Rc::clone(&state);
            move |chunk| {
                let mut state = state.borrow_mut();
                state.inline_css.push_str(chunk.as_str());
                if chunk.last_in_text_node() {
                    state.inline_css.push('\n');
                }
                Ok(())
            }
        }),
    ];
    for attribute in PLACEHOLDER_ATTRIBUTES {
        let selector = placeholder_selector(attribute);
        let state = Rc::clone(&state);
        handlers.push(element!(selector.as_str(), move |el| {
            if owns_placeholder(el, attribute)
                && let Some(spec) = placeholder_spec(el)
            {
                state.borrow_mut().graphics.push(spec);
            }
            Ok(())
        }));
    }

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)?;

    let scanned = state.borrow().clone();
    Ok(scanned)
}

/// Next `url(...)` in `css`: byte offsets of its argument and the unquoted
/// target.
fn next_url(css: &str) -> Option<(usize, usize, &str)> {
    let open = css.find("url(")? + 4;
    let close = open + css[open..].find(')')?;
    let target = css[open..close]
        .trim()
        .trim_matches(|c| c == '"' || c == '\'');
    Some((open, close, target))
}

fn push_unique(urls: &mut Vec<String>, url: &str) {
    if !url.is_empty() && !urls.iter().any(|u| u == url) {
        urls.push(url.to_owned());
    }
}

/// `url(...)` targets inside `@font-face` rules.
pub fn font_urls(css: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = css;
    while let Some(start) = rest.find("@font-face") {
        let block = &rest[start..];
        let end = block.find('}').map_or(block.len(), |i| i + 1);
        let mut rule = &block[..end];
        while let Some((_, close, url)) = next_url(rule) {
            push_unique(&mut urls, url);
            rule = &rule[close..];
        }
        rest = &block[end..];
    }
    urls
}

/// Every `url(...)` target in `css`, in order.
pub fn css_urls(css: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = css;
    while let Some((_, close, url)) = next_url(rest) {
        push_unique(&mut urls, url);
        rest = &rest[close..];
    }
    urls
}

/// Rewrite the `url(...)` targets for which `replace` returns a new URL.
/// Other references are copied unchanged.
pub fn rewrite_css_urls(css: &str, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some((open, close, target)) = next_url(rest) {
        out.push_str(&rest[..open]);
        match replace(target) {
            Some(url) => {
                out.push('"');
                out.push_str(&url);
                out.push('"');
            }
            None => out.push_str(&rest[open..close]),
        }
        rest = &rest[close..];
    }
    out.push_str(rest);
    out
}

/// Write settled results into a copy of `html`.
///
/// With an empty composition the output equals the input byte for byte.
pub fn compose(html: &str, composition: &Composition<'_>) -> Result<String> {
    let overlay_written = Rc::new(Cell::new(false));
    let graphic_index = Rc::new(Cell::new(0usize));

    let mut handlers = vec![
        element!("head", {
            let overlay_written = Rc::clone(&overlay_written);
            let overlay = composition.overlay;
            move |el| {
                if let Some(style) = overlay
                    && !overlay_written.get()
                {
                    el.append(style, ContentType::Html);
                    overlay_written.set(true);
                }
                Ok(())
            }
        }),
        element!("body", {
            let overlay_written = Rc::clone(&overlay_written);
            let overlay = composition.overlay;
            move |el| {
                if let Some(style) = overlay
                    && !overlay_written.get()
                {
                    el.before(style, ContentType::Html);
                    overlay_written.set(true);
                }
                Ok(())
            }
        }),
        element!("img[src]", {
            let images = composition.images;
            move |el| {
                if let Some(src) = el.get_attribute("src")
                    && let Some(data_uri) = images.get(&src)
                {
                    el.set_attribute("src", data_uri)?;
                }
                Ok(())
            }
        }),
        element!("link[href]", {
            let stylesheets = composition.stylesheets;
            move |el| {
                if is_stylesheet(el)
                    && let Some(href) = el.get_attribute("href")
                    && let Some(css) = stylesheets.get(&href)
                {
                    let media = el
                        .get_attribute("media")
                        .map(|m| format!(" media=\"{m}\""))
                        .unwrap_or_default();
                    el.replace(&format!("<style{media}>{css}</style>"), ContentType::Html);
                }
                Ok(())
            }
        }),
        text!("style", {
            let style_urls = composition.style_urls;
            let mut buffer = String::new();
            move |chunk| {
                if style_urls.is_empty() {
                    return Ok(());
                }
                buffer.push_str(chunk.as_str());
                if chunk.last_in_text_node() {
                    let css = std::mem::take(&mut buffer);
                    let css = rewrite_css_urls(&css, |target| style_urls.get(target).cloned());
                    chunk.replace(&css, ContentType::Html);
                } else {
                    chunk.remove();
                }
                Ok(())
            }
        }),
    ];
    for attribute in PLACEHOLDER_ATTRIBUTES {
        let selector = placeholder_selector(attribute);
        let graphic_index = Rc::clone(&graphic_index);
        let graphics = composition.graphics;
        handlers.push(element!(selector.as_str(), move |el| {
            if !owns_placeholder(el, attribute) || placeholder_spec(el).is_none() {
                return Ok(());
            }
            let index = graphic_index.get();
            graphic_index.set(index + 1);
            if let Some(Some(svg)) = graphics.get(index) {
                fill_placeholder(el, svg)?;
            }
            Ok(())
        }));
    }

    let mut output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(rewrite_error)?;

    // Fragment without <head> or <body>.
    if let Some(style) = composition.overlay
        && !overlay_written.get()
    {
        output.insert_str(0, style);
    }
    Ok(output)
}

/// Put a generated SVG into its placeholder.
///
/// `<svg>` placeholders are replaced (keeping `id` and `class`), `<img>`
/// placeholders get a `data:` source, anything else gets the SVG as content.
fn fill_placeholder(
    el: &mut Element,
    svg: &str,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match el.tag_name().as_str() {
        "svg" => {
            let mut keep = String::new();
            for name in ["id", "class"] {
                if let Some(value) = el.get_attribute(name) {
                    keep.push_str(&format!(" {name}=\"{value}\""));
                }
            }
            let svg = svg.replacen("<svg ", &format!("<svg{keep} "), 1);
            el.replace(&svg, ContentType::Html);
        }
        "img" => {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(svg);
            el.set_attribute("src", &format!("data:image/svg+xml;base64,{encoded}"))?;
        }
        _ => el.set_inner_content(svg, ContentType::Html),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECEIPT: &str = r#"<!DOCTYPE html>
<html><head><base href="https://pos.example/r/"><title>R</title>
<link rel="stylesheet" href="receipt.css">
<style>@font-face { font-family: Mono; src: url("fonts/mono.woff2") format("woff2"); }</style>
</head><body>
<img src="logo.png"><img src="logo.png"><img src="stamp.png">
<svg id="code" class="bc" jsbarcode-value="A-77" jsbarcode-height="30"></svg>
<div data-barcode="9001"></div>
</body></html>"#;

    #[test]
    fn scan_collects_references_in_order() {
        let scanned = scan(RECEIPT).unwrap();
        assert_eq!(scanned.base_href.as_deref(), Some("https://pos.example/r/"));
        assert_eq!(scanned.images, vec!["logo.png", "stamp.png"]);
        assert_eq!(scanned.stylesheets, vec!["receipt.css"]);
        assert_eq!(font_urls(&scanned.inline_css), vec!["fonts/mono.woff2"]);
        let values: Vec<_> = scanned.graphics.iter().map(|g| g.value.as_str()).collect();
        assert_eq!(values, vec!["A-77", "9001"]);
        assert_eq!(scanned.graphics[0].height_px, 30.0);
    }

    #[test]
    fn element_with_both_spellings_counts_once() {
        let scanned = scan(r#"<div data-barcode="1" jsbarcode-value="2"></div>"#).unwrap();
        assert_eq!(scanned.graphics.len(), 1);
        assert_eq!(scanned.graphics[0].value, "1");
    }

    #[test]
    fn empty_composition_is_identity() {
        let empty = HashMap::new();
        let out = compose(
            RECEIPT,
            &Composition {
                overlay: None,
                images: &empty,
                stylesheets: &empty,
                style_urls: &empty,
                graphics: &[],
            },
        )
        .unwrap();
        assert_eq!(out, RECEIPT);
    }

    #[test]
    fn overlay_is_appended_to_head() {
        let empty = HashMap::new();
        let out = compose(
            "<html><head><title>x</title></head><body>hi</body></html>",
            &Composition {
                overlay: Some("<style id=\"o\">b{}</style>"),
                images: &empty,
                stylesheets: &empty,
                style_urls: &empty,
                graphics: &[],
            },
        )
        .unwrap();
        assert_eq!(
            out,
            "<html><head><title>x</title><style id=\"o\">b{}</style></head><body>hi</body></html>"
        );
    }

    #[test]
    fn overlay_prefixes_bare_fragment() {
        let empty = HashMap::new();
        let out = compose(
            "<p>hi</p>",
            &Composition {
                overlay: Some("<style>p{}</style>"),
                images: &empty,
                stylesheets: &empty,
                style_urls: &empty,
                graphics: &[],
            },
        )
        .unwrap();
        assert_eq!(out, "<style>p{}</style><p>hi</p>");
    }

    #[test]
    fn settled_resources_are_written_back() {
        let images = HashMap::from([(
            "logo.png".to_owned(),
            "data:image/png;base64,AA".to_owned(),
        )]);
        let sheets = HashMap::from([("receipt.css".to_owned(), "p{margin:0}".to_owned())]);
        let style_urls = HashMap::from([(
            "fonts/mono.woff2".to_owned(),
            "data:font/woff2;base64,d09GMg==".to_owned(),
        )]);
        let graphics = vec![Some("<svg width=\"1\"><rect/></svg>".to_owned()), None];
        let out = compose(
            RECEIPT,
            &Composition {
                overlay: None,
                images: &images,
                stylesheets: &sheets,
                style_urls: &style_urls,
                graphics: &graphics,
            },
        )
        .unwrap();
        let logo = r#"<img src="data:image/png;base64,AA">"#;
        assert!(out.contains(&format!("{logo}{logo}")));
        assert!(out.contains(r#"<img src="stamp.png">"#));
        assert!(out.contains("<style>p{margin:0}</style>"));
        assert!(out.contains(r#"<svg id="code" class="bc" width="1"><rect/></svg>"#));
        assert!(!out.contains("jsbarcode-value"));
        // Failed graphic keeps its placeholder.
        assert!(out.contains(r#"<div data-barcode="9001"></div>"#));
        assert!(out.contains(r#"src: url("data:font/woff2;base64,d09GMg==") format("woff2")"#));
        assert!(!out.contains("fonts/mono.woff2"));
    }

    #[test]
    fn every_css_reference_is_listed() {
        let css = "@font-face{src:url('a.woff')}body{background:url( paper.png )}\
                   i{background:url(paper.png)}";
        assert_eq!(css_urls(css), vec!["a.woff", "paper.png"]);
        assert_eq!(font_urls(css), vec!["a.woff"]);
    }

    #[test]
    fn css_references_are_rewritten_selectively() {
        let css = "@font-face{src:url(mono.woff) format('woff')}\
                   body{background:url('paper.png')}h1{color:red}";
        let out = rewrite_css_urls(css, |target| {
            (target == "mono.woff").then(|| "data:font/woff;base64,d09GRg==".to_owned())
        });
        assert_eq!(
            out,
            "@font-face{src:url(\"data:font/woff;base64,d09GRg==\") format('woff')}\
             body{background:url('paper.png')}h1{color:red}"
        );
    }

    #[test]
    fn css_without_references_is_unchanged() {
        let css = "p{margin:0}a{content:\"url(\"}";
        assert_eq!(rewrite_css_urls(css, |_| Some("x".into())), css);
    }
}
