// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded resource loading: images, fonts and stylesheets referenced by a
// document.
//
// The raw payload is never fetched over the network; only the resources it
// references are. Supported schemes are `data:`, `file:` and `http(s):`.
// Every fetch is bounded by the configured resource timeout.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bondruck_core::error::{BondruckError, Result};
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Longest URL prefix written to logs (data URLs can be megabytes).
const LOG_URL_CHARS: usize = 80;

/// Why a resource could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out")]
    TimedOut,
    #[error("cannot resolve '{0}'")]
    Unresolvable(String),
    #[error("{0}")]
    Failed(String),
}

/// Raw bytes of a fetched resource.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub bytes: Vec<u8>,
    /// Content type reported by the source, if any.
    pub mime: Option<String>,
}

/// A fully decoded image.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl LoadedImage {
    /// The image as an inline `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Terminal state of one image: decode-complete or decode-error.
#[derive(Debug, Clone)]
pub enum ImageSettlement {
    Decoded(LoadedImage),
    Errored(String),
}

/// A fetched web font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFont {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl LoadedFont {
    /// The font as an inline `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Terminal state of one web font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSettlement {
    Ready(LoadedFont),
    Errored(String),
}

/// Fetches and decodes embedded resources with a per-resource budget.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    client: reqwest::Client,
    timeout: Duration,
}

impl ResourceLoader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BondruckError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve a reference from the document against its `<base href>`.
    pub fn resolve(base: Option<&Url>, reference: &str) -> std::result::Result<Url, FetchError> {
        let reference = reference.trim();
        match Url::parse(reference) {
            Ok(url) => Ok(url),
            Err(_) => base
                .and_then(|b| b.join(reference).ok())
                .ok_or_else(|| FetchError::Unresolvable(reference.to_owned())),
        }
    }

    /// Fetch a resource, bounded by the loader timeout.
    #[instrument(skip(self, url), fields(url = %log_url(url)))]
    pub async fn fetch(&self, url: &Url) -> std::result::Result<FetchedResource, FetchError> {
        match tokio::time::timeout(self.timeout, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("resource fetch timed out");
                Err(FetchError::TimedOut)
            }
        }
    }

    async fn fetch_inner(&self, url: &Url) -> std::result::Result<FetchedResource, FetchError> {
        match url.scheme() {
            "data" => decode_data_url(url.as_str()),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| FetchError::Unresolvable(url.to_string()))?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| FetchError::Failed(format!("{}: {e}", path.display())))?;
                Ok(FetchedResource { bytes, mime: None })
            }
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            FetchError::TimedOut
                        } else {
                            FetchError::Failed(e.to_string())
                        }
                    })?
                    .error_for_status()
                    .map_err(|e| FetchError::Failed(e.to_string()))?;
                let mime = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_owned());
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Failed(e.to_string()))?;
                Ok(FetchedResource {
                    bytes: bytes.to_vec(),
                    mime,
                })
            }
            other => Err(FetchError::Unresolvable(format!("unsupported scheme '{other}'"))),
        }
    }

    /// Fetch and fully decode an image.
    pub async fn load_image(&self, url: &Url) -> ImageSettlement {
        let fetched = match self.fetch(url).await {
            Ok(f) => f,
            Err(e) => return ImageSettlement::Errored(e.to_string()),
        };

        if is_svg(&fetched) {
            let (width, height) = svg_dimensions(&fetched.bytes);
            return ImageSettlement::Decoded(LoadedImage {
                mime: "image/svg+xml".into(),
                bytes: fetched.bytes,
                width,
                height,
            });
        }

        let FetchedResource { bytes, mime } = fetched;
        let decoded = tokio::task::spawn_blocking(move || {
            let format = image::guess_format(&bytes).map_err(|e| e.to_string())?;
            let img = image::load_from_memory_with_format(&bytes, format)
                .map_err(|e| e.to_string())?;
            let mime = mime
                .filter(|m| m.starts_with("image/"))
                .unwrap_or_else(|| format.to_mime_type().to_owned());
            Ok::<_, String>(LoadedImage {
                mime,
                width: img.width(),
                height: img.height(),
                bytes,
            })
        })
        .await;

        match decoded {
            Ok(Ok(image)) => ImageSettlement::Decoded(image),
            Ok(Err(reason)) => ImageSettlement::Errored(format!("decode: {reason}")),
            Err(join) => ImageSettlement::Errored(format!("decoder task: {join}")),
        }
    }

    /// Fetch a web font and check it looks like a font file.
    pub async fn load_font(&self, url: &Url) -> FontSettlement {
        let fetched = match self.fetch(url).await {
            Ok(f) => f,
            Err(e) => return FontSettlement::Errored(e.to_string()),
        };
        let Some(sniffed) = font_mime(&fetched.bytes) else {
            return FontSettlement::Errored("not a font file".into());
        };
        let mime = fetched
            .mime
            .filter(|m| m.starts_with("font/") || m.starts_with("application/font"))
            .unwrap_or_else(|| sniffed.to_owned());
        FontSettlement::Ready(LoadedFont {
            mime,
            bytes: fetched.bytes,
        })
    }

    /// Fetch a stylesheet as text.
    pub async fn load_stylesheet(&self, url: &Url) -> std::result::Result<String, FetchError> {
        let fetched = self.fetch(url).await?;
        match String::from_utf8(fetched.bytes) {
            Ok(css) => Ok(css),
            Err(e) => {
                warn!(url = %log_url(url), "stylesheet is not valid UTF-8");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}

/// Shortened URL for log lines.
fn log_url(url: &Url) -> String {
    let s = url.as_str();
    if s.len() <= LOG_URL_CHARS {
        s.to_owned()
    } else {
        let mut end = LOG_URL_CHARS;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Decode an RFC 2397 `data:` URL.
fn decode_data_url(raw: &str) -> std::result::Result<FetchedResource, FetchError> {
    let rest = raw
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::Unresolvable(raw.chars().take(32).collect()))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::Failed("data URL without ','".into()))?;

    let is_base64 = meta.ends_with(";base64");
    let mime = meta.trim_end_matches(";base64");
    let mime = mime.split(';').next().unwrap_or("").trim();

    let bytes = if is_base64 {
        let cleaned: String = percent_decode(data)
            .into_iter()
            .map(char::from)
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| FetchError::Failed(format!("data URL base64: {e}")))?
    } else {
        percent_decode(data)
    };

    Ok(FetchedResource {
        bytes,
        mime: (!mime.is_empty()).then(|| mime.to_owned()),
    })
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3])
            && let Ok(v) = u8::from_str_radix(hex, 16)
        {
            out.push(v);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn is_svg(fetched: &FetchedResource) -> bool {
    if fetched.mime.as_deref().is_some_and(|m| m.contains("svg")) {
        return true;
    }
    let head = String::from_utf8_lossy(&fetched.bytes[..fetched.bytes.len().min(256)]);
    let head = head.trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}

/// Width and height attributes of the root `<svg>` element, in px.
fn svg_dimensions(bytes: &[u8]) -> (u32, u32) {
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    let Some(start) = text.find("<svg") else {
        return (0, 0);
    };
    let tag = match text[start..].find('>') {
        Some(end) => &text[start..start + end],
        None => &text[start..],
    };
    (
        svg_attr_px(tag, "width").unwrap_or(0),
        svg_attr_px(tag, "height").unwrap_or(0),
    )
}

fn svg_attr_px(tag: &str, name: &str) -> Option<u32> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let value = &tag[start..];
    let value = &value[..value.find('"')?];
    let numeric: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse::<f64>().ok().map(|v| v.round() as u32)
}

/// Media type from a TrueType, OpenType, WOFF or WOFF2 signature.
fn font_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes.get(..4)? {
        b"wOFF" => Some("font/woff"),
        b"wOF2" => Some("font/woff2"),
        b"OTTO" => Some("font/otf"),
        b"true" | [0, 1, 0, 0] => Some("font/ttf"),
        _ => None,
    }
}
