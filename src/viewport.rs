//! Viewport Normalization - Canonical Document Size
//!
//! Reads the root `<svg>` `width`/`height`/`viewBox` and produces a document
//! size in CSS px, the viewBox, and an estimated pixels-per-inch.
//!
//! Resolution order for the document size:
//! 1. width and height both resolve to non-percent px
//! 2. viewBox extent (user units taken 1:1 as px)
//! 3. `(0, 0)`: unrenderable, the caller decides what to do

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// CSS pixels per inch.
pub const CSS_PPI: f64 = 96.0;

#[derive(Debug, Error)]
pub enum ViewportError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Px,
    Mm,
    Cm,
    In,
    Pt,
    Pc,
    Percent,
    Unknown,
}

impl LengthUnit {
    fn from_suffix(suffix: &str) -> Self {
        match suffix.to_ascii_lowercase().as_str() {
            "" | "px" => Self::Px,
            "mm" => Self::Mm,
            "cm" => Self::Cm,
            "in" => Self::In,
            "pt" => Self::Pt,
            "pc" => Self::Pc,
            "%" => Self::Percent,
            _ => Self::Unknown,
        }
    }
}

/// A parsed SVG length with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: LengthUnit,
}

impl Length {
    pub fn to_inches(&self) -> Option<f64> {
        match self.unit {
            LengthUnit::In => Some(self.value),
            LengthUnit::Cm => Some(self.value / 2.54),
            LengthUnit::Mm => Some(self.value / 25.4),
            LengthUnit::Pt => Some(self.value / 72.0),
            LengthUnit::Pc => Some(self.value / 6.0),
            _ => None,
        }
    }

    /// Length in CSS px; `None` for `%`. Unrecognized units read as px.
    pub fn to_px(&self) -> Option<f64> {
        match self.unit {
            LengthUnit::Px | LengthUnit::Unknown => Some(self.value),
            LengthUnit::Percent => None,
            _ => self.to_inches().map(|inches| inches * CSS_PPI),
        }
    }
}

/// Parse `"<number><unit>"`. Returns `None` when there is no leading number.
pub fn parse_length(s: &str) -> Option<Length> {
    let s = s.trim();
    let split = numeric_prefix_len(s);
    if split == 0 {
        return None;
    }
    let value: f64 = s[..split].parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let suffix = s[split..].trim();
    if !suffix.chars().all(|c| c.is_ascii_alphabetic() || c == '%') {
        return None;
    }
    Some(Length { value, unit: LengthUnit::from_suffix(suffix) })
}

// sign, digits, optional fraction, optional exponent
fn numeric_prefix_len(s: &str) -> usize {
    let b = s.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < b.len() && b[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        digits += j - frac_start;
        if digits > 0 {
            i = j;
        }
    }
    if digits == 0 {
        return 0;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        let mut j = i + 1;
        if j < b.len() && (b[j] == b'+' || b[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    i
}

/// Parse `"x y w h"` (whitespace and/or comma separated). Non-positive extents are rejected.
pub fn parse_viewbox(s: &str) -> Option<[f64; 4]> {
    let parts: Vec<f64> = s
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let [x, y, w, h] = parts[..] else {
        return None;
    };
    if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) {
        return None;
    }
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some([x, y, w, h])
}

/// Raw attribute values and diagnostics captured during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewportRaw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_tag: Option<String>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default, rename = "viewBox")]
    pub view_box: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedViewport {
    pub doc_w: f64,
    pub doc_h: f64,
    pub viewbox: Option<[f64; 4]>,
    pub ppi: f64,
    pub units: LengthUnit,
    pub raw: ViewportRaw,
}

impl NormalizedViewport {
    /// Zeroed result carrying an error note.
    pub fn failed(error: impl ToString, mut raw: ViewportRaw) -> Self {
        raw.error = Some(error.to_string());
        Self {
            doc_w: 0.0,
            doc_h: 0.0,
            viewbox: None,
            ppi: CSS_PPI,
            units: LengthUnit::Unknown,
            raw,
        }
    }

    pub fn is_renderable(&self) -> bool {
        self.doc_w > 0.0 && self.doc_h > 0.0
    }

    pub fn doc_size(&self) -> Option<[f64; 2]> {
        self.is_renderable().then_some([self.doc_w, self.doc_h])
    }
}

/// Normalize from SVG text. Never fails; parse errors land in `raw.error`.
pub fn normalize(source: &str) -> NormalizedViewport {
    try_normalize(source).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "SVG viewport normalization failed");
        NormalizedViewport::failed(e, ViewportRaw::default())
    })
}

/// Normalize from raw bytes. Non-UTF-8 input is decoded lossily; the root
/// attributes read here are ASCII.
pub fn normalize_bytes(data: &[u8]) -> NormalizedViewport {
    normalize(&String::from_utf8_lossy(data))
}

/// Read and normalize a file; unreadable files yield a zeroed viewport.
pub fn normalize_file(path: &Path) -> NormalizedViewport {
    let raw = ViewportRaw {
        path: Some(path.display().to_string()),
        ..Default::default()
    };
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(source) => {
            let e = ViewportError::Io { path: path.display().to_string(), source };
            tracing::warn!(error = %e, "SVG unreadable");
            return NormalizedViewport::failed(e, raw);
        }
    };
    let mut out = normalize_bytes(&data);
    out.raw.path = raw.path;
    out
}

pub fn try_normalize(source: &str) -> Result<NormalizedViewport, ViewportError> {
    // DOCTYPEs are common in exported SVG. roxmltree never fetches external
    // entities, so references to them still fail to parse.
    let opts = roxmltree::ParsingOptions { allow_dtd: true, ..Default::default() };
    let doc = roxmltree::Document::parse_with_options(source, opts)?;
    let root = doc.root_element();

    let raw = ViewportRaw {
        path: None,
        root_tag: Some(root.tag_name().name().to_string()),
        width: root.attribute("width").map(str::to_string),
        height: root.attribute("height").map(str::to_string),
        view_box: root.attribute("viewBox").map(str::to_string),
        error: None,
    };

    let width = raw.width.as_deref().and_then(parse_length);
    let height = raw.height.as_deref().and_then(parse_length);
    let viewbox = raw.view_box.as_deref().and_then(parse_viewbox);

    let units = match (width, height) {
        (Some(w), _) if w.unit != LengthUnit::Unknown => w.unit,
        (_, Some(h)) => h.unit,
        _ => LengthUnit::Unknown,
    };

    let direct = width
        .and_then(|w| w.to_px())
        .zip(height.and_then(|h| h.to_px()))
        .filter(|(w, h)| *w >= 0.0 && *h >= 0.0);

    let (doc_w, doc_h) = match (direct, viewbox) {
        (Some((w, h)), _) => (w, h),
        (None, Some([_, _, vb_w, vb_h])) => (vb_w, vb_h),
        (None, None) => (0.0, 0.0),
    };

    let ppi = viewbox
        .and_then(|vb| estimate_ppi(vb, width, height))
        .unwrap_or(CSS_PPI);

    tracing::debug!(?units, ppi, doc_w, doc_h, ?viewbox, "normalized SVG viewport");

    Ok(NormalizedViewport { doc_w, doc_h, viewbox, ppi, units, raw })
}

/// Mean of per-axis `viewBox extent / physical inches`, when any axis has a physical unit.
fn estimate_ppi(viewbox: [f64; 4], width: Option<Length>, height: Option<Length>) -> Option<f64> {
    let axes = [(viewbox[2], width), (viewbox[3], height)];
    let estimates: Vec<f64> = axes
        .iter()
        .filter_map(|(extent, len)| {
            let inches = len.as_ref()?.to_inches()?;
            (inches > 0.0).then(|| extent / inches)
        })
        .collect();
    if estimates.is_empty() {
        return None;
    }
    Some(estimates.iter().sum::<f64>() / estimates.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_physical_units_to_px() {
        for (s, px) in [("25.4mm", 96.0), ("72pt", 96.0), ("1in", 96.0), ("2.54cm", 96.0), ("6pc", 96.0)] {
            let len = parse_length(s).unwrap();
            assert!(approx(len.to_px().unwrap(), px), "{s}");
        }
    }

    #[test]
    fn test_unitless_and_px() {
        assert_eq!(parse_length("120").unwrap().to_px(), Some(120.0));
        assert_eq!(parse_length(" 1.5e2px ").unwrap().to_px(), Some(150.0));
        assert_eq!(parse_length(".5").unwrap().to_px(), Some(0.5));
    }

    #[test]
    fn test_percent_does_not_resolve_and_unknown_reads_as_px() {
        let pct = parse_length("100%").unwrap();
        assert_eq!(pct.unit, LengthUnit::Percent);
        assert_eq!(pct.to_px(), None);
        let em = parse_length("3em").unwrap();
        assert_eq!(em.unit, LengthUnit::Unknown);
        assert_eq!(em.to_px(), Some(3.0));
        assert_eq!(em.to_inches(), None);
        assert!(parse_length("auto").is_none());
        assert!(parse_length("").is_none());
        assert!(parse_length("12 px x").is_none());
    }

    #[test]
    fn test_viewbox_parsing() {
        assert_eq!(parse_viewbox("0,0 200 100"), Some([0.0, 0.0, 200.0, 100.0]));
        assert_eq!(parse_viewbox("0 0 0 100"), None);
        assert_eq!(parse_viewbox("0 0 10"), None);
        assert_eq!(parse_viewbox("a b c d"), None);
    }

    #[test]
    fn test_viewbox_only_document() {
        let vp = normalize(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100"/>"#);
        assert_eq!((vp.doc_w, vp.doc_h), (200.0, 100.0));
        assert_eq!(vp.ppi, CSS_PPI);
        assert_eq!(vp.units, LengthUnit::Unknown);
    }

    #[test]
    fn test_percent_size_falls_back_to_viewbox() {
        let vp = normalize(r#"<svg width="100%" height="100%" viewBox="0 0 64 32"/>"#);
        assert_eq!((vp.doc_w, vp.doc_h), (64.0, 32.0));
        assert_eq!(vp.units, LengthUnit::Percent);
    }

    #[test]
    fn test_physical_size_estimates_ppi() {
        let vp = normalize(r#"<svg width="100mm" height="50mm" viewBox="0 0 400 200"/>"#);
        assert!((vp.doc_w - 377.952_755_9).abs() < 1e-4);
        assert!((vp.doc_h - 188.976_378).abs() < 1e-4);
        assert!(approx(vp.ppi, 101.6));
        assert_eq!(vp.units, LengthUnit::Mm);
    }

    #[test]
    fn test_single_physical_axis_estimates_ppi() {
        let vp = normalize(r#"<svg width="2in" viewBox="0 0 300 100"/>"#);
        assert!(approx(vp.ppi, 150.0));
        assert_eq!((vp.doc_w, vp.doc_h), (300.0, 100.0));
    }

    #[test]
    fn test_nothing_usable_is_unrenderable() {
        let vp = normalize("<svg/>");
        assert!(!vp.is_renderable());
        assert!(vp.raw.error.is_none());
    }

    #[test]
    fn test_malformed_xml_is_zeroed() {
        let vp = normalize("<svg width=\"10\"");
        assert_eq!((vp.doc_w, vp.doc_h), (0.0, 0.0));
        assert_eq!(vp.units, LengthUnit::Unknown);
        assert!(vp.raw.error.is_some());
        assert!(try_normalize("<svg").is_err());
    }

    #[test]
    fn test_unknown_units_size_the_document() {
        let vp = normalize(r#"<svg width="10em" height="5em"/>"#);
        assert_eq!((vp.doc_w, vp.doc_h), (10.0, 5.0));
        assert_eq!(vp.units, LengthUnit::Unknown);
        assert!(vp.is_renderable());
        assert_eq!(vp.ppi, CSS_PPI);
    }

    #[test]
    fn test_public_doctype_is_accepted() {
        let vp = normalize(concat!(
            r#"<?xml version="1.0" standalone="no"?>"#,
            r#"<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">"#,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="20"/>"#,
        ));
        assert!(vp.raw.error.is_none());
        assert_eq!((vp.doc_w, vp.doc_h), (10.0, 20.0));
        assert_eq!(vp.raw.root_tag.as_deref(), Some("svg"));
    }

    #[test]
    fn test_internal_entity_subset_is_accepted() {
        let vp = normalize(concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd" ["#,
            r#"<!ENTITY ns_svg "http://www.w3.org/2000/svg">"#,
            r#"<!ENTITY ns_xlink "http://www.w3.org/1999/xlink">"#,
            r#"]>"#,
            r#"<svg xmlns="&ns_svg;" xmlns:xlink="&ns_xlink;" width="100mm" height="50mm" viewBox="0 0 400 200"/>"#,
        ));
        assert!(vp.raw.error.is_none());
        assert!(approx(vp.doc_w, 100.0 / 25.4 * 96.0));
        assert!(approx(vp.ppi, 101.6));
    }

    #[test]
    fn test_external_entity_reference_is_zeroed() {
        let vp = normalize(r#"<!DOCTYPE svg [<!ENTITY e SYSTEM "file:///etc/passwd">]><svg width="5" height="5">&e;</svg>"#);
        assert!(vp.raw.error.is_some());
        assert_eq!((vp.doc_w, vp.doc_h), (0.0, 0.0));
    }

    #[test]
    fn test_latin1_bytes_are_decoded_lossily() {
        let mut data = br#"<?xml version="1.0" encoding="ISO-8859-1"?><svg width="12" height="8"><title>"#.to_vec();
        data.extend_from_slice(&[0xE9, 0xE8]);
        data.extend_from_slice(b"</title></svg>");
        let vp = normalize_bytes(&data);
        assert!(vp.raw.error.is_none());
        assert_eq!((vp.doc_w, vp.doc_h), (12.0, 8.0));
    }

    #[test]
    fn test_missing_file_is_zeroed() {
        let vp = normalize_file(Path::new("/nonexistent/definitely/missing.svg"));
        assert!(vp.raw.error.is_some());
        assert!(vp.raw.path.is_some());
        assert!(!vp.is_renderable());
    }
}
