//! Report Ranking & Regression Detection
//!
//! - Rank actionable items (WARN/FAIL/INVISIBLE) by severity then error.
//! - Build a reproducible single-file command per SVG.
//! - Diff a run against a stored baseline report.
//!
//! Stored reports are read leniently: a baseline from an older or foreign run
//! still yields whatever `{svg, status, max_abs_err_px}` it carries.

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::align::AlignmentInfo;
use crate::compare::{BBoxDiff, ComparisonReport, Status, StatusDetail};

/// Sort weight for an INVISIBLE item that carries no error.
const INVISIBLE_ERR_RANK: f64 = f64::INFINITY;

pub const DEFAULT_ERR_EPS: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to read report {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Report is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported report shape: expected an array or {{\"items\": [...]}}")]
    UnsupportedShape,
}

/// One entry of the flat bbox report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportItem {
    pub svg: String,
    pub status: Status,
    #[serde(default)]
    pub max_abs_err_px: Option<f64>,
    #[serde(default)]
    pub qt_bbox_xyxy: Option<[f64; 4]>,
    #[serde(default)]
    pub geom_bbox_xyxy: Option<[f64; 4]>,
    #[serde(default)]
    pub diff: Option<BBoxDiff>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub geom_align: Option<AlignmentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<StatusDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repro: Option<String>,
}

impl ReportItem {
    pub fn from_comparison(svg: impl Into<String>, report: ComparisonReport, align: Option<AlignmentInfo>) -> Self {
        let detail = report.detail();
        Self {
            svg: svg.into(),
            status: report.status,
            max_abs_err_px: report.max_abs_err_px,
            qt_bbox_xyxy: report.qt_bbox_xyxy,
            geom_bbox_xyxy: report.geom_bbox_xyxy,
            diff: report.diff,
            notes: report.notes,
            geom_align: align,
            detail,
            repro: None,
        }
    }

    /// Minimal item: used for scenarios and for baselines that do not match the full schema.
    pub fn summary(svg: impl Into<String>, status: Status, max_abs_err_px: Option<f64>) -> Self {
        Self {
            svg: svg.into(),
            status,
            max_abs_err_px,
            qt_bbox_xyxy: None,
            geom_bbox_xyxy: None,
            diff: None,
            notes: vec![],
            geom_align: None,
            detail: None,
            repro: None,
        }
    }

    fn from_value(value: Value) -> Self {
        match serde_json::from_value::<ReportItem>(value.clone()) {
            Ok(item) => item,
            Err(_) => {
                let svg = value
                    .get("svg")
                    .and_then(Value::as_str)
                    .or_else(|| value.get("path").and_then(Value::as_str))
                    .unwrap_or_default();
                let status = match value.get("status") {
                    Some(Value::String(s)) => Status::parse(s),
                    _ => Status::Other(String::new()),
                };
                let err = value.get("max_abs_err_px").and_then(lenient_f64);
                Self::summary(svg, status, err)
            }
        }
    }
}

fn lenient_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a report document: a bare array or `{"items": [...]}`.
pub fn parse_report(text: &str) -> Result<Vec<ReportItem>, ReportError> {
    let items = match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items,
            _ => return Err(ReportError::UnsupportedShape),
        },
        _ => return Err(ReportError::UnsupportedShape),
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .map(ReportItem::from_value)
        .collect())
}

pub fn load_report(path: &Path) -> Result<Vec<ReportItem>, ReportError> {
    let text = fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_report(&text)
}

/// Like [`load_report`], but any failure is an empty baseline.
pub fn load_baseline(path: &Path) -> Vec<ReportItem> {
    load_report(path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "baseline unavailable; comparing against an empty baseline");
        vec![]
    })
}

fn rank_err(status: &Status, err: Option<f64>) -> f64 {
    match err {
        Some(e) if !e.is_nan() => e,
        _ if *status == Status::Invisible => INVISIBLE_ERR_RANK,
        _ => -1.0,
    }
}

/// Actionable items, most severe first. Ties keep input order.
pub fn rank(items: &[ReportItem], include_no_geom: bool, limit: Option<usize>) -> Vec<ReportItem> {
    let mut out: Vec<ReportItem> = items
        .iter()
        .filter(|it| it.status.is_actionable(include_no_geom))
        .cloned()
        .collect();
    out.sort_by(|a, b| {
        let ka = (a.status.severity(), rank_err(&a.status, a.max_abs_err_px));
        let kb = (b.status.severity(), rank_err(&b.status, b.max_abs_err_px));
        kb.0.cmp(&ka.0).then_with(|| kb.1.total_cmp(&ka.1))
    });
    if let Some(n) = limit {
        out.truncate(n);
    }
    out
}

/// Options for [`repro_command`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReproOptions {
    pub program: String,
    pub out_dir: String,
    pub modes: Vec<String>,
    pub size_px: u32,
    pub render_scale: f64,
    pub tol_abs_px: f64,
    pub warn_abs_px: f64,
    pub recursive: bool,
}

/// Command line that re-runs the harness on a single SVG.
pub fn repro_command(svg_path: &str, opts: &ReproOptions) -> String {
    let mut parts = vec![
        opts.program.clone(),
        format!("\"{}\"", svg_path),
        format!("--out \"{}\"", opts.out_dir),
        format!("--modes {}", opts.modes.join(",")),
        format!("--size {}", opts.size_px),
        format!("--scale {:?}", opts.render_scale),
        format!("--bbox-tol {:?}", opts.tol_abs_px),
        format!("--bbox-warn {:?}", opts.warn_abs_px),
    ];
    if opts.recursive {
        parts.push("--recursive".to_string());
    }
    parts.join(" ")
}

/// Report matching key: separators unified, `.`/`..` folded, case-insensitive.
pub fn norm_svg_key(svg: &str) -> String {
    let unified = svg.trim().replace('\\', "/");
    if unified.is_empty() {
        return String::new();
    }
    let absolute = unified.starts_with('/');
    let mut segments: Vec<&str> = vec![];
    for seg in unified.split('/') {
        match seg {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            s => segments.push(s),
        }
    }
    let joined = segments.join("/");
    let key = match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    };
    key.to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionEntry {
    pub svg: String,
    pub baseline_status: Status,
    pub current_status: Status,
    pub baseline_max_abs_err_px: Option<f64>,
    pub current_max_abs_err_px: Option<f64>,
    pub delta_max_abs_err_px: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repro: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegressionCounts {
    pub baseline: usize,
    pub current: usize,
    pub regressions: usize,
    pub improvements: usize,
    pub unchanged: usize,
    pub new: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionSummary {
    pub when: String,
    pub counts: RegressionCounts,
    pub regressions: Vec<RegressionEntry>,
    pub improvements: Vec<RegressionEntry>,
    pub new: Vec<String>,
    pub missing: Vec<String>,
}

fn keyed(items: &[ReportItem]) -> IndexMap<String, &ReportItem> {
    let mut map = IndexMap::new();
    for it in items {
        let key = norm_svg_key(&it.svg);
        if !key.is_empty() {
            map.insert(key, it);
        }
    }
    map
}

/// Diff `current` against `baseline`, stamped with the local time.
pub fn compare_against_baseline(
    baseline: &[ReportItem],
    current: &[ReportItem],
    err_eps: f64,
) -> RegressionSummary {
    compare_against_baseline_at(baseline, current, err_eps, Local::now())
}

pub fn compare_against_baseline_at(
    baseline: &[ReportItem],
    current: &[ReportItem],
    err_eps: f64,
    when: DateTime<Local>,
) -> RegressionSummary {
    let bmap = keyed(baseline);
    let cmap = keyed(current);

    let mut regressions = vec![];
    let mut improvements = vec![];
    let mut unchanged = 0;
    let mut missing = vec![];

    for (key, b) in &bmap {
        let Some(c) = cmap.get(key) else {
            missing.push(key.clone());
            continue;
        };

        // TODO: count NO_GEOM pairs in their own bucket instead of folding them into `unchanged`.
        if b.status == Status::NoGeom || c.status == Status::NoGeom {
            unchanged += 1;
            continue;
        }

        let delta = match (b.max_abs_err_px, c.max_abs_err_px) {
            (Some(be), Some(ce)) => Some(ce - be),
            _ => None,
        };
        let svg = [c.svg.as_str(), b.svg.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(key.as_str());
        let entry = RegressionEntry {
            svg: svg.to_string(),
            baseline_status: b.status.clone(),
            current_status: c.status.clone(),
            baseline_max_abs_err_px: b.max_abs_err_px,
            current_max_abs_err_px: c.max_abs_err_px,
            delta_max_abs_err_px: delta,
            repro: None,
        };

        match c.status.severity().cmp(&b.status.severity()) {
            Ordering::Greater => regressions.push(entry),
            Ordering::Less => improvements.push(entry),
            Ordering::Equal => match delta {
                Some(d) if d > err_eps => regressions.push(entry),
                Some(d) if d < -err_eps => improvements.push(entry),
                _ => unchanged += 1,
            },
        }
    }

    let new: Vec<String> = cmap.keys().filter(|k| !bmap.contains_key(*k)).cloned().collect();

    let reg_key = |e: &RegressionEntry| {
        let delta = match e.delta_max_abs_err_px {
            Some(d) if !d.is_nan() => d,
            _ if e.current_status == Status::Invisible => INVISIBLE_ERR_RANK,
            _ => 0.0,
        };
        (e.current_status.severity(), delta)
    };
    regressions.sort_by(|a, b| {
        let (ka, kb) = (reg_key(a), reg_key(b));
        kb.0.cmp(&ka.0).then_with(|| kb.1.total_cmp(&ka.1))
    });

    tracing::info!(
        regressions = regressions.len(),
        improvements = improvements.len(),
        unchanged,
        new = new.len(),
        missing = missing.len(),
        "baseline comparison finished"
    );

    RegressionSummary {
        when: when.format("%Y-%m-%dT%H:%M:%S").to_string(),
        counts: RegressionCounts {
            baseline: bmap.len(),
            current: cmap.len(),
            regressions: regressions.len(),
            improvements: improvements.len(),
            unchanged,
            new: new.len(),
            missing: missing.len(),
        },
        regressions,
        improvements,
        new,
        missing,
    }
}
