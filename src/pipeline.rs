//! Harness Pipeline - Per-File Analysis and Batch Driver
//!
//! Per file: normalize viewport -> align geometry -> compare -> report item.
//! Files are independent, so a batch fans out over rayon and only the
//! ranking/baseline pass runs after every item is in.
//!
//! A broken file never aborts the batch; it becomes an item with a
//! conservative status and a note.

use serde::{Deserialize, Serialize};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::align::{align, RenderSize, ViewportCandidate};
use crate::bbox::{BBoxInput, ViewportDescriptor};
use crate::compare::{compare, Status};
use crate::config::HarnessConfig;
use crate::report::{compare_against_baseline, rank, repro_command, RegressionSummary, ReportItem};
use crate::viewport::{normalize_file, NormalizedViewport};

pub const NORM_VIEWBOX_LABEL: &str = "norm_viewbox";
pub const NORM_DOCSIZE_LABEL: &str = "norm_docsize";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Failed to encode report: {0}")]
    Encode(serde_json::Error),
}

/// What the external rasterizer and geometry library measured for one SVG.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    pub svg: String,
    /// `(x, y, w, h)` alpha bbox of the rendered pixels.
    #[serde(default)]
    pub observed: Option<Vec<f64>>,
    /// `(x0, y0, x1, y1)` from the geometry library.
    #[serde(default)]
    pub geometry: Option<Vec<f64>>,
    #[serde(default)]
    pub render_px: Option<RenderSize>,
    #[serde(default)]
    pub viewports: Vec<ViewportCandidate>,
}

/// Load a measurement manifest (JSON array). Relative `svg` paths resolve against the manifest's directory.
pub fn load_manifest(path: &Path) -> Result<Vec<Measurement>, PipelineError> {
    let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut items: Vec<Measurement> = serde_json::from_str(&text)?;
    if let Some(base) = path.parent() {
        for m in &mut items {
            let p = Path::new(&m.svg);
            if p.is_relative() && !base.as_os_str().is_empty() {
                m.svg = base.join(p).display().to_string();
            }
        }
    }
    Ok(items)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let io_err = |source| PipelineError::Io { path: path.display().to_string(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let text = serde_json::to_string_pretty(value).map_err(PipelineError::Encode)?;
    fs::write(path, text).map_err(io_err)
}

/// Count per status; anything unrecognized is not counted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RunStats {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
    pub no_geom: usize,
    pub invisible: usize,
}

impl RunStats {
    pub fn tally(items: &[ReportItem]) -> Self {
        let mut stats = Self::default();
        for it in items {
            match it.status {
                Status::Pass => stats.pass += 1,
                Status::Warn => stats.warn += 1,
                Status::Fail => stats.fail += 1,
                Status::NoGeom => stats.no_geom += 1,
                Status::Invisible => stats.invisible += 1,
                Status::Other(_) => {}
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutput {
    pub report: Vec<ReportItem>,
    pub failures: Vec<ReportItem>,
    pub regressions: Option<RegressionSummary>,
    pub stats: RunStats,
}

/// The harness - one config, many files.
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Caller-supplied viewports first, then the normalizer's viewBox and doc size.
    pub fn candidate_viewports(
        &self,
        m: &Measurement,
        viewport: &NormalizedViewport,
    ) -> Vec<ViewportCandidate> {
        let mut out = m.viewports.clone();
        if let Some(vb) = viewport.viewbox {
            out.push(ViewportCandidate::new(NORM_VIEWBOX_LABEL, ViewportDescriptor::Rect(vb)));
        }
        if let Some(size) = viewport.doc_size() {
            out.push(ViewportCandidate::new(NORM_DOCSIZE_LABEL, ViewportDescriptor::Size(size)));
        }
        out
    }

    /// Analyze one file against an already-normalized viewport. Pure.
    pub fn analyze(&self, m: &Measurement, viewport: &NormalizedViewport) -> ReportItem {
        let observed = BBoxInput::rect_from_slice(m.observed.as_deref());
        let geometry = BBoxInput::corners_from_slice(m.geometry.as_deref());
        let render_px = m.render_px.unwrap_or_else(|| self.config.render_px());
        let candidates = self.candidate_viewports(m, viewport);

        let (aligned, info) = align(
            &observed,
            &geometry,
            render_px,
            &candidates,
            self.config.tol_abs_px,
            self.config.warn_abs_px,
        );
        let mut report = compare(&observed, &aligned, self.config.tol_abs_px, self.config.warn_abs_px);
        if let Some(err) = &viewport.raw.error {
            report.notes.push(format!("viewport normalization failed: {}", err));
        }

        tracing::debug!(svg = %m.svg, status = %report.status, align = %info.chosen, "bbox compared");
        ReportItem::from_comparison(m.svg.clone(), report, Some(info))
    }

    /// Read the SVG from disk and analyze it.
    pub fn analyze_file(&self, m: &Measurement) -> ReportItem {
        let viewport = normalize_file(Path::new(&m.svg));
        self.analyze(m, &viewport)
    }

    /// Analyze every measurement in parallel; output order matches input order.
    pub fn run_batch(&self, measurements: &[Measurement]) -> Vec<ReportItem> {
        let items: Vec<ReportItem> = measurements.par_iter().map(|m| self.analyze_file(m)).collect();
        tracing::info!(files = items.len(), "batch analyzed");
        items
    }

    /// Global pass: rank failures, diff against a baseline, attach repro commands.
    pub fn finish(&self, report: Vec<ReportItem>, baseline: Option<&[ReportItem]>, out_dir: &Path) -> RunOutput {
        let repro = self.config.repro_options(out_dir);

        let mut failures = rank(&report, self.config.include_no_geom, self.config.rank_limit());
        for it in &mut failures {
            it.repro = Some(repro_command(&it.svg, &repro));
        }

        let regressions = baseline.map(|base| {
            let mut summary = compare_against_baseline(base, &report, self.config.err_eps);
            for r in &mut summary.regressions {
                r.repro = Some(repro_command(&r.svg, &repro));
            }
            summary
        });

        let stats = RunStats::tally(&report);
        RunOutput { report, failures, regressions, stats }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(HarnessConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::normalize;

    fn measurement(observed: Option<Vec<f64>>, geometry: Option<Vec<f64>>) -> Measurement {
        Measurement {
            svg: "icons/a.svg".to_string(),
            observed,
            geometry,
            render_px: None,
            viewports: vec![],
        }
    }

    #[test]
    fn test_normalizer_viewports_follow_supplied_ones() {
        let h = Harness::default();
        let mut m = measurement(None, None);
        m.viewports.push(ViewportCandidate::new("qtsvg_viewbox", ViewportDescriptor::Size([10.0, 10.0])));
        let vp = normalize(r#"<svg width="40" height="20" viewBox="0 0 400 200"/>"#);
        let labels: Vec<_> = h.candidate_viewports(&m, &vp).into_iter().map(|c| c.label).collect();
        assert_eq!(labels, ["qtsvg_viewbox", NORM_VIEWBOX_LABEL, NORM_DOCSIZE_LABEL]);
    }

    #[test]
    fn test_viewbox_user_units_align_to_render_target() {
        let h = Harness::default();
        // 512px square target, geometry in 0..128 user units
        let m = measurement(Some(vec![0.0, 0.0, 512.0, 512.0]), Some(vec![0.0, 0.0, 128.0, 128.0]));
        let vp = normalize(r#"<svg viewBox="0 0 128 128"/>"#);
        let item = h.analyze(&m, &vp);
        assert_eq!(item.status, Status::Pass);
        assert_eq!(item.geom_align.unwrap().chosen, "norm_viewbox_keep");
    }

    #[test]
    fn test_missing_geometry_is_no_geom() {
        let h = Harness::default();
        let item = h.analyze(&measurement(Some(vec![0.0, 0.0, 4.0, 4.0]), None), &normalize("<svg/>"));
        assert_eq!(item.status, Status::NoGeom);
    }

    #[test]
    fn test_unreadable_svg_still_reports() {
        let h = Harness::default();
        let mut m = measurement(Some(vec![0.0, 0.0, 10.0, 10.0]), Some(vec![0.0, 0.0, 10.0, 10.0]));
        m.svg = "/nonexistent/x.svg".to_string();
        let item = h.analyze_file(&m);
        assert_eq!(item.status, Status::Pass);
        assert!(item.notes.iter().any(|n| n.starts_with("viewport normalization failed")));
    }

    #[test]
    fn test_finish_ranks_and_attaches_repro() {
        let h = Harness::default();
        let report = vec![
            ReportItem::summary("a.svg", Status::Pass, Some(0.0)),
            ReportItem::summary("b.svg", Status::Fail, Some(20.0)),
        ];
        let out = h.finish(report, None, Path::new("out"));
        assert_eq!(out.failures.len(), 1);
        assert!(out.failures[0].repro.as_deref().unwrap().contains("\"b.svg\""));
        assert!(out.regressions.is_none());
        assert_eq!(out.stats, RunStats { pass: 1, fail: 1, ..Default::default() });
    }
}
