//! BBox Comparison - Status Taxonomy
//!
//! Observed (rasterized alpha bbox) vs geometry (measurement library) bbox.
//! Checks run in priority order: NO_GEOM, INVISIBLE, then PASS/WARN/FAIL
//! by the largest absolute corner delta.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::bbox::{BBoxInput, BBoxXyxy};

/// Near-zero extent threshold for advisory notes.
const DEGENERATE_EPS: f64 = 1e-6;

/// Relative aspect difference above which a WARN is attributed to ratio.
const WARN_RATIO_THRESHOLD: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Pass,
    Warn,
    Fail,
    Invisible,
    NoGeom,
    /// Any other label read back from a stored report, upper-cased.
    Other(String),
}

impl Status {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Self::Pass,
            "WARN" => Self::Warn,
            "FAIL" => Self::Fail,
            "INVISIBLE" => Self::Invisible,
            "NO_GEOM" => Self::NoGeom,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
            Self::Invisible => "INVISIBLE",
            Self::NoGeom => "NO_GEOM",
            Self::Other(s) => s,
        }
    }

    /// `PASS < WARN < FAIL < INVISIBLE`. NO_GEOM is below everything;
    /// unrecognized labels rank with FAIL.
    pub fn severity(&self) -> i32 {
        match self {
            Self::NoGeom => -1,
            Self::Pass => 0,
            Self::Warn => 1,
            Self::Fail | Self::Other(_) => 2,
            Self::Invisible => 3,
        }
    }

    /// WARN, FAIL and INVISIBLE need a look; NO_GEOM only on request.
    pub fn is_actionable(&self, include_no_geom: bool) -> bool {
        match self {
            Self::Warn | Self::Fail | Self::Invisible => true,
            Self::NoGeom => include_no_geom,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(s) => Status::parse(&s),
            serde_json::Value::Null => Status::Other(String::new()),
            other => Status::parse(&other.to_string()),
        })
    }
}

/// Finer reading of a non-PASS status. Advisory only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusDetail {
    InvisibleRender,
    WarnSmall,
    WarnRatio,
    FailAlign,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BBoxDiff {
    pub dx0: f64,
    pub dy0: f64,
    pub dx1: f64,
    pub dy1: f64,
    pub dw: f64,
    pub dh: f64,
}

impl BBoxDiff {
    fn between(observed: &BBoxXyxy, geometry: &BBoxXyxy) -> Self {
        Self {
            dx0: observed.x0 - geometry.x0,
            dy0: observed.y0 - geometry.y0,
            dx1: observed.x1 - geometry.x1,
            dy1: observed.y1 - geometry.y1,
            dw: observed.width() - geometry.width(),
            dh: observed.height() - geometry.height(),
        }
    }

    pub fn max_abs_corner(&self) -> f64 {
        [self.dx0, self.dy0, self.dx1, self.dy1]
            .iter()
            .fold(0.0_f64, |acc, d| acc.max(d.abs()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonReport {
    pub status: Status,
    pub tol_abs_px: f64,
    pub warn_abs_px: f64,
    pub qt_bbox_xyxy: Option<[f64; 4]>,
    pub geom_bbox_xyxy: Option<[f64; 4]>,
    pub max_abs_err_px: Option<f64>,
    pub diff: Option<BBoxDiff>,
    pub notes: Vec<String>,
}

impl ComparisonReport {
    pub fn detail(&self) -> Option<StatusDetail> {
        match self.status {
            Status::Invisible if self.geom_bbox_xyxy.is_some() => Some(StatusDetail::InvisibleRender),
            Status::Warn => {
                let ratio = |b: &Option<[f64; 4]>| {
                    let [x0, y0, x1, y1] = (*b)?;
                    let (w, h) = ((x1 - x0).max(0.0), (y1 - y0).max(0.0));
                    (h > 0.0 && w > 0.0).then(|| w / h)
                };
                match (ratio(&self.qt_bbox_xyxy), ratio(&self.geom_bbox_xyxy)) {
                    (Some(rq), Some(rg)) if (rq - rg).abs() / rg >= WARN_RATIO_THRESHOLD => {
                        Some(StatusDetail::WarnRatio)
                    }
                    _ => Some(StatusDetail::WarnSmall),
                }
            }
            Status::Fail => Some(StatusDetail::FailAlign),
            _ => None,
        }
    }
}

/// Compare an observed bbox against a geometry bbox. Total for any input.
pub fn compare(
    observed: &BBoxInput,
    geometry: &BBoxInput,
    tol_abs_px: f64,
    warn_abs_px: f64,
) -> ComparisonReport {
    let qt = observed.to_xyxy();
    let geom = geometry.to_xyxy();

    let mut report = ComparisonReport {
        status: Status::NoGeom,
        tol_abs_px,
        warn_abs_px,
        qt_bbox_xyxy: qt.map(|b| b.as_array()),
        geom_bbox_xyxy: geom.map(|b| b.as_array()),
        max_abs_err_px: None,
        diff: None,
        notes: vec![],
    };

    let Some(geom) = geom else {
        report.notes.push(match geometry {
            BBoxInput::Invalid => "geometry bbox not available".to_string(),
            _ => "geometry bbox malformed or degenerate".to_string(),
        });
        return report;
    };

    let Some(qt) = qt else {
        report.status = Status::Invisible;
        report.notes.push(match observed {
            BBoxInput::Invalid => "rendered alpha bbox missing (likely invisible render)".to_string(),
            _ => "rendered alpha bbox empty or malformed".to_string(),
        });
        return report;
    };

    let diff = BBoxDiff::between(&qt, &geom);
    let max_abs = diff.max_abs_corner();

    if geom.width() <= DEGENERATE_EPS || geom.height() <= DEGENERATE_EPS {
        report.notes.push("geom bbox degenerate".to_string());
    }
    if qt.width() <= DEGENERATE_EPS || qt.height() <= DEGENERATE_EPS {
        report.notes.push("qt bbox degenerate".to_string());
    }

    report.status = if max_abs <= tol_abs_px {
        Status::Pass
    } else if max_abs <= warn_abs_px {
        Status::Warn
    } else {
        Status::Fail
    };
    report.max_abs_err_px = Some(max_abs);
    report.diff = Some(diff);
    report
}
