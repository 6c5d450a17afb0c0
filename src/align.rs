//! Geometry BBox Alignment - Affine Candidate Search
//!
//! The rasterizer draws into a fixed target rect while the geometry bbox may be
//! expressed in viewBox user units, document px or physical units. A systematic
//! scale/offset mismatch would turn every file into a FAIL, so a handful of
//! plausible mappings are generated, scored with the comparator, and the best
//! one wins.
//!
//! Candidate order is fixed: `raw`, then for each viewport its `_keep` followed
//! by its `_stretch`. Equal errors keep the earliest candidate.

use serde::{Deserialize, Serialize};

use crate::bbox::{BBoxInput, BBoxXyxy, ViewportDescriptor};
use crate::compare::{compare, Status};

pub const RAW_KIND: &str = "raw";

/// `(x, y) -> (x * scale_x + tx, y * scale_y + ty)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffineTransform {
    pub kind: String,
    pub scale_x: f64,
    pub scale_y: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self { kind: RAW_KIND.to_string(), scale_x: 1.0, scale_y: 1.0, tx: 0.0, ty: 0.0 }
    }

    /// Uniform scale, letterboxed and centered in the destination.
    pub fn keep_aspect(kind: String, src: (f64, f64, f64, f64), dst_w: f64, dst_h: f64) -> Option<Self> {
        let (x, y, w, h) = src;
        if w <= 0.0 || h <= 0.0 || dst_w <= 0.0 || dst_h <= 0.0 {
            return None;
        }
        let s = (dst_w / w).min(dst_h / h);
        Some(Self {
            kind,
            scale_x: s,
            scale_y: s,
            tx: (dst_w - w * s) * 0.5 - x * s,
            ty: (dst_h - h * s) * 0.5 - y * s,
        })
    }

    /// Independent per-axis scale, origin pinned to the destination corner.
    pub fn stretch(kind: String, src: (f64, f64, f64, f64), dst_w: f64, dst_h: f64) -> Option<Self> {
        let (x, y, w, h) = src;
        if w <= 0.0 || h <= 0.0 || dst_w <= 0.0 || dst_h <= 0.0 {
            return None;
        }
        let sx = dst_w / w;
        let sy = dst_h / h;
        Some(Self { kind, scale_x: sx, scale_y: sy, tx: -x * sx, ty: -y * sy })
    }

    /// Maps both corners independently; a negative scale can invert the box.
    pub fn apply(&self, b: &BBoxXyxy) -> BBoxInput {
        BBoxInput::CornerPair {
            x0: b.x0 * self.scale_x + self.tx,
            y0: b.y0 * self.scale_y + self.ty,
            x1: b.x1 * self.scale_x + self.tx,
            y1: b.y1 * self.scale_y + self.ty,
        }
    }
}

/// A viewport offered as a mapping source, labeled by where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewportCandidate {
    pub label: String,
    pub viewport: ViewportDescriptor,
}

impl ViewportCandidate {
    pub fn new(label: impl Into<String>, viewport: ViewportDescriptor) -> Self {
        Self { label: label.into(), viewport }
    }
}

/// Target raster size, `[width, height]` in px.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderSize(pub [u32; 2]);

impl RenderSize {
    pub fn square(px: u32) -> Self {
        Self([px, px])
    }

    pub fn width(&self) -> f64 {
        self.0[0] as f64
    }

    pub fn height(&self) -> f64 {
        self.0[1] as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateScore {
    pub kind: String,
    pub max_abs_err_px: Option<f64>,
    pub status: Status,
    pub transform: AffineTransform,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentInfo {
    pub chosen: String,
    pub candidates: Vec<CandidateScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<AffineTransform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_px: Option<RenderSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AlignmentInfo {
    fn skipped(note: &str) -> Self {
        Self {
            chosen: RAW_KIND.to_string(),
            candidates: vec![],
            transform: None,
            render_px: None,
            note: Some(note.to_string()),
        }
    }
}

/// Build every candidate transform in generation order.
pub fn candidate_transforms(render_px: RenderSize, viewports: &[ViewportCandidate]) -> Vec<AffineTransform> {
    let (dst_w, dst_h) = (render_px.width(), render_px.height());
    let mut out = vec![AffineTransform::identity()];
    for vc in viewports {
        let Some(src) = vc.viewport.extent() else {
            tracing::debug!(label = %vc.label, "skipping viewport with non-positive extent");
            continue;
        };
        out.extend(AffineTransform::keep_aspect(format!("{}_keep", vc.label), src, dst_w, dst_h));
        out.extend(AffineTransform::stretch(format!("{}_stretch", vc.label), src, dst_w, dst_h));
    }
    out
}

/// Pick the mapping of `geometry` that best matches `observed`.
///
/// Returns the geometry bbox unchanged when either side is absent.
pub fn align(
    observed: &BBoxInput,
    geometry: &BBoxInput,
    render_px: RenderSize,
    viewports: &[ViewportCandidate],
    tol_abs_px: f64,
    warn_abs_px: f64,
) -> (BBoxInput, AlignmentInfo) {
    if observed.to_xyxy().is_none() {
        return (*geometry, AlignmentInfo::skipped("observed bbox missing; cannot score candidates"));
    }
    let Some(geom) = geometry.to_xyxy() else {
        return (*geometry, AlignmentInfo::skipped("geometry bbox missing or invalid"));
    };

    let mut candidates = Vec::new();
    let mut best: Option<(f64, AffineTransform, BBoxInput)> = None;

    for t in candidate_transforms(render_px, viewports) {
        let mapped = t.apply(&geom);
        let rep = compare(observed, &mapped, tol_abs_px, warn_abs_px);
        let err = rep.max_abs_err_px.unwrap_or(f64::INFINITY);

        // strict `<` keeps the first of equal candidates
        let better = match &best {
            Some((best_err, _, _)) => err < *best_err,
            None => true,
        };
        candidates.push(CandidateScore {
            kind: t.kind.clone(),
            max_abs_err_px: rep.max_abs_err_px,
            status: rep.status,
            transform: t.clone(),
        });
        if better {
            best = Some((err, t, mapped));
        }
    }

    // raw is always generated, so there is a best
    let (err, transform, mapped) = match best {
        Some(b) => b,
        None => (f64::INFINITY, AffineTransform::identity(), *geometry),
    };
    tracing::debug!(chosen = %transform.kind, err, "geometry alignment selected");

    let info = AlignmentInfo {
        chosen: transform.kind.clone(),
        candidates,
        transform: Some(transform),
        render_px: Some(render_px),
        note: None,
    };
    (mapped, info)
}
