//! BBox Shapes - Rasterizer vs Geometry Conventions
//!
//! The rasterizer reports `(x, y, w, h)` pixel rects, the geometry library
//! reports `(x0, y0, x1, y1)` corner pairs. Both coerce into [`BBoxXyxy`].
//! A degenerate shape is absent, never a zero-size box.

use serde::{Deserialize, Serialize};

/// A bbox as supplied by a collaborator, before coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BBoxInput {
    AxisAlignedRect { x: f64, y: f64, w: f64, h: f64 },
    CornerPair { x0: f64, y0: f64, x1: f64, y1: f64 },
    Invalid,
}

/// Corner-pair bbox. `x1 >= x0` and `y1 >= y0`, all finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBoxXyxy {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBoxXyxy {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

impl BBoxInput {
    /// Integer pixel rect from the rasterizer.
    pub fn rect(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self::AxisAlignedRect { x: x as f64, y: y as f64, w: w as f64, h: h as f64 }
    }

    pub fn corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::CornerPair { x0, y0, x1, y1 }
    }

    /// `None` maps to `Invalid`; anything but four numbers is `Invalid`.
    pub fn rect_from_slice(values: Option<&[f64]>) -> Self {
        match values {
            Some(&[x, y, w, h]) => Self::AxisAlignedRect { x, y, w, h },
            _ => Self::Invalid,
        }
    }

    pub fn corners_from_slice(values: Option<&[f64]>) -> Self {
        match values {
            Some(&[x0, y0, x1, y1]) => Self::CornerPair { x0, y0, x1, y1 },
            _ => Self::Invalid,
        }
    }

    pub fn to_xyxy(&self) -> Option<BBoxXyxy> {
        match *self {
            Self::AxisAlignedRect { x, y, w, h } => rect_to_xyxy(x, y, w, h),
            Self::CornerPair { x0, y0, x1, y1 } => corners_to_xyxy(x0, y0, x1, y1),
            Self::Invalid => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

impl From<BBoxXyxy> for BBoxInput {
    fn from(b: BBoxXyxy) -> Self {
        Self::CornerPair { x0: b.x0, y0: b.y0, x1: b.x1, y1: b.y1 }
    }
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn rect_to_xyxy(x: f64, y: f64, w: f64, h: f64) -> Option<BBoxXyxy> {
    if !all_finite(&[x, y, w, h]) || w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some(BBoxXyxy { x0: x, y0: y, x1: x + w, y1: y + h })
}

fn corners_to_xyxy(x0: f64, y0: f64, x1: f64, y1: f64) -> Option<BBoxXyxy> {
    // Zero extent is kept (the comparator notes it); inverted corners are not.
    if !all_finite(&[x0, y0, x1, y1]) || x1 < x0 || y1 < y0 {
        return None;
    }
    Some(BBoxXyxy { x0, y0, x1, y1 })
}

/// A candidate viewport, `(x, y, w, h)` or `(w, h)` anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewportDescriptor {
    Rect([f64; 4]),
    Size([f64; 2]),
}

impl ViewportDescriptor {
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match *values {
            [x, y, w, h] => Some(Self::Rect([x, y, w, h])),
            [w, h] => Some(Self::Size([w, h])),
            _ => None,
        }
    }

    /// `(x, y, w, h)`, or `None` when the extent is not strictly positive.
    pub fn extent(&self) -> Option<(f64, f64, f64, f64)> {
        let (x, y, w, h) = match *self {
            Self::Rect([x, y, w, h]) => (x, y, w, h),
            Self::Size([w, h]) => (0.0, 0.0, w, h),
        };
        if !all_finite(&[x, y, w, h]) || w <= 0.0 || h <= 0.0 {
            return None;
        }
        Some((x, y, w, h))
    }
}
