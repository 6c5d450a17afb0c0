//! RCS BBox Core - Render/Geom Agreement Harness
//!
//! # Ground Rules
//! 1. The rendered alpha bbox is ground truth
//! 2. Coordinate spaces are reconciled before anything is judged
//! 3. Missing data is a status, not an error
//! 4. Every entry point is total; one bad file never stops a batch
//! 5. Same inputs, same report
//! 6. Regressions are measured against a stored baseline, never remembered

pub mod bbox;
pub mod viewport;
pub mod compare;
pub mod align;
pub mod report;
pub mod config;
pub mod hashing;
pub mod pipeline;

pub use bbox::{BBoxInput, BBoxXyxy, ViewportDescriptor};
pub use viewport::{normalize, normalize_file, try_normalize, NormalizedViewport, LengthUnit, ViewportError};
pub use compare::{compare, BBoxDiff, ComparisonReport, Status, StatusDetail};
pub use align::{align, AffineTransform, AlignmentInfo, CandidateScore, RenderSize, ViewportCandidate};
pub use report::{
    compare_against_baseline, load_baseline, rank, repro_command, RegressionEntry, RegressionSummary,
    ReportItem, ReproOptions,
};
pub use config::HarnessConfig;
pub use hashing::{canonical_json, report_digest};
pub use pipeline::{Harness, Measurement, PipelineError, RunOutput, RunStats};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const TOOL_NAME: &str = "rcs-bbox-cli";
