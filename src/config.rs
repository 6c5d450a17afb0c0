//! Harness Configuration
//!
//! Thresholds and run options. Every field has a default so a partial JSON
//! file (or none at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::align::RenderSize;
use crate::report::ReproOptions;

pub const KNOWN_MODES: [&str; 3] = ["canvas", "raw", "thumb"];

const MIN_RENDER_PX: u32 = 32;
const MAX_RENDER_PX: u32 = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid threshold: {0}")]
    Threshold(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    #[serde(default = "default_tol")]
    pub tol_abs_px: f64,
    #[serde(default = "default_warn")]
    pub warn_abs_px: f64,
    #[serde(default = "default_err_eps")]
    pub err_eps: f64,
    #[serde(default = "default_size_px")]
    pub size_px: u32,
    #[serde(default = "default_render_scale")]
    pub render_scale: u32,
    #[serde(default = "default_modes")]
    pub modes: Vec<String>,
    /// Ranked failures kept; 0 keeps all.
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default)]
    pub include_no_geom: bool,
    /// Only forwarded to repro commands; manifests list files explicitly.
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_repro_program")]
    pub repro_program: String,
}

fn default_tol() -> f64 { 3.0 }
fn default_warn() -> f64 { 8.0 }
fn default_err_eps() -> f64 { crate::report::DEFAULT_ERR_EPS }
fn default_size_px() -> u32 { 256 }
fn default_render_scale() -> u32 { 2 }
fn default_top() -> usize { 25 }
fn default_repro_program() -> String { "rcs-render-debug".to_string() }

fn default_modes() -> Vec<String> {
    KNOWN_MODES.iter().map(|m| m.to_string()).collect()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tol_abs_px: default_tol(),
            warn_abs_px: default_warn(),
            err_eps: default_err_eps(),
            size_px: default_size_px(),
            render_scale: default_render_scale(),
            modes: default_modes(),
            top: default_top(),
            include_no_geom: false,
            recursive: false,
            repro_program: default_repro_program(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Thresholds must be finite and non-negative. `warn < tol` is allowed; tol is checked first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("tol_abs_px", self.tol_abs_px),
            ("warn_abs_px", self.warn_abs_px),
            ("err_eps", self.err_eps),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Threshold(format!("{} = {}", name, v)));
            }
        }
        Ok(())
    }

    /// Square raster target, `size * scale` clamped to 32..=1024.
    pub fn render_px(&self) -> RenderSize {
        let px = self.size_px.saturating_mul(self.render_scale);
        RenderSize::square(px.clamp(MIN_RENDER_PX, MAX_RENDER_PX))
    }

    /// Lower-cased known modes, sorted and deduplicated; all modes when none survive.
    pub fn normalized_modes(&self) -> Vec<String> {
        let mut modes: Vec<String> = self
            .modes
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| KNOWN_MODES.contains(&m.as_str()))
            .collect();
        modes.sort();
        modes.dedup();
        if modes.is_empty() {
            return default_modes();
        }
        modes
    }

    pub fn rank_limit(&self) -> Option<usize> {
        (self.top > 0).then_some(self.top)
    }

    pub fn repro_options(&self, out_dir: &Path) -> ReproOptions {
        ReproOptions {
            program: self.repro_program.clone(),
            out_dir: out_dir.display().to_string(),
            modes: self.normalized_modes(),
            size_px: self.size_px,
            render_scale: self.render_scale as f64,
            tol_abs_px: self.tol_abs_px,
            warn_abs_px: self.warn_abs_px,
            recursive: self.recursive,
        }
    }
}

/// Split a comma-separated mode list.
pub fn parse_modes(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}
