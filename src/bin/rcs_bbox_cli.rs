//! RCS BBox CLI - Render/Geom harness driver
//!
//! Commands: analyze, normalize, diff
//! JSON reports go to files (analyze) or stdout (normalize, diff).
//! Logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

use rcs_bbox_core::{
    config::parse_modes,
    hashing::report_digest,
    pipeline::{load_manifest, write_json},
    report::load_report,
    compare_against_baseline, load_baseline, normalize_file, Harness, HarnessConfig,
    ENGINE_VERSION, TOOL_NAME,
};

#[derive(Parser)]
#[command(name = "rcs-bbox-cli")]
#[command(about = "RCS BBox CLI - render vs geometry bbox agreement and regressions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a measurement manifest and write bbox reports
    Analyze(AnalyzeArgs),

    /// Print the normalized viewport of an SVG
    Normalize {
        svg: PathBuf,
    },

    /// Compare two flat bbox reports
    Diff {
        baseline: PathBuf,
        current: PathBuf,

        #[arg(long, default_value_t = rcs_bbox_core::report::DEFAULT_ERR_EPS)]
        err_eps: f64,
    },
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// JSON array of measurements
    manifest: PathBuf,

    /// Output directory (default: render_debug_out next to the manifest)
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "RCS_DBG_BBOX_TOL")]
    bbox_tol: Option<f64>,

    #[arg(long, env = "RCS_DBG_BBOX_WARN")]
    bbox_warn: Option<f64>,

    #[arg(long, env = "RCS_DBG_SIZE")]
    size: Option<u32>,

    #[arg(long, env = "RCS_DBG_RENDER_SCALE")]
    scale: Option<u32>,

    /// raw,thumb,canvas (comma-separated)
    #[arg(long, env = "RCS_DBG_MODES")]
    modes: Option<String>,

    /// Top N non-PASS items in the failure ranking (0 = all)
    #[arg(long, env = "RCS_DBG_BBOX_TOP")]
    bbox_top: Option<usize>,

    #[arg(long)]
    bbox_include_no_geom: bool,

    /// Previous _bbox_report.json to diff against
    #[arg(long)]
    bbox_baseline: Option<PathBuf>,

    /// Overwrite the baseline with this run's report afterwards
    #[arg(long)]
    bbox_baseline_update: bool,

    /// Add --recursive to repro commands (the manifest is never walked)
    #[arg(long)]
    recursive: bool,
}

impl AnalyzeArgs {
    fn resolve_config(&self) -> Result<HarnessConfig, String> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path).map_err(|e| e.to_string())?,
            None => HarnessConfig::default(),
        };
        if let Some(v) = self.bbox_tol { config.tol_abs_px = v; }
        if let Some(v) = self.bbox_warn { config.warn_abs_px = v; }
        if let Some(v) = self.size { config.size_px = v; }
        if let Some(v) = self.scale { config.render_scale = v; }
        if let Some(v) = &self.modes { config.modes = parse_modes(v); }
        if let Some(v) = self.bbox_top { config.top = v; }
        config.include_no_geom |= self.bbox_include_no_geom;
        config.recursive |= self.recursive;
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Analyze(args) => match run_analyze(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!(r#"{{"error": "{}"}}"#, e);
                ExitCode::FAILURE
            }
        },

        Commands::Normalize { svg } => {
            let viewport = normalize_file(&svg);
            print_json(&viewport)
        }

        Commands::Diff { baseline, current, err_eps } => {
            let current = match load_report(&current) {
                Ok(items) => items,
                Err(e) => {
                    eprintln!(r#"{{"error": "{}"}}"#, e);
                    return ExitCode::FAILURE;
                }
            };
            let summary = compare_against_baseline(&load_baseline(&baseline), &current, err_eps);
            print_json(&summary)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(r#"{{"error": "{}"}}"#, e);
            ExitCode::FAILURE
        }
    }
}

fn default_out_dir(manifest: &Path) -> PathBuf {
    manifest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("render_debug_out")
}

fn run_analyze(args: &AnalyzeArgs) -> Result<(), String> {
    let config = args.resolve_config()?;
    let out_dir = args.out.clone().unwrap_or_else(|| default_out_dir(&args.manifest));
    let measurements = load_manifest(&args.manifest).map_err(|e| e.to_string())?;

    tracing::info!(
        files = measurements.len(),
        tol = config.tol_abs_px,
        warn = config.warn_abs_px,
        out = %out_dir.display(),
        "bbox analysis started"
    );

    let harness = Harness::new(config);
    let report = harness.run_batch(&measurements);
    let baseline = args.bbox_baseline.as_deref().map(load_baseline);
    let output = harness.finish(report, baseline.as_deref(), &out_dir);

    let report_path = out_dir.join("_bbox_report.json");
    let failures_path = out_dir.join("_bbox_failures.json");
    let regressions_path = out_dir.join("_bbox_regressions.json");
    write_json(&report_path, &output.report).map_err(|e| e.to_string())?;
    write_json(&failures_path, &output.failures).map_err(|e| e.to_string())?;

    if let Some(reg) = &output.regressions {
        write_json(&regressions_path, reg).map_err(|e| e.to_string())?;
        let c = &reg.counts;
        tracing::info!(
            regressions = c.regressions,
            improvements = c.improvements,
            unchanged = c.unchanged,
            new = c.new,
            missing = c.missing,
            "baseline compare"
        );
        if args.bbox_baseline_update {
            if let Some(path) = &args.bbox_baseline {
                match write_json(path, &output.report) {
                    Ok(()) => tracing::info!(baseline = %path.display(), "baseline updated"),
                    Err(e) => tracing::warn!(error = %e, "baseline update failed"),
                }
            }
        }
    }

    let config = harness.config();
    let summary = serde_json::json!({
        "tool": TOOL_NAME,
        "version": ENGINE_VERSION,
        "when": chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        "input": args.manifest.display().to_string(),
        "count": measurements.len(),
        "size_px": config.size_px,
        "render_scale": config.render_scale,
        "modes": config.normalized_modes(),
        "bbox_compare": {
            "tol_abs_px": config.tol_abs_px,
            "warn_abs_px": config.warn_abs_px,
            "report": report_path.display().to_string(),
            "report_sha256": report_digest(&output.report).ok(),
            "failures_report": failures_path.display().to_string(),
            "regressions_report": output.regressions.as_ref().map(|_| regressions_path.display().to_string()),
            "baseline": args.bbox_baseline.as_ref().map(|p| p.display().to_string()),
            "stats": output.stats,
        },
    });
    let summary_path = out_dir.join("_summary.json");
    write_json(&summary_path, &summary).map_err(|e| e.to_string())?;

    tracing::info!(
        pass = output.stats.pass,
        warn = output.stats.warn,
        fail = output.stats.fail,
        no_geom = output.stats.no_geom,
        invisible = output.stats.invisible,
        summary = %summary_path.display(),
        "bbox analysis finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_only_reaches_repro_command() {
        let cli = Cli::try_parse_from(["rcs-bbox-cli", "analyze", "m.json", "--recursive", "--bbox-tol", "2"]).unwrap();
        let Commands::Analyze(args) = cli.command else { panic!("expected analyze") };
        let config = args.resolve_config().unwrap();
        assert!(config.recursive);
        assert_eq!(config.tol_abs_px, 2.0);
        let opts = config.repro_options(Path::new("out"));
        assert!(rcs_bbox_core::report::repro_command("x.svg", &opts).ends_with("--recursive"));
    }
}
