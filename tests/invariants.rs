//! Contract Invariant Tests
//!
//! End-to-end guarantees of the harness: normalization, alignment,
//! comparison, ranking and baseline diffing through the public API.

use std::fs;
use std::path::Path;

use rcs_bbox_core::{
    align, compare, compare_against_baseline, load_baseline, normalize, rank,
    pipeline::load_manifest,
    report::{parse_report, DEFAULT_ERR_EPS},
    BBoxInput, Harness, HarnessConfig, Measurement, RenderSize, ReportItem, Status,
    ViewportCandidate, ViewportDescriptor,
};

fn approx(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
}

fn item(svg: &str, status: Status, err: Option<f64>) -> ReportItem {
    ReportItem::summary(svg, status, err)
}

#[test]
fn invariant_units_convert_at_96_ppi() {
    for (len, px) in [("25.4mm", 96.0), ("72pt", 96.0), ("1in", 96.0)] {
        let vp = normalize(&format!(r#"<svg width="{len}" height="{len}"/>"#));
        assert!(approx(vp.doc_w, px, 1e-9), "{len}");
        assert!(approx(vp.doc_h, px, 1e-9), "{len}");
    }
}

#[test]
fn invariant_viewbox_only_document_size() {
    let vp = normalize(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100"></svg>"#);
    assert_eq!((vp.doc_w, vp.doc_h), (200.0, 100.0));
    assert_eq!(vp.ppi, 96.0);
}

#[test]
fn invariant_garbage_svg_never_raises() {
    for src in ["", "not xml at all", "<svg", "<?xml version=\"1.0\"?><!DOCTYPE x [<!ENTITY e SYSTEM \"file:///etc/passwd\">]><svg>&e;</svg>"] {
        let vp = normalize(src);
        assert_eq!((vp.doc_w, vp.doc_h), (0.0, 0.0));
        assert_eq!(vp.ppi, 96.0);
    }
}

#[test]
fn invariant_align_without_candidates_is_raw() {
    let geom = BBoxInput::corners(3.0, 4.0, 50.0, 60.0);
    let (out, info) = align(&BBoxInput::rect(0, 0, 40, 40), &geom, RenderSize::square(256), &[], 3.0, 8.0);
    assert_eq!(out, geom);
    assert_eq!(info.chosen, "raw");
}

#[test]
fn invariant_exact_stretch_beats_raw() {
    let viewports = [ViewportCandidate::new("vb", ViewportDescriptor::Rect([0.0, 0.0, 100.0, 100.0]))];
    let (out, info) = align(
        &BBoxInput::rect(0, 0, 300, 150),
        &BBoxInput::corners(0.0, 0.0, 100.0, 100.0),
        RenderSize([300, 150]),
        &viewports,
        3.0,
        8.0,
    );
    assert_eq!(info.chosen, "vb_stretch");
    let raw = &info.candidates[0];
    assert_eq!(raw.kind, "raw");
    assert!(raw.max_abs_err_px.unwrap() > 0.0);
    assert_eq!(compare(&BBoxInput::rect(0, 0, 300, 150), &out, 0.0, 0.0).status, Status::Pass);
}

#[test]
fn invariant_compare_is_idempotent() {
    let obs = BBoxInput::rect(10, 10, 50, 50);
    let geom = BBoxInput::corners(10.0, 10.0, 60.0, 60.0);
    let first = compare(&obs, &geom, 0.0, 0.0);
    assert_eq!(first.status, Status::Pass);
    assert_eq!(first.max_abs_err_px, Some(0.0));
    for _ in 0..3 {
        assert_eq!(compare(&obs, &geom, 0.0, 0.0), first);
    }
}

#[test]
fn invariant_severity_increase_is_regression() {
    let s = compare_against_baseline(
        &[item("a.svg", Status::Pass, Some(1.0))],
        &[item("a.svg", Status::Warn, Some(4.0))],
        DEFAULT_ERR_EPS,
    );
    assert_eq!(s.counts.regressions, 1);
    assert_eq!(s.regressions[0].baseline_status, Status::Pass);
    assert_eq!(s.regressions[0].current_status, Status::Warn);
}

#[test]
fn invariant_missing_and_new_keys() {
    let s = compare_against_baseline(
        &[item("a.svg", Status::Pass, Some(0.0)), item("b.svg", Status::Warn, Some(4.0))],
        &[item("B.svg", Status::Warn, Some(4.2)), item("c.svg", Status::Pass, Some(0.0))],
        DEFAULT_ERR_EPS,
    );
    assert_eq!(s.missing, ["a.svg"]);
    assert_eq!(s.new, ["c.svg"]);
    assert_eq!(s.counts.unchanged, 1);
    assert_eq!((s.counts.baseline, s.counts.current), (2, 2));
}

#[test]
fn invariant_rank_order() {
    let items = [
        item("p", Status::Pass, Some(0.0)),
        item("w", Status::Warn, Some(5.0)),
        item("f", Status::Fail, Some(10.0)),
        item("i", Status::Invisible, None),
        item("n", Status::NoGeom, None),
    ];
    let order: Vec<Status> = rank(&items, false, None).into_iter().map(|i| i.status).collect();
    assert_eq!(order, [Status::Invisible, Status::Fail, Status::Warn]);
}

#[test]
fn invariant_end_to_end_physical_units() {
    let vp = normalize(r#"<svg width="100mm" height="50mm" viewBox="0 0 400 200"/>"#);
    assert!(approx(vp.doc_w, 377.95, 0.01));
    assert!(approx(vp.doc_h, 188.98, 0.01));
    assert!(approx(vp.ppi, 101.6, 1e-9));

    let observed = BBoxInput::rect(0, 0, 378, 189);
    let viewports = [ViewportCandidate::new("vb", ViewportDescriptor::Rect([0.0, 0.0, 400.0, 200.0]))];
    let (aligned, info) = align(
        &observed,
        &BBoxInput::corners(0.0, 0.0, 400.0, 200.0),
        RenderSize([378, 189]),
        &viewports,
        3.0,
        8.0,
    );
    let b = aligned.to_xyxy().unwrap();
    assert!(approx(b.x1, 378.0, 1e-9) && approx(b.y1, 189.0, 1e-9));
    assert_ne!(info.chosen, "raw");

    let stretch = info.candidates.iter().find(|c| c.kind == "vb_stretch").unwrap();
    assert_eq!(stretch.status, Status::Pass);
    assert_eq!(compare(&observed, &aligned, 3.0, 8.0).status, Status::Pass);
}

#[test]
fn invariant_batch_survives_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("good.svg"), r#"<svg viewBox="0 0 128 128"/>"#).unwrap();
    fs::write(dir.path().join("broken.svg"), "<svg").unwrap();
    let manifest = r#"[
        {"svg": "good.svg", "observed": [0, 0, 512, 512], "geometry": [0, 0, 128, 128]},
        {"svg": "broken.svg", "observed": [0, 0, 10, 10], "geometry": [0, 0, 400, 400]},
        {"svg": "missing.svg", "observed": null, "geometry": [0, 0, 1, 1]},
        {"svg": "nogeom.svg", "observed": [0, 0, 1, 1], "geometry": [1, 2, 3]}
    ]"#;
    let manifest_path = dir.path().join("manifest.json");
    fs::write(&manifest_path, manifest).unwrap();

    let measurements: Vec<Measurement> = load_manifest(&manifest_path).unwrap();
    let harness = Harness::new(HarnessConfig::default());
    let report = harness.run_batch(&measurements);
    let statuses: Vec<&Status> = report.iter().map(|i| &i.status).collect();
    assert_eq!(statuses, [&Status::Pass, &Status::Fail, &Status::Invisible, &Status::NoGeom]);

    let out = harness.finish(report, None, dir.path());
    assert_eq!(out.failures[0].status, Status::Invisible);
    assert!(out.failures.iter().all(|f| f.repro.is_some()));
    assert_eq!(out.stats.no_geom, 1);
}

#[test]
fn invariant_baseline_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("_bbox_report.json");

    let current = vec![item("icons/a.svg", Status::Fail, Some(12.0))];
    fs::write(&baseline_path, serde_json::to_string(&vec![item("icons/a.svg", Status::Pass, Some(0.5))]).unwrap()).unwrap();

    let baseline = load_baseline(&baseline_path);
    let s = compare_against_baseline(&baseline, &current, DEFAULT_ERR_EPS);
    assert_eq!(s.counts.regressions, 1);

    let text = serde_json::to_string(&current).unwrap();
    assert_eq!(parse_report(&text).unwrap(), current);

    fs::write(&baseline_path, "{ broken").unwrap();
    assert!(load_baseline(&baseline_path).is_empty());
    assert_eq!(compare_against_baseline(&load_baseline(Path::new("nope.json")), &current, 0.5).counts.baseline, 0);
}
