use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::convert::convert;
use crate::dae::Document;
use crate::diagnostics::{self, Diagnostics, Issue};
use crate::export::TxtExporter;
use crate::internal::complete_vertex_data;
use crate::settings::ConvertOptions;

/// Summary of one converted file, serialized next to the input on request.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub mesh_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub joint_count: usize,
    pub material_count: usize,
    pub frame_count: usize,
    pub frame_rate: f32,
    pub degenerate_triangles: usize,
    pub invalid_tangent_basis: usize,
    /// Average transform to vertex ratio before and after index reordering.
    pub atvr_before: f32,
    pub atvr_after: f32,
    pub issues: Vec<Issue>,
}

/// Outcome counts of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub fn report_path_for_input(input: &Path) -> PathBuf {
    input.with_extension("report.json")
}

// ─── Per-file pipeline ────────────────────────────────────────────────────────

/// Parse, convert, clean up, optimize and export one `.dae` file.
pub fn process_file(input: &Path, options: &ConvertOptions) -> Result<ConversionReport> {
    let is_dae = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("dae"));
    if !is_dae {
        bail!("unsupported input format: {}", input.display());
    }
    let exporter = TxtExporter::new(options)?;

    let mut diagnostics = Diagnostics::new();
    let document = Document::open(input, &mut diagnostics)
        .with_context(|| format!("failed to parse {}", input.display()))?;
    let conversion = convert(&document, options.bind_pose)
        .with_context(|| format!("failed to convert {}", input.display()))?;
    diagnostics.extend(conversion.diagnostics);
    let mut data = conversion.data;

    let degenerate_triangles = data.remove_degenerate_triangles();
    if degenerate_triangles > 0 {
        diagnostics.warn(
            diagnostics::DEGENERATE_TRIANGLES,
            format!("removed {degenerate_triangles} degenerate triangles"),
        );
    }

    let atvr_before = data.atvr();
    if options.cache_optimize {
        data.optimize_index_order();
    }
    let atvr_after = data.atvr();
    log::info!("ATVR {atvr_before:.3} -> {atvr_after:.3}");

    let mut invalid_tangent_basis = 0;
    for mesh in &mut data.meshes {
        invalid_tangent_basis += complete_vertex_data(mesh, options.tex_channel)
            .with_context(|| format!("failed to complete vertex data of {}", input.display()))?;
    }
    if invalid_tangent_basis > 0 {
        diagnostics.warn(
            diagnostics::ZERO_LENGTH_BASIS,
            format!("{invalid_tangent_basis} vertices have a zero-length tangent basis"),
        );
    }

    let outputs = exporter
        .write(input, &data)
        .with_context(|| format!("failed to export {}", input.display()))?;

    Ok(ConversionReport {
        input: input.to_path_buf(),
        outputs,
        mesh_count: data.meshes.len(),
        vertex_count: data.vertex_count(),
        triangle_count: data.triangle_count(),
        joint_count: data.joints.len(),
        material_count: data.materials.len(),
        frame_count: data.frame_count,
        frame_rate: data.frame_rate,
        degenerate_triangles,
        invalid_tangent_basis,
        atvr_before,
        atvr_after,
        issues: diagnostics.into_issues(),
    })
}

pub fn write_report(path: &Path, report: &ConversionReport) -> Result<()> {
    let content =
        serde_json::to_string_pretty(report).context("failed to serialize conversion report")?;
    fs::write(path, content)
        .with_context(|| format!("failed to write report: {}", path.display()))?;
    Ok(())
}

// ─── Batch driver ─────────────────────────────────────────────────────────────

/// Process `inputs` in order. A failing file is logged and skipped.
pub fn run_batch(inputs: &[PathBuf], options: &ConvertOptions, write_reports: bool) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for input in inputs {
        log::info!("processing {}", input.display());
        let result = process_file(input, options).and_then(|report| {
            if write_reports {
                write_report(&report_path_for_input(input), &report)?;
            }
            Ok(report)
        });
        match result {
            Ok(report) => {
                summary.succeeded += 1;
                log::info!(
                    "{}: {} meshes, {} joints, {} issues",
                    input.display(),
                    report.mesh_count,
                    report.joint_count,
                    report.issues.len()
                );
            }
            Err(err) => {
                summary.failed += 1;
                log::error!("failed to export {}: {err:#}", input.display());
            }
        }
    }
    summary
}
