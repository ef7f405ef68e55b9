//! End-to-end run: registry → selection → aggregation → weighted copies →
//! plot → merge.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::container::CONTAINER_EXTENSION;
use crate::merge::{ExternalMerge, InProcessMerge, MergeBackend};
use crate::registry;
use crate::render::{CsvTable, PlotRequest, PngOverlay, Renderer};
use crate::select::{discover, select};
use crate::weighted::{build_weighted_copy, copy_path_for, is_unit_weight};

/// Default tolerance for treating an effective weight as exactly one.
pub const UNIT_WEIGHT_TOLERANCE: f64 = 1e-12;

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    /// Histogram to draw; the first one found when `None`.
    pub histogram: Option<String>,
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub output_name: String,
    pub unit_weight_tolerance: f64,
    pub plot: bool,
    /// External bulk-merge program; in-process merge when `None`.
    pub merge_tool: Option<String>,
}

impl RunOptions {
    pub fn new(config: impl Into<PathBuf>) -> Self {
        RunOptions {
            config: config.into(),
            histogram: None,
            input_dir: None,
            output_dir: None,
            output_name: format!("combined.{CONTAINER_EXTENSION}"),
            unit_weight_tolerance: UNIT_WEIGHT_TOLERANCE,
            plot: true,
            merge_tool: None,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub combined: PathBuf,
    pub plot: Option<PathBuf>,
    pub table: Option<PathBuf>,
    pub histogram_path: String,
    pub contributing_bins: usize,
    pub merged_inputs: usize,
}

/// Run the whole pipeline. Scratch files live in a temporary directory that
/// is removed when this function returns, whether it succeeds or not.
pub fn run(opts: &RunOptions) -> Result<RunSummary> {
    let config_path = std::path::absolute(&opts.config)
        .with_context(|| format!("resolving {}", opts.config.display()))?;
    if !config_path.exists() {
        anyhow::bail!("config file not found: {}", config_path.display());
    }
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let output_dir = opts.output_dir.clone().unwrap_or_else(|| config_dir.clone());
    let output_dir = std::path::absolute(&output_dir)
        .with_context(|| format!("resolving {}", output_dir.display()))?;
    debug!("input directory: {}", opts.input_dir.as_deref().unwrap_or(config_dir.as_path()).display());
    debug!("output directory: {}", output_dir.display());

    let bins = registry::load_file(&config_path, opts.input_dir.as_deref())
        .context("loading bin registry")?;

    let work_dir = tempfile::Builder::new()
        .prefix(&format!("pthat-combine-{}-", std::process::id()))
        .tempdir()
        .context("creating temporary directory")?;
    debug!("scratch directory: {}", work_dir.path().display());

    let candidates = discover(&bins);
    let selection = select(&candidates, opts.histogram.as_deref())?;
    let aggregate = aggregate(&candidates, selection)?;
    let contributing_bins = aggregate.series.len();

    // Every usable bin takes part in the merge, including those that lack
    // the selected histogram.
    let mut merge_inputs = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let bin = candidate.bin;
        let weight = bin.effective_weight();
        if is_unit_weight(weight, opts.unit_weight_tolerance) {
            debug!("bin '{}': unit weight, using source in place", bin.name);
            merge_inputs.push(bin.source.clone());
        } else {
            let target = copy_path_for(work_dir.path(), bin);
            let copy = build_weighted_copy(&bin.source, weight, &target)
                .with_context(|| format!("scaling bin '{}'", bin.name))?;
            merge_inputs.push(copy);
        }
    }
    drop(candidates);

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let output_name = Path::new(&opts.output_name)
        .file_name()
        .with_context(|| format!("invalid output name '{}'", opts.output_name))?;
    let combined_path = output_dir.join(output_name);

    // Plot and table come first; the combined container is written last so a
    // failed run never leaves one behind.
    let (plot, table) = if opts.plot {
        let plot_path = combined_path.with_extension("png");
        let table_path = combined_path.with_extension("csv");
        PngOverlay::default().render(&PlotRequest {
            histogram_path: &aggregate.path,
            series: &aggregate.series,
            sum: &aggregate.sum,
            target: &plot_path,
        })?;
        CsvTable.render(&PlotRequest {
            histogram_path: &aggregate.path,
            series: &aggregate.series,
            sum: &aggregate.sum,
            target: &table_path,
        })?;
        (Some(plot_path), Some(table_path))
    } else {
        (None, None)
    };

    let backend: Box<dyn MergeBackend> = match &opts.merge_tool {
        Some(program) => Box::new(ExternalMerge::new(program)),
        None => Box::new(InProcessMerge),
    };
    let combined = match backend.merge(&merge_inputs, &combined_path) {
        Ok(path) => path,
        Err(e) => {
            for rendered in plot.iter().chain(table.iter()) {
                if let Err(err) = std::fs::remove_file(rendered) {
                    warn!("cannot remove {}: {err}", rendered.display());
                }
            }
            return Err(anyhow::Error::new(e).context("merging weighted containers"));
        }
    };

    info!("wrote combined container to {}", combined.display());
    info!("drawn histogram: {}", aggregate.path);

    Ok(RunSummary {
        combined,
        plot,
        table,
        histogram_path: aggregate.path,
        contributing_bins,
        merged_inputs: merge_inputs.len(),
    })
}
