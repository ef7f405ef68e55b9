/// Rendering boundary: turns the aggregated series into artifacts.
///
/// ```text
///   Aggregate (series + sum)
///        │
///        ▼
///   ┌──────────────┐
///   │  PlotRequest  │
///   └──────────────┘
///     │          │
///     ▼          ▼
///  PngOverlay  CsvTable
///  (.png)      (.csv)
/// ```

pub mod png;
pub mod table;

use std::path::Path;

use anyhow::Result;

use crate::aggregate::ScaledSeries;
use crate::container::Histogram;

pub use png::PngOverlay;
pub use table::CsvTable;

/// Everything a renderer receives.
pub struct PlotRequest<'a> {
    pub histogram_path: &'a str,
    pub series: &'a [ScaledSeries],
    pub sum: &'a Histogram,
    pub target: &'a Path,
}

pub trait Renderer {
    fn render(&self, request: &PlotRequest<'_>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// `(lo, hi)` of every cell along the horizontal axis. 1-D histograms use
/// their edges; higher dimensions fall back to the flat cell index.
pub fn cell_bounds(hist: &Histogram) -> Vec<(f64, f64)> {
    match hist.axes.as_slice() {
        [axis] => axis.edges.windows(2).map(|w| (w[0], w[1])).collect(),
        _ => (0..hist.n_cells()).map(|i| (i as f64, i as f64 + 1.0)).collect(),
    }
}

/// Log-scale y range covering every series and the sum: half the smallest
/// positive value (at least 1e-6) up to twice the largest.
pub fn y_range(series: &[ScaledSeries], sum: &Histogram) -> (f64, f64) {
    let all = series.iter().map(|s| &s.histogram).chain(std::iter::once(sum));

    let mut max_value: Option<f64> = None;
    let mut min_positive: Option<f64> = None;
    for hist in all {
        if let Some(m) = hist.max_content() {
            max_value = Some(max_value.map_or(m, |v| v.max(m)));
        }
        if let Some(m) = hist.min_positive() {
            min_positive = Some(min_positive.map_or(m, |v| v.min(m)));
        }
    }

    let max_value = max_value.unwrap_or(0.0);
    let lower = min_positive.unwrap_or(max_value * 1e-3);
    let lower = (lower * 0.5).max(1e-6);
    let upper = if max_value > 0.0 { max_value * 2.0 } else { 1.0 };
    (lower, upper.max(lower * 10.0))
}
