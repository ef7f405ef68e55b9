use anyhow::{bail, Context, Result};

use super::{cell_bounds, PlotRequest, Renderer};

/// CSV companion to the plot: one row per cell, one column per series.
///
/// ```text
/// lo,hi,10-20 (w=2),20-40,sum
/// 0,10,20,5,25
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvTable;

impl Renderer for CsvTable {
    fn render(&self, request: &PlotRequest<'_>) -> Result<()> {
        let bounds = cell_bounds(request.sum);
        for s in request.series {
            if s.histogram.contents.len() != bounds.len() {
                bail!(
                    "series '{}' has {} cells, sum has {}",
                    s.label,
                    s.histogram.contents.len(),
                    bounds.len()
                );
            }
        }

        let mut writer = csv::Writer::from_path(request.target)
            .with_context(|| format!("creating {}", request.target.display()))?;

        let mut header = vec!["lo".to_string(), "hi".to_string()];
        header.extend(request.series.iter().map(|s| s.label.clone()));
        header.push("sum".to_string());
        writer.write_record(&header).context("writing CSV header")?;

        for (i, (lo, hi)) in bounds.iter().enumerate() {
            let mut row = vec![lo.to_string(), hi.to_string()];
            row.extend(request.series.iter().map(|s| s.histogram.contents[i].to_string()));
            row.push(request.sum.contents[i].to_string());
            writer
                .write_record(&row)
                .with_context(|| format!("writing CSV row {i}"))?;
        }
        writer.flush().context("flushing CSV")?;
        log::info!("wrote table {}", request.target.display());
        Ok(())
    }
}
