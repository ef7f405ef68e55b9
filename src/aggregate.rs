//! Per-bin scaled copies of the selected histogram and their running sum.

use log::debug;

use crate::color::DisplayAttrs;
use crate::container::Histogram;
use crate::error::{CombineError, Result};
use crate::select::{Candidate, Selection};

// ---------------------------------------------------------------------------
// RunningSum
// ---------------------------------------------------------------------------

/// Accumulator bound to one histogram path. Empty until the first
/// contribution, which it clones; later contributions are added cell-wise.
#[derive(Debug, Clone)]
pub struct RunningSum {
    path: String,
    total: Option<Histogram>,
    contributions: usize,
}

impl RunningSum {
    pub fn new(path: &str) -> Self {
        RunningSum {
            path: path.to_string(),
            total: None,
            contributions: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn total(&self) -> Option<&Histogram> {
        self.total.as_ref()
    }

    pub fn contributions(&self) -> usize {
        self.contributions
    }

    /// Add one contribution. A layout mismatch fails with `Shape` and leaves
    /// the total as it was.
    pub fn add(&mut self, contribution: &Histogram) -> Result<()> {
        match &mut self.total {
            None => self.total = Some(contribution.clone()),
            Some(total) => total.add(contribution).map_err(|e| e.at_path(&self.path))?,
        }
        self.contributions += 1;
        Ok(())
    }

    pub fn into_total(self) -> Option<Histogram> {
        self.total
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// One bin's scaled copy of the selected histogram, ready for drawing.
#[derive(Debug, Clone)]
pub struct ScaledSeries {
    pub bin_name: String,
    pub label: String,
    pub weight: f64,
    pub display: DisplayAttrs,
    pub histogram: Histogram,
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    pub path: String,
    pub series: Vec<ScaledSeries>,
    pub sum: Histogram,
}

/// Scale each matched histogram by its bin's effective weight and sum them
/// in registry order. Any layout mismatch aborts the whole aggregation.
pub fn aggregate(candidates: &[Candidate<'_>], selection: Selection) -> Result<Aggregate> {
    let mut running = RunningSum::new(&selection.path);
    let mut series = Vec::with_capacity(selection.matches.len());

    for m in selection.matches {
        let bin = candidates
            .get(m.candidate)
            .ok_or_else(|| CombineError::Value(format!("no candidate #{}", m.candidate)))?
            .bin;
        let weight = bin.effective_weight();
        let scaled = m.histogram.scaled(weight);
        running.add(&scaled)?;
        debug!("bin '{}' contributes '{}' x {weight}", bin.name, m.path);

        series.push(ScaledSeries {
            bin_name: bin.name.clone(),
            label: bin.label(),
            weight,
            display: bin.display,
            histogram: scaled,
        });
    }

    let path = running.path().to_string();
    let sum = running.into_total().ok_or_else(|| {
        CombineError::NotFound(format!("selected histogram '{path}' absent from every included bin"))
    })?;
    Ok(Aggregate { path, series, sum })
}
