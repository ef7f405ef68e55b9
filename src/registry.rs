//! Bin registry: the list of pT-hat bins read from the configuration file.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::color::DisplayAttrs;
use crate::error::{CombineError, Result};

// ---------------------------------------------------------------------------
// Raw configuration shape
// ---------------------------------------------------------------------------

/// Top-level configuration document.
///
/// ```json
/// {
///   "pthat_bins": [
///     { "name": "10-20", "file": "pthat_10_20.hcf", "include": true,
///       "use_scale_factor": true, "scale_factor": 2.3e-3,
///       "range": { "min": 10, "max": 20 } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub pthat_bins: Vec<RawBin>,
}

/// One bin as written in the configuration. Required fields are optional
/// here so a missing one can be reported by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBin {
    pub name: Option<String>,
    pub file: Option<String>,
    pub include: Option<bool>,
    pub use_scale_factor: Option<bool>,
    pub scale_factor: Option<JsonValue>,
    #[serde(default)]
    pub range: RawRange,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRange {
    pub min: Option<JsonValue>,
    pub max: Option<JsonValue>,
}

// ---------------------------------------------------------------------------
// SourceBin
// ---------------------------------------------------------------------------

/// One contributing dataset, immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBin {
    /// Position in the configuration file (before sorting).
    pub position: usize,
    pub name: String,
    pub source: PathBuf,
    pub included: bool,
    pub weight: f64,
    pub apply_weight: bool,
    pub range_lo: Option<f64>,
    pub range_hi: Option<f64>,
    pub display: DisplayAttrs,
}

impl SourceBin {
    /// The stored weight when `apply_weight` is set, otherwise exactly 1.
    pub fn effective_weight(&self) -> f64 {
        if self.apply_weight {
            self.weight
        } else {
            1.0
        }
    }

    /// Legend label: the name, plus the weight when one is applied.
    pub fn label(&self) -> String {
        if self.apply_weight && self.weight != 1.0 {
            format!("{} (w={})", self.name, short_float(self.weight))
        } else {
            self.name.clone()
        }
    }

    fn sort_key(&self) -> (f64, f64) {
        (
            self.range_lo.unwrap_or(f64::NEG_INFINITY),
            self.range_hi.unwrap_or(f64::INFINITY),
        )
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Build the ordered registry from raw entries. Files are resolved against
/// `base_dir`; the result is sorted by `(range.min, range.max)` with
/// declaration order breaking ties.
pub fn load(raw: &[RawBin], base_dir: &Path) -> Result<Vec<SourceBin>> {
    let base_dir = std::path::absolute(base_dir)
        .map_err(|e| CombineError::Config(format!("cannot resolve {}: {e}", base_dir.display())))?;

    let mut bins = raw
        .iter()
        .enumerate()
        .map(|(i, entry)| build_bin(i, entry, &base_dir))
        .collect::<Result<Vec<_>>>()?;

    // `sort_by` is stable, so equal keys keep declaration order.
    bins.sort_by(|a, b| {
        let (alo, ahi) = a.sort_key();
        let (blo, bhi) = b.sort_key();
        alo.total_cmp(&blo).then(ahi.total_cmp(&bhi))
    });

    for bin in &bins {
        debug!(
            "bin '{}' -> {} (include={}, weight={})",
            bin.name,
            bin.source.display(),
            bin.included,
            bin.effective_weight()
        );
    }
    Ok(bins)
}

/// Read and parse a JSON configuration file, then [`load`] it relative to
/// `input_dir` (defaulting to the configuration's own directory).
pub fn load_file(config_path: &Path, input_dir: Option<&Path>) -> Result<Vec<SourceBin>> {
    let text = std::fs::read_to_string(config_path)
        .map_err(|e| CombineError::Config(format!("reading {}: {e}", config_path.display())))?;
    let config: RegistryConfig = serde_json::from_str(&text)
        .map_err(|e| CombineError::Config(format!("parsing {}: {e}", config_path.display())))?;

    let base_dir = match input_dir {
        Some(dir) => dir.to_path_buf(),
        None => config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
    };
    load(&config.pthat_bins, &base_dir)
}

fn build_bin(position: usize, raw: &RawBin, base_dir: &Path) -> Result<SourceBin> {
    let missing = |field: &str| CombineError::Config(format!("bin #{position}: missing required field '{field}'"));

    let name = raw.name.clone().ok_or_else(|| missing("name"))?;
    let file = raw.file.as_deref().ok_or_else(|| missing("file"))?;
    let scale = raw.scale_factor.as_ref().ok_or_else(|| missing("scale_factor"))?;
    let weight = numeric(scale).ok_or_else(|| {
        CombineError::Config(format!("bin '{name}': scale_factor {scale} is not numeric"))
    })?;
    let bound = |field: &str, value: &Option<JsonValue>| -> Result<Option<f64>> {
        value
            .as_ref()
            .map(|v| {
                numeric(v).ok_or_else(|| {
                    CombineError::Config(format!("bin '{name}': range.{field} {v} is not numeric"))
                })
            })
            .transpose()
    };
    let range_lo = bound("min", &raw.range.min)?;
    let range_hi = bound("max", &raw.range.max)?;

    Ok(SourceBin {
        position,
        name,
        source: base_dir.join(file),
        included: raw.include.unwrap_or(true),
        weight,
        apply_weight: raw.use_scale_factor.unwrap_or(false),
        range_lo,
        range_hi,
        display: DisplayAttrs::for_position(position),
    })
}

/// Three significant digits, trailing zeros dropped; scientific notation
/// only for exponents below -4 or above 2 (`2`, `0.5`, `1.02e-05`).
pub fn short_float(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let sci = format!("{value:.2e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return sci;
    };
    if !(-4..3).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_zeros(mantissa), exp.abs());
    }
    let decimals = (2 - exp).max(0) as usize;
    trim_zeros(&format!("{value:.decimals$}")).to_string()
}

fn trim_zeros(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// Numbers and numeric strings are accepted.
fn numeric(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
