//! Bin discovery and histogram selection.
//!
//! Selection runs in two phases: the first viable bin that holds a suitable
//! histogram fixes the path, then every viable bin is scanned for that path.

use log::{debug, info, warn};

use crate::container::walk::{find_matching, histograms};
use crate::container::{ContainerReader, Histogram, Object};
use crate::error::{CombineError, Result};
use crate::registry::SourceBin;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// An included bin whose container opened cleanly.
#[derive(Debug)]
pub struct Candidate<'a> {
    pub bin: &'a SourceBin,
    pub reader: ContainerReader,
}

/// Open every usable bin in registry order. Excluded bins, missing files,
/// non-positive weights and unreadable containers are logged and skipped.
pub fn discover(bins: &[SourceBin]) -> Vec<Candidate<'_>> {
    let mut out = Vec::new();
    for bin in bins {
        if !bin.included {
            info!("skipping bin '{}': include is false", bin.name);
            continue;
        }
        if !bin.source.exists() {
            warn!("skipping bin '{}': file not found: {}", bin.name, bin.source.display());
            continue;
        }
        let weight = bin.effective_weight();
        if !(weight > 0.0) {
            warn!("skipping bin '{}': non-positive weight {weight}", bin.name);
            continue;
        }
        match ContainerReader::open(&bin.source) {
            Ok(reader) => {
                debug!("bin '{}' usable with weight {weight}", bin.name);
                out.push(Candidate { bin, reader });
            }
            Err(e) => warn!("skipping bin '{}': {e}", bin.name),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Whether the histogram path has been fixed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Unresolved,
    Resolved(String),
}

/// The histogram one candidate contributes.
#[derive(Debug, Clone)]
pub struct BinMatch {
    /// Index into the candidate slice.
    pub candidate: usize,
    /// Path of the object inside that bin's container.
    pub path: String,
    /// Detached copy, unscaled.
    pub histogram: Histogram,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub path: String,
    pub matches: Vec<BinMatch>,
}

/// Phase 1: fix the path from the first candidate that has a match.
///
/// Without `requested` the first histogram in traversal order wins;
/// otherwise the first whose full path or final segment equals it.
pub fn resolve(candidates: &[Candidate<'_>], requested: Option<&str>) -> SelectionState {
    for candidate in candidates {
        let root = candidate.reader.root();
        let found = match requested {
            Some(name) => find_matching(root, name).map(|(path, _)| path),
            None => histograms(root).into_iter().next().map(|(path, _)| path),
        };
        if let Some(path) = found {
            debug!("resolved histogram '{path}' from bin '{}'", candidate.bin.name);
            return SelectionState::Resolved(path);
        }
        debug!("bin '{}' has no candidate histogram", candidate.bin.name);
    }
    SelectionState::Unresolved
}

/// Resolve the histogram path and collect the first match from every
/// candidate.
pub fn select(candidates: &[Candidate<'_>], requested: Option<&str>) -> Result<Selection> {
    let path = match resolve(candidates, requested) {
        SelectionState::Resolved(path) => path,
        SelectionState::Unresolved => {
            let detail = match requested {
                Some(name) => format!("no histogram found matching '{name}'"),
                None => "no histogram found".to_string(),
            };
            return Err(CombineError::NotFound(detail));
        }
    };

    // Phase 2: the full path is frozen; a bin holding the same name under
    // another directory does not contribute.
    let mut matches = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.reader.get(&path) {
            Some(Object::Histogram(hist)) => matches.push(BinMatch {
                candidate: index,
                path: path.clone(),
                histogram: hist.clone(),
            }),
            _ => warn!("bin '{}' has no histogram '{path}'", candidate.bin.name),
        }
    }

    if matches.is_empty() {
        return Err(CombineError::NotFound(format!(
            "selected histogram '{path}' absent from every included bin"
        )));
    }
    info!("selected histogram '{path}' ({} bins)", matches.len());
    Ok(Selection { path, matches })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use crate::registry::{self, RegistryConfig};
    use serde_json::json;
    use std::path::Path;

    fn hist(v: f64) -> Object {
        Object::Histogram(Histogram::one_d("", vec![0.0, 1.0], vec![v]).unwrap())
    }

    fn write(path: &Path, entries: &[(&str, f64)]) {
        let mut w = ContainerWriter::create(path).unwrap();
        for (full, v) in entries {
            let (dir, name) = full.rsplit_once('/').unwrap_or(("", full));
            w.put(dir, name, hist(*v)).unwrap();
        }
        w.close().unwrap();
    }

    fn bins(dir: &Path, config: serde_json::Value) -> Vec<SourceBin> {
        let cfg: RegistryConfig = serde_json::from_value(config).unwrap();
        registry::load(&cfg.pthat_bins, dir).unwrap()
    }

    #[test]
    fn first_histogram_of_first_bin_wins_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("b1.hcf"), &[("h1", 1.0), ("h2", 2.0)]);
        write(&dir.path().join("b2.hcf"), &[("h2", 3.0)]);
        let bins = bins(
            dir.path(),
            json!({"pthat_bins": [
                {"name": "B1", "file": "b1.hcf", "scale_factor": 1},
                {"name": "B2", "file": "b2.hcf", "scale_factor": 1}
            ]}),
        );
        let candidates = discover(&bins);
        let sel = select(&candidates, None).unwrap();
        assert_eq!(sel.path, "h1");
        assert_eq!(sel.matches.len(), 1);
        assert_eq!(sel.matches[0].candidate, 0);

        let sel = select(&candidates, Some("h2")).unwrap();
        assert_eq!(sel.path, "h2");
        let values: Vec<f64> = sel.matches.iter().map(|m| m.histogram.contents[0]).collect();
        assert_eq!(values, [2.0, 3.0]);
    }

    #[test]
    fn requested_name_matches_final_segment() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("b1.hcf"), &[("other", 0.0), ("jets/pt", 1.0)]);
        write(&dir.path().join("b2.hcf"), &[("jets/pt", 2.0)]);
        let bins = bins(
            dir.path(),
            json!({"pthat_bins": [
                {"name": "B1", "file": "b1.hcf", "scale_factor": 1},
                {"name": "B2", "file": "b2.hcf", "scale_factor": 1}
            ]}),
        );
        let candidates = discover(&bins);
        let sel = select(&candidates, Some("pt")).unwrap();
        assert_eq!(sel.path, "jets/pt");
        assert_eq!(sel.matches.len(), 2);
        assert_eq!(sel.matches[1].path, "jets/pt");
    }

    #[test]
    fn frozen_path_ignores_same_name_in_other_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.hcf"), &[("h", 1.0)]);
        write(&dir.path().join("b.hcf"), &[("qa/h", 100.0)]);
        let bins = bins(
            dir.path(),
            json!({"pthat_bins": [
                {"name": "A", "file": "a.hcf", "scale_factor": 1},
                {"name": "B", "file": "b.hcf", "scale_factor": 1}
            ]}),
        );
        let candidates = discover(&bins);
        let sel = select(&candidates, None).unwrap();
        assert_eq!(sel.path, "h");
        let paths: Vec<&str> = sel.matches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, ["h"]);
        assert_eq!(sel.matches[0].histogram.contents, vec![1.0]);
    }

    #[test]
    fn skips_excluded_missing_and_non_positive_bins() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("excluded.hcf"), &[("h", 100.0)]);
        write(&dir.path().join("zero.hcf"), &[("h", 200.0)]);
        write(&dir.path().join("good.hcf"), &[("h", 1.0)]);
        std::fs::write(dir.path().join("zombie.hcf"), "{").unwrap();
        let bins = bins(
            dir.path(),
            json!({"pthat_bins": [
                {"name": "excluded", "file": "excluded.hcf", "include": false, "scale_factor": 1},
                {"name": "missing", "file": "missing.hcf", "scale_factor": 1},
                {"name": "zero", "file": "zero.hcf", "use_scale_factor": true, "scale_factor": 0},
                {"name": "zombie", "file": "zombie.hcf", "scale_factor": 1},
                {"name": "good", "file": "good.hcf", "scale_factor": 1}
            ]}),
        );
        let candidates = discover(&bins);
        let names: Vec<&str> = candidates.iter().map(|c| c.bin.name.as_str()).collect();
        assert_eq!(names, ["good"]);
        let sel = select(&candidates, None).unwrap();
        assert_eq!(sel.matches[0].histogram.contents, vec![1.0]);
    }

    #[test]
    fn resolution_moves_past_bins_without_histograms() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("empty.hcf"), &[]);
        write(&dir.path().join("full.hcf"), &[("qa/h", 1.0)]);
        let bins = bins(
            dir.path(),
            json!({"pthat_bins": [
                {"name": "empty", "file": "empty.hcf", "scale_factor": 1},
                {"name": "full", "file": "full.hcf", "scale_factor": 1}
            ]}),
        );
        let candidates = discover(&bins);
        assert_eq!(resolve(&candidates, None), SelectionState::Resolved("qa/h".into()));
        let sel = select(&candidates, None).unwrap();
        assert_eq!(sel.matches.len(), 1);
        assert_eq!(sel.matches[0].candidate, 1);
    }

    #[test]
    fn nothing_to_select_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("b.hcf"), &[("h", 1.0)]);
        let bins = bins(
            dir.path(),
            json!({"pthat_bins": [{"name": "B", "file": "b.hcf", "scale_factor": 1}]}),
        );
        let candidates = discover(&bins);
        let err = select(&candidates, Some("absent")).unwrap_err();
        assert!(matches!(err, CombineError::NotFound(_)));

        let err = select(&[], None).unwrap_err();
        assert!(matches!(&err, CombineError::NotFound(msg) if msg.contains("no histogram found")));
    }
}
