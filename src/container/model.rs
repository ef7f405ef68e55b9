use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CombineError, Result};

/// Relative tolerance used when comparing bin edges of two histograms.
pub const EDGE_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Axis – bin edges plus a title
// ---------------------------------------------------------------------------

/// One histogram axis. `edges.len()` is the number of bins plus one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    #[serde(default)]
    pub title: String,
    pub edges: Vec<f64>,
}

impl Axis {
    pub fn new(title: &str, edges: Vec<f64>) -> Self {
        Axis {
            title: title.to_string(),
            edges,
        }
    }

    /// `n` equal-width bins spanning `[lo, hi]`.
    pub fn uniform(title: &str, n: usize, lo: f64, hi: f64) -> Self {
        let step = (hi - lo) / n.max(1) as f64;
        let edges = (0..=n).map(|i| lo + i as f64 * step).collect();
        Axis::new(title, edges)
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    fn matches(&self, other: &Axis) -> bool {
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(&a, &b)| (a - b).abs() <= EDGE_TOLERANCE * a.abs().max(b.abs()).max(1.0))
    }
}

// ---------------------------------------------------------------------------
// Histogram – the binned-numeric leaf
// ---------------------------------------------------------------------------

/// A 1-D or 2-D binned dataset. Contents are stored row-major over the axes,
/// without under/overflow cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    #[serde(default)]
    pub title: String,
    pub axes: Vec<Axis>,
    pub contents: Vec<f64>,
    /// Sum of squared weights per cell, when the producer stored it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sumw2: Option<Vec<f64>>,
    #[serde(default)]
    pub entries: f64,
}

impl Histogram {
    pub fn new(title: &str, axes: Vec<Axis>, contents: Vec<f64>) -> Result<Self> {
        let hist = Histogram {
            title: title.to_string(),
            axes,
            contents,
            sumw2: None,
            entries: 0.0,
        };
        hist.validate().map_err(CombineError::Value)?;
        Ok(hist)
    }

    /// Convenience constructor for a 1-D histogram.
    pub fn one_d(title: &str, edges: Vec<f64>, contents: Vec<f64>) -> Result<Self> {
        Histogram::new(title, vec![Axis::new("", edges)], contents)
    }

    pub fn with_sumw2(mut self, sumw2: Vec<f64>) -> Result<Self> {
        self.sumw2 = Some(sumw2);
        self.validate().map_err(CombineError::Value)?;
        Ok(self)
    }

    pub fn with_entries(mut self, entries: f64) -> Self {
        self.entries = entries;
        self
    }

    /// Check that the stored arrays agree with the axes.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.axes.is_empty() {
            return Err("histogram has no axes".to_string());
        }
        for (i, axis) in self.axes.iter().enumerate() {
            if axis.edges.len() < 2 {
                return Err(format!("axis {i} has {} edges, need at least 2", axis.edges.len()));
            }
            if axis.edges.windows(2).any(|w| !(w[1] > w[0])) {
                return Err(format!("axis {i} edges are not strictly increasing"));
            }
        }
        let cells = self.n_cells();
        if self.contents.len() != cells {
            return Err(format!(
                "{} contents for {cells} bins",
                self.contents.len()
            ));
        }
        if let Some(sumw2) = &self.sumw2 {
            if sumw2.len() != cells {
                return Err(format!("{} sumw2 values for {cells} bins", sumw2.len()));
            }
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    /// Number of stored cells (product of the per-axis bin counts).
    pub fn n_cells(&self) -> usize {
        self.axes.iter().map(Axis::n_bins).product()
    }

    /// Multiply every cell by `weight`. Squared weights scale by `weight²`.
    pub fn scale(&mut self, weight: f64) {
        for c in &mut self.contents {
            *c *= weight;
        }
        if let Some(sumw2) = &mut self.sumw2 {
            let w2 = weight * weight;
            for s in sumw2 {
                *s *= w2;
            }
        }
    }

    /// A scaled copy; `self` is left untouched.
    pub fn scaled(&self, weight: f64) -> Self {
        let mut copy = self.clone();
        copy.scale(weight);
        copy
    }

    /// Describe why `other` cannot be added to `self`, if it cannot.
    pub fn layout_mismatch(&self, other: &Histogram) -> Option<String> {
        if self.axes.len() != other.axes.len() {
            return Some(format!(
                "{}-D histogram vs {}-D histogram",
                self.axes.len(),
                other.axes.len()
            ));
        }
        for (i, (a, b)) in self.axes.iter().zip(&other.axes).enumerate() {
            if a.n_bins() != b.n_bins() {
                return Some(format!("axis {i}: {} bins vs {} bins", a.n_bins(), b.n_bins()));
            }
            if !a.matches(b) {
                return Some(format!("axis {i}: bin edges differ"));
            }
        }
        None
    }

    pub fn same_layout(&self, other: &Histogram) -> bool {
        self.layout_mismatch(other).is_none()
    }

    /// Add `other` cell by cell. On a layout mismatch nothing is modified.
    pub fn add(&mut self, other: &Histogram) -> Result<()> {
        if let Some(reason) = self.layout_mismatch(other) {
            return Err(CombineError::Shape(reason));
        }
        if self.sumw2.is_some() || other.sumw2.is_some() {
            let mut sumw2 = self.sumw2_or_contents();
            for (s, o) in sumw2.iter_mut().zip(other.sumw2_or_contents()) {
                *s += o;
            }
            self.sumw2 = Some(sumw2);
        }
        for (c, o) in self.contents.iter_mut().zip(&other.contents) {
            *c += o;
        }
        self.entries += other.entries;
        Ok(())
    }

    fn sumw2_or_contents(&self) -> Vec<f64> {
        self.sumw2.clone().unwrap_or_else(|| self.contents.clone())
    }

    /// Per-cell statistical uncertainty.
    pub fn errors(&self) -> Vec<f64> {
        match &self.sumw2 {
            Some(sumw2) => sumw2.iter().map(|s| s.max(0.0).sqrt()).collect(),
            None => self.contents.iter().map(|c| c.abs().sqrt()).collect(),
        }
    }

    pub fn max_content(&self) -> Option<f64> {
        self.contents.iter().copied().reduce(f64::max)
    }

    /// Smallest strictly positive cell, if any.
    pub fn min_positive(&self) -> Option<f64> {
        self.contents
            .iter()
            .copied()
            .filter(|&c| c > 0.0)
            .reduce(f64::min)
    }
}

// ---------------------------------------------------------------------------
// Opaque – anything that is not binned-numeric
// ---------------------------------------------------------------------------

/// A leaf the pipeline carries through without interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opaque {
    pub class_name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Object / Key / Directory – the tree
// ---------------------------------------------------------------------------

/// Closed set of things a container key can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Object {
    Directory(Directory),
    Histogram(Histogram),
    Opaque(Opaque),
}

/// Coarse classification returned by directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Leaf,
}

impl Object {
    pub fn kind(&self) -> EntryKind {
        match self {
            Object::Directory(_) => EntryKind::Directory,
            Object::Histogram(_) | Object::Opaque(_) => EntryKind::Leaf,
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Object::Directory(_) => "Directory",
            Object::Histogram(h) if h.dimension() == 2 => "Histogram2D",
            Object::Histogram(_) => "Histogram1D",
            Object::Opaque(o) => &o.class_name,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Directory => write!(f, "directory"),
            EntryKind::Leaf => write!(f, "leaf"),
        }
    }
}

/// A named slot inside a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub name: String,
    pub object: Object,
}

/// Ordered list of keys. Names are unique within one directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(default)]
    keys: Vec<Key>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|k| k.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Object> {
        self.position(name).map(|i| &self.keys[i].object)
    }

    /// Store `object` under `name`. An existing key of that name is replaced
    /// in place, so listing order follows first insertion.
    pub fn insert(&mut self, name: &str, object: Object) {
        match self.position(name) {
            Some(i) => self.keys[i].object = object,
            None => self.keys.push(Key {
                name: name.to_string(),
                object,
            }),
        }
    }

    /// Return the sub-directory `name`, creating it when absent. `None` when
    /// the name is unusable or already taken by a leaf.
    pub fn get_or_create_dir(&mut self, name: &str) -> Option<&mut Directory> {
        if name.is_empty() || name.contains('/') {
            return None;
        }
        let pos = match self.position(name) {
            Some(pos) => pos,
            None => {
                self.keys.push(Key {
                    name: name.to_string(),
                    object: Object::Directory(Directory::new()),
                });
                self.keys.len() - 1
            }
        };
        match &mut self.keys[pos].object {
            Object::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Resolve a slash-separated path to an object.
    pub fn find(&self, path: &str) -> Option<&Object> {
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let mut dir = self;
        while let Some(segment) = segments.next() {
            let object = dir.get(segment)?;
            if segments.peek().is_none() {
                return Some(object);
            }
            match object {
                Object::Directory(sub) => dir = sub,
                _ => return None,
            }
        }
        None
    }

    /// Resolve a slash-separated path to a sub-directory; `""` is `self`.
    pub fn subdir(&self, path: &str) -> Option<&Directory> {
        if path.split('/').all(str::is_empty) {
            return Some(self);
        }
        match self.find(path)? {
            Object::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// `(name, kind)` for every key, in stored order.
    pub fn list_entries(&self) -> Vec<(String, EntryKind)> {
        self.keys
            .iter()
            .map(|k| (k.name.clone(), k.object.kind()))
            .collect()
    }

    /// Validate every histogram in the tree, reporting the first bad path.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for key in &self.keys {
            match &key.object {
                Object::Directory(dir) => dir
                    .validate()
                    .map_err(|e| format!("{}/{e}", key.name))?,
                Object::Histogram(hist) => hist
                    .validate()
                    .map_err(|e| format!("{}: {e}", key.name))?,
                Object::Opaque(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(contents: Vec<f64>) -> Histogram {
        let n = contents.len();
        Histogram::one_d("h", (0..=n).map(|i| i as f64).collect(), contents).unwrap()
    }

    #[test]
    fn scale_multiplies_contents_and_squares_sumw2() {
        let mut h = hist(vec![1.0, 2.0, 4.0])
            .with_sumw2(vec![1.0, 2.0, 4.0])
            .unwrap()
            .with_entries(7.0);
        h.scale(2.5);
        assert_eq!(h.contents, vec![2.5, 5.0, 10.0]);
        assert_eq!(h.sumw2, Some(vec![6.25, 12.5, 25.0]));
        assert_eq!(h.entries, 7.0);
    }

    #[test]
    fn scale_by_one_is_bit_identical() {
        let h = hist(vec![0.1, 1.0 / 3.0, 1e300]);
        assert_eq!(h.scaled(1.0), h);
    }

    #[test]
    fn add_sums_cells_and_entries() {
        let mut a = hist(vec![1.0, 2.0]).with_entries(3.0);
        let b = hist(vec![10.0, 20.0]).with_entries(30.0);
        a.add(&b).unwrap();
        assert_eq!(a.contents, vec![11.0, 22.0]);
        assert_eq!(a.entries, 33.0);
        assert!(a.sumw2.is_none());
    }

    #[test]
    fn add_promotes_missing_sumw2_to_contents() {
        let mut a = hist(vec![4.0, 9.0]);
        let b = hist(vec![1.0, 1.0]).with_sumw2(vec![0.5, 0.25]).unwrap();
        a.add(&b).unwrap();
        assert_eq!(a.sumw2, Some(vec![4.5, 9.25]));
    }

    #[test]
    fn add_with_mismatched_bins_leaves_receiver_untouched() {
        let mut a = hist(vec![1.0; 8]);
        let before = a.clone();
        let err = a.add(&hist(vec![1.0; 10])).unwrap_err();
        assert!(matches!(err, CombineError::Shape(_)));
        assert_eq!(a, before);
    }

    #[test]
    fn add_with_shifted_edges_is_a_shape_error() {
        let mut a = hist(vec![1.0, 1.0]);
        let b = Histogram::one_d("h", vec![0.0, 1.5, 2.0], vec![1.0, 1.0]).unwrap();
        assert!(matches!(a.add(&b), Err(CombineError::Shape(_))));
    }

    #[test]
    fn constructor_rejects_wrong_content_length() {
        let err = Histogram::one_d("h", vec![0.0, 1.0, 2.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, CombineError::Value(_)));
    }

    #[test]
    fn two_d_cells_are_the_product_of_axes() {
        let h = Histogram::new(
            "h2",
            vec![Axis::uniform("x", 3, 0.0, 3.0), Axis::uniform("y", 2, 0.0, 1.0)],
            vec![0.0; 6],
        )
        .unwrap();
        assert_eq!(h.n_cells(), 6);
        assert_eq!(Object::Histogram(h).class_name(), "Histogram2D");
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut dir = Directory::new();
        dir.insert("a", Object::Histogram(hist(vec![1.0])));
        dir.insert("b", Object::Histogram(hist(vec![2.0])));
        dir.insert("a", Object::Histogram(hist(vec![3.0])));
        let names: Vec<_> = dir.keys().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(dir.get("a"), Some(&Object::Histogram(hist(vec![3.0]))));
    }

    #[test]
    fn get_or_create_dir_refuses_leaf_names() {
        let mut dir = Directory::new();
        dir.insert("h", Object::Histogram(hist(vec![1.0])));
        assert!(dir.get_or_create_dir("h").is_none());
        assert!(dir.get_or_create_dir("").is_none());
        dir.get_or_create_dir("qa").unwrap().insert("x", Object::Histogram(hist(vec![1.0])));
        // second call returns the existing directory
        assert_eq!(dir.get_or_create_dir("qa").unwrap().len(), 1);
        assert!(matches!(dir.find("qa/x"), Some(Object::Histogram(_))));
        assert!(dir.find("qa/missing").is_none());
        assert!(dir.find("h/x").is_none());
    }

    #[test]
    fn serde_uses_kind_tags() {
        let mut dir = Directory::new();
        dir.insert(
            "info",
            Object::Opaque(Opaque {
                class_name: "RunInfo".into(),
                payload: serde_json::json!({"events": 1000}),
            }),
        );
        let text = serde_json::to_string(&dir).unwrap();
        assert!(text.contains(r#""kind":"opaque""#));
        let back: Directory = serde_json::from_str(&text).unwrap();
        assert_eq!(back, dir);
    }
}
