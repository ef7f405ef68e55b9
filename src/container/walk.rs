use super::model::{Directory, Histogram, Object};

// ---------------------------------------------------------------------------
// Recursive histogram listing
// ---------------------------------------------------------------------------

/// Join a parent path and a key name with `/`.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Every histogram below `dir`, depth-first in key order, paired with its
/// slash-joined path from `dir`.
pub fn histograms(dir: &Directory) -> Vec<(String, &Histogram)> {
    let mut out = Vec::new();
    collect(dir, "", &mut out);
    out
}

fn collect<'a>(dir: &'a Directory, prefix: &str, out: &mut Vec<(String, &'a Histogram)>) {
    for key in dir.keys() {
        let path = join(prefix, &key.name);
        match &key.object {
            Object::Directory(sub) => collect(sub, &path, out),
            Object::Histogram(hist) => out.push((path, hist)),
            Object::Opaque(_) => {}
        }
    }
}

/// Last `/`-separated segment of a path.
pub fn final_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A candidate path matches a requested name when it equals the name outright
/// or when its final segment does.
pub fn path_matches(candidate: &str, requested: &str) -> bool {
    candidate == requested || final_segment(candidate) == requested
}

/// First histogram (in traversal order) whose path matches `requested`.
pub fn find_matching<'a>(dir: &'a Directory, requested: &str) -> Option<(String, &'a Histogram)> {
    histograms(dir)
        .into_iter()
        .find(|(path, _)| path_matches(path, requested))
}
