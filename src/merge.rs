//! Combine weighted per-bin containers into one output container.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::container::walk::join;
use crate::container::{ContainerReader, ContainerWriter, Directory, Object, CONTAINER_EXTENSION};
use crate::error::{CombineError, IoKind, Result};

/// Anything that can turn a list of containers into one.
pub trait MergeBackend {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf>;
}

// ---------------------------------------------------------------------------
// In-process merge
// ---------------------------------------------------------------------------

/// Fold `from` into `into`:
/// * histogram + histogram at the same path → cell-wise sum
/// * directory + directory → recurse
/// * any other clash → the incoming object replaces the existing one
/// * new paths → copied
pub fn merge_tree(into: &mut Directory, from: &Directory, prefix: &str) -> Result<()> {
    for key in from.keys() {
        let path = join(prefix, &key.name);
        match (into.get(&key.name), &key.object) {
            (Some(Object::Histogram(current)), Object::Histogram(incoming)) => {
                let mut summed = current.clone();
                summed
                    .add(incoming)
                    .map_err(|e| e.at_path(&path))?;
                into.insert(&key.name, Object::Histogram(summed));
            }
            (Some(Object::Directory(_)), Object::Directory(sub)) => {
                if let Some(target) = into.get_or_create_dir(&key.name) {
                    merge_tree(target, sub, &path)?;
                }
            }
            (existing, object) => {
                if existing.is_some() {
                    debug!("'{path}' replaced by a later input");
                }
                into.insert(&key.name, object.clone());
            }
        }
    }
    Ok(())
}

/// Merge every listed container into a fresh container at `output`.
/// Listing the same input twice adds its histograms twice.
pub fn merge(inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
    if inputs.is_empty() {
        return Err(CombineError::Value("nothing to merge: no input containers".to_string()));
    }

    let mut combined = Directory::new();
    for input in inputs {
        let reader = ContainerReader::open(input)?;
        merge_tree(&mut combined, reader.root(), "")?;
        debug!("merged {}", input.display());
    }

    let mut writer = ContainerWriter::create(output)?;
    *writer.root_mut() = combined;
    let written = writer.close()?;
    info!("merged {} containers into {}", inputs.len(), written.display());
    Ok(written)
}

/// The built-in merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessMerge;

impl MergeBackend for InProcessMerge {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
        merge(inputs, output)
    }
}

// ---------------------------------------------------------------------------
// External merge utility
// ---------------------------------------------------------------------------

/// Delegates to a bulk-merge program invoked as
/// `<program> -f <output> <inputs...>`.
#[derive(Debug, Clone)]
pub struct ExternalMerge {
    pub program: String,
}

impl ExternalMerge {
    pub fn new(program: &str) -> Self {
        ExternalMerge {
            program: program.to_string(),
        }
    }

    fn command(&self, inputs: &[PathBuf], output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-f").arg(output).args(inputs);
        cmd
    }
}

impl MergeBackend for ExternalMerge {
    /// The program writes to a staging file next to `output`, which is moved
    /// into place only after a zero exit status.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if inputs.is_empty() {
            return Err(CombineError::Value("nothing to merge: no input containers".to_string()));
        }
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let staging = tempfile::Builder::new()
            .prefix(".merging-")
            .suffix(&format!(".{CONTAINER_EXTENSION}"))
            .tempfile_in(parent)
            .map_err(|e| CombineError::io(IoKind::Create, output, e))?
            .into_temp_path();

        let mut cmd = self.command(inputs, &staging);
        debug!("running {cmd:?}");
        let status = cmd
            .status()
            .map_err(|e| CombineError::io(IoKind::Merge, output, format!("{}: {e}", self.program)))?;
        if !status.success() {
            return Err(CombineError::io(
                IoKind::Merge,
                output,
                format!("{} exited with {status}", self.program),
            ));
        }
        staging
            .persist(output)
            .map_err(|e| CombineError::io(IoKind::Write, output, e.error))?;
        info!("{} merged {} containers into {}", self.program, inputs.len(), output.display());
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Histogram, Opaque};

    fn h(contents: Vec<f64>) -> Object {
        let n = contents.len();
        Object::Histogram(
            Histogram::one_d("", (0..=n).map(|i| i as f64).collect(), contents).unwrap(),
        )
    }

    fn opaque(tag: &str) -> Object {
        Object::Opaque(Opaque {
            class_name: "Note".into(),
            payload: serde_json::json!(tag),
        })
    }

    fn write(path: &Path, root: Directory) -> PathBuf {
        let mut w = ContainerWriter::create(path).unwrap();
        *w.root_mut() = root;
        w.close().unwrap()
    }

    fn contents(dir: &Directory, path: &str) -> Vec<f64> {
        match dir.find(path) {
            Some(Object::Histogram(h)) => h.contents.clone(),
            other => panic!("{path}: {other:?}"),
        }
    }

    #[test]
    fn sums_shared_histograms_and_passes_unique_paths() {
        let mut a = Directory::new();
        a.insert("spectrum", h(vec![20.0, 40.0]));
        a.get_or_create_dir("qa").unwrap().insert("only_a", h(vec![1.0]));
        a.insert("note", opaque("a"));

        let mut b = Directory::new();
        b.insert("spectrum", h(vec![5.0, 10.0]));
        b.get_or_create_dir("qa").unwrap().insert("only_b", h(vec![2.0]));
        b.insert("note", opaque("b"));

        let mut out = Directory::new();
        merge_tree(&mut out, &a, "").unwrap();
        merge_tree(&mut out, &b, "").unwrap();

        assert_eq!(contents(&out, "spectrum"), vec![25.0, 50.0]);
        assert_eq!(contents(&out, "qa/only_a"), vec![1.0]);
        assert_eq!(contents(&out, "qa/only_b"), vec![2.0]);
        assert_eq!(out.find("note"), Some(&opaque("b")));
    }

    #[test]
    fn kind_clash_is_last_writer_wins() {
        let mut a = Directory::new();
        a.insert("x", h(vec![1.0]));
        let mut b = Directory::new();
        b.get_or_create_dir("x").unwrap().insert("inner", h(vec![2.0]));

        let mut out = Directory::new();
        merge_tree(&mut out, &a, "").unwrap();
        merge_tree(&mut out, &b, "").unwrap();
        assert_eq!(contents(&out, "x/inner"), vec![2.0]);
    }

    #[test]
    fn layout_mismatch_is_fatal() {
        let mut a = Directory::new();
        a.insert("spectrum", h(vec![1.0, 2.0]));
        let mut b = Directory::new();
        b.insert("spectrum", h(vec![1.0, 2.0, 3.0]));

        let mut out = Directory::new();
        merge_tree(&mut out, &a, "").unwrap();
        let err = merge_tree(&mut out, &b, "").unwrap_err();
        assert!(matches!(&err, CombineError::Shape(msg) if msg.contains("spectrum")));
    }

    #[test]
    fn single_input_is_reproduced_and_doubled_input_is_summed() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = Directory::new();
        root.insert("spectrum", h(vec![10.0, 20.0]));
        root.get_or_create_dir("qa").unwrap().insert("eta", h(vec![3.0]));
        root.insert("note", opaque("a"));
        let a = write(&dir.path().join("a.hcf"), root.clone());

        let once = merge(&[a.clone()], &dir.path().join("once.hcf")).unwrap();
        assert_eq!(ContainerReader::open(&once).unwrap().root(), &root);

        let twice = merge(&[a.clone(), a], &dir.path().join("twice.hcf")).unwrap();
        let merged = ContainerReader::open(&twice).unwrap().into_root();
        assert_eq!(contents(&merged, "spectrum"), vec![20.0, 40.0]);
        assert_eq!(contents(&merged, "qa/eta"), vec![6.0]);
        assert_eq!(merged.find("note"), Some(&opaque("a")));
    }

    #[test]
    fn empty_input_is_a_value_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.hcf");
        assert!(matches!(merge(&[], &out), Err(CombineError::Value(_))));
        assert!(matches!(
            ExternalMerge::new("hadd").merge(&[], &out),
            Err(CombineError::Value(_))
        ));
        assert!(!out.exists());
    }

    #[test]
    fn failed_merge_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = Directory::new();
        a.insert("s", h(vec![1.0]));
        let mut b = Directory::new();
        b.insert("s", h(vec![1.0, 1.0]));
        let a = write(&dir.path().join("a.hcf"), a);
        let b = write(&dir.path().join("b.hcf"), b);
        let out = dir.path().join("out.hcf");
        assert!(merge(&[a, b], &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn external_command_line_shape() {
        let cmd = ExternalMerge::new("hadd").command(
            &[PathBuf::from("a.hcf"), PathBuf::from("b.hcf")],
            Path::new("out.hcf"),
        );
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.get_program(), "hadd");
        assert_eq!(args, ["-f", "out.hcf", "a.hcf", "b.hcf"]);
    }

    #[cfg(unix)]
    #[test]
    fn external_failure_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = Directory::new();
        root.insert("s", h(vec![1.0]));
        let a = write(&dir.path().join("a.hcf"), root);
        let out = dir.path().join("out.hcf");

        let err = ExternalMerge::new("false").merge(&[a], &out).unwrap_err();
        assert!(matches!(err, CombineError::Io { kind: IoKind::Merge, .. }), "{err}");
        assert!(!out.exists());
        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left, ["a.hcf"]);
    }

    #[cfg(unix)]
    #[test]
    fn external_success_moves_output_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = Directory::new();
        root.insert("s", h(vec![1.0]));
        let a = write(&dir.path().join("a.hcf"), root);
        let out = dir.path().join("out.hcf");

        let written = ExternalMerge::new("true").merge(&[a], &out).unwrap();
        assert_eq!(written, out);
        assert!(out.exists());
    }
}
