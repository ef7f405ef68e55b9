//! Weighted copies: rebuild a whole container with every histogram scaled.

use std::path::{Path, PathBuf};

use log::debug;

use crate::container::{ContainerReader, ContainerWriter, Directory, Object, CONTAINER_EXTENSION};
use crate::error::{CombineError, IoKind, Result};
use crate::registry::SourceBin;

/// Rebuild `source` into a fresh tree, scaling every histogram by `weight`.
/// Directories mirror the source; opaque leaves are cloned unchanged.
pub fn scale_tree(source: &Directory, weight: f64) -> Directory {
    let mut out = Directory::new();
    copy_into(source, &mut out, weight);
    out
}

fn copy_into(source: &Directory, dest: &mut Directory, weight: f64) {
    for key in source.keys() {
        match &key.object {
            Object::Directory(sub) => {
                // Source names are unique and `dest` starts empty, so the slot
                // is either new or a directory created by this walk.
                if let Some(dest_sub) = dest.get_or_create_dir(&key.name) {
                    copy_into(sub, dest_sub, weight);
                }
            }
            Object::Histogram(hist) => dest.insert(&key.name, Object::Histogram(hist.scaled(weight))),
            Object::Opaque(opaque) => dest.insert(&key.name, Object::Opaque(opaque.clone())),
        }
    }
}

/// Write a weighted copy of the container at `source` to `destination`.
///
/// Fails with `Value` for a non-positive weight and `Io(cannot open)` for a
/// missing source, both before anything is created.
pub fn build_weighted_copy(source: &Path, weight: f64, destination: &Path) -> Result<PathBuf> {
    if !(weight > 0.0) || !weight.is_finite() {
        return Err(CombineError::Value(format!(
            "cannot scale {} with non-positive weight {weight}",
            source.display()
        )));
    }
    if !source.exists() {
        return Err(CombineError::io(IoKind::Open, source, "input container not found"));
    }

    let reader = ContainerReader::open(source)?;
    let mut writer = ContainerWriter::create(destination)?;
    *writer.root_mut() = scale_tree(reader.root(), weight);
    drop(reader);

    debug!("scaled {} by {weight} -> {}", source.display(), destination.display());
    writer.close()
}

/// Scratch file name for a bin's weighted copy: keyed by declaration
/// position and name, never by the source file stem.
pub fn copy_path_for(work_dir: &Path, bin: &SourceBin) -> PathBuf {
    let safe: String = bin
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    work_dir.join(format!("{:03}_{safe}_weighted.{CONTAINER_EXTENSION}", bin.position))
}

/// True when `weight` is 1 within `tolerance`, both relative and absolute.
pub fn is_unit_weight(weight: f64, tolerance: f64) -> bool {
    let diff = (weight - 1.0).abs();
    diff <= tolerance || diff <= tolerance * weight.abs().max(1.0)
}
