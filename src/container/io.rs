use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::model::{Directory, EntryKind, Object};
use crate::error::{CombineError, IoKind, Result};

/// File extension used for containers written by this crate.
pub const CONTAINER_EXTENSION: &str = "hcf";

const FORMAT_TAG: &str = "pthat-container";
const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// On-disk envelope
// ---------------------------------------------------------------------------

/// Expected layout:
///
/// ```json
/// {
///   "format": "pthat-container",
///   "version": 1,
///   "root": { "keys": [ { "name": "spectrum", "object": { "kind": "histogram", ... } } ] }
/// }
/// ```
#[derive(Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    root: Directory,
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A container opened for reading. The whole tree is loaded on open and the
/// file handle is released before `open` returns.
#[derive(Debug)]
pub struct ContainerReader {
    path: PathBuf,
    root: Directory,
}

impl ContainerReader {
    /// Open and parse a container. Missing, unreadable and corrupt ("zombie")
    /// files all fail with `Io(cannot open)`.
    pub fn open(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CombineError::io(IoKind::Open, path, e))?;
        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| CombineError::io(IoKind::Open, path, format!("corrupt container: {e}")))?;

        if envelope.format != FORMAT_TAG {
            return Err(CombineError::io(
                IoKind::Open,
                path,
                format!("unknown container format '{}'", envelope.format),
            ));
        }
        if envelope.version != FORMAT_VERSION {
            return Err(CombineError::io(
                IoKind::Open,
                path,
                format!("unsupported container version {}", envelope.version),
            ));
        }
        envelope
            .root
            .validate()
            .map_err(|e| CombineError::io(IoKind::Open, path, format!("corrupt histogram {e}")))?;

        debug!("opened {} ({} top-level keys)", path.display(), envelope.root.len());
        Ok(ContainerReader {
            path: path.to_path_buf(),
            root: envelope.root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub fn into_root(self) -> Directory {
        self.root
    }

    /// List the keys of the directory at `dir_path` (`""` for the root).
    pub fn list_entries(&self, dir_path: &str) -> Result<Vec<(String, EntryKind)>> {
        self.root
            .subdir(dir_path)
            .map(Directory::list_entries)
            .ok_or_else(|| CombineError::NotFound(format!("no directory '{dir_path}' in {}", self.path.display())))
    }

    pub fn get(&self, path: &str) -> Option<&Object> {
        self.root.find(path)
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// A container opened for writing. Content is staged in a temporary file in
/// the target's directory and only appears at the target path on
/// [`ContainerWriter::close`]; dropping the writer discards everything.
#[derive(Debug)]
pub struct ContainerWriter {
    path: PathBuf,
    staging: NamedTempFile,
    root: Directory,
}

impl ContainerWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if path.is_dir() {
            return Err(CombineError::io(IoKind::Create, path, "target is a directory"));
        }
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(&format!(".{CONTAINER_EXTENSION}"))
            .tempfile_in(parent)
            .map_err(|e| CombineError::io(IoKind::Create, path, e))?;
        Ok(ContainerWriter {
            path: path.to_path_buf(),
            staging,
            root: Directory::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root_mut(&mut self) -> &mut Directory {
        &mut self.root
    }

    /// Walk `dir_path` from the root, creating missing directories.
    pub fn get_or_create_subdirectory(&mut self, dir_path: &str) -> Result<&mut Directory> {
        let path = &self.path;
        let mut dir = &mut self.root;
        for segment in dir_path.split('/').filter(|s| !s.is_empty()) {
            dir = dir.get_or_create_dir(segment).ok_or_else(|| {
                CombineError::io(
                    IoKind::Create,
                    path,
                    format!("subdirectory '{segment}' clashes with an existing leaf"),
                )
            })?;
        }
        Ok(dir)
    }

    /// Store `object` as `name` inside `dir_path`.
    pub fn put(&mut self, dir_path: &str, name: &str, object: Object) -> Result<()> {
        self.get_or_create_subdirectory(dir_path)?.insert(name, object);
        Ok(())
    }

    /// Serialize the tree and move it into place. Consumes the writer, so a
    /// handle can be closed at most once.
    pub fn close(self) -> Result<PathBuf> {
        let ContainerWriter {
            path,
            staging,
            root,
        } = self;
        let envelope = Envelope {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            root,
        };

        {
            let mut out = BufWriter::new(staging.as_file());
            serde_json::to_writer(&mut out, &envelope)
                .map_err(|e| CombineError::io(IoKind::Write, &path, e))?;
            out.flush().map_err(|e| CombineError::io(IoKind::Write, &path, e))?;
        }
        staging
            .persist(&path)
            .map_err(|e| CombineError::io(IoKind::Write, &path, e.error))?;
        debug!("wrote {}", path.display());
        Ok(path)
    }
}
