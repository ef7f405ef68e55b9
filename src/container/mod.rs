/// Container layer: object model, file access, and traversal.
///
/// Architecture:
/// ```text
///  bin_10_20.hcf  (JSON envelope)
///        │
///        ▼
///   ┌──────────┐
///   │    io     │  open / create / close → ContainerReader, ContainerWriter
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │   Directory   │  ordered keys → Directory | Histogram | Opaque
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   walk    │  recursive histogram listing, path matching
///   └──────────┘
/// ```

pub mod io;
pub mod model;
pub mod walk;

pub use io::{ContainerReader, ContainerWriter, CONTAINER_EXTENSION};
pub use model::{Axis, Directory, EntryKind, Histogram, Key, Object, Opaque};
