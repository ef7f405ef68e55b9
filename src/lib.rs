//! # pthat-combine
//!
//! Weight, sum and merge histogram containers produced per pT-hat bin.
//!
//! ```no_run
//! use pthat_combine::pipeline::{run, RunOptions};
//!
//! let mut opts = RunOptions::new("pthat_add_config.json");
//! opts.histogram = Some("spectrum".into());
//! let summary = run(&opts).unwrap();
//! println!("{} bins -> {}", summary.contributing_bins, summary.combined.display());
//! ```

pub mod aggregate;
pub mod color;
pub mod container;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod select;
pub mod weighted;

pub use error::{CombineError, IoKind, Result};
