#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod combinator;
mod error;
mod filter;
mod graph;
pub mod manifest;
mod param;
mod path;
mod registry;
mod settings;
mod task;
#[cfg(feature = "logging")]
mod utils;
mod walk;

pub use crate::combinator::{Assignment, Constraint, Constraints, Expansion, expand};
pub use crate::error::*;
pub use crate::filter::{filter, matches};
pub use crate::graph::TaskGraph;
pub use crate::param::{Parameter, SerializedParams, serialize_parameters};
pub use crate::path::{derive_path, ensure_dir, log_files, output_path, parse_path};
pub use crate::registry::{
    OutputRecord, OutputRegistry, RegistryBuilder, build, create_output_dirs, input_files,
    output_file, output_files,
};
pub use crate::settings::{SETTINGS_FILE, Settings};
pub use crate::task::{Outputs, Task, TaskId};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
pub use crate::walk::{Unique, Walk, walk, walk_checked};
