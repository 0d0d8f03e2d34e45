//! Vector options and shared tag types.

pub mod options;
pub mod types;

pub use options::VecOptions;
pub use types::{AccessMode, InsertMode, NormType, ScatterDirection, VecFlags, VecKind};
