//! Numeric capability trait and its element-type implementations.

pub mod traits;
pub mod wrappers;

pub use traits::Scalar;
