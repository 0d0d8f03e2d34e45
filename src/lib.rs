//! ghostvec: PETSc-style distributed dense vectors
//!
//! This crate provides a distributed vector container partitioned into
//! contiguous per-process ranges, optional ghost entries kept in sync by halo
//! exchange, a staged-write/assembly protocol, and scoped borrowing of the
//! local memory, with the usual elementwise and reduction operations on top.
//! Processes talk through a [`Comm`] backend: serial, in-process threads, or
//! MPI with the `mpi` feature.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod resource;
pub mod vector;

// Re-exports for convenience
pub use config::*;
pub use context::Context;
pub use core::Scalar;
pub use error::{Result, VError};
pub use parallel::{Comm, ThreadComm, UniverseComm};
pub use resource::{Layout, SharedBuffer};
pub use vector::ghost::{GhostVector, LocalForm, ghost_update};
pub use vector::view::LocalView;
pub use vector::{AuxData, Vector};

#[cfg(feature = "mpi")]
pub use parallel::MpiComm;
