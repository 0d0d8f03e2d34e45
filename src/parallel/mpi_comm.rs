//! MPI-based parallel communication module.
//!
//! This module provides an implementation of the `Comm` trait on top of the
//! `mpi` crate for distributed-memory runs. Reductions map onto native MPI
//! collectives; packet exchanges are buffered by `post` and carried out by
//! `wait` as an `MPI_Alltoallv` pair (indices, then values). Every rank must
//! therefore complete its requests in the same order it posted them.
//!
//! # Usage
//!
//! - `MpiComm::new()` initializes MPI and owns the universe; dropping it
//!   finalizes MPI, so it must outlive every vector built on it.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # {
//! use ghostvec::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().unwrap();
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use super::{Comm, Packet, Request};
use crate::error::VError;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;
use std::sync::atomic::{AtomicU64, Ordering};

/// MPI communicator wrapper for distributed parallelism.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    rank: usize,
    size: usize,
    seq: AtomicU64,
    _universe: Universe,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    pub fn new() -> Result<Self, VError> {
        let universe = mpi::initialize()
            .ok_or_else(|| VError::Resource("MPI is already initialized or failed to start".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { world, rank, size, seq: AtomicU64::new(0), _universe: universe })
    }

    fn all_to_all_v<T>(&self, send: Vec<Vec<T>>) -> Vec<Vec<T>>
    where
        T: Equivalence + Copy + Default,
    {
        let send_counts: Vec<Count> = send.iter().map(|s| s.len() as Count).collect();
        let mut recv_counts: Vec<Count> = vec![0; self.size];
        self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

        let send_displs = displacements(&send_counts);
        let recv_displs = displacements(&recv_counts);
        let flat: Vec<T> = send.into_iter().flatten().collect();
        let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
        let mut recv_flat = vec![T::default(); total];
        {
            let send_part = Partition::new(&flat[..], &send_counts[..], &send_displs[..]);
            let mut recv_part =
                PartitionMut::new(&mut recv_flat[..], &recv_counts[..], &recv_displs[..]);
            self.world.all_to_all_varcount_into(&send_part, &mut recv_part);
        }
        recv_counts
            .iter()
            .zip(&recv_displs)
            .map(|(&c, &d)| recv_flat[d as usize..(d + c) as usize].to_vec())
            .collect()
    }
}

fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &c| {
            let d = *acc;
            *acc += c;
            Some(d)
        })
        .collect()
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) {
        self.world.barrier();
    }

    fn post(&self, sends: Vec<Packet>) -> Request {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        Request { seq, deferred: Some(sends) }
    }

    fn wait(&self, request: Request) -> Vec<Packet> {
        let sends = request.deferred.unwrap_or_default();
        let (indices, values): (Vec<Vec<u64>>, Vec<Vec<f64>>) = sends
            .into_iter()
            .map(|p| (p.indices.into_iter().map(|i| i as u64).collect(), p.values))
            .unzip();
        let indices = self.all_to_all_v(indices);
        let values = self.all_to_all_v(values);
        indices
            .into_iter()
            .zip(values)
            .map(|(idx, vals)| Packet::new(idx.into_iter().map(|i| i as usize).collect(), vals))
            .collect()
    }

    fn all_reduce(&self, x: f64) -> f64 {
        let mut y = 0.0f64;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::sum());
        y
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        let mut y = 0.0f64;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::max());
        y
    }

    fn all_reduce_min(&self, x: f64) -> f64 {
        let mut y = 0.0f64;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::min());
        y
    }

    fn all_reduce_sum_vec(&self, local: &mut [f64]) {
        let send = local.to_vec();
        self.world.all_reduce_into(&send[..], local, SystemOperation::sum());
    }

    fn all_reduce_and(&self, flag: bool) -> bool {
        let x: i32 = flag as i32;
        let mut y: i32 = 0;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::logical_and());
        y != 0
    }

    fn broadcast_bool(&self, flag: bool, root: usize) -> bool {
        let mut x: i32 = flag as i32;
        self.world.process_at_rank(root as i32).broadcast_into(&mut x);
        x != 0
    }

    fn all_gather(&self, x: usize) -> Vec<usize> {
        let mine = x as u64;
        let mut all = vec![0u64; self.size];
        self.world.all_gather_into(&mine, &mut all[..]);
        all.into_iter().map(|v| v as usize).collect()
    }
}
