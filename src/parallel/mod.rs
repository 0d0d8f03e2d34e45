//! Communicator abstraction for distributed vectors.
//!
//! Every collective the vector layer performs goes through the [`Comm`] trait:
//! size negotiation, stash exchange during assembly, halo exchange, and the
//! reductions behind norms, dots and assembly verification.
//!
//! Point-to-point traffic is expressed as a split-phase all-to-all: `post`
//! hands one [`Packet`] per destination rank to the backend and returns a
//! [`Request`]; `wait` completes it and yields one packet per source rank.
//! Requests are matched by posting order, so every process must post and wait
//! in the same order. There is no cancellation or timeout: a process that never
//! reaches a matching call stalls the group.

pub mod thread_comm;
pub use thread_comm::ThreadComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// One message of a split-phase exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl Packet {
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        Self { indices, values }
    }

    pub fn values(values: Vec<f64>) -> Self {
        Self { indices: Vec::new(), values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() && self.values.is_empty()
    }
}

/// Handle for an in-flight exchange.
///
/// Backends that transfer eagerly only record the sequence number; backends
/// that transfer inside `wait` keep the outgoing packets in `deferred`.
#[derive(Debug)]
#[must_use = "a posted exchange must be completed with `wait`"]
pub struct Request {
    pub(crate) seq: u64,
    pub(crate) deferred: Option<Vec<Packet>>,
}

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);

    /// Start an exchange; `sends[r]` goes to rank `r`. `sends.len()` must equal `size()`.
    fn post(&self, sends: Vec<Packet>) -> Request;
    /// Finish an exchange; element `r` of the result came from rank `r`.
    fn wait(&self, request: Request) -> Vec<Packet>;

    fn exchange(&self, sends: Vec<Packet>) -> Vec<Packet> {
        let request = self.post(sends);
        self.wait(request)
    }

    /// Sum of `x` over all ranks.
    fn all_reduce(&self, x: f64) -> f64 {
        self.gather_scalar(x).into_iter().sum()
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        self.gather_scalar(x).into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    fn all_reduce_min(&self, x: f64) -> f64 {
        self.gather_scalar(x).into_iter().fold(f64::INFINITY, f64::min)
    }

    /// Element-wise sum of `local` across all ranks, in place.
    fn all_reduce_sum_vec(&self, local: &mut [f64]) {
        let sends = (0..self.size()).map(|_| Packet::values(local.to_vec())).collect();
        let recvd = self.exchange(sends);
        local.iter_mut().for_each(|x| *x = 0.0);
        for packet in recvd {
            for (acc, v) in local.iter_mut().zip(packet.values) {
                *acc += v;
            }
        }
    }

    /// Logical AND of `flag` over all ranks.
    fn all_reduce_and(&self, flag: bool) -> bool {
        self.all_reduce_min(if flag { 1.0 } else { 0.0 }) > 0.5
    }

    /// Every rank receives `root`'s `flag`.
    fn broadcast_bool(&self, flag: bool, root: usize) -> bool {
        self.gather_scalar(if flag { 1.0 } else { 0.0 })[root] > 0.5
    }

    /// Every rank receives the `x` contributed by each rank, in rank order.
    fn all_gather(&self, x: usize) -> Vec<usize> {
        let sends = (0..self.size()).map(|_| Packet::new(vec![x], Vec::new())).collect();
        self.exchange(sends)
            .into_iter()
            .map(|p| p.indices.first().copied().unwrap_or(0))
            .collect()
    }

    #[doc(hidden)]
    fn gather_scalar(&self, x: f64) -> Vec<f64> {
        let sends = (0..self.size()).map(|_| Packet::values(vec![x])).collect();
        self.exchange(sends)
            .into_iter()
            .map(|p| p.values.first().copied().unwrap_or(0.0))
            .collect()
    }
}

pub enum UniverseComm {
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
    Threads(ThreadComm),
    Serial,
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            UniverseComm::Threads(comm) => comm.rank(),
            UniverseComm::Serial => 0,
        }
    }
    fn size(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            UniverseComm::Threads(comm) => comm.size(),
            UniverseComm::Serial => 1,
        }
    }
    fn barrier(&self) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            UniverseComm::Threads(comm) => comm.barrier(),
            UniverseComm::Serial => {}
        }
    }
    fn post(&self, sends: Vec<Packet>) -> Request {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.post(sends),
            UniverseComm::Threads(comm) => comm.post(sends),
            UniverseComm::Serial => Request { seq: 0, deferred: Some(sends) },
        }
    }
    fn wait(&self, request: Request) -> Vec<Packet> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.wait(request),
            UniverseComm::Threads(comm) => comm.wait(request),
            // a single rank only ever sends to itself
            UniverseComm::Serial => request.deferred.unwrap_or_default(),
        }
    }
    fn all_reduce(&self, x: f64) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce(x),
            UniverseComm::Threads(comm) => comm.all_reduce(x),
            UniverseComm::Serial => x,
        }
    }
    fn all_reduce_max(&self, x: f64) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_max(x),
            UniverseComm::Threads(comm) => comm.all_reduce_max(x),
            UniverseComm::Serial => x,
        }
    }
    fn all_reduce_min(&self, x: f64) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_min(x),
            UniverseComm::Threads(comm) => comm.all_reduce_min(x),
            UniverseComm::Serial => x,
        }
    }
    fn all_reduce_sum_vec(&self, local: &mut [f64]) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_sum_vec(local),
            UniverseComm::Threads(comm) => comm.all_reduce_sum_vec(local),
            UniverseComm::Serial => {}
        }
    }
    fn all_reduce_and(&self, flag: bool) -> bool {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_and(flag),
            UniverseComm::Threads(comm) => comm.all_reduce_and(flag),
            UniverseComm::Serial => flag,
        }
    }
    fn broadcast_bool(&self, flag: bool, root: usize) -> bool {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.broadcast_bool(flag, root),
            UniverseComm::Threads(comm) => comm.broadcast_bool(flag, root),
            UniverseComm::Serial => flag,
        }
    }
    fn all_gather(&self, x: usize) -> Vec<usize> {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_gather(x),
            UniverseComm::Threads(comm) => comm.all_gather(x),
            UniverseComm::Serial => vec![x],
        }
    }
}
