// In-process rank group: each rank is a thread, packets travel through mailboxes.

use super::{Comm, Packet, Request};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct Mailbox {
    /// Keyed by (sequence number, source rank).
    slots: Mutex<HashMap<(u64, usize), Packet>>,
    ready: Condvar,
}

struct Shared {
    boxes: Vec<Mailbox>,
    poisoned: AtomicBool,
    origin: Mutex<Option<usize>>,
}

impl Shared {
    fn new(size: usize) -> Self {
        let boxes = (0..size)
            .map(|_| Mailbox { slots: Mutex::new(HashMap::new()), ready: Condvar::new() })
            .collect();
        Self { boxes, poisoned: AtomicBool::new(false), origin: Mutex::new(None) }
    }

    fn poison(&self, rank: usize) {
        self.origin.lock().get_or_insert(rank);
        self.poisoned.store(true, Ordering::Release);
        for mailbox in &self.boxes {
            let _slots = mailbox.slots.lock();
            mailbox.ready.notify_all();
        }
    }
}

struct PoisonOnPanic {
    rank: usize,
    shared: Arc<Shared>,
}

impl Drop for PoisonOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shared.poison(self.rank);
        }
    }
}

/// A communicator whose ranks are threads of the current process.
///
/// Used to exercise collective code paths without an MPI launcher. A rank
/// that panics poisons the group: peers blocked in `wait` panic as well, and
/// [`ThreadComm::run`] re-raises the panic of the rank that failed first.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
    seq: AtomicU64,
}

impl ThreadComm {
    /// Run `f` on `size` ranks and collect the per-rank results in rank order.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        assert!(size > 0, "a rank group needs at least one rank");
        let shared = Arc::new(Shared::new(size));
        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let comm = ThreadComm { rank, shared: Arc::clone(&shared), seq: AtomicU64::new(0) };
                    let guard = PoisonOnPanic { rank, shared: Arc::clone(&shared) };
                    let f = &f;
                    s.spawn(move || {
                        let _guard = guard;
                        f(comm)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let origin = *shared.origin.lock();
        let mut results = Vec::with_capacity(size);
        let mut first_panic = None;
        for (rank, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(r) => results.push(r),
                Err(payload) => {
                    if first_panic.is_none() || origin == Some(rank) {
                        first_panic = Some(payload);
                    }
                }
            }
        }
        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }
        results
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.boxes.len()
    }

    fn barrier(&self) {
        let sends = (0..self.size()).map(|_| Packet::default()).collect();
        let _ = self.exchange(sends);
    }

    fn post(&self, sends: Vec<Packet>) -> Request {
        debug_assert_eq!(sends.len(), self.size(), "one packet per destination rank");
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        for (dst, packet) in sends.into_iter().enumerate() {
            let mailbox = &self.shared.boxes[dst];
            mailbox.slots.lock().insert((seq, self.rank), packet);
            mailbox.ready.notify_all();
        }
        Request { seq, deferred: None }
    }

    fn wait(&self, request: Request) -> Vec<Packet> {
        let size = self.size();
        let mailbox = &self.shared.boxes[self.rank];
        let mut slots = mailbox.slots.lock();
        loop {
            if (0..size).all(|src| slots.contains_key(&(request.seq, src))) {
                return (0..size)
                    .map(|src| slots.remove(&(request.seq, src)).unwrap_or_default())
                    .collect();
            }
            if self.shared.poisoned.load(Ordering::Acquire) {
                panic!("rank {} aborted: a peer rank panicked", self.rank);
            }
            mailbox.ready.wait(&mut slots);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_agree_on_every_rank() {
        let out = ThreadComm::run(3, |comm| {
            let r = comm.rank() as f64;
            (
                comm.all_reduce(r + 1.0),
                comm.all_reduce_max(r),
                comm.all_reduce_min(r),
                comm.all_reduce_and(comm.rank() != 1),
                comm.broadcast_bool(comm.rank() == 2, 2),
                comm.all_gather(comm.rank() * 10),
            )
        });
        for (sum, max, min, and, bcast, gathered) in out {
            assert_eq!(sum, 6.0);
            assert_eq!(max, 2.0);
            assert_eq!(min, 0.0);
            assert!(!and);
            assert!(bcast);
            assert_eq!(gathered, vec![0, 10, 20]);
        }
    }

    #[test]
    fn overlapping_requests_complete_in_any_order() {
        let out = ThreadComm::run(2, |comm| {
            let me = comm.rank();
            let first = comm.post((0..2).map(|_| Packet::new(vec![me], vec![])).collect());
            let second = comm.post((0..2).map(|_| Packet::new(vec![me + 100], vec![])).collect());
            let b = comm.wait(second);
            let a = comm.wait(first);
            (a[1].indices[0], b[0].indices[0])
        });
        assert_eq!(out, vec![(1, 100), (1, 100)]);
    }

    #[test]
    fn sum_vec_reduces_elementwise() {
        let out = ThreadComm::run(2, |comm| {
            let mut v = [comm.rank() as f64, 1.0];
            comm.all_reduce_sum_vec(&mut v);
            v
        });
        assert_eq!(out, vec![[1.0, 2.0], [1.0, 2.0]]);
    }

    #[test]
    #[should_panic(expected = "rank 1 failed")]
    fn panicking_rank_does_not_hang_the_group() {
        ThreadComm::run(2, |comm| {
            if comm.rank() == 1 {
                panic!("rank 1 failed");
            }
            comm.barrier();
        });
    }
}
