//! Ghost scatter plan: who mirrors which owned entry, and where it lands.
//!
//! Local storage of a ghosted vector is `[owned entries | ghost entries]`, the
//! ghost entries in the order their global indices were supplied. The plan is
//! built once, collectively, when the vector is created:
//!
//! - `recv_positions[r]`: slots in our storage holding ghosts owned by rank `r`
//! - `send_offsets[r]`: offsets of our owned entries that rank `r` mirrors,
//!   in the order rank `r` listed them
//!
//! A forward exchange sends `send_offsets` values and writes them into the
//! peer's `recv_positions`; a reverse exchange runs the same lists backwards.

use crate::config::{InsertMode, ScatterDirection};
use crate::core::Scalar;
use crate::core::wrappers::{pack_all, unpack_all};
use crate::error::VError;
use crate::parallel::{Comm, Packet, Request};
use crate::resource::{Layout, combine};
use std::collections::HashMap;

pub(crate) struct GhostPlan {
    ghosts: Vec<usize>,
    lookup: HashMap<usize, usize>,
    send_offsets: Vec<Vec<usize>>,
    recv_positions: Vec<Vec<usize>>,
}

impl GhostPlan {
    /// Collective. `ghosts` are 0-based global indices owned by other ranks.
    pub(crate) fn build<C: Comm + ?Sized>(
        comm: &C,
        layout: &Layout,
        ghosts: Vec<usize>,
    ) -> Result<Self, VError> {
        let local = layout.local();
        let mut lookup = HashMap::with_capacity(ghosts.len());
        let mut valid = true;
        for (k, &g) in ghosts.iter().enumerate() {
            valid &= g < layout.global() && !layout.owns(g);
            valid &= lookup.insert(g, local + k).is_none();
        }
        // every rank must learn about a bad index, or the exchange below hangs
        if !comm.all_reduce_and(valid) {
            return Err(VError::Config(
                "ghost indices must be unique, in range, and owned by another process".into(),
            ));
        }

        let size = comm.size();
        let mut wanted = vec![Packet::default(); size];
        let mut recv_positions = vec![Vec::new(); size];
        for (k, &g) in ghosts.iter().enumerate() {
            let owner = layout
                .owner(g)
                .ok_or_else(|| VError::Config(format!("ghost index {g} is out of range")))?;
            wanted[owner].indices.push(g);
            recv_positions[owner].push(local + k);
        }

        let start = layout.start();
        let send_offsets = comm
            .exchange(wanted)
            .into_iter()
            .map(|p| p.indices.into_iter().map(|g| g - start).collect())
            .collect();

        Ok(Self { ghosts, lookup, send_offsets, recv_positions })
    }

    pub(crate) fn len(&self) -> usize {
        self.ghosts.len()
    }

    /// 0-based global indices of the ghost slots, in storage order.
    pub(crate) fn ghosts(&self) -> &[usize] {
        &self.ghosts
    }

    /// Storage slot of ghost index `g`.
    pub(crate) fn position(&self, g: usize) -> Option<usize> {
        self.lookup.get(&g).copied()
    }

    fn lists(&self, direction: ScatterDirection) -> (&[Vec<usize>], &[Vec<usize>]) {
        match direction {
            ScatterDirection::Forward => (&self.send_offsets, &self.recv_positions),
            ScatterDirection::Reverse => (&self.recv_positions, &self.send_offsets),
        }
    }

    /// Pack outgoing values and post them. Values are captured now.
    pub(crate) fn begin<T: Scalar, C: Comm + ?Sized>(
        &self,
        comm: &C,
        data: &[T],
        direction: ScatterDirection,
    ) -> Request {
        let (outgoing, _) = self.lists(direction);
        let sends = outgoing
            .iter()
            .map(|list| Packet::values(pack_all(list.iter().map(|&i| data[i]))))
            .collect();
        comm.post(sends)
    }

    pub(crate) fn end<T: Scalar, C: Comm + ?Sized>(
        &self,
        comm: &C,
        request: Request,
        data: &mut [T],
        mode: InsertMode,
        direction: ScatterDirection,
    ) -> Result<(), VError> {
        let (_, incoming) = self.lists(direction);
        for (src, packet) in comm.wait(request).into_iter().enumerate() {
            let vals: Vec<T> = unpack_all(&packet.values);
            let targets = &incoming[src];
            if vals.len() != targets.len() {
                return Err(VError::Resource(format!(
                    "halo message from rank {src} carried {} values, expected {}",
                    vals.len(),
                    targets.len()
                )));
            }
            for (&pos, v) in targets.iter().zip(vals) {
                combine(&mut data[pos], v, mode);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::ThreadComm;

    #[test]
    fn plan_pairs_senders_with_receivers() {
        let out = ThreadComm::run(2, |comm| {
            // 2 + 2 entries; each rank mirrors the first entry of the other
            let layout = Layout::negotiate(&comm, Some(4), None, 1).unwrap();
            let ghost = if comm.rank() == 0 { 2 } else { 0 };
            let plan = GhostPlan::build(&comm, &layout, vec![ghost]).unwrap();
            (plan.send_offsets.clone(), plan.recv_positions.clone(), plan.position(ghost))
        });
        assert_eq!(out[0].0, vec![vec![], vec![0]]);
        assert_eq!(out[0].1, vec![vec![], vec![2]]);
        assert_eq!(out[0].2, Some(2));
        assert_eq!(out[1].0, vec![vec![0], vec![]]);
    }

    #[test]
    fn owned_index_is_rejected_everywhere() {
        let out = ThreadComm::run(2, |comm| {
            let layout = Layout::negotiate(&comm, Some(4), None, 1).unwrap();
            // rank 0 lists one of its own entries
            let ghosts = if comm.rank() == 0 { vec![1] } else { vec![0] };
            GhostPlan::build(&comm, &layout, ghosts).is_err()
        });
        assert_eq!(out, vec![true, true]);
    }
}
