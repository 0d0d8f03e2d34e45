//! Parallel layout: global length, local length and per-rank ownership ranges.

use crate::error::VError;
use crate::parallel::Comm;

/// Contiguous ownership of a vector's global index space.
///
/// Rank `r` owns the 0-based half-open range `ranges[r]..ranges[r + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    global: usize,
    block_size: usize,
    ranges: Vec<usize>,
    me: usize,
}

/// Local length of `rank` when `global` entries are balanced over `size`
/// ranks in whole blocks of `bs`; leading ranks absorb the remainder.
pub fn split_ownership(global: usize, bs: usize, size: usize, rank: usize) -> usize {
    let blocks = global / bs;
    let extra = usize::from(rank < blocks % size);
    bs * (blocks / size + extra)
}

impl Layout {
    /// Agree on sizes with every rank of `comm`.
    ///
    /// Exactly one of `global`/`local` may be `None`. When `local` is missing
    /// the global length is balanced with [`split_ownership`]; when `global` is
    /// missing it becomes the sum of the local lengths.
    pub fn negotiate<C: Comm + ?Sized>(
        comm: &C,
        global: Option<usize>,
        local: Option<usize>,
        bs: usize,
    ) -> Result<Self, VError> {
        if bs == 0 {
            return Err(VError::Config("block size must be positive".into()));
        }
        let local = match (global, local) {
            (None, None) => {
                return Err(VError::Config(
                    "cannot determine vector sizes: both global and local length are unspecified".into(),
                ));
            }
            (Some(n), None) => {
                if n % bs != 0 {
                    return Err(VError::Resource(format!(
                        "global length {n} is not divisible by block size {bs}"
                    )));
                }
                split_ownership(n, bs, comm.size(), comm.rank())
            }
            (_, Some(n)) => n,
        };

        let locals = comm.all_gather(local);
        let total: usize = locals.iter().sum();
        if let Some(n) = global {
            if n != total {
                return Err(VError::Resource(format!(
                    "sum of local lengths {total} does not match global length {n}"
                )));
            }
        }
        if let Some((r, n)) = locals.iter().enumerate().find(|(_, n)| **n % bs != 0) {
            return Err(VError::Resource(format!(
                "local length {n} on rank {r} is not divisible by block size {bs}"
            )));
        }
        Ok(Self::from_locals(&locals, comm.rank(), bs))
    }

    /// Layout of a process-local vector.
    pub fn sequential(n: usize, bs: usize) -> Result<Self, VError> {
        if bs == 0 {
            return Err(VError::Config("block size must be positive".into()));
        }
        if n % bs != 0 {
            return Err(VError::Resource(format!(
                "length {n} is not divisible by block size {bs}"
            )));
        }
        Ok(Self::from_locals(&[n], 0, bs))
    }

    fn from_locals(locals: &[usize], me: usize, bs: usize) -> Self {
        let mut ranges = Vec::with_capacity(locals.len() + 1);
        ranges.push(0);
        for n in locals {
            let last = ranges[ranges.len() - 1];
            ranges.push(last + n);
        }
        Self { global: ranges[ranges.len() - 1], block_size: bs, ranges, me }
    }

    pub fn global(&self) -> usize {
        self.global
    }

    pub fn local(&self) -> usize {
        self.end() - self.start()
    }

    pub fn start(&self) -> usize {
        self.ranges[self.me]
    }

    pub fn end(&self) -> usize {
        self.ranges[self.me + 1]
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Ownership boundaries of every rank.
    pub fn ranges(&self) -> &[usize] {
        &self.ranges
    }

    /// Number of ranks the layout spans.
    pub fn ranks(&self) -> usize {
        self.ranges.len() - 1
    }

    pub fn owns(&self, g: usize) -> bool {
        g >= self.start() && g < self.end()
    }

    /// Rank owning global index `g`, or `None` past the end.
    pub fn owner(&self, g: usize) -> Option<usize> {
        if g >= self.global {
            return None;
        }
        // first boundary strictly greater than g, minus one
        let upper = self.ranges.partition_point(|&b| b <= g);
        Some(upper - 1)
    }

    pub(crate) fn with_block_size(&self, bs: usize) -> Result<Self, VError> {
        if bs == 0 {
            return Err(VError::Config("block size must be positive".into()));
        }
        if let Some(w) = self.ranges.windows(2).find(|w| (w[1] - w[0]) % bs != 0) {
            return Err(VError::Resource(format!(
                "local length {} is not divisible by block size {bs}",
                w[1] - w[0]
            )));
        }
        Ok(Self { block_size: bs, ..self.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::UniverseComm;

    #[test]
    fn split_balances_with_remainder_first() {
        let parts: Vec<usize> = (0..3).map(|r| split_ownership(7, 1, 3, r)).collect();
        assert_eq!(parts, vec![3, 2, 2]);
        let blocked: Vec<usize> = (0..2).map(|r| split_ownership(6, 3, 2, r)).collect();
        assert_eq!(blocked, vec![3, 3]);
        let uneven: Vec<usize> = (0..2).map(|r| split_ownership(6, 2, 2, r)).collect();
        assert_eq!(uneven, vec![4, 2]);
    }

    #[test]
    fn owner_lookup_skips_empty_ranks() {
        let layout = Layout::from_locals(&[2, 0, 3], 0, 1);
        assert_eq!(layout.owner(0), Some(0));
        assert_eq!(layout.owner(1), Some(0));
        assert_eq!(layout.owner(2), Some(2));
        assert_eq!(layout.owner(4), Some(2));
        assert_eq!(layout.owner(5), None);
    }

    #[test]
    fn negotiate_rejects_unspecified_sizes() {
        let comm = UniverseComm::Serial;
        assert!(matches!(Layout::negotiate(&comm, None, None, 1), Err(VError::Config(_))));
        assert!(matches!(Layout::negotiate(&comm, Some(5), None, 2), Err(VError::Resource(_))));
        assert!(matches!(Layout::negotiate(&comm, Some(5), Some(4), 1), Err(VError::Resource(_))));
        let l = Layout::negotiate(&comm, None, Some(4), 2).unwrap();
        assert_eq!((l.global(), l.local(), l.start()), (4, 4, 0));
    }
}
