//! Staged writes and the assembly bracket.
//!
//! Any staged write clears the local assembled flag; only a successful
//! `assembly_end` sets it again. `assembly_begin`/`assembly_end` are
//! collective for distributed vectors whether or not `verify_assembled` is
//! on: off-process entries can only reach their owners through them.

use crate::config::{InsertMode, VecFlags};
use crate::core::Scalar;
use crate::error::VError;
use crate::resource::RawVec;
use crate::vector::Vector;
use std::ops::RangeInclusive;

fn zero_based(index: usize) -> Result<usize, VError> {
    index
        .checked_sub(1)
        .ok_or_else(|| VError::Config("global indices are 1-based; got 0".into()))
}

impl<T: Scalar> Vector<T> {
    pub fn insert_mode(&self) -> InsertMode {
        self.insert_mode
    }

    /// Mode used by [`Vector::set`] and the assignment helpers.
    pub fn set_insert_mode(&mut self, mode: InsertMode) {
        self.insert_mode = mode;
    }

    pub fn verify_assembled(&self) -> bool {
        self.flags.contains(VecFlags::VERIFY_ASSEMBLED)
    }

    pub fn set_verify_assembled(&mut self, verify: bool) {
        self.flags.set(VecFlags::VERIFY_ASSEMBLED, verify);
    }

    fn stage(&mut self, f: impl FnOnce(&mut RawVec<T>) -> Result<(), VError>) -> Result<(), VError> {
        f(self.raw_mut()?)?;
        self.flags.remove(VecFlags::ASSEMBLED);
        Ok(())
    }

    /// Stage `value` at 1-based global `index` with the vector's insert mode.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), VError> {
        let g = zero_based(index)?;
        let mode = self.insert_mode;
        self.stage(|raw| raw.set_values(&[g], &[value], mode))
    }

    /// Value at 1-based global `index`; the entry must be owned or ghosted
    /// on this process.
    pub fn get(&self, index: usize) -> Result<T, VError> {
        let g = zero_based(index)?;
        let vals = self.assembled()?.get_values(&[g])?;
        vals.first()
            .copied()
            .ok_or_else(|| VError::Resource(format!("no value returned for index {index}")))
    }

    /// Bulk staged write at 0-based global indices.
    pub fn set_values(&mut self, idx: &[usize], vals: &[T], mode: InsertMode) -> Result<(), VError> {
        self.stage(|raw| raw.set_values(idx, vals, mode))
    }

    /// Bulk staged write of whole blocks at 0-based block indices.
    pub fn set_values_blocked(
        &mut self,
        idx: &[usize],
        vals: &[T],
        mode: InsertMode,
    ) -> Result<(), VError> {
        self.stage(|raw| raw.set_values_blocked(idx, vals, mode))
    }

    /// Bulk staged write at 0-based local indices (owned entries, then ghosts).
    pub fn set_values_local(
        &mut self,
        idx: &[usize],
        vals: &[T],
        mode: InsertMode,
    ) -> Result<(), VError> {
        self.stage(|raw| raw.set_values_local(idx, vals, mode))
    }

    pub fn set_values_blocked_local(
        &mut self,
        idx: &[usize],
        vals: &[T],
        mode: InsertMode,
    ) -> Result<(), VError> {
        self.stage(|raw| raw.set_values_blocked_local(idx, vals, mode))
    }

    /// Values at 0-based global indices held by this process.
    pub fn get_values(&self, idx: &[usize]) -> Result<Vec<T>, VError> {
        self.assembled()?.get_values(idx)
    }

    pub fn assembly_begin(&mut self) -> Result<(), VError> {
        self.raw_mut()?.assembly_begin()
    }

    pub fn assembly_end(&mut self) -> Result<(), VError> {
        self.raw_mut()?.assembly_end()?;
        self.flags.insert(VecFlags::ASSEMBLED);
        Ok(())
    }

    /// Local flag, or its AND over every process when verification is on.
    pub fn is_assembled(&self) -> Result<bool, VError> {
        let raw = self.raw()?;
        let local = self.flags.contains(VecFlags::ASSEMBLED);
        if self.verify_assembled() { Ok(raw.reduce_and(local)) } else { Ok(local) }
    }

    /// Run `body`, then commit once. The bracket runs even when `body` fails so
    /// that the other processes are not left waiting; the body's error wins.
    pub fn with_assembly<R>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<R, VError>,
    ) -> Result<R, VError> {
        let out = body(self);
        self.assembly_begin()?;
        self.assembly_end()?;
        out
    }

    fn owned_span(&self) -> Result<(usize, usize, usize), VError> {
        let layout = self.raw()?.layout()?;
        Ok((layout.start(), layout.end(), layout.global()))
    }

    /// Assign `value` to every 1-based index in `range`. Collective.
    ///
    /// Values combine with the vector's insert mode. An insert over the whole
    /// vector is a direct fill when every process is assembled; anything else
    /// is staged and committed in one bracket.
    pub fn assign_range(&mut self, range: RangeInclusive<usize>, value: T) -> Result<(), VError> {
        let (start, end, n) = self.owned_span()?;
        let (&lo, &hi) = (range.start(), range.end());
        if lo == 0 || hi > n {
            return Err(VError::Config(format!(
                "range {lo}..={hi} is outside 1..={n}"
            )));
        }
        if lo == 1 && hi == n {
            let ready = self.flags.contains(VecFlags::ASSEMBLED) && self.insert_mode == InsertMode::Insert;
            // the bracket below is collective, so the choice must be too
            if self.raw()?.reduce_and(ready) {
                return self.assembled_mut()?.fill(value);
            }
        }
        let idx: Vec<usize> = (lo - 1..hi).filter(|g| (start..end).contains(g)).collect();
        let vals = vec![value; idx.len()];
        let mode = self.insert_mode;
        self.with_assembly(|v| v.set_values(&idx, &vals, mode))
    }

    /// Assign `values[i]` to index `i + 1`. `values` spans the whole vector.
    pub fn assign_slice(&mut self, values: &[T]) -> Result<(), VError> {
        let (start, end, n) = self.owned_span()?;
        if values.len() != n {
            return Err(VError::Config(format!(
                "{} values for a vector of length {n}",
                values.len()
            )));
        }
        let idx: Vec<usize> = (start..end).collect();
        let mode = self.insert_mode;
        self.with_assembly(|v| v.set_values(&idx, &values[start..end], mode))
    }

    /// Assign `value` where `mask` is true. Collective.
    pub fn assign_masked(&mut self, mask: &[bool], value: T) -> Result<(), VError> {
        let count = mask.iter().filter(|&&m| m).count();
        self.assign_masked_values(mask, &vec![value; count])
    }

    /// Assign `values`, in order, to the indices where `mask` is true.
    pub fn assign_masked_values(&mut self, mask: &[bool], values: &[T]) -> Result<(), VError> {
        let (start, end, n) = self.owned_span()?;
        if mask.len() != n {
            return Err(VError::Config(format!("mask of length {} for a vector of length {n}", mask.len())));
        }
        let selected: Vec<usize> = (0..n).filter(|&g| mask[g]).collect();
        if selected.len() != values.len() {
            return Err(VError::Config(format!(
                "mask selects {} entries but {} values were given",
                selected.len(),
                values.len()
            )));
        }
        let (idx, vals): (Vec<usize>, Vec<T>) = selected
            .into_iter()
            .zip(values.iter().copied())
            .filter(|(g, _)| (start..end).contains(g))
            .unzip();
        let mode = self.insert_mode;
        self.with_assembly(|v| v.set_values(&idx, &vals, mode))
    }

    /// Values where `mask` is true, in index order. Collective.
    pub fn get_masked(&self, mask: &[bool]) -> Result<Vec<T>, VError> {
        let all = self.to_global_vec()?;
        if mask.len() != all.len() {
            return Err(VError::Config(format!(
                "mask of length {} for a vector of length {}",
                mask.len(),
                all.len()
            )));
        }
        Ok(all.into_iter().zip(mask).filter(|(_, m)| **m).map(|(v, _)| v).collect())
    }
}
