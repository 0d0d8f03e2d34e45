//! The distributed vector container.
//!
//! A [`Vector`] wraps one [`RawVec`] handle and tracks the per-process state
//! the handle does not: the assembled flag, the insert mode used by the next
//! staged write, whether `is_assembled` verifies across processes, and an
//! auxiliary slot that keeps aliased memory alive. Releasing a vector (or
//! dropping it) turns the handle into the finalized sentinel; every later
//! operation fails with [`VError::Finalized`].
//!
//! Submodules add the assembly protocol, ghost vectors and local forms,
//! borrowed local views, the arithmetic layer and the diagnostic dump.

pub mod assembly;
pub mod display;
pub mod ghost;
pub mod ops;
pub mod view;

use crate::config::{InsertMode, VecFlags, VecKind};
use crate::context::Context;
use crate::core::Scalar;
use crate::error::VError;
use crate::parallel::Comm;
use crate::resource::{RawVec, SharedBuffer};
use log::{debug, warn};
use std::any::Any;
use std::fmt;
use std::ops::RangeInclusive;
use std::rc::Rc;

/// Opaque reference kept alive for the lifetime of a vector.
pub type AuxData = Rc<dyn Any>;

pub struct Vector<T: Scalar> {
    handle: Option<RawVec<T>>,
    flags: VecFlags,
    insert_mode: InsertMode,
    aux: Option<AuxData>,
}

fn initial_flags(ctx: &Context) -> VecFlags {
    if ctx.options().verify_assembled {
        VecFlags::ASSEMBLED | VecFlags::VERIFY_ASSEMBLED
    } else {
        VecFlags::ASSEMBLED
    }
}

impl<T: Scalar> Vector<T> {
    /// The finalized sentinel.
    pub fn null() -> Self {
        Self { handle: None, flags: VecFlags::empty(), insert_mode: InsertMode::Insert, aux: None }
    }

    pub(crate) fn from_raw(raw: RawVec<T>) -> Self {
        let ctx = Rc::clone(raw.context());
        Self {
            handle: Some(raw),
            flags: initial_flags(&ctx),
            insert_mode: ctx.options().insert_mode,
            aux: None,
        }
    }

    /// Empty, unsized distributed vector; call [`Vector::resize`] before use.
    pub fn new(ctx: &Rc<Context>) -> Result<Self, VError> {
        let raw = RawVec::create(ctx, VecKind::Standard)?;
        debug!("created {} vector on rank {}", T::TYPE_NAME, ctx.rank());
        Ok(Self::from_raw(raw))
    }

    /// Distributed vector with the given sizes. Either `global` or `local`
    /// may be `None` (decided by the layout), not both.
    pub fn with_sizes(
        ctx: &Rc<Context>,
        global: Option<usize>,
        local: Option<usize>,
        bs: usize,
    ) -> Result<Self, VError> {
        let mut v = Self::new(ctx)?;
        v.set_block_size(bs)?;
        v.resize(global, local)?;
        Ok(v)
    }

    /// Process-local vector of length `n`.
    pub fn seq(ctx: &Rc<Context>, n: usize) -> Result<Self, VError> {
        let mut raw = RawVec::create(ctx, VecKind::Sequential)?;
        raw.set_sizes(Some(n), None)?;
        Ok(Self::from_raw(raw))
    }

    /// Distributed vector whose local part is `buffer`.
    ///
    /// The buffer is shared, not copied; the vector holds a reference to it
    /// until released.
    pub fn from_local_buffer(
        ctx: &Rc<Context>,
        buffer: SharedBuffer<T>,
        global: Option<usize>,
    ) -> Result<Self, VError> {
        let raw = RawVec::wrap(ctx, Rc::clone(&buffer), global)?;
        let mut v = Self::from_raw(raw);
        v.flags |= VecFlags::WRAPPED;
        v.aux = Some(buffer as AuxData);
        Ok(v)
    }

    pub(crate) fn raw(&self) -> Result<&RawVec<T>, VError> {
        let raw = self.handle.as_ref().ok_or(VError::Finalized)?;
        raw.context().ensure_live()?;
        Ok(raw)
    }

    pub(crate) fn raw_mut(&mut self) -> Result<&mut RawVec<T>, VError> {
        let raw = self.handle.as_mut().ok_or(VError::Finalized)?;
        raw.context().ensure_live()?;
        Ok(raw)
    }

    /// Handle of an assembled vector.
    pub(crate) fn assembled(&self) -> Result<&RawVec<T>, VError> {
        let raw = self.raw()?;
        if !self.flags.contains(VecFlags::ASSEMBLED) {
            return Err(VError::NotAssembled);
        }
        Ok(raw)
    }

    /// Handle of an assembled, readable vector, agreed on by every process.
    /// `check` adds conditions on other operands. Call this before anything
    /// that communicates: a failure on one process then fails all of them.
    pub(crate) fn collective(
        &self,
        check: impl FnOnce(&RawVec<T>) -> Result<(), VError>,
    ) -> Result<&RawVec<T>, VError> {
        let raw = self.raw()?;
        let local = if self.flags.contains(VecFlags::ASSEMBLED) {
            raw.read().map(drop).and_then(|()| check(raw))
        } else {
            Err(VError::NotAssembled)
        };
        raw.agree(local)?;
        Ok(raw)
    }

    pub(crate) fn assembled_mut(&mut self) -> Result<&mut RawVec<T>, VError> {
        if self.handle.is_some() && !self.flags.contains(VecFlags::ASSEMBLED) {
            return Err(VError::NotAssembled);
        }
        self.raw_mut()
    }

    pub fn context(&self) -> Result<&Rc<Context>, VError> {
        Ok(self.handle.as_ref().ok_or(VError::Finalized)?.context())
    }

    pub fn is_finalized(&self) -> bool {
        self.handle.is_none()
    }

    pub fn kind(&self) -> Option<VecKind> {
        self.handle.as_ref().map(RawVec::kind)
    }

    pub fn flags(&self) -> VecFlags {
        self.flags
    }

    pub fn aux_data(&self) -> Option<&AuxData> {
        self.aux.as_ref()
    }

    pub fn set_aux_data(&mut self, aux: Option<AuxData>) {
        self.aux = aux;
    }

    /// Release the handle. Idempotent, and a no-op once the runtime is gone.
    ///
    /// Local forms cannot be released this way; restore them through their
    /// ghost vector instead.
    pub fn release(&mut self) -> Result<(), VError> {
        if self.flags.contains(VecFlags::LOCAL_FORM) {
            return Err(VError::Config(
                "a local form must be restored through its ghost vector, not released".into(),
            ));
        }
        self.release_handle();
        Ok(())
    }

    pub(crate) fn release_handle(&mut self) {
        let Some(raw) = self.handle.take() else {
            return;
        };
        if raw.context().is_finalized() {
            warn!("vector released after runtime finalize; nothing to free");
        } else {
            if raw.has_pending_exchange() {
                warn!("vector released with an unfinished exchange on rank {}", raw.context().rank());
            }
            debug!("released {} vector on rank {}", T::TYPE_NAME, raw.context().rank());
        }
        self.aux = None;
    }

    // ---- partition ----

    /// Collective unless the vector is sequential.
    pub fn resize(&mut self, global: Option<usize>, local: Option<usize>) -> Result<(), VError> {
        self.raw_mut()?.set_sizes(global, local)
    }

    pub fn set_block_size(&mut self, bs: usize) -> Result<(), VError> {
        self.raw_mut()?.set_block_size(bs)
    }

    pub fn block_size(&self) -> Result<usize, VError> {
        Ok(self.raw()?.block_size())
    }

    /// Global length.
    pub fn len(&self) -> Result<usize, VError> {
        self.raw()?.size()
    }

    pub fn is_empty(&self) -> Result<bool, VError> {
        Ok(self.len()? == 0)
    }

    /// Number of entries owned by this process.
    pub fn local_len(&self) -> Result<usize, VError> {
        self.raw()?.local_size()
    }

    /// 1-based inclusive range of global indices owned by this process.
    pub fn ownership_range(&self) -> Result<RangeInclusive<usize>, VError> {
        let layout = self.raw()?.layout()?;
        Ok(layout.start() + 1..=layout.end())
    }

    /// 1-based inclusive range of owned block indices.
    pub fn ownership_range_block(&self) -> Result<RangeInclusive<usize>, VError> {
        let layout = self.raw()?.layout()?;
        let bs = layout.block_size();
        let first = layout.start() / bs + 1;
        if layout.local() == 0 {
            return Ok(first..=first - 1);
        }
        Ok(first..=(layout.end() - 1) / bs + 1)
    }

    // ---- copies and equality ----

    /// Same layout and ghost pattern; values zeroed.
    pub fn duplicate(&self) -> Result<Self, VError> {
        let raw = self.raw()?.duplicate()?;
        Ok(Self {
            handle: Some(raw),
            flags: VecFlags::ASSEMBLED | (self.flags & VecFlags::VERIFY_ASSEMBLED),
            insert_mode: self.insert_mode,
            aux: None,
        })
    }

    /// Commit pending writes, then return a duplicate holding the same values.
    pub fn copy(&mut self) -> Result<Self, VError> {
        self.assembly_begin()?;
        self.assembly_end()?;
        let mut out = self.duplicate()?;
        out.raw_mut()?.copy_from(self.raw()?)?;
        Ok(out)
    }

    /// Copy values into `dest`, which must have the same layout.
    pub fn copy_to(&self, dest: &mut Vector<T>) -> Result<(), VError> {
        let src = self.assembled()?;
        dest.assembled_mut()?.copy_from(src)
    }

    /// Exact equality of sizes and values. Collective.
    pub fn equals(&self, other: &Vector<T>) -> Result<bool, VError> {
        let a = self.collective(|_| other.assembled()?.read().map(drop))?;
        let b = other.raw()?;
        let same = a.layout()? == b.layout()? && *a.read()? == *b.read()?;
        Ok(a.reduce_and(same))
    }

    /// Compare the local part against `values`. Collective: every process
    /// sees the same answer.
    pub fn equals_array(&self, values: &[T]) -> Result<bool, VError> {
        let raw = self.collective(|_| Ok(()))?;
        let same = *raw.read()? == *values;
        let all = raw.reduce_and(same);
        Ok(match raw.kind() {
            VecKind::Sequential => all,
            _ => raw.context().comm().broadcast_bool(all, 0),
        })
    }
}

impl<T: Scalar> PartialEq for Vector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl<T: Scalar> Drop for Vector<T> {
    fn drop(&mut self) {
        self.release_handle();
    }
}

impl<T: Scalar> fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Vector");
        d.field("type", &T::TYPE_NAME).field("kind", &self.kind()).field("flags", &self.flags);
        if let Some(layout) = self.handle.as_ref().and_then(|raw| raw.layout().ok()) {
            d.field("global", &layout.global()).field("local", &layout.local());
        }
        d.finish()
    }
}
