//! The vector resource: storage, layout and the collective primitives.
//!
//! [`RawVec`] is the engine underneath [`crate::Vector`]. It owns (or shares)
//! the process-local buffer, knows the parallel [`Layout`], stashes writes to
//! entries owned by other processes until assembly, and drives ghost
//! exchanges. It never tracks the assembled flag itself; that bookkeeping
//! belongs to the container. Mutating entry points are crate-private so that
//! every staged write goes through the container's assembly protocol.

pub mod kernels;
pub mod layout;
pub mod scatter;

pub use layout::{Layout, split_ownership};

use crate::config::{InsertMode, ScatterDirection, VecKind};
use crate::context::Context;
use crate::core::Scalar;
use crate::core::wrappers::unpack_all;
use crate::error::VError;
use crate::parallel::{Comm, Packet, Request};
use log::{debug, trace};
use scatter::GhostPlan;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Process-local memory that several vectors may alias.
pub type SharedBuffer<T> = Rc<RefCell<Vec<T>>>;

enum Assembly {
    Local,
    Posted(Request, InsertMode),
}

struct Halo {
    request: Request,
    mode: InsertMode,
    direction: ScatterDirection,
}

pub struct RawVec<T: Scalar> {
    ctx: Rc<Context>,
    kind: VecKind,
    layout: Option<Layout>,
    block_size: usize,
    data: SharedBuffer<T>,
    ghost: Option<Rc<GhostPlan>>,
    stash: Vec<(usize, T)>,
    stash_mode: Option<InsertMode>,
    assembling: Option<Assembly>,
    halo: Option<Halo>,
}

pub(crate) fn combine<T: Scalar>(slot: &mut T, v: T, mode: InsertMode) {
    match mode {
        InsertMode::Insert => *slot = v,
        InsertMode::Add => *slot = *slot + v,
    }
}

fn busy(_: std::cell::BorrowError) -> VError {
    VError::Busy("local storage is borrowed for writing")
}

fn busy_mut(_: std::cell::BorrowMutError) -> VError {
    VError::Busy("local storage is already borrowed")
}

impl<T: Scalar> RawVec<T> {
    pub(crate) fn create(ctx: &Rc<Context>, kind: VecKind) -> Result<Self, VError> {
        ctx.ensure_live()?;
        Ok(Self {
            ctx: Rc::clone(ctx),
            kind,
            layout: None,
            block_size: ctx.options().block_size,
            data: Rc::new(RefCell::new(Vec::new())),
            ghost: None,
            stash: Vec::new(),
            stash_mode: None,
            assembling: None,
            halo: None,
        })
    }

    /// Distributed vector over caller-supplied local memory.
    pub(crate) fn wrap(
        ctx: &Rc<Context>,
        buffer: SharedBuffer<T>,
        global: Option<usize>,
    ) -> Result<Self, VError> {
        let mut raw = Self::create(ctx, VecKind::Standard)?;
        let local = buffer.try_borrow().map_err(busy)?.len();
        raw.layout = Some(Layout::negotiate(ctx.comm(), global, Some(local), raw.block_size)?);
        raw.data = buffer;
        debug!("wrapped local buffer of length {local} on rank {}", ctx.rank());
        Ok(raw)
    }

    /// Ghosted vector; `ghosts` are 0-based global point indices.
    pub(crate) fn create_ghost(
        ctx: &Rc<Context>,
        local: usize,
        global: Option<usize>,
        ghosts: Vec<usize>,
        bs: usize,
    ) -> Result<Self, VError> {
        let mut raw = Self::create(ctx, VecKind::Ghosted)?;
        raw.block_size = bs;
        let layout = Layout::negotiate(ctx.comm(), global, Some(local), bs)?;
        let plan = GhostPlan::build(ctx.comm(), &layout, ghosts)?;
        *raw.data.borrow_mut() = vec![T::zero(); layout.local() + plan.len()];
        debug!(
            "created ghosted vector: {} owned + {} ghost entries on rank {}",
            layout.local(),
            plan.len(),
            ctx.rank()
        );
        raw.layout = Some(layout);
        raw.ghost = Some(Rc::new(plan));
        Ok(raw)
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    pub fn kind(&self) -> VecKind {
        self.kind
    }

    pub fn is_sized(&self) -> bool {
        self.layout.is_some()
    }

    pub fn layout(&self) -> Result<&Layout, VError> {
        self.layout
            .as_ref()
            .ok_or_else(|| VError::Config("vector sizes have not been set".into()))
    }

    pub fn size(&self) -> Result<usize, VError> {
        Ok(self.layout()?.global())
    }

    pub fn local_size(&self) -> Result<usize, VError> {
        Ok(self.layout()?.local())
    }

    pub fn block_size(&self) -> usize {
        self.layout.as_ref().map_or(self.block_size, Layout::block_size)
    }

    pub(crate) fn ghost_plan(&self) -> Option<&GhostPlan> {
        self.ghost.as_deref()
    }

    pub(crate) fn storage(&self) -> &SharedBuffer<T> {
        &self.data
    }

    pub(crate) fn set_sizes(
        &mut self,
        global: Option<usize>,
        local: Option<usize>,
    ) -> Result<(), VError> {
        self.ctx.ensure_live()?;
        if let Some(layout) = &self.layout {
            let same = global.is_none_or(|n| n == layout.global())
                && local.is_none_or(|n| n == layout.local());
            return if same {
                Ok(())
            } else {
                Err(VError::Config(format!(
                    "vector sizes are already set (global {}, local {})",
                    layout.global(),
                    layout.local()
                )))
            };
        }
        let layout = match self.kind {
            VecKind::Sequential => {
                let n = match (global, local) {
                    (None, None) => {
                        return Err(VError::Config(
                            "cannot determine vector sizes: both global and local length are unspecified"
                                .into(),
                        ));
                    }
                    (Some(g), Some(l)) if g != l => {
                        return Err(VError::Resource(format!(
                            "sequential vector: local length {l} differs from global length {g}"
                        )));
                    }
                    (Some(n), _) | (_, Some(n)) => n,
                };
                Layout::sequential(n, self.block_size)?
            }
            _ => Layout::negotiate(self.ctx.comm(), global, local, self.block_size)?,
        };
        *self.data.try_borrow_mut().map_err(busy_mut)? = vec![T::zero(); layout.local()];
        debug!(
            "sized vector on rank {}: global {}, local {}, range {}..{}",
            self.ctx.rank(),
            layout.global(),
            layout.local(),
            layout.start(),
            layout.end()
        );
        self.layout = Some(layout);
        Ok(())
    }

    pub(crate) fn set_block_size(&mut self, bs: usize) -> Result<(), VError> {
        if bs == 0 {
            return Err(VError::Config("block size must be positive".into()));
        }
        if let Some(layout) = &self.layout {
            if self.ghost.is_some() && bs != layout.block_size() {
                return Err(VError::Unsupported("changing the block size of a ghosted vector"));
            }
            self.layout = Some(layout.with_block_size(bs)?);
        }
        self.block_size = bs;
        Ok(())
    }

    /// Same layout and ghost pattern, fresh zeroed storage.
    pub(crate) fn duplicate(&self) -> Result<Self, VError> {
        self.ctx.ensure_live()?;
        let len = self.layout()?.local() + self.ghost.as_ref().map_or(0, |g| g.len());
        Ok(Self {
            ctx: Rc::clone(&self.ctx),
            kind: self.kind,
            layout: self.layout.clone(),
            block_size: self.block_size,
            data: Rc::new(RefCell::new(vec![T::zero(); len])),
            ghost: self.ghost.clone(),
            stash: Vec::new(),
            stash_mode: None,
            assembling: None,
            halo: None,
        })
    }

    /// Sequential vector aliasing this vector's owned + ghost storage.
    pub(crate) fn local_form(&self) -> Result<Self, VError> {
        self.ctx.ensure_live()?;
        let plan = self
            .ghost
            .as_ref()
            .ok_or(VError::Unsupported("local form of a vector without ghosts"))?;
        let n = self.layout()?.local() + plan.len();
        Ok(Self {
            ctx: Rc::clone(&self.ctx),
            kind: VecKind::Sequential,
            layout: Some(Layout::sequential(n, self.block_size())?),
            block_size: self.block_size(),
            data: Rc::clone(&self.data),
            ghost: None,
            stash: Vec::new(),
            stash_mode: None,
            assembling: None,
            halo: None,
        })
    }

    // ---- storage access ----

    fn checked_len(&self, with_ghosts: bool, available: usize) -> Result<usize, VError> {
        let layout = self.layout()?;
        let n = layout.local() + if with_ghosts { self.ghost.as_ref().map_or(0, |g| g.len()) } else { 0 };
        if available < n {
            return Err(VError::Resource(format!(
                "backing buffer holds {available} entries but the layout needs {n}"
            )));
        }
        Ok(n)
    }

    /// Owned entries, read-only.
    pub fn read(&self) -> Result<Ref<'_, [T]>, VError> {
        let data = self.data.try_borrow().map_err(busy)?;
        let n = self.checked_len(false, data.len())?;
        Ok(Ref::map(data, |d| &d[..n]))
    }

    pub(crate) fn write(&self) -> Result<RefMut<'_, [T]>, VError> {
        let data = self.data.try_borrow_mut().map_err(busy_mut)?;
        let n = self.checked_len(false, data.len())?;
        Ok(RefMut::map(data, |d| &mut d[..n]))
    }

    fn write_with_ghosts(&self) -> Result<RefMut<'_, [T]>, VError> {
        let data = self.data.try_borrow_mut().map_err(busy_mut)?;
        let n = self.checked_len(true, data.len())?;
        Ok(RefMut::map(data, |d| &mut d[..n]))
    }

    fn read_with_ghosts(&self) -> Result<Ref<'_, [T]>, VError> {
        let data = self.data.try_borrow().map_err(busy)?;
        let n = self.checked_len(true, data.len())?;
        Ok(Ref::map(data, |d| &d[..n]))
    }

    // ---- reductions scoped by vector kind ----

    pub(crate) fn reduce_sum(&self, x: f64) -> f64 {
        match self.kind {
            VecKind::Sequential => x,
            _ => self.ctx.comm().all_reduce(x),
        }
    }

    pub(crate) fn reduce_max(&self, x: f64) -> f64 {
        match self.kind {
            VecKind::Sequential => x,
            _ => self.ctx.comm().all_reduce_max(x),
        }
    }

    pub(crate) fn reduce_min(&self, x: f64) -> f64 {
        match self.kind {
            VecKind::Sequential => x,
            _ => self.ctx.comm().all_reduce_min(x),
        }
    }

    pub(crate) fn reduce_sum_vec(&self, local: &mut [f64]) {
        if self.kind != VecKind::Sequential {
            self.ctx.comm().all_reduce_sum_vec(local);
        }
    }

    pub(crate) fn reduce_and(&self, flag: bool) -> bool {
        match self.kind {
            VecKind::Sequential => flag,
            _ => self.ctx.comm().all_reduce_and(flag),
        }
    }

    /// Agree on a local precondition before anything is exchanged. A process
    /// that failed keeps its own error; the others get `NotAssembled` or a
    /// `Config` error naming the remote failure, so no process is left
    /// waiting in the exchange that follows.
    pub(crate) fn agree(&self, local: Result<(), VError>) -> Result<(), VError> {
        if self.kind == VecKind::Sequential {
            return local;
        }
        let code = match &local {
            Ok(()) => 0.0,
            Err(VError::NotAssembled) => 1.0,
            Err(_) => 2.0,
        };
        let worst = self.ctx.comm().all_reduce_max(code);
        match local {
            Err(e) => Err(e),
            Ok(()) if worst < 0.5 => Ok(()),
            Ok(()) if worst < 1.5 => Err(VError::NotAssembled),
            Ok(()) => Err(VError::Config(format!(
                "operation rejected on another process (rank {} was ready)",
                self.ctx.rank()
            ))),
        }
    }

    // ---- staged writes ----

    fn admit_mode(&self, mode: InsertMode) -> Result<(), VError> {
        if self.assembling.is_some() {
            return Err(VError::Config("cannot stage values while an assembly is in progress".into()));
        }
        match self.stash_mode {
            Some(m) if m != mode => Err(VError::Config(format!(
                "cannot mix {m:?} and {mode:?} without an intervening assembly"
            ))),
            _ => Ok(()),
        }
    }

    /// Stage `vals` at 0-based global `idx`. Owned entries are written
    /// immediately, the rest wait in the stash for assembly.
    pub(crate) fn set_values(
        &mut self,
        idx: &[usize],
        vals: &[T],
        mode: InsertMode,
    ) -> Result<(), VError> {
        self.ctx.ensure_live()?;
        if idx.len() != vals.len() {
            return Err(VError::Config(format!(
                "{} indices but {} values",
                idx.len(),
                vals.len()
            )));
        }
        self.admit_mode(mode)?;
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| VError::Config("vector sizes have not been set".into()))?;
        if let Some(&g) = idx.iter().find(|&&g| g >= layout.global()) {
            return Err(VError::Config(format!(
                "index {g} out of range for vector of length {}",
                layout.global()
            )));
        }
        let start = layout.start();
        let mut data = self.data.try_borrow_mut().map_err(busy_mut)?;
        for (&g, &v) in idx.iter().zip(vals) {
            if layout.owns(g) {
                combine(&mut data[g - start], v, mode);
            } else {
                self.stash.push((g, v));
            }
        }
        self.stash_mode = Some(mode);
        Ok(())
    }

    pub(crate) fn set_values_blocked(
        &mut self,
        idx: &[usize],
        vals: &[T],
        mode: InsertMode,
    ) -> Result<(), VError> {
        let bs = self.block_size();
        if vals.len() != idx.len() * bs {
            return Err(VError::Config(format!(
                "{} blocks of size {bs} need {} values, got {}",
                idx.len(),
                idx.len() * bs,
                vals.len()
            )));
        }
        let points: Vec<usize> = idx.iter().flat_map(|&b| (0..bs).map(move |k| b * bs + k)).collect();
        self.set_values(&points, vals, mode)
    }

    /// Translate a local index (owned entries first, then ghosts) to global.
    fn local_to_global(&self, i: usize) -> Result<usize, VError> {
        let layout = self.layout()?;
        if i < layout.local() {
            return Ok(layout.start() + i);
        }
        self.ghost
            .as_ref()
            .and_then(|plan| plan.ghosts().get(i - layout.local()).copied())
            .ok_or_else(|| {
                VError::Config(format!("local index {i} has no global counterpart"))
            })
    }

    pub(crate) fn set_values_local(
        &mut self,
        idx: &[usize],
        vals: &[T],
        mode: InsertMode,
    ) -> Result<(), VError> {
        let global = idx
            .iter()
            .map(|&i| self.local_to_global(i))
            .collect::<Result<Vec<_>, _>>()?;
        self.set_values(&global, vals, mode)
    }

    pub(crate) fn set_values_blocked_local(
        &mut self,
        idx: &[usize],
        vals: &[T],
        mode: InsertMode,
    ) -> Result<(), VError> {
        let bs = self.block_size();
        if vals.len() != idx.len() * bs {
            return Err(VError::Config(format!(
                "{} blocks of size {bs} need {} values, got {}",
                idx.len(),
                idx.len() * bs,
                vals.len()
            )));
        }
        let points: Vec<usize> = idx.iter().flat_map(|&b| (0..bs).map(move |k| b * bs + k)).collect();
        self.set_values_local(&points, vals, mode)
    }

    /// Read 0-based global entries held by this process (owned or ghost).
    pub fn get_values(&self, idx: &[usize]) -> Result<Vec<T>, VError> {
        let layout = self.layout()?;
        let data = self.read_with_ghosts()?;
        idx.iter()
            .map(|&g| {
                if layout.owns(g) {
                    Ok(data[g - layout.start()])
                } else if let Some(pos) = self.ghost.as_ref().and_then(|p| p.position(g)) {
                    Ok(data[pos])
                } else {
                    Err(VError::Resource(format!(
                        "index {g} is neither owned by nor ghosted on rank {}; only local values can be read",
                        self.ctx.rank()
                    )))
                }
            })
            .collect()
    }

    // ---- assembly ----

    pub(crate) fn assembly_begin(&mut self) -> Result<(), VError> {
        self.ctx.ensure_live()?;
        if self.assembling.is_some() {
            return Err(VError::Config("assembly already in progress".into()));
        }
        if self.kind == VecKind::Sequential {
            self.assembling = Some(Assembly::Local);
            return Ok(());
        }
        let layout = self.layout()?.clone();
        let comm = self.ctx.comm();

        // agree on the insert mode before anything moves
        let mut modes = [0.0, 0.0];
        match self.stash_mode {
            Some(InsertMode::Insert) => modes[0] = 1.0,
            Some(InsertMode::Add) => modes[1] = 1.0,
            None => {}
        }
        comm.all_reduce_sum_vec(&mut modes);
        if modes[0] > 0.0 && modes[1] > 0.0 {
            return Err(VError::Config(
                "processes staged values with different insert modes".into(),
            ));
        }
        let mode = if modes[1] > 0.0 { InsertMode::Add } else { InsertMode::Insert };

        let mut sends = vec![Packet::default(); comm.size()];
        for (g, v) in self.stash.drain(..) {
            let owner = layout.owner(g).ok_or_else(|| {
                VError::Resource(format!("stashed index {g} is outside the layout"))
            })?;
            sends[owner].indices.push(g);
            v.pack(&mut sends[owner].values);
        }
        trace!(
            "assembly begin on rank {}: {} off-process entries",
            comm.rank(),
            sends.iter().map(|p| p.indices.len()).sum::<usize>()
        );
        self.assembling = Some(Assembly::Posted(comm.post(sends), mode));
        Ok(())
    }

    pub(crate) fn assembly_end(&mut self) -> Result<(), VError> {
        self.ctx.ensure_live()?;
        let pending = self
            .assembling
            .take()
            .ok_or_else(|| VError::Config("assembly_end called without assembly_begin".into()))?;
        if let Assembly::Posted(request, mode) = pending {
            // a busy buffer keeps the request pending so the call can be retried
            let mut data = match self.data.try_borrow_mut() {
                Ok(data) => data,
                Err(e) => {
                    self.assembling = Some(Assembly::Posted(request, mode));
                    return Err(busy_mut(e));
                }
            };
            let layout = self
                .layout
                .as_ref()
                .ok_or_else(|| VError::Config("vector sizes have not been set".into()))?;
            let received = self.ctx.comm().wait(request);
            for (src, packet) in received.into_iter().enumerate() {
                let vals: Vec<T> = unpack_all(&packet.values);
                for (&g, v) in packet.indices.iter().zip(vals) {
                    if !layout.owns(g) {
                        return Err(VError::Resource(format!(
                            "rank {src} sent index {g} which rank {} does not own",
                            self.ctx.rank()
                        )));
                    }
                    combine(&mut data[g - layout.start()], v, mode);
                }
            }
            trace!("assembly end on rank {}", self.ctx.rank());
        }
        self.stash_mode = None;
        Ok(())
    }

    // ---- ghost exchange ----

    /// Local conditions for posting a halo exchange.
    pub(crate) fn halo_ready(&self) -> Result<(), VError> {
        self.ctx.ensure_live()?;
        if self.halo.is_some() {
            return Err(VError::Config("a halo exchange is already in progress".into()));
        }
        if self.ghost.is_none() {
            return Err(VError::Unsupported("halo exchange on a vector without ghosts"));
        }
        self.read_with_ghosts().map(drop)
    }

    pub(crate) fn ghost_update_begin(
        &mut self,
        mode: InsertMode,
        direction: ScatterDirection,
    ) -> Result<(), VError> {
        self.halo_ready()?;
        let plan = self
            .ghost
            .as_ref()
            .ok_or(VError::Unsupported("halo exchange on a vector without ghosts"))?;
        let request = {
            let data = self.read_with_ghosts()?;
            plan.begin(self.ctx.comm(), &data, direction)
        };
        trace!("ghost update begin ({mode:?}, {direction:?}) on rank {}", self.ctx.rank());
        self.halo = Some(Halo { request, mode, direction });
        Ok(())
    }

    pub(crate) fn ghost_update_end(
        &mut self,
        mode: InsertMode,
        direction: ScatterDirection,
    ) -> Result<(), VError> {
        self.ctx.ensure_live()?;
        let halo = self
            .halo
            .take()
            .ok_or_else(|| VError::Config("ghost_end called without ghost_begin".into()))?;
        if halo.mode != mode || halo.direction != direction {
            let err = VError::Config(format!(
                "ghost_end({mode:?}, {direction:?}) does not match ghost_begin({:?}, {:?})",
                halo.mode, halo.direction
            ));
            self.halo = Some(halo);
            return Err(err);
        }
        let plan = self
            .ghost
            .clone()
            .ok_or(VError::Unsupported("halo exchange on a vector without ghosts"))?;
        // a busy buffer keeps the exchange pending so the call can be retried
        if let Err(e) = self.data.try_borrow_mut() {
            self.halo = Some(halo);
            return Err(busy_mut(e));
        }
        let mut data = self.write_with_ghosts()?;
        plan.end(self.ctx.comm(), halo.request, &mut data, mode, direction)?;
        trace!("ghost update end ({mode:?}, {direction:?}) on rank {}", self.ctx.rank());
        Ok(())
    }

    pub(crate) fn has_pending_exchange(&self) -> bool {
        self.assembling.is_some() || self.halo.is_some()
    }
}
