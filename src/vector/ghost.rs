//! Ghosted vectors, their local forms and halo exchange.
//!
//! A [`GhostVector`] stores `local + ghost_count` entries per process: the
//! owned entries followed by copies of remote entries in the order their
//! indices were supplied. [`GhostVector::local_form`] presents that whole
//! buffer as a sequential vector. The form borrows the ghost vector, so the
//! parent cannot be released, resized or exchanged while a form is alive.

use crate::config::{InsertMode, ScatterDirection, VecFlags};
use crate::context::Context;
use crate::core::Scalar;
use crate::error::VError;
use crate::resource::RawVec;
use crate::vector::{AuxData, Vector};
use log::debug;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

pub struct GhostVector<T: Scalar> {
    inner: Vector<T>,
}

impl<T: Scalar> GhostVector<T> {
    /// Create a ghosted vector. Collective.
    ///
    /// `ghosts` are 1-based global indices of entries owned elsewhere; with
    /// `bs > 1` they are 1-based block indices and each names `bs` entries.
    pub fn new(
        ctx: &Rc<Context>,
        local: usize,
        ghosts: &[usize],
        global: Option<usize>,
        bs: usize,
    ) -> Result<Self, VError> {
        if bs == 0 {
            return Err(VError::Config("unsupported block size 0 for a ghosted vector".into()));
        }
        // index 0 maps past the end so the collective range check rejects it everywhere
        let points = ghosts
            .iter()
            .flat_map(|&b| {
                let base = b.checked_sub(1).map(|b| b * bs);
                (0..bs).map(move |k| base.map_or(usize::MAX, |base| base + k))
            })
            .collect();
        let raw = RawVec::create_ghost(ctx, local, global, points, bs)?;
        Ok(Self { inner: Vector::from_raw(raw) })
    }

    /// Same layout and ghost pattern, zeroed.
    pub fn duplicate(&self) -> Result<Self, VError> {
        Ok(Self { inner: self.inner.duplicate()? })
    }

    /// 1-based global indices of the ghost entries, in storage order.
    pub fn ghost_indices(&self) -> Result<Vec<usize>, VError> {
        let plan = self.plan()?;
        Ok(plan.ghosts().iter().map(|g| g + 1).collect())
    }

    pub fn ghost_count(&self) -> Result<usize, VError> {
        Ok(self.plan()?.len())
    }

    fn plan(&self) -> Result<&crate::resource::scatter::GhostPlan, VError> {
        self.inner
            .raw()?
            .ghost_plan()
            .ok_or_else(|| VError::Resource("ghosted vector lost its scatter plan".into()))
    }

    /// Sequential view of the owned and ghost entries, aliasing this vector.
    pub fn local_form(&self) -> Result<LocalForm<'_, T>, VError> {
        let raw = self.inner.raw()?;
        let storage = Rc::clone(raw.storage());
        let mut form = Vector::from_raw(raw.local_form()?);
        form.flags = VecFlags::LOCAL_FORM | VecFlags::ASSEMBLED;
        form.aux = Some(storage as AuxData);
        debug!("local form taken on rank {}", raw.context().rank());
        Ok(LocalForm { form, parent: self })
    }

    /// Give a local form back. It must have come from this vector.
    pub fn restore_local_form(&self, form: LocalForm<'_, T>) -> Result<(), VError> {
        if !std::ptr::eq(form.parent, self) {
            return Err(VError::Config("local form belongs to a different ghost vector".into()));
        }
        form.restore();
        Ok(())
    }

    /// Start a halo exchange. Forward copies owners to ghosts; reverse
    /// combines ghosts into owners.
    pub fn ghost_begin(&mut self, mode: InsertMode, direction: ScatterDirection) -> Result<(), VError> {
        let local = self.halo_check();
        self.inner.raw()?.agree(local)?;
        self.inner.raw_mut()?.ghost_update_begin(mode, direction)
    }

    /// Local conditions for `ghost_begin`, before any process agrees on them.
    fn halo_check(&self) -> Result<(), VError> {
        let raw = self.inner.raw()?;
        if !self.inner.flags.contains(VecFlags::ASSEMBLED) {
            return Err(VError::NotAssembled);
        }
        raw.halo_ready()
    }

    /// Finish the exchange started by a matching `ghost_begin`.
    pub fn ghost_end(&mut self, mode: InsertMode, direction: ScatterDirection) -> Result<(), VError> {
        self.inner.raw_mut()?.ghost_update_end(mode, direction)
    }

    pub fn scatter(&mut self, mode: InsertMode, direction: ScatterDirection) -> Result<(), VError> {
        self.ghost_begin(mode, direction)?;
        self.ghost_end(mode, direction)
    }
}

/// Exchange ghosts of several vectors: every `ghost_begin` is issued before
/// any `ghost_end`, so the transfers overlap. Collective.
///
/// Every vector is checked, on every process, before the first exchange is
/// posted; if any of them cannot start, none does.
pub fn ghost_update<T: Scalar>(
    vectors: &mut [&mut GhostVector<T>],
    mode: InsertMode,
    direction: ScatterDirection,
) -> Result<(), VError> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let local = vectors.iter().try_for_each(|v| v.halo_check());
    first.inner.raw()?.agree(local)?;
    for v in vectors.iter_mut() {
        v.inner.raw_mut()?.ghost_update_begin(mode, direction)?;
    }
    for v in vectors.iter_mut() {
        v.ghost_end(mode, direction)?;
    }
    Ok(())
}

impl<T: Scalar> Deref for GhostVector<T> {
    type Target = Vector<T>;
    fn deref(&self) -> &Vector<T> {
        &self.inner
    }
}

impl<T: Scalar> DerefMut for GhostVector<T> {
    fn deref_mut(&mut self) -> &mut Vector<T> {
        &mut self.inner
    }
}

/// A ghost vector's owned and ghost entries as one sequential vector.
///
/// Restored when dropped.
pub struct LocalForm<'a, T: Scalar> {
    form: Vector<T>,
    parent: &'a GhostVector<T>,
}

impl<'a, T: Scalar> LocalForm<'a, T> {
    pub fn parent(&self) -> &'a GhostVector<T> {
        self.parent
    }

    pub fn restore(self) {}
}

impl<T: Scalar> Deref for LocalForm<'_, T> {
    type Target = Vector<T>;
    fn deref(&self) -> &Vector<T> {
        &self.form
    }
}

impl<T: Scalar> DerefMut for LocalForm<'_, T> {
    fn deref_mut(&mut self) -> &mut Vector<T> {
        &mut self.form
    }
}

impl<T: Scalar> Drop for LocalForm<'_, T> {
    fn drop(&mut self) {
        self.form.release_handle();
        if let Ok(ctx) = self.parent.context() {
            debug!("local form restored on rank {}", ctx.rank());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::UniverseComm;

    #[test]
    fn serial_ghost_vector_has_no_ghosts() {
        let ctx = Context::new(UniverseComm::Serial);
        let mut g = GhostVector::<f64>::new(&ctx, 3, &[], None, 1).unwrap();
        assert_eq!(g.ghost_count().unwrap(), 0);
        g.fill(2.0).unwrap();
        g.scatter(InsertMode::Insert, ScatterDirection::Forward).unwrap();
        let form = g.local_form().unwrap();
        assert_eq!(form.local_len().unwrap(), 3);
        assert_eq!(form.get(1).unwrap(), 2.0);
        g.restore_local_form(form).unwrap();
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let ctx = Context::new(UniverseComm::Serial);
        assert!(matches!(GhostVector::<f64>::new(&ctx, 2, &[], None, 0), Err(VError::Config(_))));
    }

    #[test]
    fn local_form_cannot_be_released_directly() {
        let ctx = Context::new(UniverseComm::Serial);
        let g = GhostVector::<f64>::new(&ctx, 2, &[], None, 1).unwrap();
        let mut form = g.local_form().unwrap();
        assert!(matches!(form.release(), Err(VError::Config(_))));
        assert!(!form.is_finalized());
        form.restore();
        assert!(!g.is_finalized());
    }
}
