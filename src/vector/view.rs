//! Scoped access to a vector's process-local memory.
//!
//! A [`LocalView`] holds a borrow of the vector's buffer. Any number of
//! read-only views may coexist; a read-write view is exclusive, and asking for
//! a second one fails with [`VError::Busy`] instead of handing out two
//! aliasing mutable slices. Views are released explicitly or when dropped.

use crate::config::AccessMode;
use crate::core::Scalar;
use crate::error::VError;
use crate::vector::Vector;
use std::cell::{Ref, RefMut};
use std::ops::{Index, IndexMut};

enum Access<'a, T> {
    Read(Ref<'a, [T]>),
    Write(RefMut<'a, [T]>),
}

pub struct LocalView<'a, T: Scalar> {
    access: Option<Access<'a, T>>,
    mode: AccessMode,
}

impl<'a, T: Scalar> LocalView<'a, T> {
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_released(&self) -> bool {
        self.access.is_none()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The borrowed entries; empty once released.
    pub fn as_slice(&self) -> &[T] {
        match &self.access {
            Some(Access::Read(r)) => &**r,
            Some(Access::Write(w)) => &**w,
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [T], VError> {
        match &mut self.access {
            Some(Access::Write(w)) => Ok(&mut **w),
            Some(Access::Read(_)) => Err(VError::Config("local view is read-only".into())),
            None => Err(VError::Config("local view has been released".into())),
        }
    }

    pub fn get(&self, i: usize) -> Result<T, VError> {
        if self.is_released() {
            return Err(VError::Config("local view has been released".into()));
        }
        let s = self.as_slice();
        s.get(i).copied().ok_or(VError::OutOfBounds { index: i, len: s.len() })
    }

    pub fn set(&mut self, i: usize, value: T) -> Result<(), VError> {
        let s = self.as_mut_slice()?;
        let len = s.len();
        let slot = s.get_mut(i).ok_or(VError::OutOfBounds { index: i, len })?;
        *slot = value;
        Ok(())
    }

    /// Drop the borrow. Idempotent.
    pub fn release(&mut self) {
        self.access = None;
    }
}

impl<T: Scalar> Index<usize> for LocalView<'_, T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        &self.as_slice()[i]
    }
}

/// # Panics
/// On a read-only or released view, or an index out of range.
impl<T: Scalar> IndexMut<usize> for LocalView<'_, T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        match self.as_mut_slice() {
            Ok(s) => &mut s[i],
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T: Scalar> Vector<T> {
    /// Borrow the local entries (owned entries; for a local form, owned and
    /// ghost entries).
    pub fn borrow_local(&self, mode: AccessMode) -> Result<LocalView<'_, T>, VError> {
        let raw = self.raw()?;
        let access = match mode {
            AccessMode::ReadOnly => Access::Read(raw.read()?),
            AccessMode::ReadWrite => Access::Write(raw.write()?),
        };
        Ok(LocalView { access: Some(access), mode })
    }

    pub fn read_local(&self) -> Result<LocalView<'_, T>, VError> {
        self.borrow_local(AccessMode::ReadOnly)
    }

    pub fn write_local(&self) -> Result<LocalView<'_, T>, VError> {
        self.borrow_local(AccessMode::ReadWrite)
    }

    /// `self[i] = f(&[s[i] for s in sources])` over the local entries.
    ///
    /// Every source must start at the same global index as `self` and hold no
    /// more local entries; the map covers the shortest local length among
    /// `self` and the sources.
    pub fn map_from<F>(&mut self, sources: &[&Vector<T>], mut f: F) -> Result<(), VError>
    where
        F: FnMut(&[T]) -> T,
    {
        if sources.is_empty() {
            return Err(VError::Config("map needs at least one source vector".into()));
        }
        let dest = self.assembled()?.layout()?.clone();
        let mut n = dest.local();
        for src in sources {
            let layout = src.assembled()?.layout()?;
            if layout.local() > dest.local() {
                return Err(VError::Config(format!(
                    "source has {} local entries, destination only {}",
                    layout.local(),
                    dest.local()
                )));
            }
            if layout.start() != dest.start() {
                return Err(VError::Config(format!(
                    "source local range starts at {}, destination at {}",
                    layout.start() + 1,
                    dest.start() + 1
                )));
            }
            n = n.min(layout.local());
        }

        let views = sources.iter().map(|s| s.read_local()).collect::<Result<Vec<_>, _>>()?;
        let mut out = self.write_local()?;
        let mut args = Vec::with_capacity(views.len());
        let dst = out.as_mut_slice()?;
        for (i, slot) in dst.iter_mut().enumerate().take(n) {
            args.clear();
            args.extend(views.iter().map(|v| v.as_slice()[i]));
            *slot = f(&args);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::parallel::UniverseComm;

    #[test]
    fn views_follow_borrow_rules() {
        let ctx = Context::new(UniverseComm::Serial);
        let v = Vector::<f64>::with_sizes(&ctx, Some(3), None, 1).unwrap();
        let mut w = v.write_local().unwrap();
        assert!(matches!(v.write_local(), Err(VError::Busy(_))));
        assert!(matches!(v.read_local(), Err(VError::Busy(_))));
        w[1] = 5.0;
        assert!(matches!(w.set(3, 1.0), Err(VError::OutOfBounds { index: 3, len: 3 })));
        w.release();
        w.release();
        assert!(w.is_released());

        let r1 = v.read_local().unwrap();
        let mut r2 = v.read_local().unwrap();
        assert_eq!(r1[1], 5.0);
        assert!(matches!(r2.set(0, 1.0), Err(VError::Config(_))));
        assert!(matches!(v.write_local(), Err(VError::Busy(_))));
    }

    #[test]
    fn map_covers_the_shortest_range() {
        let ctx = Context::new(UniverseComm::Serial);
        let mut dest = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        let mut a = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
        let b = Vector::<f64>::with_sizes(&ctx, Some(2), None, 1).unwrap();
        a.fill(3.0).unwrap();
        dest.fill(-1.0).unwrap();
        dest.map_from(&[&a, &b], |xs| xs[0] + xs[1] + 1.0).unwrap();
        assert_eq!(dest.to_global_vec().unwrap(), vec![4.0, 4.0, -1.0, -1.0]);
        assert!(matches!(dest.map_from(&[], |_| 0.0), Err(VError::Config(_))));
    }

    #[test]
    fn map_rejects_longer_sources() {
        let ctx = Context::new(UniverseComm::Serial);
        let mut dest = Vector::<f64>::with_sizes(&ctx, Some(2), None, 1).unwrap();
        let a = Vector::<f64>::with_sizes(&ctx, Some(3), None, 1).unwrap();
        assert!(matches!(dest.map_from(&[&a], |xs| xs[0]), Err(VError::Config(_))));
    }
}
