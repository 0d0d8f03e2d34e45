//! Process-wide runtime context.
//!
//! A [`Context`] owns the communicator and the default [`VecOptions`] for one
//! process, and is the explicit init/teardown point for the numerical runtime.
//! Every vector keeps an `Rc<Context>`; once [`Context::finalize`] has run, new
//! vectors cannot be created, operations on surviving vectors fail with
//! [`VError::RuntimeFinalized`], and cleanup paths (vector release, view
//! release) degrade to no-ops.
//!
//! The context also hosts a lazily built, type-indexed table of "null" vectors:
//! one finalized sentinel per element type, shared by every caller that needs a
//! placeholder vector.
//!
//! # Example
//! ```rust
//! use ghostvec::{Context, UniverseComm, Vector};
//! let ctx = Context::new(UniverseComm::Serial);
//! let mut v = Vector::<f64>::with_sizes(&ctx, Some(4), None, 1).unwrap();
//! v.fill(1.0).unwrap();
//! assert_eq!(v.sum().unwrap(), 4.0);
//! ctx.finalize();
//! ```

use crate::config::VecOptions;
use crate::core::Scalar;
use crate::error::VError;
use crate::parallel::{Comm, UniverseComm};
use crate::vector::Vector;
use log::debug;
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

pub struct Context {
    comm: UniverseComm,
    options: VecOptions,
    finalized: Cell<bool>,
    nulls: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl Context {
    pub fn new(comm: UniverseComm) -> Rc<Self> {
        Self::with_options(comm, VecOptions::default())
    }

    pub fn with_options(comm: UniverseComm, options: VecOptions) -> Rc<Self> {
        debug!("context initialized on rank {} of {}", comm.rank(), comm.size());
        Rc::new(Self {
            comm,
            options,
            finalized: Cell::new(false),
            nulls: RefCell::new(HashMap::new()),
        })
    }

    pub fn comm(&self) -> &UniverseComm {
        &self.comm
    }

    pub fn options(&self) -> &VecOptions {
        &self.options
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Begin runtime shutdown. Idempotent.
    pub fn finalize(&self) {
        if self.finalized.replace(true) {
            return;
        }
        self.nulls.borrow_mut().clear();
        debug!("context finalized on rank {}", self.comm.rank());
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.get()
    }

    pub(crate) fn ensure_live(&self) -> Result<(), VError> {
        if self.is_finalized() { Err(VError::RuntimeFinalized) } else { Ok(()) }
    }

    /// The shared finalized sentinel for element type `T`.
    pub fn null_vector<T: Scalar>(&self) -> Rc<Vector<T>> {
        let mut table = self.nulls.borrow_mut();
        let entry = table
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Rc::new(Rc::new(Vector::<T>::null())) as Rc<dyn Any>);
        match entry.downcast_ref::<Rc<Vector<T>>>() {
            Some(v) => Rc::clone(v),
            None => Rc::new(Vector::null()),
        }
    }
}
