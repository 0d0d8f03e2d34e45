//! Elementwise kernels and reductions on the owned part of a vector.
//!
//! Local loops run on rayon parallel iterators when the `rayon` feature is
//! enabled. Global reductions combine the local partial results through the
//! communicator (or not at all for sequential vectors). Ghost slots are never
//! touched here.

use crate::config::{NormType, VecKind};
use crate::core::Scalar;
use crate::core::wrappers::{pack_all, unpack_all};
use crate::error::VError;
use crate::parallel::{Comm, Packet};
use crate::resource::RawVec;
use num_traits::{Float, FromPrimitive, ToPrimitive, Zero};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Pointwise binary operations producing a new vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointwiseOp {
    Max,
    Min,
    MaxAbs,
    Mult,
    Divide,
    Pow,
}

impl PointwiseOp {
    fn apply<T: Scalar>(self, a: T, b: T) -> T {
        match self {
            PointwiseOp::Max => if b.re() > a.re() { b } else { a },
            PointwiseOp::Min => if b.re() < a.re() { b } else { a },
            PointwiseOp::MaxAbs => {
                T::from_real(if b.modulus() > a.modulus() { b.modulus() } else { a.modulus() })
            }
            PointwiseOp::Mult => a * b,
            PointwiseOp::Divide => a / b,
            PointwiseOp::Pow => a.pow(b),
        }
    }
}

pub(crate) fn to_f64<R: ToPrimitive>(r: R) -> f64 {
    r.to_f64().unwrap_or(f64::NAN)
}

pub(crate) fn from_f64<R: FromPrimitive + Float>(x: f64) -> R {
    R::from_f64(x).unwrap_or_else(R::nan)
}

fn map_in_place<T: Scalar>(y: &mut [T], f: impl Fn(T) -> T + Sync + Send) {
    #[cfg(feature = "rayon")]
    {
        y.par_iter_mut().for_each(|yi| *yi = f(*yi));
    }
    #[cfg(not(feature = "rayon"))]
    {
        y.iter_mut().for_each(|yi| *yi = f(*yi));
    }
}

fn zip_in_place<T: Scalar>(y: &mut [T], x: &[T], f: impl Fn(T, T) -> T + Sync + Send) {
    #[cfg(feature = "rayon")]
    {
        y.par_iter_mut().zip(x.par_iter()).for_each(|(yi, xi)| *yi = f(*yi, *xi));
    }
    #[cfg(not(feature = "rayon"))]
    {
        y.iter_mut().zip(x.iter()).for_each(|(yi, xi)| *yi = f(*yi, *xi));
    }
}

fn zip3_in_place<T: Scalar>(w: &mut [T], x: &[T], y: &[T], f: impl Fn(T, T, T) -> T + Sync + Send) {
    #[cfg(feature = "rayon")]
    {
        w.par_iter_mut()
            .zip(x.par_iter().zip(y.par_iter()))
            .for_each(|(wi, (xi, yi))| *wi = f(*wi, *xi, *yi));
    }
    #[cfg(not(feature = "rayon"))]
    {
        w.iter_mut()
            .zip(x.iter().zip(y.iter()))
            .for_each(|(wi, (xi, yi))| *wi = f(*wi, *xi, *yi));
    }
}

fn sum_of<T: Scalar, R>(x: &[T], f: impl Fn(T) -> R + Sync + Send) -> R
where
    R: Zero + Copy + Send,
{
    #[cfg(feature = "rayon")]
    {
        x.par_iter().map(|xi| f(*xi)).reduce(R::zero, |a, b| a + b)
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter().map(|xi| f(*xi)).fold(R::zero(), |a, b| a + b)
    }
}

fn sum_of_pairs<T: Scalar>(x: &[T], y: &[T], f: impl Fn(T, T) -> T + Sync + Send) -> T {
    #[cfg(feature = "rayon")]
    {
        x.par_iter().zip(y.par_iter()).map(|(a, b)| f(*a, *b)).reduce(T::zero, |a, b| a + b)
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter().zip(y.iter()).map(|(a, b)| f(*a, *b)).fold(T::zero(), |a, b| a + b)
    }
}

impl<T: Scalar> RawVec<T> {
    pub(crate) fn check_compatible(&self, other: &RawVec<T>) -> Result<(), VError> {
        let (a, b) = (self.layout()?, other.layout()?);
        if a.global() != b.global() || a.local() != b.local() {
            return Err(VError::Config(format!(
                "incompatible vector layouts: global {} / local {} vs global {} / local {}",
                a.global(),
                a.local(),
                b.global(),
                b.local()
            )));
        }
        Ok(())
    }

    pub(crate) fn map_values(&mut self, f: impl Fn(T) -> T + Sync + Send) -> Result<(), VError> {
        self.context().ensure_live()?;
        map_in_place(&mut self.write()?, f);
        Ok(())
    }

    pub(crate) fn fill(&mut self, s: T) -> Result<(), VError> {
        self.map_values(move |_| s)
    }

    pub(crate) fn chop(&mut self, tol: T::Real) -> Result<(), VError> {
        self.map_values(move |v| if v.modulus() < tol { T::zero() } else { v })
    }

    pub(crate) fn reciprocal(&mut self) -> Result<(), VError> {
        self.map_values(|v| if v == T::zero() { v } else { T::one() / v })
    }

    pub(crate) fn copy_from(&mut self, x: &RawVec<T>) -> Result<(), VError> {
        self.check_compatible(x)?;
        self.write()?.copy_from_slice(&x.read()?);
        Ok(())
    }

    pub(crate) fn swap_values(&mut self, other: &mut RawVec<T>) -> Result<(), VError> {
        self.check_compatible(other)?;
        self.write()?.swap_with_slice(&mut other.write()?);
        Ok(())
    }

    /// `self = f(self, x)` elementwise.
    pub(crate) fn zip_with(
        &mut self,
        x: &RawVec<T>,
        f: impl Fn(T, T) -> T + Sync + Send,
    ) -> Result<(), VError> {
        self.context().ensure_live()?;
        self.check_compatible(x)?;
        let xs = x.read()?;
        zip_in_place(&mut self.write()?, &xs, f);
        Ok(())
    }

    /// `self = f(self, x, y)` elementwise.
    pub(crate) fn zip3_with(
        &mut self,
        x: &RawVec<T>,
        y: &RawVec<T>,
        f: impl Fn(T, T, T) -> T + Sync + Send,
    ) -> Result<(), VError> {
        self.context().ensure_live()?;
        self.check_compatible(x)?;
        self.check_compatible(y)?;
        let (xs, ys) = (x.read()?, y.read()?);
        zip3_in_place(&mut self.write()?, &xs, &ys, f);
        Ok(())
    }

    /// `self += Σ alphas[k] * xs[k]`.
    pub(crate) fn maxpy(&mut self, alphas: &[T], xs: &[&RawVec<T>]) -> Result<(), VError> {
        if alphas.len() != xs.len() {
            return Err(VError::Config(format!(
                "{} coefficients for {} vectors",
                alphas.len(),
                xs.len()
            )));
        }
        for (&alpha, x) in alphas.iter().zip(xs) {
            self.zip_with(x, move |y, x| y + alpha * x)?;
        }
        Ok(())
    }

    pub(crate) fn pointwise(&mut self, op: PointwiseOp, x: &RawVec<T>, y: &RawVec<T>) -> Result<(), VError> {
        self.zip3_with(x, y, move |_, a, b| op.apply(a, b))
    }

    // ---- reductions ----

    pub(crate) fn norm(&self, kind: NormType) -> Result<T::Real, VError> {
        self.context().ensure_live()?;
        let xs = self.read()?;
        let global = match kind {
            NormType::One => self.reduce_sum(to_f64(sum_of(&xs, |v| v.modulus()))),
            NormType::Two => {
                let local = to_f64(sum_of(&xs, |v| {
                    let m = v.modulus();
                    m * m
                }));
                self.reduce_sum(local).sqrt()
            }
            NormType::Infinity => {
                let local = xs.iter().map(|v| to_f64(v.modulus())).fold(0.0, f64::max);
                self.reduce_max(local)
            }
        };
        Ok(from_f64(global))
    }

    fn reduce_scalar(&self, local: T) -> T {
        let mut words = pack_all([local]);
        self.reduce_sum_vec(&mut words);
        unpack_all::<T>(&words).first().copied().unwrap_or_else(T::zero)
    }

    /// `Σ conj(self_i) * y_i`.
    pub(crate) fn dot(&self, y: &RawVec<T>) -> Result<T, VError> {
        self.context().ensure_live()?;
        self.check_compatible(y)?;
        let local = sum_of_pairs(&self.read()?, &y.read()?, |a, b| a.conj() * b);
        Ok(self.reduce_scalar(local))
    }

    /// `Σ self_i * y_i`.
    pub(crate) fn tdot(&self, y: &RawVec<T>) -> Result<T, VError> {
        self.context().ensure_live()?;
        self.check_compatible(y)?;
        let local = sum_of_pairs(&self.read()?, &y.read()?, |a, b| a * b);
        Ok(self.reduce_scalar(local))
    }

    pub(crate) fn sum(&self) -> Result<T, VError> {
        self.context().ensure_live()?;
        let local = sum_of(&self.read()?, |v| v);
        Ok(self.reduce_scalar(local))
    }

    /// Extreme real part and its 0-based global index (smallest index on ties).
    pub(crate) fn extremum(&self, largest: bool) -> Result<(T::Real, usize), VError> {
        self.context().ensure_live()?;
        let layout = self.layout()?;
        if layout.global() == 0 {
            return Err(VError::Config("extremum of an empty vector".into()));
        }
        let xs = self.read()?;
        let better = |a: f64, b: f64| if largest { a > b } else { a < b };
        let mut best: Option<(f64, usize)> = None;
        for (i, v) in xs.iter().enumerate() {
            let r = to_f64(v.re());
            if best.is_none_or(|(b, _)| better(r, b)) {
                best = Some((r, i));
            }
        }
        let local = best.map(|b| b.0);
        let value = if largest {
            self.reduce_max(local.unwrap_or(f64::NEG_INFINITY))
        } else {
            self.reduce_min(local.unwrap_or(f64::INFINITY))
        };
        let candidate = match best {
            Some((r, i)) if r == value => (layout.start() + i) as f64,
            _ => f64::INFINITY,
        };
        let at = self.reduce_min(candidate);
        Ok((from_f64(value), at as usize))
    }

    /// Every entry of the vector, on every process. Collective.
    pub(crate) fn gather_all(&self) -> Result<Vec<T>, VError> {
        self.context().ensure_live()?;
        let layout = self.layout()?;
        let local = self.read()?;
        if self.kind() == VecKind::Sequential {
            return Ok(local.to_vec());
        }
        let comm = self.context().comm();
        let mine = Packet::new(vec![layout.start()], pack_all(local.iter().copied()));
        let received = comm.exchange(vec![mine; comm.size()]);
        let mut out = vec![T::zero(); layout.global()];
        for packet in received {
            let Some(&start) = packet.indices.first() else {
                continue;
            };
            let vals: Vec<T> = unpack_all(&packet.values);
            let slots = out.get_mut(start..start + vals.len()).ok_or_else(|| {
                VError::Resource(format!("gathered block at {start} overruns the vector"))
            })?;
            slots.copy_from_slice(&vals);
        }
        Ok(out)
    }
}
