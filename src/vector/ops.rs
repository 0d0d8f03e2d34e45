//! Elementwise and reduction operations.
//!
//! Every operand must be assembled; none of these force an assembly. Norms,
//! dots, sums, extrema and comparisons are collective for distributed
//! vectors, and their operands are checked on every process before anything
//! is exchanged; everything else touches only the local entries.

use crate::config::NormType;
use crate::core::Scalar;
use crate::error::VError;
use crate::resource::RawVec;
use crate::resource::kernels::PointwiseOp;
use crate::vector::Vector;
use num_complex::Complex64;
use num_traits::{Float, One, Zero};
use std::ops::{Add, Mul, Neg, Sub};

/// `y` is assembled, readable and laid out like `x`.
fn compatible<T: Scalar>(x: &RawVec<T>, y: &Vector<T>) -> Result<(), VError> {
    let y = y.assembled()?;
    x.check_compatible(y)?;
    y.read().map(drop)
}

impl<T: Scalar> Vector<T> {
    pub fn fill(&mut self, value: T) -> Result<(), VError> {
        self.assembled_mut()?.fill(value)
    }

    fn map_in_place(&mut self, f: impl Fn(T) -> T + Sync + Send) -> Result<(), VError> {
        self.assembled_mut()?.map_values(f)
    }

    /// Duplicate holding this vector's values.
    fn cloned(&self) -> Result<Self, VError> {
        let mut out = self.duplicate()?;
        self.copy_to(&mut out)?;
        Ok(out)
    }

    pub fn abs_in_place(&mut self) -> Result<(), VError> {
        self.map_in_place(|v| T::from_real(v.modulus()))
    }

    pub fn abs(&self) -> Result<Self, VError> {
        let mut out = self.cloned()?;
        out.abs_in_place()?;
        Ok(out)
    }

    pub fn exp_in_place(&mut self) -> Result<(), VError> {
        self.map_in_place(Scalar::exp)
    }

    pub fn exp(&self) -> Result<Self, VError> {
        let mut out = self.cloned()?;
        out.exp_in_place()?;
        Ok(out)
    }

    /// Natural logarithm.
    pub fn log_in_place(&mut self) -> Result<(), VError> {
        self.map_in_place(Scalar::ln)
    }

    pub fn log(&self) -> Result<Self, VError> {
        let mut out = self.cloned()?;
        out.log_in_place()?;
        Ok(out)
    }

    pub fn conj_in_place(&mut self) -> Result<(), VError> {
        self.map_in_place(Scalar::conj)
    }

    pub fn conjugate(&self) -> Result<Self, VError> {
        let mut out = self.cloned()?;
        out.conj_in_place()?;
        Ok(out)
    }

    /// Zero every entry whose magnitude is below `tol`.
    pub fn chop(&mut self, tol: T::Real) -> Result<(), VError> {
        self.assembled_mut()?.chop(tol)
    }

    /// `1 / x` elementwise; zero entries stay zero.
    pub fn reciprocal(&mut self) -> Result<(), VError> {
        self.assembled_mut()?.reciprocal()
    }

    /// Largest real part and its 1-based index; the smallest index wins ties.
    pub fn max(&self) -> Result<(T::Real, usize), VError> {
        let (v, i) = self.collective(|_| Ok(()))?.extremum(true)?;
        Ok((v, i + 1))
    }

    /// Smallest real part and its 1-based index.
    pub fn min(&self) -> Result<(T::Real, usize), VError> {
        let (v, i) = self.collective(|_| Ok(()))?.extremum(false)?;
        Ok((v, i + 1))
    }

    pub fn norm(&self, kind: NormType) -> Result<T::Real, VError> {
        self.collective(|_| Ok(()))?.norm(kind)
    }

    /// Scale to unit 2-norm and return the previous norm. A zero vector is
    /// left unchanged.
    pub fn normalize(&mut self) -> Result<T::Real, VError> {
        let n = self.norm(NormType::Two)?;
        if !n.is_zero() {
            self.scale(T::from_real(Float::recip(n)))?;
        }
        Ok(n)
    }

    /// `Σ conj(self_i) * y_i`.
    pub fn dot(&self, y: &Vector<T>) -> Result<T, VError> {
        self.collective(|x| compatible(x, y))?.dot(y.raw()?)
    }

    /// `Σ self_i * y_i`, without conjugation.
    pub fn tdot(&self, y: &Vector<T>) -> Result<T, VError> {
        self.collective(|x| compatible(x, y))?.tdot(y.raw()?)
    }

    pub fn sum(&self) -> Result<T, VError> {
        self.collective(|_| Ok(()))?.sum()
    }

    fn pointwise(&self, op: PointwiseOp, y: &Vector<T>) -> Result<Self, VError> {
        let (a, b) = (self.assembled()?, y.assembled()?);
        let mut out = self.duplicate()?;
        out.raw_mut()?.pointwise(op, a, b)?;
        Ok(out)
    }

    /// Elementwise maximum by real part.
    pub fn pointwise_max(&self, y: &Vector<T>) -> Result<Self, VError> {
        self.pointwise(PointwiseOp::Max, y)
    }

    pub fn pointwise_min(&self, y: &Vector<T>) -> Result<Self, VError> {
        self.pointwise(PointwiseOp::Min, y)
    }

    /// `max(|x_i|, |y_i|)`.
    pub fn pointwise_max_abs(&self, y: &Vector<T>) -> Result<Self, VError> {
        self.pointwise(PointwiseOp::MaxAbs, y)
    }

    pub fn pointwise_mult(&self, y: &Vector<T>) -> Result<Self, VError> {
        self.pointwise(PointwiseOp::Mult, y)
    }

    pub fn pointwise_divide(&self, y: &Vector<T>) -> Result<Self, VError> {
        self.pointwise(PointwiseOp::Divide, y)
    }

    pub fn pointwise_pow(&self, y: &Vector<T>) -> Result<Self, VError> {
        self.pointwise(PointwiseOp::Pow, y)
    }

    pub fn scale(&mut self, s: T) -> Result<(), VError> {
        self.map_in_place(move |v| s * v)
    }

    /// Add `c` to every entry.
    pub fn shift(&mut self, c: T) -> Result<(), VError> {
        self.map_in_place(move |v| v + c)
    }

    /// `self += alpha * x`
    pub fn axpy(&mut self, alpha: T, x: &Vector<T>) -> Result<(), VError> {
        let x = x.assembled()?;
        self.assembled_mut()?.zip_with(x, move |y, x| y + alpha * x)
    }

    /// `self = alpha * self + x`
    pub fn aypx(&mut self, alpha: T, x: &Vector<T>) -> Result<(), VError> {
        let x = x.assembled()?;
        self.assembled_mut()?.zip_with(x, move |y, x| alpha * y + x)
    }

    /// `self = alpha * x + beta * self`
    pub fn axpby(&mut self, alpha: T, beta: T, x: &Vector<T>) -> Result<(), VError> {
        let x = x.assembled()?;
        self.assembled_mut()?.zip_with(x, move |y, x| alpha * x + beta * y)
    }

    /// `self = alpha * x + beta * y + gamma * self`
    pub fn axpbypcz(
        &mut self,
        alpha: T,
        beta: T,
        gamma: T,
        x: &Vector<T>,
        y: &Vector<T>,
    ) -> Result<(), VError> {
        let (x, y) = (x.assembled()?, y.assembled()?);
        self.assembled_mut()?
            .zip3_with(x, y, move |z, x, y| alpha * x + beta * y + gamma * z)
    }

    /// `self += Σ alphas[k] * xs[k]`
    pub fn maxpy(&mut self, alphas: &[T], xs: &[&Vector<T>]) -> Result<(), VError> {
        let raws = xs.iter().map(|x| x.assembled()).collect::<Result<Vec<_>, _>>()?;
        self.assembled_mut()?.maxpy(alphas, &raws)
    }

    /// `self = alpha * x + y`
    pub fn waxpy(&mut self, alpha: T, x: &Vector<T>, y: &Vector<T>) -> Result<(), VError> {
        let (x, y) = (x.assembled()?, y.assembled()?);
        self.assembled_mut()?.zip3_with(x, y, move |_, x, y| alpha * x + y)
    }

    /// Exchange the values of two vectors with the same layout.
    pub fn swap(&mut self, other: &mut Vector<T>) -> Result<(), VError> {
        let other = other.assembled_mut()?;
        self.assembled_mut()?.swap_values(other)
    }

    /// The whole vector on every process. Collective.
    pub fn to_global_vec(&self) -> Result<Vec<T>, VError> {
        self.collective(|_| Ok(()))?.gather_all()
    }
}

impl<T: Scalar> Add for &Vector<T> {
    type Output = Result<Vector<T>, VError>;

    fn add(self, rhs: Self) -> Self::Output {
        let mut out = self.duplicate()?;
        out.waxpy(T::one(), self, rhs)?;
        Ok(out)
    }
}

impl<T: Scalar> Sub for &Vector<T> {
    type Output = Result<Vector<T>, VError>;

    fn sub(self, rhs: Self) -> Self::Output {
        let mut out = self.duplicate()?;
        out.waxpy(-T::one(), rhs, self)?;
        Ok(out)
    }
}

impl<T: Scalar> Neg for &Vector<T> {
    type Output = Result<Vector<T>, VError>;

    fn neg(self) -> Self::Output {
        let mut out = self.cloned()?;
        out.scale(-T::one())?;
        Ok(out)
    }
}

macro_rules! scalar_ops {
    ($($t:ty),*) => {$(
        impl Mul<$t> for &Vector<$t> {
            type Output = Result<Vector<$t>, VError>;

            fn mul(self, s: $t) -> Self::Output {
                let mut out = self.cloned()?;
                out.scale(s)?;
                Ok(out)
            }
        }

        impl Add<$t> for &Vector<$t> {
            type Output = Result<Vector<$t>, VError>;

            fn add(self, c: $t) -> Self::Output {
                let mut out = self.cloned()?;
                out.shift(c)?;
                Ok(out)
            }
        }
    )*};
}

scalar_ops!(f32, f64, Complex64);
