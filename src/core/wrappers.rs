//! `Scalar` implementations for the supported element types.
//!
//! Real types travel as one `f64` word, complex types as two (real, imaginary).
//! `f32` widens to `f64` on the wire, which is lossless.

use crate::core::traits::Scalar;
use num_complex::Complex64;

impl Scalar for f64 {
    type Real = f64;
    const TYPE_NAME: &'static str = "f64";
    const PARTS: usize = 1;

    fn from_real(r: f64) -> Self {
        r
    }
    fn re(self) -> f64 {
        self
    }
    fn modulus(self) -> f64 {
        self.abs()
    }
    fn conj(self) -> Self {
        self
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn pow(self, e: Self) -> Self {
        self.powf(e)
    }
    fn pack(self, out: &mut Vec<f64>) {
        out.push(self);
    }
    fn unpack(parts: &[f64]) -> Self {
        parts[0]
    }
}

impl Scalar for f32 {
    type Real = f32;
    const TYPE_NAME: &'static str = "f32";
    const PARTS: usize = 1;

    fn from_real(r: f32) -> Self {
        r
    }
    fn re(self) -> f32 {
        self
    }
    fn modulus(self) -> f32 {
        self.abs()
    }
    fn conj(self) -> Self {
        self
    }
    fn exp(self) -> Self {
        f32::exp(self)
    }
    fn ln(self) -> Self {
        f32::ln(self)
    }
    fn pow(self, e: Self) -> Self {
        self.powf(e)
    }
    fn pack(self, out: &mut Vec<f64>) {
        out.push(self as f64);
    }
    fn unpack(parts: &[f64]) -> Self {
        parts[0] as f32
    }
}

impl Scalar for Complex64 {
    type Real = f64;
    const TYPE_NAME: &'static str = "c64";
    const PARTS: usize = 2;

    fn from_real(r: f64) -> Self {
        Complex64::new(r, 0.0)
    }
    fn re(self) -> f64 {
        self.re
    }
    fn modulus(self) -> f64 {
        self.norm()
    }
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }
    fn exp(self) -> Self {
        Complex64::exp(self)
    }
    fn ln(self) -> Self {
        Complex64::ln(self)
    }
    fn pow(self, e: Self) -> Self {
        self.powc(e)
    }
    fn pack(self, out: &mut Vec<f64>) {
        out.push(self.re);
        out.push(self.im);
    }
    fn unpack(parts: &[f64]) -> Self {
        Complex64::new(parts[0], parts[1])
    }
}

/// Pack a slice of scalars into wire words.
pub(crate) fn pack_all<T: Scalar>(values: impl IntoIterator<Item = T>) -> Vec<f64> {
    let mut out = Vec::new();
    for v in values {
        v.pack(&mut out);
    }
    out
}

/// Inverse of [`pack_all`].
pub(crate) fn unpack_all<T: Scalar>(words: &[f64]) -> Vec<T> {
    words.chunks_exact(T::PARTS).map(T::unpack).collect()
}
