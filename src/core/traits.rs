//! Core numeric traits for ghostvec.

use num_traits::{Float, FromPrimitive, One, ToPrimitive, Zero};
use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Element type of a distributed vector.
///
/// Every arithmetic operation on [`crate::Vector`] is generic over this trait,
/// so the set of supported element types is exactly the set of impls.
pub trait Scalar:
    Copy
    + Send
    + Sync
    + PartialEq
    + Debug
    + Display
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Real type used for norms, tolerances and orderings.
    type Real: Float + FromPrimitive + ToPrimitive + Debug + Display + Send + Sync + 'static;

    /// Tag printed in diagnostics.
    const TYPE_NAME: &'static str;

    /// Number of `f64` words one value occupies on the wire.
    const PARTS: usize;

    fn from_real(r: Self::Real) -> Self;
    /// Real part (the value itself for real types).
    fn re(self) -> Self::Real;
    /// Absolute value / complex modulus.
    fn modulus(self) -> Self::Real;
    fn conj(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn pow(self, e: Self) -> Self;

    /// Append the wire representation of `self` to `out`.
    fn pack(self, out: &mut Vec<f64>);
    /// Rebuild a value from `PARTS` words.
    fn unpack(parts: &[f64]) -> Self;
}
