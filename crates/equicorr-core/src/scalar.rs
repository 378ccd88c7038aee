//! Scalar trait for block values and coefficient tables.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul};

use faer_traits::ComplexField;
use num_traits::{One, Zero};

/// Trait for the floating-point precisions supported by block values.
///
/// The `ComplexField` bound is what the faer GEMM kernel of the dense
/// combination mode requires. Coefficient tables are always computed in
/// `f64` and converted through [`Scalar::from_f64`] on request.
pub trait Scalar:
    Clone
    + Copy
    + Debug
    + Default
    + PartialEq
    + Zero
    + One
    + Add<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + ComplexField
    + Send
    + Sync
    + 'static
{
    /// Convert from f64, rounding to the nearest representable value.
    fn from_f64(val: f64) -> Self;

    /// Widen back to f64.
    fn to_f64(self) -> f64;
}

impl Scalar for f64 {
    fn from_f64(val: f64) -> Self {
        val
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl Scalar for f32 {
    fn from_f64(val: f64) -> Self {
        val as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}
