//! Owned dense value storage for blocks and coefficient tables.

use mdarray::{DynRank, Shape, Tensor};

use crate::scalar::Scalar;

/// Dense row-major N-mode array, wrapping mdarray's dynamic-rank tensor.
///
/// Shape information lives inside the tensor; the raw data is exposed as a
/// row-major slice so that contraction kernels can walk it with explicit
/// strides.
#[derive(Debug, Clone)]
pub struct DenseArray<T>(Tensor<T, DynRank>);

impl<T: Scalar> DenseArray<T> {
    /// Create a new array from a flat buffer with an explicit shape.
    ///
    /// # Panics
    /// Panics if the product of `dims` does not match `vec.len()`.
    pub fn from_vec_with_shape(vec: Vec<T>, dims: &[usize]) -> Self {
        let expected: usize = dims.iter().product();
        assert_eq!(
            vec.len(),
            expected,
            "buffer length {} does not match shape {:?}",
            vec.len(),
            dims,
        );
        let tensor = Tensor::from(vec).into_shape(DynRank::from_dims(dims));
        Self(tensor)
    }

    /// Create a zero-initialized array with the given shape.
    pub fn zeros(dims: &[usize]) -> Self {
        let len: usize = dims.iter().product();
        Self::from_vec_with_shape(vec![T::zero(); len], dims)
    }

    /// Get the shape (dimensions) of the array.
    pub fn dims(&self) -> Vec<usize> {
        self.0.shape().with_dims(|d| d.to_vec())
    }

    /// Get the rank (number of dimensions).
    pub fn rank(&self) -> usize {
        self.0.rank()
    }

    /// Get the total number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the underlying data as a row-major slice.
    pub fn as_slice(&self) -> &[T] {
        &self.0[..]
    }

    /// Get the underlying data as a mutable row-major slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.0[..]
    }

    /// Consume the array, returning the flat buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.0.into_vec()
    }

    /// Row-major strides for this array's shape.
    pub fn strides(&self) -> Vec<usize> {
        strides_for(&self.dims())
    }
}

/// Compute row-major strides for given dimensions.
pub(crate) fn strides_for(dims: &[usize]) -> Vec<usize> {
    if dims.is_empty() {
        return vec![];
    }
    let mut strides = vec![1; dims.len()];
    for i in (0..dims.len() - 1).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}
