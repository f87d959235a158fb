//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and the dense, convolutional and
//! reshape layers that implement it.

mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod reshape;

pub use conv2d::ConvolutionalLayer;
pub use dense::DenseLayer;
pub use r#trait::{Layer, Parameter};
pub use reshape::ReshapeLayer;

use crate::error::{Error, Result};

/// Fail with `ShapeMismatch` unless `actual` equals `expected` exactly.
pub(crate) fn check_shape(context: &'static str, actual: &[usize], expected: &[usize]) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::shape_mismatch(context, expected, actual))
    }
}

/// Shape of a batched tensor: the leading batch size (or 0 for a scalar)
/// followed by the per-sample shape.
pub(crate) fn batched(batch: usize, per_sample: &[usize]) -> Vec<usize> {
    let mut shape = Vec::with_capacity(per_sample.len() + 1);
    shape.push(batch);
    shape.extend_from_slice(per_sample);
    shape
}

/// Leading axis length of a tensor, or 0 for a zero-dimensional one.
pub(crate) fn batch_size(shape: &[usize]) -> usize {
    shape.first().copied().unwrap_or(0)
}
