//! Shared utilities for the layer implementations
//!
//! This module provides random number generation for parameter initialization,
//! the 2D correlation/convolution primitives, and the shape-adjustment helpers
//! used by the convolutional layer's gradient path.

pub mod rng;
pub mod shape;
pub mod signal;

pub use rng::SimpleRng;
pub use shape::{dilate, pad_to_shape};
pub use signal::{convolve2d_full, correlate2d_valid};
