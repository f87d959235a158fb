//! Neural network layer primitives
//!
//! This library provides dense, convolutional and reshape layers, each with a
//! forward pass and a hand-derived backward pass. Callers chain layers, run a
//! batch forward, compute a loss gradient themselves and run it backward; the
//! gradients each layer exposes are then consumed by an external optimizer.
//!
//! # Modules
//!
//! - `layers`: Layer trait and implementations (Dense, Convolutional, Reshape)
//! - `network`: Ordered chain of layers
//! - `architecture`: JSON architecture configuration and network building
//! - `utils`: Seeded RNG, 2D correlation/convolution, dilation and padding
//! - `error`: Crate-wide error type

#[cfg(feature = "blas")]
extern crate blas_src;

pub mod architecture;
pub mod error;
pub mod layers;
pub mod network;
pub mod utils;

pub use error::{Error, Result};
pub use layers::{ConvolutionalLayer, DenseLayer, Layer, Parameter, ReshapeLayer};
pub use network::Network;
