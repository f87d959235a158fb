//! Error type shared by every layer, helper and the architecture loader.

use thiserror::Error;

/// Errors raised by layer construction, forward/backward passes and
/// architecture loading.
///
/// None of these are retried anywhere in the crate; every variant describes a
/// permanent fault that the caller has to fix.
#[derive(Debug, Error)]
pub enum Error {
    /// A tensor's shape is incompatible with the layer's configured dimensions.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Construction parameters that cannot produce a valid layer.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// `pad_to_shape` was asked to shrink an array.
    #[error("cannot pad array of shape {actual:?} down to {target:?}")]
    PaddingUnderflow {
        actual: Vec<usize>,
        target: Vec<usize>,
    },

    /// `backward` was called on a layer that has never run `forward`.
    #[error("{0}: backward called before forward")]
    MissingForward(&'static str),

    #[error("failed to read architecture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse architecture JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape_mismatch(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
