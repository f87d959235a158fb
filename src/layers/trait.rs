//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait that all layer types implement.
//! The trait covers forward propagation and backward propagation only;
//! parameter updates belong to an external optimizer.

use std::any::Any;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};

use crate::error::Result;

/// One trainable tensor of a layer, paired with its gradient from the most
/// recent backward call (`None` before the first backward).
///
/// An external optimizer updates `value` in place from `gradient`.
#[derive(Debug)]
pub struct Parameter<'a> {
    pub name: &'static str,
    pub value: ArrayViewMutD<'a, f64>,
    pub gradient: Option<ArrayViewD<'a, f64>>,
}

/// Core trait for neural network layers.
///
/// All layer types (Dense, Convolutional, Reshape) implement this trait so a
/// caller can chain heterogeneous layers as `Box<dyn Layer>` without knowing
/// which variant each one is.
///
/// Every tensor carries the batch as its leading axis. A layer remembers the
/// inputs of its most recent `forward` call and uses them in the next
/// `backward` call; it keeps no history beyond that single step.
///
/// # Example
///
/// ```ignore
/// layer.forward(&batch)?;
/// let output = layer.output().unwrap();
///
/// layer.backward(&grad_output)?;
/// let grad_input = layer.dinputs().unwrap();
/// ```
pub trait Layer {
    /// Short, static layer name used in logs and error contexts.
    fn name(&self) -> &'static str;

    /// Forward propagation through the layer.
    ///
    /// Stores `inputs` for the backward pass and computes the output, which is
    /// then available through [`Layer::output`].
    ///
    /// Calling `forward` twice without an intervening `backward` replaces the
    /// stored inputs; the last call wins.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `inputs` is not `[batch, *input_shape]`. On error
    /// the layer's previous state is left untouched.
    fn forward(&mut self, inputs: &ArrayD<f64>) -> Result<()>;

    /// Backward propagation through the layer.
    ///
    /// Given the gradient of the loss with respect to the layer output,
    /// computes the gradient with respect to the layer inputs (and, for
    /// parameterized layers, with respect to each parameter, summed over the
    /// batch).
    ///
    /// # Errors
    ///
    /// - `MissingForward` if `forward` has never succeeded on this layer
    /// - `ShapeMismatch` if `delta` is not shaped like the last output
    fn backward(&mut self, delta: &ArrayD<f64>) -> Result<()>;

    /// Output of the most recent successful forward call.
    fn output(&self) -> Option<&ArrayD<f64>>;

    /// Gradient with respect to the inputs from the most recent backward call.
    fn dinputs(&self) -> Option<&ArrayD<f64>>;

    /// Per-sample input shape (batch axis excluded).
    fn input_shape(&self) -> Vec<usize>;

    /// Per-sample output shape (batch axis excluded).
    fn output_shape(&self) -> Vec<usize>;

    /// Number of trainable scalars held by the layer.
    fn parameter_count(&self) -> usize;

    /// Trainable tensors and their gradients. Parameter-free layers return an
    /// empty list.
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        Vec::new()
    }

    /// Downcast support for reaching layer-specific accessors through a
    /// `dyn Layer`.
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
