//! Reshape layer implementation
//!
//! Reinterprets each sample's shape without touching its values, e.g.
//! flattening `[batch, depth, height, width]` into `[batch, depth * height * width]`
//! so a convolutional stack can feed a dense layer. It has no parameters.

use std::any::Any;

use ndarray::{ArrayD, IxDyn};
use tracing::{debug, warn};

use super::{batch_size, batched, check_shape, Layer};
use crate::error::{Error, Result};

/// Parameter-free layer that changes the per-sample shape of a batch.
///
/// Forward maps `[batch, *input_shape]` to `[batch, *output_shape]` in
/// row-major order; backward applies the inverse mapping to the gradient.
#[derive(Debug, Clone)]
pub struct ReshapeLayer {
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,

    // Batch size of the last forward call
    batch: Option<usize>,
    output: Option<ArrayD<f64>>,
    awaiting_backward: bool,
    dinputs: Option<ArrayD<f64>>,
}

impl ReshapeLayer {
    /// Create a reshape layer between two per-sample shapes.
    ///
    /// # Errors
    ///
    /// `Configuration` if either shape has a zero dimension or the two shapes
    /// hold a different number of elements.
    pub fn new(input_shape: &[usize], output_shape: &[usize]) -> Result<Self> {
        let input_len: usize = input_shape.iter().product();
        let output_len: usize = output_shape.iter().product();

        if input_shape.is_empty() || output_shape.is_empty() || input_len == 0 || output_len == 0 {
            return Err(Error::Configuration(format!(
                "reshape shapes must be non-empty and positive, got {:?} -> {:?}",
                input_shape, output_shape
            )));
        }
        if input_len != output_len {
            return Err(Error::Configuration(format!(
                "cannot reshape {:?} ({} elements) into {:?} ({} elements)",
                input_shape, input_len, output_shape, output_len
            )));
        }

        debug!(?input_shape, ?output_shape, "created reshape layer");
        Ok(Self {
            input_shape: input_shape.to_vec(),
            output_shape: output_shape.to_vec(),
            batch: None,
            output: None,
            awaiting_backward: false,
            dinputs: None,
        })
    }

    /// Flatten `input_shape` into a single axis.
    pub fn flatten(input_shape: &[usize]) -> Result<Self> {
        let flattened: usize = input_shape.iter().product();
        Self::new(input_shape, &[flattened])
    }
}

/// Row-major reshape of a batched tensor to `[batch, *per_sample]`.
fn reshape_batch(tensor: &ArrayD<f64>, batch: usize, per_sample: &[usize]) -> Result<ArrayD<f64>> {
    let target = batched(batch, per_sample);
    tensor
        .as_standard_layout()
        .into_owned()
        .into_shape(IxDyn(&target))
        .map_err(|_| Error::shape_mismatch("ReshapeLayer", &target, tensor.shape()))
}

impl Layer for ReshapeLayer {
    fn name(&self) -> &'static str {
        "ReshapeLayer"
    }

    fn forward(&mut self, inputs: &ArrayD<f64>) -> Result<()> {
        let batch = batch_size(inputs.shape());
        check_shape(
            "ReshapeLayer::forward inputs",
            inputs.shape(),
            &batched(batch, &self.input_shape),
        )?;

        let output = reshape_batch(inputs, batch, &self.output_shape)?;

        if self.awaiting_backward {
            warn!(layer = self.name(), "forward called again before backward; replacing stored batch");
        }
        debug!(layer = self.name(), batch, "forward");

        self.batch = Some(batch);
        self.output = Some(output);
        self.awaiting_backward = true;
        Ok(())
    }

    fn backward(&mut self, delta: &ArrayD<f64>) -> Result<()> {
        let batch = self.batch.ok_or(Error::MissingForward("ReshapeLayer"))?;
        check_shape(
            "ReshapeLayer::backward delta",
            delta.shape(),
            &batched(batch, &self.output_shape),
        )?;

        let dinputs = reshape_batch(delta, batch, &self.input_shape)?;
        debug!(layer = self.name(), batch, "backward");

        self.dinputs = Some(dinputs);
        self.awaiting_backward = false;
        Ok(())
    }

    fn output(&self) -> Option<&ArrayD<f64>> {
        self.output.as_ref()
    }

    fn dinputs(&self) -> Option<&ArrayD<f64>> {
        self.dinputs.as_ref()
    }

    fn input_shape(&self) -> Vec<usize> {
        self.input_shape.clone()
    }

    fn output_shape(&self) -> Vec<usize> {
        self.output_shape.clone()
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
