//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that performs the transformation: output = inputs · weights + biases

use std::any::Any;

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, Ix2};
use tracing::{debug, warn};

use super::{batch_size, check_shape, Layer, Parameter};
use crate::error::{Error, Result};
use crate::utils::SimpleRng;

/// Scale applied to standard-normal samples when initializing weights.
const WEIGHT_SCALE: f64 = 0.1;

/// Dense (fully connected) layer with weights and biases.
///
/// Performs the affine transformation: y = xW + b
/// where x is the input (batch_size × n_inputs),
/// W is the weight matrix (n_inputs × n_neurons),
/// and b is the bias vector (n_neurons), broadcast over the batch.
///
/// # Example
///
/// ```ignore
/// use dlfs::layers::{DenseLayer, Layer};
/// use dlfs::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DenseLayer::new(784, 128, &mut rng)?;
/// assert_eq!(layer.parameter_count(), 784 * 128 + 128);
/// ```
#[derive(Debug, Clone)]
pub struct DenseLayer {
    weights: Array2<f64>,
    biases: Array1<f64>,

    // Record of the last forward call
    inputs: Option<Array2<f64>>,
    output: Option<ArrayD<f64>>,
    awaiting_backward: bool,

    // Gradients from the last backward call
    dweights: Option<Array2<f64>>,
    dbiases: Option<Array1<f64>>,
    dinputs: Option<ArrayD<f64>>,
}

impl DenseLayer {
    /// Create a new DenseLayer.
    ///
    /// Weights are drawn from `0.1 * N(0, 1)` and biases start at zero.
    ///
    /// # Errors
    ///
    /// `Configuration` if either size is zero.
    pub fn new(n_inputs: usize, n_neurons: usize, rng: &mut SimpleRng) -> Result<Self> {
        if n_inputs == 0 || n_neurons == 0 {
            return Err(Error::Configuration(format!(
                "dense layer needs positive sizes, got n_inputs={} n_neurons={}",
                n_inputs, n_neurons
            )));
        }

        let weights = rng.normal_array((n_inputs, n_neurons), WEIGHT_SCALE);

        debug!(n_inputs, n_neurons, "created dense layer");
        Ok(Self::with_parameters(weights, Array1::zeros(n_neurons)))
    }

    /// Create a DenseLayer from explicit parameters.
    ///
    /// # Errors
    ///
    /// - `Configuration` if `weights` has a zero dimension
    /// - `ShapeMismatch` if `biases` does not have one entry per weight column
    pub fn from_parameters(weights: Array2<f64>, biases: Array1<f64>) -> Result<Self> {
        let (n_inputs, n_neurons) = weights.dim();
        if n_inputs == 0 || n_neurons == 0 {
            return Err(Error::Configuration(format!(
                "dense weights must be non-empty, got {}x{}",
                n_inputs, n_neurons
            )));
        }
        check_shape("DenseLayer biases", biases.shape(), &[n_neurons])?;

        Ok(Self::with_parameters(weights, biases))
    }

    fn with_parameters(weights: Array2<f64>, biases: Array1<f64>) -> Self {
        Self {
            weights,
            biases,
            inputs: None,
            output: None,
            awaiting_backward: false,
            dweights: None,
            dbiases: None,
            dinputs: None,
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_neurons(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> ArrayView2<f64> {
        self.weights.view()
    }

    pub fn biases(&self) -> ArrayView1<f64> {
        self.biases.view()
    }

    /// Mutable view of the weights for an external optimizer. The shape is fixed.
    pub fn weights_mut(&mut self) -> ArrayViewMut2<f64> {
        self.weights.view_mut()
    }

    /// Mutable view of the biases for an external optimizer. The shape is fixed.
    pub fn biases_mut(&mut self) -> ArrayViewMut1<f64> {
        self.biases.view_mut()
    }

    /// Replace the weight matrix; the new one must have the same shape.
    pub fn set_weights(&mut self, weights: Array2<f64>) -> Result<()> {
        check_shape("DenseLayer::set_weights", weights.shape(), self.weights.shape())?;
        self.weights = weights;
        Ok(())
    }

    /// Replace the bias vector; the new one must have the same shape.
    pub fn set_biases(&mut self, biases: Array1<f64>) -> Result<()> {
        check_shape("DenseLayer::set_biases", biases.shape(), self.biases.shape())?;
        self.biases = biases;
        Ok(())
    }

    /// Inputs stored by the most recent forward call.
    pub fn inputs(&self) -> Option<&Array2<f64>> {
        self.inputs.as_ref()
    }

    /// Gradient with respect to the weights, summed over the batch.
    pub fn dweights(&self) -> Option<&Array2<f64>> {
        self.dweights.as_ref()
    }

    /// Gradient with respect to the biases, summed over the batch.
    pub fn dbiases(&self) -> Option<&Array1<f64>> {
        self.dbiases.as_ref()
    }
}

impl Layer for DenseLayer {
    fn name(&self) -> &'static str {
        "DenseLayer"
    }

    fn forward(&mut self, inputs: &ArrayD<f64>) -> Result<()> {
        let batch = batch_size(inputs.shape());
        let expected = [batch, self.n_inputs()];
        check_shape("DenseLayer::forward inputs", inputs.shape(), &expected)?;

        let inputs = inputs
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| Error::shape_mismatch("DenseLayer::forward inputs", &expected, inputs.shape()))?;

        let output = inputs.dot(&self.weights) + &self.biases;

        if self.awaiting_backward {
            warn!(layer = self.name(), "forward called again before backward; replacing stored inputs");
        }
        debug!(layer = self.name(), batch, "forward");

        self.inputs = Some(inputs.to_owned());
        self.output = Some(output.into_dyn());
        self.awaiting_backward = true;
        Ok(())
    }

    fn backward(&mut self, delta: &ArrayD<f64>) -> Result<()> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or(Error::MissingForward("DenseLayer"))?;

        let expected = [inputs.nrows(), self.n_neurons()];
        check_shape("DenseLayer::backward delta", delta.shape(), &expected)?;
        let delta = delta
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| Error::shape_mismatch("DenseLayer::backward delta", &expected, delta.shape()))?;

        let dweights = inputs.t().dot(&delta);
        let dbiases = delta.sum_axis(Axis(0));
        let dinputs = delta.dot(&self.weights.t());

        debug!(layer = self.name(), batch = inputs.nrows(), "backward");

        self.dweights = Some(dweights);
        self.dbiases = Some(dbiases);
        self.dinputs = Some(dinputs.into_dyn());
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
        vec![self.n_inputs()]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.n_neurons()]
    }

    /// Returns n_inputs × n_neurons (weights) + n_neurons (biases).
    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter {
                name: "weights",
                value: self.weights.view_mut().into_dyn(),
                gradient: self.dweights.as_ref().map(|g| g.view().into_dyn()),
            },
            Parameter {
                name: "biases",
                value: self.biases.view_mut().into_dyn(),
                gradient: self.dbiases.as_ref().map(|g| g.view().into_dyn()),
            },
        ]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
