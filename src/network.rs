//! Ordered chain of layers
//!
//! A `Network` owns a sequence of boxed layers and threads tensors through
//! them: forward in order, backward in reverse. It does not compute losses or
//! update parameters.

use ndarray::ArrayD;
use tracing::debug;

use crate::error::{Error, Result};
use crate::layers::{Layer, Parameter};

/// Sequence of heterogeneous layers evaluated one after another.
///
/// # Example
///
/// ```ignore
/// let mut net = Network::new();
/// net.push(Box::new(ConvolutionalLayer::new((1, 8, 8), 4, 3, 1, &mut rng)?));
/// net.push(Box::new(ReshapeLayer::flatten(&[4, 6, 6])?));
/// net.push(Box::new(DenseLayer::new(144, 10, &mut rng)?));
///
/// let output = net.forward(&batch)?;
/// let grad_input = net.backward(&loss_gradient)?;
/// ```
#[derive(Default)]
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer to the end of the chain.
    pub fn push(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|layer| layer.as_ref())
    }

    /// Mutable access to one layer, e.g. for an optimizer step.
    pub fn layer_mut(&mut self, index: usize) -> Option<&mut (dyn Layer + 'static)> {
        self.layers.get_mut(index).map(|layer| layer.as_mut())
    }

    /// Trainable tensors of every layer, in layer order, each paired with
    /// its gradient from the last backward pass.
    pub fn parameters(&mut self) -> Vec<Parameter<'_>> {
        self.layers
            .iter_mut()
            .flat_map(|layer| layer.parameters())
            .collect()
    }

    /// Total trainable scalars across all layers.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }

    /// Run `input` through every layer in order and return the last output.
    ///
    /// # Errors
    ///
    /// `Configuration` for an empty network; otherwise the first layer error.
    /// Layers before the failing one keep their new forward state.
    pub fn forward(&mut self, input: &ArrayD<f64>) -> Result<&ArrayD<f64>> {
        let (first, rest) = self
            .layers
            .split_first_mut()
            .ok_or_else(|| Error::Configuration("network has no layers".into()))?;

        first.forward(input)?;
        let mut previous: &dyn Layer = &**first;

        for layer in rest.iter_mut() {
            let activations = previous
                .output()
                .ok_or(Error::MissingForward("Network::forward"))?;
            layer.forward(activations)?;
            previous = &**layer;
        }

        debug!(layers = self.layers.len(), "network forward");
        self.output()
            .ok_or(Error::MissingForward("Network::forward"))
    }

    /// Propagate `delta` (gradient of the loss with respect to the network
    /// output) back through every layer and return the gradient with respect
    /// to the network input.
    pub fn backward(&mut self, delta: &ArrayD<f64>) -> Result<&ArrayD<f64>> {
        let (last, rest) = self
            .layers
            .split_last_mut()
            .ok_or_else(|| Error::Configuration("network has no layers".into()))?;

        last.backward(delta)?;
        let mut next: &dyn Layer = &**last;

        for layer in rest.iter_mut().rev() {
            let gradient = next
                .dinputs()
                .ok_or(Error::MissingForward("Network::backward"))?;
            layer.backward(gradient)?;
            next = &**layer;
        }

        debug!(layers = self.layers.len(), "network backward");
        self.layers
            .first()
            .and_then(|layer| layer.dinputs())
            .ok_or(Error::MissingForward("Network::backward"))
    }

    /// Output of the last layer from the most recent forward pass.
    pub fn output(&self) -> Option<&ArrayD<f64>> {
        self.layers.last().and_then(|layer| layer.output())
    }
}
