//! Architecture configuration structures
//!
//! This module describes a chain of layers in JSON so networks can be
//! assembled without code changes. A configuration goes through three steps:
//! parse (serde), validate (required fields, positive sizes, layer-to-layer
//! size agreement), and build (construct each layer with a seeded RNG).

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::layers::conv2d::conv_output_shape;
use crate::layers::{ConvolutionalLayer, DenseLayer, ReshapeLayer};
use crate::network::Network;
use crate::utils::SimpleRng;

/// Configuration for a single layer in the network.
///
/// Different layer types require different fields:
///
/// - **dense**: `n_inputs`, `n_neurons`
/// - **convolutional** (aliases `conv`, `conv2d`): `input_shape` as
///   `[channels, height, width]`, `output_channels`, `kernel_size`, and
///   optional `stride` (default 1)
/// - **reshape**: `input_shape`, `output_shape`
/// - **flatten**: `input_shape`; `output_shape` defaults to the flattened size
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "convolutional",
///   "input_shape": [1, 28, 28],
///   "output_channels": 8,
///   "kernel_size": 3,
///   "stride": 2
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerConfig {
    /// Type of layer: "dense", "convolutional", "reshape" or "flatten"
    pub layer_type: String,

    // Dense layer parameters
    /// Number of inputs for a dense layer
    pub n_inputs: Option<usize>,
    /// Number of neurons for a dense layer
    pub n_neurons: Option<usize>,

    // Convolutional and reshape parameters
    /// Per-sample input shape for convolutional and reshape layers
    pub input_shape: Option<Vec<usize>>,
    /// Number of kernels for a convolutional layer
    pub output_channels: Option<usize>,
    /// Kernel side for a convolutional layer (square kernels)
    pub kernel_size: Option<usize>,
    /// Stride for a convolutional layer (default: 1)
    pub stride: Option<usize>,

    /// Per-sample output shape for a reshape layer
    pub output_shape: Option<Vec<usize>>,
}

/// Configuration for the entire network.
///
/// Layers are applied in the order they appear in the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    /// Sequence of layer configurations defining the network structure
    pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerKind {
    Dense,
    Convolutional,
    Reshape,
    Flatten,
}

impl LayerKind {
    fn parse(layer: &LayerConfig, index: usize) -> Result<Self> {
        match layer.layer_type.to_lowercase().as_str() {
            "dense" => Ok(LayerKind::Dense),
            "convolutional" | "conv" | "conv2d" => Ok(LayerKind::Convolutional),
            "reshape" => Ok(LayerKind::Reshape),
            "flatten" => Ok(LayerKind::Flatten),
            _ => Err(Error::InvalidArchitecture(format!(
                "Layer {}: Invalid layer type '{}'. Must be one of: dense, convolutional, reshape, flatten",
                index, layer.layer_type
            ))),
        }
    }
}

fn missing(index: usize, layer: &str, field: &str) -> Error {
    Error::InvalidArchitecture(format!("Layer {}: {} layer requires '{}'", index, layer, field))
}

fn conv_input_shape(layer: &LayerConfig, index: usize) -> Result<(usize, usize, usize)> {
    match layer.input_shape.as_deref() {
        Some(&[c, h, w]) => Ok((c, h, w)),
        Some(other) => Err(Error::InvalidArchitecture(format!(
            "Layer {}: Convolutional input_shape must be [channels, height, width], got {:?}",
            index, other
        ))),
        None => Err(missing(index, "Convolutional", "input_shape")),
    }
}

/// Loads an architecture configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it and validates the result.
///
/// # Examples
///
/// ```no_run
/// use dlfs::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/small_cnn.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config = parse_architecture(&contents)?;
    info!(path = %path.display(), layers = config.layers.len(), "loaded architecture");
    Ok(config)
}

/// Parses and validates an architecture configuration from a JSON string.
pub fn parse_architecture(json: &str) -> Result<ArchitectureConfig> {
    let config: ArchitectureConfig = serde_json::from_str(json)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Per-sample element count a layer consumes.
fn layer_input_size(layer: &LayerConfig, index: usize) -> Result<usize> {
    match LayerKind::parse(layer, index)? {
        LayerKind::Dense => layer.n_inputs.ok_or_else(|| missing(index, "Dense", "n_inputs")),
        LayerKind::Convolutional => {
            let (c, h, w) = conv_input_shape(layer, index)?;
            Ok(c * h * w)
        }
        LayerKind::Reshape | LayerKind::Flatten => layer
            .input_shape
            .as_ref()
            .map(|shape| shape.iter().product())
            .ok_or_else(|| missing(index, "Reshape", "input_shape")),
    }
}

/// Per-sample element count a layer produces.
fn layer_output_size(layer: &LayerConfig, index: usize) -> Result<usize> {
    match LayerKind::parse(layer, index)? {
        LayerKind::Dense => layer.n_neurons.ok_or_else(|| missing(index, "Dense", "n_neurons")),
        LayerKind::Convolutional => {
            let input_shape = conv_input_shape(layer, index)?;
            let output_channels = layer
                .output_channels
                .ok_or_else(|| missing(index, "Convolutional", "output_channels"))?;
            let kernel_size = layer
                .kernel_size
                .ok_or_else(|| missing(index, "Convolutional", "kernel_size"))?;
            let stride = layer.stride.unwrap_or(1);

            let (c, h, w) = conv_output_shape(input_shape, output_channels, kernel_size, stride)
                .map_err(|e| Error::InvalidArchitecture(format!("Layer {}: {}", index, e)))?;
            Ok(c * h * w)
        }
        LayerKind::Reshape => layer
            .output_shape
            .as_ref()
            .map(|shape| shape.iter().product())
            .ok_or_else(|| missing(index, "Reshape", "output_shape")),
        LayerKind::Flatten => match &layer.output_shape {
            Some(shape) => Ok(shape.iter().product()),
            None => layer_input_size(layer, index),
        },
    }
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Each layer has the required fields for its type
/// - Parameter values are within valid ranges
/// - Layer connections are valid (output size of layer i matches input size of layer i+1)
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(Error::InvalidArchitecture(
            "Architecture must have at least one layer".into(),
        ));
    }

    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }

    for (i, pair) in config.layers.windows(2).enumerate() {
        let current_output = layer_output_size(&pair[0], i)?;
        let next_input = layer_input_size(&pair[1], i + 1)?;

        if current_output != next_input {
            return Err(Error::InvalidArchitecture(format!(
                "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
                i,
                current_output,
                i + 1,
                next_input
            )));
        }
    }

    Ok(())
}

/// Validates a single layer configuration: required fields present, sizes
/// positive, kernel fits the input, reshape preserves the element count.
fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    let positive = |value: usize, field: &str| -> Result<()> {
        if value == 0 {
            Err(Error::InvalidArchitecture(format!(
                "Layer {}: {} must be greater than 0",
                index, field
            )))
        } else {
            Ok(())
        }
    };

    match LayerKind::parse(layer, index)? {
        LayerKind::Dense => {
            let n_inputs = layer.n_inputs.ok_or_else(|| missing(index, "Dense", "n_inputs"))?;
            let n_neurons = layer.n_neurons.ok_or_else(|| missing(index, "Dense", "n_neurons"))?;
            positive(n_inputs, "n_inputs")?;
            positive(n_neurons, "n_neurons")?;
        }
        LayerKind::Convolutional => {
            let (c, h, w) = conv_input_shape(layer, index)?;
            positive(c, "input channels")?;
            positive(h, "input height")?;
            positive(w, "input width")?;
            if let Some(stride) = layer.stride {
                positive(stride, "stride")?;
            }
            // Checks output_channels and kernel_size presence, positivity and fit
            layer_output_size(layer, index)?;
        }
        LayerKind::Reshape | LayerKind::Flatten => {
            let input_shape = layer
                .input_shape
                .as_ref()
                .ok_or_else(|| missing(index, "Reshape", "input_shape"))?;
            if input_shape.is_empty() || input_shape.contains(&0) {
                return Err(Error::InvalidArchitecture(format!(
                    "Layer {}: input_shape must be non-empty with positive dimensions",
                    index
                )));
            }
            if let Some(output_shape) = &layer.output_shape {
                if output_shape.is_empty() || output_shape.contains(&0) {
                    return Err(Error::InvalidArchitecture(format!(
                        "Layer {}: output_shape must be non-empty with positive dimensions",
                        index
                    )));
                }
            }

            let input_size = layer_input_size(layer, index)?;
            let output_size = layer_output_size(layer, index)?;
            if input_size != output_size {
                return Err(Error::InvalidArchitecture(format!(
                    "Layer {}: cannot reshape {} elements into {}",
                    index, input_size, output_size
                )));
            }
        }
    }

    Ok(())
}

/// Builds a network from an architecture configuration.
///
/// Each layer is constructed from its config and initialized with `rng`, in
/// order. The configuration is validated first.
///
/// # Examples
///
/// ```no_run
/// use dlfs::architecture::{build_network, load_architecture};
/// use dlfs::utils::SimpleRng;
///
/// let config = load_architecture("config/architectures/small_cnn.json").unwrap();
/// let mut rng = SimpleRng::new(42);
/// let network = build_network(&config, &mut rng).unwrap();
/// assert_eq!(network.len(), config.layers.len());
/// ```
pub fn build_network(config: &ArchitectureConfig, rng: &mut SimpleRng) -> Result<Network> {
    validate_architecture(config)?;

    let mut network = Network::new();
    for (i, layer) in config.layers.iter().enumerate() {
        match LayerKind::parse(layer, i)? {
            LayerKind::Dense => {
                let n_inputs = layer.n_inputs.ok_or_else(|| missing(i, "Dense", "n_inputs"))?;
                let n_neurons = layer.n_neurons.ok_or_else(|| missing(i, "Dense", "n_neurons"))?;
                network.push(Box::new(DenseLayer::new(n_inputs, n_neurons, rng)?));
            }
            LayerKind::Convolutional => {
                let input_shape = conv_input_shape(layer, i)?;
                let output_channels = layer
                    .output_channels
                    .ok_or_else(|| missing(i, "Convolutional", "output_channels"))?;
                let kernel_size = layer
                    .kernel_size
                    .ok_or_else(|| missing(i, "Convolutional", "kernel_size"))?;
                let stride = layer.stride.unwrap_or(1);
                network.push(Box::new(ConvolutionalLayer::new(
                    input_shape,
                    output_channels,
                    kernel_size,
                    stride,
                    rng,
                )?));
            }
            LayerKind::Reshape => {
                let input_shape = layer
                    .input_shape
                    .as_deref()
                    .ok_or_else(|| missing(i, "Reshape", "input_shape"))?;
                let output_shape = layer
                    .output_shape
                    .as_deref()
                    .ok_or_else(|| missing(i, "Reshape", "output_shape"))?;
                network.push(Box::new(ReshapeLayer::new(input_shape, output_shape)?));
            }
            LayerKind::Flatten => {
                let input_shape = layer
                    .input_shape
                    .as_deref()
                    .ok_or_else(|| missing(i, "Flatten", "input_shape"))?;
                let reshape = match layer.output_shape.as_deref() {
                    Some(output_shape) => ReshapeLayer::new(input_shape, output_shape)?,
                    None => ReshapeLayer::flatten(input_shape)?,
                };
                network.push(Box::new(reshape));
            }
        }
    }

    info!(
        layers = network.len(),
        parameters = network.parameter_count(),
        "built network"
    );
    Ok(network)
}
