//! 2D Convolutional layer implementation
//!
//! This module provides a ConvolutionalLayer that slides square kernels over
//! multi-channel inputs, commonly used in computer vision tasks like image
//! classification.
//!
//! # Forward pass
//!
//! For every sample, output channel and input channel the layer computes the
//! valid-mode cross-correlation of the input plane with the kernel at stride 1
//! and then keeps every `stride`-th row and column. The per-channel results
//! are summed on top of the bias map.
//!
//! # Backward pass
//!
//! - kernel gradient: valid correlation of the input plane with the output
//!   gradient
//! - input gradient: full convolution of the output gradient with the kernel
//!
//! With `stride > 1` the output gradient first has to be dilated back to the
//! stride-1 grid. Because the output size is floored, the dilated gradient
//! can fall short of the stride-1 output size, and the full convolution can
//! fall short of the input size. Both targets are computed explicitly and the
//! shortfall is zero-padded at the bottom/right.

use std::any::Any;

use ndarray::{s, Array2, Array3, Array4, ArrayD, ArrayView2, ArrayView3, ArrayView4, ArrayViewMut3, ArrayViewMut4, Axis, Ix4};
use tracing::{debug, trace, warn};

use super::{batch_size, batched, check_shape, Layer, Parameter};
use crate::error::{Error, Result};
use crate::utils::{convolve2d_full, correlate2d_valid, dilate, pad_to_shape, SimpleRng};

/// 2D Convolutional layer with learnable kernels and a per-position bias map.
///
/// # Shapes
///
/// * inputs: `[batch, input_channels, input_height, input_width]`
/// * kernels: `[output_channels, input_channels, kernel_size, kernel_size]`
/// * biases: `[output_channels, output_height, output_width]`
/// * output: `[batch, output_channels, output_height, output_width]`
///
/// where `output_height = (input_height - kernel_size) / stride + 1`
/// (integer division), and likewise for the width.
///
/// # Example
///
/// ```ignore
/// use dlfs::layers::{ConvolutionalLayer, Layer};
/// use dlfs::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// // 1 input channel (grayscale 28x28), 8 output channels, 3x3 kernel, stride 1
/// let layer = ConvolutionalLayer::new((1, 28, 28), 8, 3, 1, &mut rng)?;
/// assert_eq!(layer.output_shape(), vec![8, 26, 26]);
/// ```
#[derive(Debug, Clone)]
pub struct ConvolutionalLayer {
    input_shape: (usize, usize, usize),
    output_shape: (usize, usize, usize),
    kernel_size: usize,
    stride: usize,

    kernels: Array4<f64>,
    biases: Array3<f64>,

    // Record of the last forward call
    inputs: Option<Array4<f64>>,
    output: Option<ArrayD<f64>>,
    awaiting_backward: bool,

    // Gradients from the last backward call
    dkernels: Option<Array4<f64>>,
    dbiases: Option<Array3<f64>>,
    dinputs: Option<ArrayD<f64>>,
}

/// Per-sample output shape `(output_channels, height, width)` for the given
/// configuration.
///
/// # Errors
///
/// `Configuration` if any size or the stride is zero, or if the kernel does
/// not fit inside the input.
pub fn conv_output_shape(
    input_shape: (usize, usize, usize),
    output_channels: usize,
    kernel_size: usize,
    stride: usize,
) -> Result<(usize, usize, usize)> {
    let (channels, height, width) = input_shape;

    if channels == 0 || height == 0 || width == 0 {
        return Err(Error::Configuration(format!(
            "convolution input shape must be positive, got {:?}",
            input_shape
        )));
    }
    if output_channels == 0 {
        return Err(Error::Configuration(
            "convolution needs at least one output channel".into(),
        ));
    }
    if stride == 0 {
        return Err(Error::Configuration("convolution stride must be at least 1".into()));
    }
    if kernel_size == 0 || kernel_size > height || kernel_size > width {
        return Err(Error::Configuration(format!(
            "kernel size {} does not fit input of {}x{}",
            kernel_size, height, width
        )));
    }

    let output_height = (height - kernel_size) / stride + 1;
    let output_width = (width - kernel_size) / stride + 1;
    Ok((output_channels, output_height, output_width))
}

impl ConvolutionalLayer {
    /// Create a new ConvolutionalLayer.
    ///
    /// Kernels and biases are both drawn from a standard normal distribution.
    ///
    /// # Arguments
    ///
    /// * `input_shape` - Per-sample `(channels, height, width)`
    /// * `output_channels` - Number of kernels, i.e. depth of the output
    /// * `kernel_size` - Side of each square kernel
    /// * `stride` - Step between kernel positions, along both axes
    /// * `rng` - Random number generator for parameter initialization
    ///
    /// # Errors
    ///
    /// `Configuration` if the kernel does not fit the input or any size or the
    /// stride is zero.
    pub fn new(
        input_shape: (usize, usize, usize),
        output_channels: usize,
        kernel_size: usize,
        stride: usize,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        let output_shape = conv_output_shape(input_shape, output_channels, kernel_size, stride)?;
        let input_channels = input_shape.0;

        let kernels = rng.normal_array(
            (output_channels, input_channels, kernel_size, kernel_size),
            1.0,
        );
        let biases = rng.normal_array(output_shape, 1.0);

        debug!(
            ?input_shape,
            ?output_shape,
            kernel_size,
            stride,
            "created convolutional layer"
        );
        Ok(Self::with_parameters(
            input_shape,
            output_shape,
            kernel_size,
            stride,
            kernels,
            biases,
        ))
    }

    /// Same as [`ConvolutionalLayer::new`] with `stride = 1`.
    pub fn with_unit_stride(
        input_shape: (usize, usize, usize),
        output_channels: usize,
        kernel_size: usize,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        Self::new(input_shape, output_channels, kernel_size, 1, rng)
    }

    /// Create a ConvolutionalLayer from explicit kernels and biases.
    ///
    /// The output channel count and kernel size are read from `kernels`.
    ///
    /// # Errors
    ///
    /// - `Configuration` for the same reasons as [`ConvolutionalLayer::new`],
    ///   or if the kernels are not square
    /// - `ShapeMismatch` if the kernel channel count or the bias shape does not
    ///   agree with `input_shape`
    pub fn from_parameters(
        input_shape: (usize, usize, usize),
        kernels: Array4<f64>,
        biases: Array3<f64>,
        stride: usize,
    ) -> Result<Self> {
        let (output_channels, kernel_channels, kernel_height, kernel_width) = kernels.dim();
        if kernel_height != kernel_width {
            return Err(Error::Configuration(format!(
                "kernels must be square, got {}x{}",
                kernel_height, kernel_width
            )));
        }

        let output_shape = conv_output_shape(input_shape, output_channels, kernel_height, stride)?;
        if kernel_channels != input_shape.0 {
            return Err(Error::shape_mismatch(
                "ConvolutionalLayer kernel input channels",
                &[input_shape.0],
                &[kernel_channels],
            ));
        }
        check_shape(
            "ConvolutionalLayer biases",
            biases.shape(),
            &[output_shape.0, output_shape.1, output_shape.2],
        )?;

        Ok(Self::with_parameters(
            input_shape,
            output_shape,
            kernel_height,
            stride,
            kernels,
            biases,
        ))
    }

    fn with_parameters(
        input_shape: (usize, usize, usize),
        output_shape: (usize, usize, usize),
        kernel_size: usize,
        stride: usize,
        kernels: Array4<f64>,
        biases: Array3<f64>,
    ) -> Self {
        Self {
            input_shape,
            output_shape,
            kernel_size,
            stride,
            kernels,
            biases,
            inputs: None,
            output: None,
            awaiting_backward: false,
            dkernels: None,
            dbiases: None,
            dinputs: None,
        }
    }

    /// Get the number of input channels.
    pub fn input_channels(&self) -> usize {
        self.input_shape.0
    }

    /// Get the number of output channels (kernels).
    pub fn output_channels(&self) -> usize {
        self.output_shape.0
    }

    /// Get the kernel size.
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Get the stride.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the output height after convolution.
    ///
    /// Calculated as: (input_height - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        self.output_shape.1
    }

    /// Get the output width after convolution.
    ///
    /// Calculated as: (input_width - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        self.output_shape.2
    }

    pub fn kernels(&self) -> ArrayView4<f64> {
        self.kernels.view()
    }

    pub fn biases(&self) -> ArrayView3<f64> {
        self.biases.view()
    }

    /// Mutable view of the kernels for an external optimizer. The shape is fixed.
    pub fn kernels_mut(&mut self) -> ArrayViewMut4<f64> {
        self.kernels.view_mut()
    }

    /// Mutable view of the biases for an external optimizer. The shape is fixed.
    pub fn biases_mut(&mut self) -> ArrayViewMut3<f64> {
        self.biases.view_mut()
    }

    /// Replace the kernels; the new tensor must have the same shape.
    pub fn set_kernels(&mut self, kernels: Array4<f64>) -> Result<()> {
        check_shape("ConvolutionalLayer::set_kernels", kernels.shape(), self.kernels.shape())?;
        self.kernels = kernels;
        Ok(())
    }

    /// Replace the bias map; the new tensor must have the same shape.
    pub fn set_biases(&mut self, biases: Array3<f64>) -> Result<()> {
        check_shape("ConvolutionalLayer::set_biases", biases.shape(), self.biases.shape())?;
        self.biases = biases;
        Ok(())
    }

    /// Inputs stored by the most recent forward call.
    pub fn inputs(&self) -> Option<&Array4<f64>> {
        self.inputs.as_ref()
    }

    /// Gradient with respect to the kernels, summed over the batch.
    pub fn dkernels(&self) -> Option<&Array4<f64>> {
        self.dkernels.as_ref()
    }

    /// Gradient with respect to the bias map, summed over the batch.
    pub fn dbiases(&self) -> Option<&Array3<f64>> {
        self.dbiases.as_ref()
    }

    fn batched_input_shape(&self, batch: usize) -> Vec<usize> {
        let (c, h, w) = self.input_shape;
        batched(batch, &[c, h, w])
    }

    fn batched_output_shape(&self, batch: usize) -> Vec<usize> {
        let (c, h, w) = self.output_shape;
        batched(batch, &[c, h, w])
    }

    /// Kernel and input gradient contributions of one (input plane, output
    /// gradient plane, kernel) triple for `stride > 1`.
    fn strided_gradients(
        &self,
        input: ArrayView2<f64>,
        delta: ArrayView2<f64>,
        kernel: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        let (_, input_height, input_width) = self.input_shape;
        let k = self.kernel_size;

        // Shape a valid correlation against the input needs to yield a k x k kernel gradient.
        let correlation_target = (input_height - k + 1, input_width - k + 1);

        let dilated = dilate(delta, self.stride)?;

        let dkernel = if dilated.dim() == correlation_target {
            correlate2d_valid(input, dilated.view())?
        } else {
            trace!(
                dilated = ?dilated.dim(),
                target = ?correlation_target,
                "padding dilated delta for kernel gradient"
            );
            let padded = pad_to_shape(dilated.view(), correlation_target)?;
            correlate2d_valid(input, padded.view())?
        };

        let candidate = convolve2d_full(dilated.view(), kernel);
        let dinput = if candidate.dim() == (input_height, input_width) {
            candidate
        } else {
            trace!(
                candidate = ?candidate.dim(),
                target = ?(input_height, input_width),
                "padding full convolution for input gradient"
            );
            pad_to_shape(candidate.view(), (input_height, input_width))?
        };

        Ok((dkernel, dinput))
    }
}

impl Layer for ConvolutionalLayer {
    fn name(&self) -> &'static str {
        "ConvolutionalLayer"
    }

    fn forward(&mut self, inputs: &ArrayD<f64>) -> Result<()> {
        let n_samples = batch_size(inputs.shape());
        let expected = self.batched_input_shape(n_samples);
        check_shape("ConvolutionalLayer::forward inputs", inputs.shape(), &expected)?;

        let inputs = inputs
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| Error::shape_mismatch("ConvolutionalLayer::forward inputs", &expected, inputs.shape()))?;

        let (output_channels, output_height, output_width) = self.output_shape;
        let mut output = Array4::<f64>::zeros((n_samples, output_channels, output_height, output_width));
        output += &self.biases;

        let stride = self.stride;
        for sample in 0..n_samples {
            for out_channel in 0..output_channels {
                let mut out_plane = output.slice_mut(s![sample, out_channel, .., ..]);
                for in_channel in 0..self.input_channels() {
                    // Correlate at stride 1, then subsample.
                    let correlation = correlate2d_valid(
                        inputs.slice(s![sample, in_channel, .., ..]),
                        self.kernels.slice(s![out_channel, in_channel, .., ..]),
                    )?;
                    out_plane += &correlation.slice(s![..;stride, ..;stride]);
                }
            }
        }

        if self.awaiting_backward {
            warn!(layer = self.name(), "forward called again before backward; replacing stored inputs");
        }
        debug!(layer = self.name(), n_samples, stride, "forward");

        self.inputs = Some(inputs.to_owned());
        self.output = Some(output.into_dyn());
        self.awaiting_backward = true;
        Ok(())
    }

    fn backward(&mut self, delta: &ArrayD<f64>) -> Result<()> {
        let inputs = self
            .inputs
            .as_ref()
            .ok_or(Error::MissingForward("ConvolutionalLayer"))?;
        let n_samples = inputs.len_of(Axis(0));

        let expected = self.batched_output_shape(n_samples);
        check_shape("ConvolutionalLayer::backward delta", delta.shape(), &expected)?;
        let delta = delta
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| Error::shape_mismatch("ConvolutionalLayer::backward delta", &expected, delta.shape()))?;

        let dbiases = delta.sum_axis(Axis(0));
        let mut dkernels = Array4::<f64>::zeros(self.kernels.raw_dim());
        let mut dinputs = Array4::<f64>::zeros(inputs.raw_dim());

        for sample in 0..n_samples {
            for out_channel in 0..self.output_channels() {
                let delta_plane = delta.slice(s![sample, out_channel, .., ..]);

                for in_channel in 0..self.input_channels() {
                    let input_plane = inputs.slice(s![sample, in_channel, .., ..]);
                    let kernel = self.kernels.slice(s![out_channel, in_channel, .., ..]);

                    let (dkernel, dinput) = if self.stride == 1 {
                        (
                            correlate2d_valid(input_plane, delta_plane)?,
                            convolve2d_full(delta_plane, kernel),
                        )
                    } else {
                        self.strided_gradients(input_plane, delta_plane, kernel)?
                    };

                    let mut dkernel_slot = dkernels.slice_mut(s![out_channel, in_channel, .., ..]);
                    dkernel_slot += &dkernel;
                    let mut dinput_slot = dinputs.slice_mut(s![sample, in_channel, .., ..]);
                    dinput_slot += &dinput;
                }
            }
        }

        debug!(layer = self.name(), n_samples, stride = self.stride, "backward");

        self.dkernels = Some(dkernels);
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
        let (c, h, w) = self.input_shape;
        vec![c, h, w]
    }

    fn output_shape(&self) -> Vec<usize> {
        let (c, h, w) = self.output_shape;
        vec![c, h, w]
    }

    fn parameter_count(&self) -> usize {
        self.kernels.len() + self.biases.len()
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter {
                name: "kernels",
                value: self.kernels.view_mut().into_dyn(),
                gradient: self.dkernels.as_ref().map(|g| g.view().into_dyn()),
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    fn ones_layer(input_size: usize, kernel_size: usize, stride: usize) -> ConvolutionalLayer {
        let (_, oh, ow) = conv_output_shape((1, input_size, input_size), 1, kernel_size, stride).unwrap();
        ConvolutionalLayer::from_parameters(
            (1, input_size, input_size),
            Array4::ones((1, 1, kernel_size, kernel_size)),
            Array3::zeros((1, oh, ow)),
            stride,
        )
        .unwrap()
    }

    #[test]
    fn test_conv_initialization() {
        let mut rng = SimpleRng::new(42);
        let layer = ConvolutionalLayer::new((1, 28, 28), 8, 3, 1, &mut rng).unwrap();

        assert_eq!(layer.input_channels(), 1);
        assert_eq!(layer.output_channels(), 8);
        assert_eq!(layer.kernel_size(), 3);
        assert_eq!(layer.stride(), 1);
        assert_eq!(layer.kernels().dim(), (8, 1, 3, 3));
        assert_eq!(layer.biases().dim(), (8, 26, 26));
    }

    #[test]
    fn test_conv_parameter_count() {
        let mut rng = SimpleRng::new(42);
        let layer = ConvolutionalLayer::new((1, 28, 28), 8, 3, 1, &mut rng).unwrap();

        // kernels: 8 * 1 * 3 * 3 = 72
        // biases: 8 * 26 * 26 = 5408
        assert_eq!(layer.parameter_count(), 72 + 5408);
    }

    #[test]
    fn test_conv_output_dimensions() {
        let mut rng = SimpleRng::new(42);
        // 28 - 3 + 1 = 26
        let layer = ConvolutionalLayer::with_unit_stride((1, 28, 28), 8, 3, &mut rng).unwrap();
        assert_eq!(layer.output_height(), 26);
        assert_eq!(layer.output_width(), 26);

        // floor((28 - 3) / 2) + 1 = 13
        let layer = ConvolutionalLayer::new((3, 28, 20), 4, 3, 2, &mut rng).unwrap();
        assert_eq!(layer.output_shape(), vec![4, 13, 9]);
    }

    #[test]
    fn test_conv_configuration_errors() {
        let mut rng = SimpleRng::new(42);
        assert!(matches!(
            ConvolutionalLayer::new((1, 3, 3), 1, 4, 1, &mut rng),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ConvolutionalLayer::new((1, 3, 3), 1, 2, 0, &mut rng),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ConvolutionalLayer::new((1, 3, 3), 0, 2, 1, &mut rng),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            ConvolutionalLayer::new((0, 3, 3), 1, 2, 1, &mut rng),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_conv_from_parameters_validation() {
        // Kernels expect 2 input channels, input has 1
        let err = ConvolutionalLayer::from_parameters(
            (1, 4, 4),
            Array4::zeros((1, 2, 2, 2)),
            Array3::zeros((1, 3, 3)),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        // Bias map has the wrong spatial size
        let err = ConvolutionalLayer::from_parameters(
            (1, 4, 4),
            Array4::zeros((1, 1, 2, 2)),
            Array3::zeros((1, 2, 2)),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        // Non-square kernels
        let err = ConvolutionalLayer::from_parameters(
            (1, 4, 4),
            Array4::zeros((1, 1, 2, 3)),
            Array3::zeros((1, 3, 2)),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_conv_deterministic_initialization() {
        let mut rng1 = SimpleRng::new(12345);
        let layer1 = ConvolutionalLayer::new((3, 32, 32), 16, 5, 1, &mut rng1).unwrap();

        let mut rng2 = SimpleRng::new(12345);
        let layer2 = ConvolutionalLayer::new((3, 32, 32), 16, 5, 1, &mut rng2).unwrap();

        assert_eq!(layer1.kernels(), layer2.kernels());
        assert_eq!(layer1.biases(), layer2.biases());
    }

    #[test]
    fn test_all_ones_stride_one() {
        let mut layer = ones_layer(3, 2, 1);
        layer.forward(&Array4::<f64>::ones((1, 1, 3, 3)).into_dyn()).unwrap();

        let output = layer.output().unwrap();
        assert_eq!(output.shape(), &[1, 1, 2, 2]);
        assert!(output.iter().all(|&v| v == 4.0));
    }

    #[test]
    fn test_all_ones_stride_two() {
        let mut layer = ones_layer(3, 2, 2);
        layer.forward(&Array4::<f64>::ones((1, 1, 3, 3)).into_dyn()).unwrap();
        assert_eq!(
            layer.output().unwrap(),
            &Array4::from_elem((1, 1, 1, 1), 4.0).into_dyn()
        );

        // The 1x1 delta dilates to 1x1 and has to be padded to 2x2.
        layer
            .backward(&Array4::<f64>::ones((1, 1, 1, 1)).into_dyn())
            .unwrap();
        assert_eq!(
            layer.dkernels().unwrap(),
            &Array4::<f64>::ones((1, 1, 2, 2))
        );
        assert_eq!(layer.dbiases().unwrap(), &array![[[1.0]]]);
        let expected_dinputs = array![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 0.0]]
            .into_shape((1, 1, 3, 3))
            .unwrap()
            .into_dyn();
        assert_eq!(layer.dinputs().unwrap(), &expected_dinputs);
    }

    #[test]
    fn test_stride_subsamples_stride_one_correlation() {
        let input = Array::from_shape_fn((1, 1, 5, 5), |(_, _, i, j)| (i * 5 + j) as f64);
        let kernel = Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, -1.0, 2.0, 0.5]).unwrap();

        let mut dense_grid = ConvolutionalLayer::from_parameters(
            (1, 5, 5),
            kernel.clone(),
            Array3::zeros((1, 4, 4)),
            1,
        )
        .unwrap();
        let mut strided = ConvolutionalLayer::from_parameters(
            (1, 5, 5),
            kernel,
            Array3::zeros((1, 2, 2)),
            2,
        )
        .unwrap();

        dense_grid.forward(&input.clone().into_dyn()).unwrap();
        strided.forward(&input.into_dyn()).unwrap();

        let full = dense_grid.output().unwrap();
        let sub = strided.output().unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(sub[[0, 0, i, j]], full[[0, 0, 2 * i, 2 * j]]);
            }
        }
    }

    #[test]
    fn test_bias_added_per_position() {
        let mut layer = ConvolutionalLayer::from_parameters(
            (1, 3, 3),
            Array4::zeros((1, 1, 2, 2)),
            array![[[1.0, 2.0], [3.0, 4.0]]],
            1,
        )
        .unwrap();
        layer.forward(&Array4::<f64>::ones((2, 1, 3, 3)).into_dyn()).unwrap();

        let output = layer.output().unwrap();
        assert_eq!(output.shape(), &[2, 1, 2, 2]);
        assert_eq!(output[[1, 0, 1, 0]], 3.0);
        assert_eq!(output[[0, 0, 1, 1]], 4.0);
    }

    #[test]
    fn test_gradient_shapes_with_padding_branches() {
        // 8x8 input, 3x3 kernel, stride 3: output 2x2, dilated delta 4x4,
        // kernel-gradient target 6x6, full convolution 6x6 padded to 8x8.
        let mut rng = SimpleRng::new(9);
        let mut layer = ConvolutionalLayer::new((2, 8, 8), 3, 3, 3, &mut rng).unwrap();
        assert_eq!(layer.output_shape(), vec![3, 2, 2]);

        let inputs = rng.normal_array((4, 2, 8, 8), 1.0).into_dyn();
        layer.forward(&inputs).unwrap();
        let delta = rng.normal_array((4, 3, 2, 2), 1.0).into_dyn();
        layer.backward(&delta).unwrap();

        assert_eq!(layer.dkernels().unwrap().shape(), layer.kernels().shape());
        assert_eq!(layer.dbiases().unwrap().shape(), layer.biases().shape());
        assert_eq!(layer.dinputs().unwrap().shape(), inputs.shape());
    }

    #[test]
    fn test_forward_rejects_wrong_channels() {
        let mut rng = SimpleRng::new(1);
        let mut layer = ConvolutionalLayer::new((2, 4, 4), 1, 2, 1, &mut rng).unwrap();
        let err = layer
            .forward(&Array4::<f64>::zeros((1, 3, 4, 4)).into_dyn())
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(layer.output().is_none());
    }

    #[test]
    fn test_backward_before_forward() {
        let mut layer = ones_layer(3, 2, 1);
        let err = layer
            .backward(&Array4::<f64>::zeros((1, 1, 2, 2)).into_dyn())
            .unwrap_err();
        assert!(matches!(err, Error::MissingForward("ConvolutionalLayer")));
    }

    #[test]
    fn test_backward_rejects_wrong_delta() {
        let mut layer = ones_layer(3, 2, 1);
        layer.forward(&Array4::<f64>::ones((2, 1, 3, 3)).into_dyn()).unwrap();

        // Batch of one against a stored batch of two
        let err = layer
            .backward(&Array4::<f64>::zeros((1, 1, 2, 2)).into_dyn())
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(layer.dkernels().is_none());
    }
}
