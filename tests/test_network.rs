// Tests for chaining layers into a network: forward threading, reverse
// gradient flow, and agreement with running the layers by hand.

use approx::assert_relative_eq;
use dlfs::layers::{ConvolutionalLayer, DenseLayer, Layer, ReshapeLayer};
use dlfs::utils::SimpleRng;
use dlfs::{Error, Network};
use ndarray::{ArrayD, IxDyn};

fn conv_flatten_dense(seed: u64) -> (ConvolutionalLayer, ReshapeLayer, DenseLayer) {
    let mut rng = SimpleRng::new(seed);
    let conv = ConvolutionalLayer::new((2, 7, 7), 3, 3, 2, &mut rng).unwrap();
    let flatten = ReshapeLayer::flatten(&conv.output_shape()).unwrap();
    let dense = DenseLayer::new(3 * 3 * 3, 4, &mut rng).unwrap();
    (conv, flatten, dense)
}

#[test]
fn test_network_matches_manual_chain() {
    let (conv, flatten, dense) = conv_flatten_dense(21);
    let (mut conv_m, mut flatten_m, mut dense_m) = (conv.clone(), flatten.clone(), dense.clone());

    let mut network = Network::new();
    network.push(Box::new(conv));
    network.push(Box::new(flatten));
    network.push(Box::new(dense));

    let mut rng = SimpleRng::new(99);
    let batch = rng.normal_array(vec![3, 2, 7, 7], 1.0);
    let delta = rng.normal_array(vec![3, 4], 1.0);

    let output = network.forward(&batch).unwrap().clone();
    let grad = network.backward(&delta).unwrap().clone();

    conv_m.forward(&batch).unwrap();
    flatten_m.forward(conv_m.output().unwrap()).unwrap();
    dense_m.forward(flatten_m.output().unwrap()).unwrap();
    dense_m.backward(&delta).unwrap();
    flatten_m.backward(dense_m.dinputs().unwrap()).unwrap();
    conv_m.backward(flatten_m.dinputs().unwrap()).unwrap();

    for (a, b) in output.iter().zip(dense_m.output().unwrap().iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
    for (a, b) in grad.iter().zip(conv_m.dinputs().unwrap().iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
    assert_eq!(grad.shape(), batch.shape());
}

#[test]
fn test_network_exposes_layer_gradients() {
    let (conv, flatten, dense) = conv_flatten_dense(22);
    let mut network = Network::new();
    network.push(Box::new(conv));
    network.push(Box::new(flatten));
    network.push(Box::new(dense));
    assert_eq!(network.len(), 3);

    let batch = ArrayD::from_elem(IxDyn(&[1, 2, 7, 7]), 1.0);
    network.forward(&batch).unwrap();
    network
        .backward(&ArrayD::from_elem(IxDyn(&[1, 4]), 1.0))
        .unwrap();

    for layer in network.layers() {
        let dinputs = layer.dinputs().expect("every layer ran backward");
        assert_eq!(&dinputs.shape()[1..], layer.input_shape().as_slice());
    }
    assert_eq!(network.layer(2).unwrap().name(), "DenseLayer");
    assert!(network.layer(3).is_none());
}

#[test]
fn test_network_propagates_shape_errors() {
    let (conv, flatten, dense) = conv_flatten_dense(23);
    let mut network = Network::new();
    network.push(Box::new(conv));
    network.push(Box::new(flatten));
    network.push(Box::new(dense));

    let err = network
        .forward(&ArrayD::zeros(IxDyn(&[1, 1, 7, 7])))
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert!(network.output().is_none());
}

#[test]
fn test_sgd_step_through_network_parameters() {
    let (conv, flatten, dense) = conv_flatten_dense(24);
    let mut network = Network::new();
    network.push(Box::new(conv));
    network.push(Box::new(flatten));
    network.push(Box::new(dense));

    let mut rng = SimpleRng::new(5);
    let batch = rng.normal_array(vec![2, 2, 7, 7], 1.0);
    network.forward(&batch).unwrap();
    network.backward(&rng.normal_array(vec![2, 4], 1.0)).unwrap();

    let before: Vec<ArrayD<f64>> = network
        .parameters()
        .iter()
        .map(|p| p.value.to_owned())
        .collect();

    let learning_rate = 0.01;
    let mut params = network.parameters();
    let names: Vec<&str> = params.iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["kernels", "biases", "weights", "biases"]);
    for param in params.iter_mut() {
        let gradient = param.gradient.as_ref().expect("backward ran");
        param.value.scaled_add(-learning_rate, gradient);
    }
    drop(params);

    for (old, param) in before.iter().zip(network.parameters()) {
        let gradient = param.gradient.unwrap();
        let expected = old - &(gradient.to_owned() * learning_rate);
        for (a, b) in param.value.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_ne!(&param.value.to_owned(), old);
    }
}

#[test]
fn test_layer_mut_downcasts_to_concrete_layers() {
    let (conv, flatten, dense) = conv_flatten_dense(25);
    let mut network = Network::new();
    network.push(Box::new(conv));
    network.push(Box::new(flatten));
    network.push(Box::new(dense));

    let batch = ArrayD::from_elem(IxDyn(&[1, 2, 7, 7]), 0.5);
    network.forward(&batch).unwrap();
    network
        .backward(&ArrayD::from_elem(IxDyn(&[1, 4]), 1.0))
        .unwrap();

    let dense = network
        .layer_mut(2)
        .unwrap()
        .as_any_mut()
        .downcast_mut::<DenseLayer>()
        .expect("layer 2 is dense");
    let step = dense.dweights().unwrap() * 0.1;
    let before = dense.weights().to_owned();
    dense.weights_mut().zip_mut_with(&step, |w, g| *w -= g);
    assert_eq!(dense.weights().to_owned(), &before - &step);

    let conv = network
        .layer(0)
        .unwrap()
        .as_any()
        .downcast_ref::<ConvolutionalLayer>()
        .expect("layer 0 is convolutional");
    assert_eq!(conv.dkernels().unwrap().shape(), conv.kernels().shape());

    assert!(network
        .layer(1)
        .unwrap()
        .as_any()
        .downcast_ref::<DenseLayer>()
        .is_none());
    assert_eq!(network.parameter_count(), 3 * 2 * 3 * 3 + 3 * 3 * 3 + 27 * 4 + 4);
}
