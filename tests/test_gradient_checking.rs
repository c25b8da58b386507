// Tests for numerical gradient checking using finite differences.
// Each layer is probed with the scalar objective L = sum(output * r) for a
// fixed random r, so dL/doutput = r and backward must reproduce dL/dinput.

use approx::assert_abs_diff_eq;
use convnet_trainer::layers::{
    AdaptiveAvgPool2DLayer, BatchNormLayer, Conv2DLayer, DenseLayer, Layer, MaxPool2DLayer,
};
use convnet_trainer::loss::cross_entropy;
use convnet_trainer::utils::SimpleRng;

fn random_vec(rng: &mut SimpleRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range_f32(-1.0, 1.0)).collect()
}

fn objective(layer: &dyn Layer, input: &[f32], r: &[f32], batch: usize) -> f64 {
    let mut output = vec![0.0f32; batch * layer.output_size()];
    layer.forward(input, &mut output, batch);
    output.iter().zip(r).map(|(&o, &w)| o as f64 * w as f64).sum()
}

fn check_input_gradient(layer: &dyn Layer, batch: usize, seed: u64, epsilon: f32, tolerance: f32) {
    let mut rng = SimpleRng::new(seed);
    let input = random_vec(&mut rng, batch * layer.input_size());
    let r = random_vec(&mut rng, batch * layer.output_size());

    let mut output = vec![0.0f32; r.len()];
    layer.forward(&input, &mut output, batch);
    let mut analytic = vec![0.0f32; input.len()];
    layer.backward(&input, &r, &mut analytic, batch);

    for i in 0..input.len() {
        let mut plus = input.clone();
        let mut minus = input.clone();
        plus[i] += epsilon;
        minus[i] -= epsilon;
        let numeric = (objective(layer, &plus, &r, batch) - objective(layer, &minus, &r, batch))
            / (2.0 * epsilon as f64);
        assert_abs_diff_eq!(analytic[i], numeric as f32, epsilon = tolerance);
    }
}

mod layer_input_gradients {
    use super::*;

    #[test]
    fn test_conv2d_input_gradient() {
        let mut rng = SimpleRng::new(1);
        let layer = Conv2DLayer::new(2, 3, 3, 1, 1, 4, 4, &mut rng);
        check_input_gradient(&layer, 2, 10, 1e-2, 1e-2);
    }

    #[test]
    fn test_strided_conv2d_input_gradient() {
        let mut rng = SimpleRng::new(2);
        let layer = Conv2DLayer::new(1, 2, 3, 0, 2, 5, 5, &mut rng);
        check_input_gradient(&layer, 1, 11, 1e-2, 1e-2);
    }

    #[test]
    fn test_dense_input_gradient() {
        let mut rng = SimpleRng::new(3);
        let layer = DenseLayer::new(6, 4, &mut rng);
        check_input_gradient(&layer, 3, 12, 1e-2, 1e-2);
    }

    #[test]
    fn test_batchnorm_training_input_gradient() {
        let layer = BatchNormLayer::new(2, 4, 1e-5, 0.9);
        check_input_gradient(&layer, 4, 13, 1e-2, 2e-2);
    }

    #[test]
    fn test_maxpool_input_gradient() {
        let layer = MaxPool2DLayer::new(2, 4, 4, 2, 2);
        check_input_gradient(&layer, 2, 14, 1e-4, 1e-2);
    }

    #[test]
    fn test_adaptive_avgpool_input_gradient() {
        let layer = AdaptiveAvgPool2DLayer::new(2, 5, 5, 3, 3);
        check_input_gradient(&layer, 2, 15, 1e-2, 1e-2);
    }
}

mod parameter_gradients {
    use super::*;

    #[test]
    fn test_conv2d_weight_gradient() {
        let mut rng = SimpleRng::new(4);
        let mut layer = Conv2DLayer::new(2, 2, 3, 1, 1, 3, 3, &mut rng);
        let batch = 2;
        let input = random_vec(&mut rng, batch * layer.input_size());
        let r = random_vec(&mut rng, batch * layer.output_size());

        layer.zero_grad();
        let mut output = vec![0.0f32; r.len()];
        layer.forward(&input, &mut output, batch);
        let mut grad_input = vec![0.0f32; input.len()];
        layer.backward(&input, &r, &mut grad_input, batch);
        let analytic = layer.grad_weights();

        let epsilon = 1e-2f32;
        for i in 0..analytic.len() {
            layer.weights_mut()[i] += epsilon;
            let plus = objective(&layer, &input, &r, batch);
            layer.weights_mut()[i] -= 2.0 * epsilon;
            let minus = objective(&layer, &input, &r, batch);
            layer.weights_mut()[i] += epsilon;

            let numeric = (plus - minus) / (2.0 * epsilon as f64);
            assert_abs_diff_eq!(analytic[i], numeric as f32, epsilon = 1e-2);
        }
    }
}

mod loss_gradients {
    use super::*;

    #[test]
    fn test_cross_entropy_gradient_matches_finite_differences() {
        let mut rng = SimpleRng::new(5);
        let logits = random_vec(&mut rng, 3 * 4);
        let labels = [2, 0, 3];
        let (_, analytic) = cross_entropy(&logits, &labels, 4).unwrap();

        let epsilon = 1e-2f32;
        for i in 0..logits.len() {
            let mut plus = logits.clone();
            let mut minus = logits.clone();
            plus[i] += epsilon;
            minus[i] -= epsilon;
            let (lp, _) = cross_entropy(&plus, &labels, 4).unwrap();
            let (lm, _) = cross_entropy(&minus, &labels, 4).unwrap();
            assert_abs_diff_eq!(analytic[i], (lp - lm) / (2.0 * epsilon), epsilon = 1e-3);
        }
    }
}
