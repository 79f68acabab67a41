use ndarray::{Array2, ArrayView2, Axis, Dimension, Ix1, Ix2, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::parameter::{Parameter, Trainable};

/// Fully connected layer: `y = x Wᵀ + b` over rows of `x`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    weight: Parameter<Ix2>,
    bias: Parameter<Ix1>,
}

impl Linear {
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();
        Self {
            weight: Parameter::uniform((out_features, in_features), bound, rng),
            bias: Parameter::uniform(out_features, bound, rng),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.value().ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.value().nrows()
    }

    pub fn weight(&self) -> &Parameter<Ix2> {
        &self.weight
    }

    pub fn bias(&self) -> &Parameter<Ix1> {
        &self.bias
    }

    /// `(N, in)` to `(N, out)`.
    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        x.dot(&self.weight.value().t()) + self.bias.value()
    }

    /// Accumulate parameter gradients for input `x` and output gradient `dy`,
    /// returning the input gradient.
    pub fn backward(&mut self, x: ArrayView2<f32>, dy: ArrayView2<f32>) -> Array2<f32> {
        *self.weight.grad_mut() += &dy.t().dot(&x);
        *self.bias.grad_mut() += &dy.sum_axis(Axis(0));
        dy.dot(self.weight.value())
    }

    pub fn parameters(&mut self) -> Vec<&mut dyn Trainable> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// Pointwise nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Tanh,
    Relu,
}

impl Activation {
    pub fn forward<D: Dimension>(&self, x: &ndarray::Array<f32, D>) -> ndarray::Array<f32, D> {
        match self {
            Activation::Tanh => x.mapv(f32::tanh),
            Activation::Relu => x.mapv(|v| v.max(0.0)),
        }
    }

    /// Input gradient from the activation's own output `y`.
    pub fn backward<D: Dimension>(
        &self,
        y: &ndarray::Array<f32, D>,
        dy: &ndarray::Array<f32, D>,
    ) -> ndarray::Array<f32, D> {
        let mut dx = dy.clone();
        match self {
            Activation::Tanh => Zip::from(&mut dx).and(y).for_each(|d, &y| *d *= 1.0 - y * y),
            Activation::Relu => Zip::from(&mut dx).and(y).for_each(|d, &y| {
                if y <= 0.0 {
                    *d = 0.0
                }
            }),
        }
        dx
    }
}

/// Linear layers with an activation between consecutive ones (none after
/// the last).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<Linear>,
    activation: Activation,
}

/// Layer inputs recorded by [`Mlp::forward`]; entry `i` is the input of layer `i`.
#[derive(Debug, Clone)]
pub struct MlpCache {
    inputs: Vec<Array2<f32>>,
}

impl Mlp {
    /// `sizes` lists the feature counts from input to output, so
    /// `[132, 100, 100, 6]` builds three layers.
    pub fn new<R: Rng>(sizes: &[usize], activation: Activation, rng: &mut R) -> Self {
        let layers = sizes
            .windows(2)
            .map(|w| Linear::new(w[0], w[1], rng))
            .collect();
        Self { layers, activation }
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> (Array2<f32>, MlpCache) {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut h = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let mut out = layer.forward(h.view());
            if i + 1 < self.layers.len() {
                out = self.activation.forward(&out);
            }
            inputs.push(h);
            h = out;
        }
        (h, MlpCache { inputs })
    }

    pub fn backward(&mut self, cache: &MlpCache, dy: ArrayView2<f32>) -> Array2<f32> {
        let mut grad = dy.to_owned();
        let layer_n = self.layers.len();
        for i in (0..layer_n).rev() {
            if i + 1 < layer_n {
                // Input of layer i + 1 is the activation output of layer i
                grad = self.activation.backward(&cache.inputs[i + 1], &grad);
            }
            grad = self.layers[i].backward(cache.inputs[i].view(), grad.view());
        }
        grad
    }

    pub fn parameters(&mut self) -> Vec<&mut dyn Trainable> {
        self.layers.iter_mut().flat_map(Linear::parameters).collect()
    }
}

/// Row-wise log-softmax of `(N, C)` scores.
pub fn log_softmax(x: ArrayView2<f32>) -> Array2<f32> {
    let mut out = x.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let shifted = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln();
        row.mapv_inplace(|v| (v - max) - shifted);
    }
    out
}

/// Gradient through [`log_softmax`] given its output `lp` and the output
/// gradient `g`: `g - softmax · Σg` per row.
pub fn log_softmax_backward(lp: ArrayView2<f32>, g: ArrayView2<f32>) -> Array2<f32> {
    let mut dx = g.to_owned();
    for (mut dx_row, lp_row) in dx.rows_mut().into_iter().zip(lp.rows()) {
        let total = dx_row.sum();
        Zip::from(&mut dx_row).and(&lp_row).for_each(|d, &l| *d -= l.exp() * total);
    }
    dx
}

/// Row `t` of the result is row `t + offset` of `x`, or `fill` where that
/// row does not exist.
pub fn shift_sequence(x: ArrayView2<f32>, offset: isize, fill: f32) -> Array2<f32> {
    let (rows, cols) = x.dim();
    let mut out = Array2::from_elem((rows, cols), fill);
    for t in 0..rows {
        let source = t as isize + offset;
        if source >= 0 && (source as usize) < rows {
            out.row_mut(t).assign(&x.row(source as usize));
        }
    }
    out
}

/// Rotate the last axis: `out[.., i] = x[.., (i + shift) mod n]`.
///
/// With `shift` equal to a root index this moves that root to position 0.
pub fn roll_pitch_classes(x: ArrayView2<f32>, shift: usize) -> Array2<f32> {
    let n = x.ncols();
    if n == 0 {
        return x.to_owned();
    }
    Array2::from_shape_fn(x.dim(), |(c, i)| x[[c, (i + shift) % n]])
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    /// Central finite difference of `f` with respect to every entry of `x`.
    pub(crate) fn numeric_grad(x: &Array2<f32>, mut f: impl FnMut(&Array2<f32>) -> f32) -> Array2<f32> {
        let eps = 1e-2f32;
        let mut grad = Array2::zeros(x.dim());
        for idx in ndarray::indices(x.dim()) {
            let mut plus = x.clone();
            plus[idx] += eps;
            let mut minus = x.clone();
            minus[idx] -= eps;
            grad[idx] = (f(&plus) - f(&minus)) / (2.0 * eps);
        }
        grad
    }

    #[test]
    fn log_softmax_normalizes() {
        let lp = log_softmax(array![[1.0f32, 2.0, 3.0], [1000.0, 1000.0, 1000.0]].view());
        for row in lp.rows() {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        }
        assert_abs_diff_eq!(lp[[1, 0]], -(3.0f32).ln(), epsilon = 1e-5);
    }

    #[test]
    fn log_softmax_keeps_precision_for_large_scores() {
        let lp = log_softmax(array![[1000.0f32, 999.0, 990.0], [-500.0, 2000.0, 2000.0]].view());
        let expected = -(1.0f32 + (-1.0f32).exp() + (-10.0f32).exp()).ln();
        assert_abs_diff_eq!(lp[[0, 0]], expected, epsilon = 1e-6);
        assert_abs_diff_eq!(lp[[0, 1]], expected - 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(lp[[1, 1]], -(2.0f32).ln(), epsilon = 1e-6);
        assert_eq!(lp[[1, 0]].exp(), 0.0);
    }

    #[test]
    fn log_softmax_gradient() {
        let x = array![[0.3f32, -1.2, 2.0, 0.1]];
        let weights = array![[0.5f32, -1.0, 2.0, 0.25]];
        let objective = |x: &Array2<f32>| (log_softmax(x.view()) * &weights).sum();

        let lp = log_softmax(x.view());
        let analytic = log_softmax_backward(lp.view(), weights.view());
        let numeric = numeric_grad(&x, objective);
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(a, n, epsilon = 2e-3);
        }
    }

    #[test]
    fn mlp_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut mlp = Mlp::new(&[3, 4, 2], Activation::Tanh, &mut rng);
        let x = array![[0.2f32, -0.4, 0.9], [1.0, 0.3, -0.5]];
        let weights = array![[1.0f32, -2.0], [0.5, 0.25]];

        let (_, cache) = mlp.forward(x.view());
        let dx = mlp.backward(&cache, weights.view());

        let frozen = mlp.clone();
        let numeric = numeric_grad(&x, |x| (frozen.forward(x.view()).0 * &weights).sum());
        for (a, n) in dx.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(a, n, epsilon = 2e-3);
        }

        // Linear in its bias: the bias gradient of the last layer is the column sum of dy.
        let last_bias = mlp.layers[1].bias().grad().clone();
        assert_abs_diff_eq!(last_bias[0], 1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(last_bias[1], -1.75, epsilon = 1e-6);
    }

    #[test]
    fn relu_blocks_negative_gradient() {
        let y = array![[0.0f32, 2.0]];
        let dy = array![[1.0f32, 1.0]];
        assert_eq!(Activation::Relu.backward(&y, &dy), array![[0.0, 1.0]]);
    }

    #[test]
    fn sequence_shift_fills_edges() {
        let x = array![[1.0f32], [2.0], [3.0]];
        assert_eq!(shift_sequence(x.view(), -1, 0.0), array![[0.0], [1.0], [2.0]]);
        assert_eq!(shift_sequence(x.view(), 2, 0.0), array![[3.0], [0.0], [0.0]]);
        assert_eq!(shift_sequence(x.view(), 0, 0.0), x);
    }

    #[test]
    fn pitch_class_roll_moves_root_to_front() {
        let x = Array2::from_shape_fn((2, 12), |(c, i)| (c * 100 + i) as f32);
        let rolled = roll_pitch_classes(x.view(), 5);
        assert_eq!(rolled[[0, 0]], 5.0);
        assert_eq!(rolled[[1, 7]], 100.0);
        assert_eq!(roll_pitch_classes(x.view(), 0), x);
    }
}
