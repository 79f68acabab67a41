use ndarray::{Array, ArrayViewD, ArrayViewMutD, Dimension};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A learnable tensor and its accumulated gradient.
///
/// Only the value is persisted; the gradient is rebuilt as zeros on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter<D: Dimension> {
    value: Array<f32, D>,
    #[serde(skip)]
    grad: Array<f32, D>,
}

impl<D: Dimension> Parameter<D> {
    pub fn new(value: Array<f32, D>) -> Self {
        let grad = Array::zeros(value.raw_dim());
        Self { value, grad }
    }

    /// Uniform in `[-bound, bound)`.
    pub fn uniform<Sh, R>(shape: Sh, bound: f32, rng: &mut R) -> Self
    where
        Sh: ndarray::ShapeBuilder<Dim = D>,
        R: Rng,
    {
        let value = Array::from_shape_simple_fn(shape, || rng.gen_range(-bound..bound));
        Self::new(value)
    }

    pub fn value(&self) -> &Array<f32, D> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Array<f32, D> {
        &mut self.value
    }

    pub fn grad(&self) -> &Array<f32, D> {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut Array<f32, D> {
        if self.grad.shape() != self.value.shape() {
            self.grad = Array::zeros(self.value.raw_dim());
        }
        &mut self.grad
    }
}

/// Type-erased view of a parameter for optimizers.
pub trait Trainable {
    fn value_and_grad(&mut self) -> (ArrayViewMutD<'_, f32>, ArrayViewD<'_, f32>);
    fn zero_grad(&mut self);
}

impl<D: Dimension> Trainable for Parameter<D> {
    fn value_and_grad(&mut self) -> (ArrayViewMutD<'_, f32>, ArrayViewD<'_, f32>) {
        self.grad_mut();
        (self.value.view_mut().into_dyn(), self.grad.view().into_dyn())
    }

    fn zero_grad(&mut self) {
        self.grad_mut().fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2, Ix2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn uniform_respects_bound() {
        let mut rng = StdRng::seed_from_u64(0);
        let p = Parameter::<Ix2>::uniform((4, 5), 0.25, &mut rng);
        assert_eq!(p.value().dim(), (4, 5));
        assert!(p.value().iter().all(|v| v.abs() <= 0.25));
        assert!(p.grad().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn grad_is_rebuilt_after_deserialize() {
        let mut p = Parameter::new(array![[1.0f32, 2.0]]);
        p.grad_mut()[[0, 1]] = 3.0;

        let json = serde_json::to_string(&p).unwrap();
        let mut back: Parameter<Ix2> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), p.value());

        let (value, grad) = back.value_and_grad();
        assert_eq!(value.shape(), &[1, 2]);
        assert_eq!(grad.shape(), &[1, 2]);
        assert!(grad.iter().all(|&g| g == 0.0));

        p.zero_grad();
        assert_eq!(p.grad(), &Array2::<f32>::zeros((1, 2)));
    }
}
