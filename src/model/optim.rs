use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::model::parameter::Trainable;

/// Plain stochastic gradient descent with L2 weight decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    pub lr: f32,
    pub weight_decay: f32,
}

/// Adam with L2 weight decay folded into the gradient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub weight_decay: f32,
    step: i32,
    /// First and second moment per parameter, in `parameters()` order.
    #[serde(skip)]
    moments: Vec<(ArrayD<f32>, ArrayD<f32>)>,
}

impl Adam {
    pub fn new(lr: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay,
            step: 0,
            moments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd(Sgd),
    Adam(Adam),
}

/// An optimizer plus an optional per-epoch exponential learning-rate decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optimizer {
    kind: OptimizerKind,
    base_lr: f32,
    lr_decay: Option<f32>,
}

impl Optimizer {
    pub fn sgd(lr: f32, weight_decay: f32) -> Self {
        Self {
            kind: OptimizerKind::Sgd(Sgd { lr, weight_decay }),
            base_lr: lr,
            lr_decay: None,
        }
    }

    pub fn adam(lr: f32, weight_decay: f32) -> Self {
        Self {
            kind: OptimizerKind::Adam(Adam::new(lr, weight_decay)),
            base_lr: lr,
            lr_decay: None,
        }
    }

    /// Multiply the learning rate by `decay` every epoch.
    pub fn with_lr_decay(mut self, decay: f32) -> Self {
        self.lr_decay = Some(decay);
        self
    }

    pub fn kind(&self) -> &OptimizerKind {
        &self.kind
    }

    pub fn learning_rate(&self) -> f32 {
        match &self.kind {
            OptimizerKind::Sgd(sgd) => sgd.lr,
            OptimizerKind::Adam(adam) => adam.lr,
        }
    }

    fn set_learning_rate(&mut self, lr: f32) {
        match &mut self.kind {
            OptimizerKind::Sgd(sgd) => sgd.lr = lr,
            OptimizerKind::Adam(adam) => adam.lr = lr,
        }
    }

    /// Set the learning rate for `epoch` (counting from 0).
    pub fn set_epoch(&mut self, epoch: usize) {
        if let Some(decay) = self.lr_decay {
            self.set_learning_rate(self.base_lr * decay.powi(epoch as i32));
        }
    }

    /// Update every parameter from its accumulated gradient. `params` must
    /// come in the same order on every call.
    pub fn step(&mut self, params: Vec<&mut dyn Trainable>) {
        match &mut self.kind {
            OptimizerKind::Sgd(sgd) => {
                for param in params {
                    let (mut value, grad) = param.value_and_grad();
                    Zip::from(&mut value).and(&grad).for_each(|w, &g| {
                        *w -= sgd.lr * (g + sgd.weight_decay * *w);
                    });
                }
            }
            OptimizerKind::Adam(adam) => {
                adam.step += 1;
                let bias1 = 1.0 - adam.beta1.powi(adam.step);
                let bias2 = 1.0 - adam.beta2.powi(adam.step);

                for (i, param) in params.into_iter().enumerate() {
                    let (mut value, grad) = param.value_and_grad();
                    if adam.moments.len() <= i {
                        adam.moments.push((
                            ArrayD::zeros(value.raw_dim()),
                            ArrayD::zeros(value.raw_dim()),
                        ));
                    }
                    let (m, v) = &mut adam.moments[i];
                    if m.shape() != value.shape() {
                        *m = ArrayD::zeros(value.raw_dim());
                        *v = ArrayD::zeros(value.raw_dim());
                    }

                    let (lr, b1, b2, eps, wd) =
                        (adam.lr, adam.beta1, adam.beta2, adam.eps, adam.weight_decay);
                    Zip::from(&mut value)
                        .and(&grad)
                        .and(m)
                        .and(v)
                        .for_each(|w, &g, m, v| {
                            let g = g + wd * *w;
                            *m = b1 * *m + (1.0 - b1) * g;
                            *v = b2 * *v + (1.0 - b2) * g * g;
                            let m_hat = *m / bias1;
                            let v_hat = *v / bias2;
                            *w -= lr * m_hat / (v_hat.sqrt() + eps);
                        });
                }
            }
        }
    }

    pub fn zero_grad(params: Vec<&mut dyn Trainable>) {
        for param in params {
            param.zero_grad();
        }
    }
}
