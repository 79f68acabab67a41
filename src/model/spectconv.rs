use ndarray::{s, Array2, Array3, ArrayView3, Ix2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::PITCH_CLASSES;
use crate::model::layers::Activation;
use crate::model::parameter::{Parameter, Trainable};

/// How a convolution treats positions beyond the ends of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// Wrap around: pitch classes within one octave form a circle.
    Circular,
    /// Read zeros: octaves do not wrap onto each other.
    Zeros,
}

impl Padding {
    pub fn for_octaves(octave_n: usize) -> Self {
        if octave_n == 1 {
            Padding::Circular
        } else {
            Padding::Zeros
        }
    }
}

/// 1-D convolution over spectral bins with a kernel spanning one octave.
///
/// The input is padded by `kernel / 2` on both sides, which for the even
/// kernel lengths used here yields one extra output position; the leading
/// one is dropped. With circular padding the layer commutes with rotations
/// of its input by multiples of `stride` bins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumConv {
    /// `(out_channels, in_channels * kernel)`, tap `k` of input channel `c`
    /// at column `c * kernel + k`.
    weight: Parameter<Ix2>,
    in_channels: usize,
    kernel: usize,
    stride: usize,
    padding: Padding,
}

/// Unfolded input of one [`SpectrumConv::forward`] call.
#[derive(Debug, Clone)]
pub struct ConvCache {
    /// One `(in_channels * kernel, out_len)` matrix per batch entry.
    cols: Vec<Array2<f32>>,
    /// Source bin of every `(t, k)` tap, `None` for zero padding.
    taps: Vec<Option<usize>>,
    input_len: usize,
}

impl SpectrumConv {
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        octave_n: usize,
        bin_n: usize,
        stride: usize,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / ((in_channels * bin_n) as f32).sqrt();
        Self {
            weight: Parameter::uniform((out_channels, in_channels * bin_n), bound, rng),
            in_channels,
            kernel: bin_n,
            stride: stride.max(1),
            padding: Padding::for_octaves(octave_n),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.weight.value().nrows()
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn output_len(&self, input_len: usize) -> usize {
        input_len / self.stride
    }

    /// Tap `k` of output `t` reads input `(t + 1)·stride + k − kernel/2`.
    fn taps(&self, input_len: usize) -> Vec<Option<usize>> {
        let half = (self.kernel / 2) as isize;
        let len = input_len as isize;
        let out_len = self.output_len(input_len);

        let mut taps = Vec::with_capacity(out_len * self.kernel);
        for t in 0..out_len {
            for k in 0..self.kernel {
                let source = ((t + 1) * self.stride + k) as isize - half;
                let tap = match self.padding {
                    Padding::Circular if len > 0 => Some(source.rem_euclid(len) as usize),
                    Padding::Circular => None,
                    Padding::Zeros => (0..len).contains(&source).then_some(source as usize),
                };
                taps.push(tap);
            }
        }
        taps
    }

    /// `(N, in_channels, L)` to `(N, out_channels, L / stride)`.
    pub fn forward(&self, x: ArrayView3<f32>) -> (Array3<f32>, ConvCache) {
        let (batch_n, _, input_len) = x.dim();
        let out_len = self.output_len(input_len);
        let taps = self.taps(input_len);

        let mut output = Array3::<f32>::zeros((batch_n, self.out_channels(), out_len));
        let mut cols = Vec::with_capacity(batch_n);
        for n in 0..batch_n {
            let mut col = Array2::<f32>::zeros((self.in_channels * self.kernel, out_len));
            for c in 0..self.in_channels {
                for t in 0..out_len {
                    for k in 0..self.kernel {
                        if let Some(source) = taps[t * self.kernel + k] {
                            col[[c * self.kernel + k, t]] = x[[n, c, source]];
                        }
                    }
                }
            }
            output
                .slice_mut(s![n, .., ..])
                .assign(&self.weight.value().dot(&col));
            cols.push(col);
        }

        (output, ConvCache { cols, taps, input_len })
    }

    /// Accumulate the weight gradient and return the input gradient.
    pub fn backward(&mut self, cache: &ConvCache, dy: ArrayView3<f32>) -> Array3<f32> {
        let batch_n = dy.dim().0;
        let out_len = dy.dim().2;
        let mut dx = Array3::<f32>::zeros((batch_n, self.in_channels, cache.input_len));

        for (n, col) in cache.cols.iter().enumerate().take(batch_n) {
            let dy_n = dy.slice(s![n, .., ..]);
            *self.weight.grad_mut() += &dy_n.dot(&col.t());

            let dcol = self.weight.value().t().dot(&dy_n);
            for c in 0..self.in_channels {
                for t in 0..out_len {
                    for k in 0..self.kernel {
                        if let Some(source) = cache.taps[t * self.kernel + k] {
                            dx[[n, c, source]] += dcol[[c * self.kernel + k, t]];
                        }
                    }
                }
            }
        }

        dx
    }

    pub fn weight(&self) -> &Parameter<Ix2> {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Parameter<Ix2> {
        &mut self.weight
    }

    pub fn parameters(&mut self) -> Vec<&mut dyn Trainable> {
        vec![&mut self.weight]
    }
}

/// A stack of [`SpectrumConv`] layers with an activation between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumSequential {
    layers: Vec<SpectrumConv>,
    activation: Activation,
}

#[derive(Debug, Clone)]
pub struct SequentialCache {
    convs: Vec<ConvCache>,
    /// Activation outputs of every layer but the last.
    activations: Vec<Array3<f32>>,
}

impl SpectrumSequential {
    /// `layer_n` convolutions from `in_channels` to `out_channels` through
    /// `hidden` channels. With `flatten_last` the last layer strides over
    /// the sub-semitone bins, leaving one output per pitch class.
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        layer_n: usize,
        hidden: usize,
        activation: Activation,
        octave_n: usize,
        bin_n: usize,
        flatten_last: bool,
        rng: &mut R,
    ) -> Self {
        let out_stride = if flatten_last { bin_n / PITCH_CLASSES } else { 1 };
        let layer_n = layer_n.max(1);

        let mut layers = Vec::with_capacity(layer_n);
        for i in 0..layer_n {
            let last = i + 1 == layer_n;
            let c_in = if i == 0 { in_channels } else { hidden };
            let c_out = if last { out_channels } else { hidden };
            let stride = if last { out_stride } else { 1 };
            layers.push(SpectrumConv::new(c_in, c_out, octave_n, bin_n, stride, rng));
        }

        Self { layers, activation }
    }

    pub fn layers(&self) -> &[SpectrumConv] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [SpectrumConv] {
        &mut self.layers
    }

    pub fn forward(&self, x: ArrayView3<f32>) -> (Array3<f32>, SequentialCache) {
        let mut convs = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len().saturating_sub(1));

        let mut h = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let (y, cache) = layer.forward(h.view());
            convs.push(cache);
            h = if i + 1 < self.layers.len() {
                let a = self.activation.forward(&y);
                activations.push(a.clone());
                a
            } else {
                y
            };
        }

        (h, SequentialCache { convs, activations })
    }

    pub fn backward(&mut self, cache: &SequentialCache, dy: ArrayView3<f32>) -> Array3<f32> {
        let mut grad = dy.to_owned();
        let layer_n = self.layers.len();
        for i in (0..layer_n).rev() {
            if i + 1 < layer_n {
                grad = self.activation.backward(&cache.activations[i], &grad);
            }
            grad = self.layers[i].backward(&cache.convs[i], grad.view());
        }
        grad
    }

    pub fn parameters(&mut self) -> Vec<&mut dyn Trainable> {
        self.layers
            .iter_mut()
            .flat_map(SpectrumConv::parameters)
            .collect()
    }
}
