use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{CONTEXT_BEATS, LR_DECAY_PER_EPOCH, PITCH_CLASSES};
use crate::dataset::data_type::DataProperties;
use crate::error::Result;
use crate::model::layers::{
    log_softmax, log_softmax_backward, roll_pitch_classes, shift_sequence, Activation, Mlp, MlpCache,
};
use crate::model::loss::argmax;
use crate::model::optim::Optimizer;
use crate::model::parameter::Trainable;
use crate::model::spectconv::{SequentialCache, SpectrumSequential};
use crate::model::trainable::{check_dim, check_width, ForwardPass, TrainableModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordNetConfig {
    /// Beats of context on either side of the current one.
    pub context: usize,
    pub attention_layers: usize,
    pub attention_hidden: usize,
    pub root_layers: usize,
    pub root_hidden: usize,
    pub quality_layers: usize,
    pub quality_hidden: usize,
    pub activation: Activation,
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub lr_decay: f32,
}

impl Default for ChordNetConfig {
    fn default() -> Self {
        Self {
            context: CONTEXT_BEATS,
            attention_layers: 2,
            attention_hidden: 20,
            root_layers: 2,
            root_hidden: 200,
            quality_layers: 2,
            quality_hidden: 100,
            activation: Activation::Tanh,
            learning_rate: 1e-4,
            weight_decay: 0.0,
            lr_decay: LR_DECAY_PER_EPOCH,
        }
    }
}

impl ChordNetConfig {
    pub fn channels(&self) -> usize {
        2 * self.context + 1
    }
}

/// Pitch-class equivariant chord recognizer.
///
/// Every beat is stacked with its neighbours into `2 · context + 1`
/// channels. A multi-octave convolution stack folds the spectrum onto
/// twelve pitch classes per channel, a circular stack picks the root, and
/// the features rotated so that root sits at index 0 go through a fully
/// connected quality classifier. Transposing the input therefore moves the
/// root prediction and leaves the quality prediction unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordNet {
    config: ChordNetConfig,
    props: DataProperties,
    attention: SpectrumSequential,
    root_net: SpectrumSequential,
    quality_net: Mlp,
}

#[derive(Debug, Clone)]
pub struct ChordNetCache {
    attention: SequentialCache,
    root: SequentialCache,
    quality: MlpCache,
    root_lp: Array2<f32>,
    quality_lp: Array2<f32>,
    predicted_roots: Vec<usize>,
    octave_n: usize,
}

impl ChordNet {
    pub fn new<R: Rng>(props: DataProperties, config: ChordNetConfig, rng: &mut R) -> Self {
        let channels = config.channels();
        let attention = SpectrumSequential::new(
            channels,
            channels,
            config.attention_layers,
            config.attention_hidden,
            config.activation,
            props.octave_n,
            props.bin_n,
            true,
            rng,
        );
        let root_net = SpectrumSequential::new(
            channels,
            1,
            config.root_layers,
            config.root_hidden,
            config.activation,
            1,
            PITCH_CLASSES,
            false,
            rng,
        );

        let mut sizes = vec![channels * PITCH_CLASSES];
        sizes.extend(std::iter::repeat(config.quality_hidden).take(config.quality_layers));
        sizes.push(props.encoding.quality_n());
        let quality_net = Mlp::new(&sizes, config.activation, rng);

        Self {
            config,
            props,
            attention,
            root_net,
            quality_net,
        }
    }

    pub fn config(&self) -> &ChordNetConfig {
        &self.config
    }

    pub fn attention_mut(&mut self) -> &mut SpectrumSequential {
        &mut self.attention
    }

    /// `(T, width)` beats to `(T, channels, width)`, channel `c` holding
    /// beat `t + c − context` or zeros beyond the sequence.
    fn context_stack(&self, signal: ArrayView2<f32>) -> Array3<f32> {
        let (frames, width) = signal.dim();
        let channels = self.config.channels();
        let mut stack = Array3::zeros((frames, channels, width));
        for c in 0..channels {
            let offset = c as isize - self.config.context as isize;
            stack
                .slice_mut(s![.., c, ..])
                .assign(&shift_sequence(signal, offset, 0.0));
        }
        stack
    }
}

/// `(T, C, octaves · 12)` to `(T, C, 12)` by summing octaves.
fn fold_octaves(x: &Array3<f32>, octave_n: usize) -> Array3<f32> {
    let (frames, channels, _) = x.dim();
    let mut out = Array3::zeros((frames, channels, PITCH_CLASSES));
    for o in 0..octave_n {
        out += &x.slice(s![.., .., o * PITCH_CLASSES..(o + 1) * PITCH_CLASSES]);
    }
    out
}

impl TrainableModel for ChordNet {
    type Cache = ChordNetCache;

    fn props(&self) -> &DataProperties {
        &self.props
    }

    fn forward(&self, signal: ArrayView2<f32>) -> Result<ForwardPass<ChordNetCache>> {
        check_width(signal, self.props.width())?;
        let frames = signal.nrows();
        let channels = self.config.channels();

        let stack = self.context_stack(signal);
        let (attended, attention) = self.attention.forward(stack.view());
        let pitch_classes = fold_octaves(&attended, self.props.octave_n);

        let (root_logits, root) = self.root_net.forward(pitch_classes.view());
        let root_logits = root_logits.index_axis_move(Axis(1), 0);
        let root_lp = log_softmax(root_logits.view());
        let predicted_roots: Vec<usize> = root_lp
            .rows()
            .into_iter()
            .map(|row| argmax(row.iter().copied()))
            .collect();

        let mut centered = Array2::zeros((frames, channels * PITCH_CLASSES));
        for (t, &r) in predicted_roots.iter().enumerate() {
            let rolled = roll_pitch_classes(pitch_classes.index_axis(Axis(0), t), r);
            for (dst, &v) in centered.row_mut(t).iter_mut().zip(rolled.iter()) {
                *dst = v;
            }
        }

        let (quality_logits, quality) = self.quality_net.forward(centered.view());
        let quality_lp = log_softmax(quality_logits.view());

        Ok(ForwardPass {
            roots: root_lp.clone(),
            qualities: quality_lp.clone(),
            regularizer: 0.0,
            cache: ChordNetCache {
                attention,
                root,
                quality,
                root_lp,
                quality_lp,
                predicted_roots,
                octave_n: self.props.octave_n,
            },
        })
    }

    fn backward(
        &mut self,
        cache: &ChordNetCache,
        d_roots: ArrayView2<f32>,
        d_qualities: ArrayView2<f32>,
    ) -> Result<()> {
        check_dim("root gradient", d_roots.dim(), cache.root_lp.dim())?;
        check_dim("quality gradient", d_qualities.dim(), cache.quality_lp.dim())?;
        let frames = cache.root_lp.nrows();
        let channels = self.config.channels();

        let d_quality_logits = log_softmax_backward(cache.quality_lp.view(), d_qualities);
        let d_centered = self.quality_net.backward(&cache.quality, d_quality_logits.view());

        let d_root_logits = log_softmax_backward(cache.root_lp.view(), d_roots).insert_axis(Axis(1));
        let mut d_pitch_classes = self.root_net.backward(&cache.root, d_root_logits.view());

        for (t, &r) in cache.predicted_roots.iter().enumerate() {
            for c in 0..channels {
                for i in 0..PITCH_CLASSES {
                    d_pitch_classes[[t, c, (i + r) % PITCH_CLASSES]] +=
                        d_centered[[t, c * PITCH_CLASSES + i]];
                }
            }
        }

        let mut d_attended = Array3::zeros((frames, channels, cache.octave_n * PITCH_CLASSES));
        for o in 0..cache.octave_n {
            d_attended
                .slice_mut(s![.., .., o * PITCH_CLASSES..(o + 1) * PITCH_CLASSES])
                .assign(&d_pitch_classes);
        }
        self.attention.backward(&cache.attention, d_attended.view());
        Ok(())
    }

    fn parameters(&mut self) -> Vec<&mut dyn Trainable> {
        let mut params = self.attention.parameters();
        params.extend(self.root_net.parameters());
        params.extend(self.quality_net.parameters());
        params
    }

    fn configure_optimizer(&self) -> Optimizer {
        Optimizer::adam(self.config.learning_rate, self.config.weight_decay)
            .with_lr_decay(self.config.lr_decay)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::Array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::music::chord::ChordEncoding;

    fn small_config() -> ChordNetConfig {
        ChordNetConfig {
            context: 1,
            attention_hidden: 4,
            root_hidden: 8,
            quality_hidden: 6,
            ..ChordNetConfig::default()
        }
    }

    fn props(octave_n: usize) -> DataProperties {
        DataProperties {
            encoding: ChordEncoding::MajMin,
            octave_n,
            bin_n: 12,
            start_octave: -1,
        }
    }

    fn random_signal(frames: usize, width: usize, seed: u64) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array::from_shape_simple_fn((frames, width), || rng.gen_range(0.0..1.0))
    }

    #[test]
    fn output_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = ChordNet::new(props(3), small_config(), &mut rng);
        let pass = net.forward(random_signal(4, 36, 1).view()).unwrap();
        assert_eq!(pass.roots.dim(), (4, 12));
        assert_eq!(pass.qualities.dim(), (4, 3));
        assert_eq!(pass.regularizer, 0.0);
        assert_eq!(pass.cache.predicted_roots.len(), 4);

        assert!(net.forward(random_signal(4, 35, 1).view()).is_err());
    }

    #[test]
    fn default_config_matches_published_sizes() {
        let config = ChordNetConfig::default();
        assert_eq!(config.channels(), 11);
        let mut rng = StdRng::seed_from_u64(0);
        let mut net = ChordNet::new(DataProperties::new(ChordEncoding::MajMin), config, &mut rng);
        // attention 2 convs, root 2 convs, quality 3 linear layers with bias
        assert_eq!(net.parameters().len(), 2 + 2 + 6);
    }

    #[test]
    fn transposition_moves_root_and_keeps_quality() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = ChordNet::new(props(1), small_config(), &mut rng);
        let signal = random_signal(3, 12, 3);
        let pass = net.forward(signal.view()).unwrap();

        for k in 1..12 {
            let shifted = Array2::from_shape_fn(signal.dim(), |(t, i)| signal[[t, (i + 12 - k) % 12]]);
            let moved = net.forward(shifted.view()).unwrap();
            for t in 0..3 {
                for i in 0..12 {
                    assert_abs_diff_eq!(moved.roots[[t, (i + k) % 12]], pass.roots[[t, i]], epsilon = 1e-4);
                }
                assert_eq!(
                    moved.cache.predicted_roots[t],
                    (pass.cache.predicted_roots[t] + k) % 12
                );
            }
            for (a, b) in moved.qualities.iter().zip(pass.qualities.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn attention_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut net = ChordNet::new(props(2), small_config(), &mut rng);
        let signal = random_signal(3, 24, 5);
        let d_roots = random_signal(3, 12, 6);
        let d_qualities = random_signal(3, 3, 7);

        let pass = net.forward(signal.view()).unwrap();
        net.backward(&pass.cache, d_roots.view(), d_qualities.view()).unwrap();
        let analytic = net.attention.layers()[0].weight().grad().clone();

        let objective = |net: &ChordNet| {
            let pass = net.forward(signal.view()).unwrap();
            (&pass.roots * &d_roots).sum() + (&pass.qualities * &d_qualities).sum()
        };
        let eps = 1e-2;
        for idx in [[0, 0], [1, 5], [3, 17]] {
            let mut plus = net.clone();
            plus.attention_mut().layers_mut()[0].weight_mut().value_mut()[idx] += eps;
            let mut minus = net.clone();
            minus.attention_mut().layers_mut()[0].weight_mut().value_mut()[idx] -= eps;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * eps);
            assert!(
                (analytic[idx] - numeric).abs() <= 1e-2 * numeric.abs().max(1.0),
                "{:?}: analytic {} numeric {}",
                idx,
                analytic[idx],
                numeric
            );
        }
    }

    #[test]
    fn empty_sequence() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = ChordNet::new(props(2), small_config(), &mut rng);
        let pass = net.forward(Array2::zeros((0, 24)).view()).unwrap();
        assert_eq!(pass.roots.dim(), (0, 12));
        assert_eq!(pass.qualities.dim(), (0, 3));
    }
}
