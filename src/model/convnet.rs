use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::PITCH_CLASSES;
use crate::dataset::data_type::DataProperties;
use crate::error::Result;
use crate::model::layers::{log_softmax, log_softmax_backward, Activation, Linear};
use crate::model::optim::Optimizer;
use crate::model::parameter::Trainable;
use crate::model::spectconv::{SequentialCache, SpectrumSequential};
use crate::model::trainable::{check_dim, check_width, ForwardPass, TrainableModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvNetConfig {
    pub layers: usize,
    pub hidden: usize,
    pub activation: Activation,
    pub learning_rate: f32,
    pub weight_decay: f32,
}

impl Default for ConvNetConfig {
    fn default() -> Self {
        Self {
            layers: 3,
            hidden: 5,
            activation: Activation::Tanh,
            learning_rate: 1e-3,
            weight_decay: 0.0,
        }
    }
}

/// Plain convolutional baseline: one stack scores every bin as a root and
/// sums the scores per note, another feeds a linear quality classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvNet {
    config: ConvNetConfig,
    props: DataProperties,
    root_net: SpectrumSequential,
    quality_net: SpectrumSequential,
    quality_linear: Linear,
}

#[derive(Debug, Clone)]
pub struct ConvNetCache {
    root: SequentialCache,
    quality: SequentialCache,
    quality_features: Array2<f32>,
    root_lp: Array2<f32>,
    quality_lp: Array2<f32>,
}

impl ConvNet {
    pub fn new<R: Rng>(props: DataProperties, config: ConvNetConfig, rng: &mut R) -> Self {
        let quality_n = props.encoding.quality_n();
        let root_net = SpectrumSequential::new(
            1,
            1,
            config.layers,
            config.hidden,
            config.activation,
            props.octave_n,
            props.bin_n,
            false,
            rng,
        );
        let quality_net = SpectrumSequential::new(
            1,
            quality_n,
            config.layers,
            config.hidden,
            config.activation,
            props.octave_n,
            props.bin_n,
            false,
            rng,
        );
        let quality_linear = Linear::new(quality_n * props.width(), quality_n, rng);

        Self {
            config,
            props,
            root_net,
            quality_net,
            quality_linear,
        }
    }

    pub fn config(&self) -> &ConvNetConfig {
        &self.config
    }

    /// Bin `b` of the spectrum belongs to note `(b mod bin_n) / subtones`.
    fn note_of_bin(&self, bin: usize) -> usize {
        (bin % self.props.bin_n) / self.props.subtones()
    }
}

impl TrainableModel for ConvNet {
    type Cache = ConvNetCache;

    fn props(&self) -> &DataProperties {
        &self.props
    }

    fn forward(&self, signal: ArrayView2<f32>) -> Result<ForwardPass<ConvNetCache>> {
        check_width(signal, self.props.width())?;
        let frames = signal.nrows();
        let input = signal.insert_axis(Axis(1));

        let (bin_scores, root) = self.root_net.forward(input);
        let mut root_logits = Array2::<f32>::zeros((frames, PITCH_CLASSES));
        for t in 0..frames {
            for (bin, &score) in bin_scores.slice(ndarray::s![t, 0, ..]).iter().enumerate() {
                root_logits[[t, self.note_of_bin(bin)]] += score;
            }
        }
        let root_lp = log_softmax(root_logits.view());

        let (quality_maps, quality) = self.quality_net.forward(input);
        let feature_n = quality_maps.dim().1 * quality_maps.dim().2;
        let quality_features = quality_maps.as_standard_layout().into_owned().into_shape((frames, feature_n))?;
        let quality_lp = log_softmax(self.quality_linear.forward(quality_features.view()).view());

        Ok(ForwardPass {
            roots: root_lp.clone(),
            qualities: quality_lp.clone(),
            regularizer: 0.0,
            cache: ConvNetCache {
                root,
                quality,
                quality_features,
                root_lp,
                quality_lp,
            },
        })
    }

    fn backward(
        &mut self,
        cache: &ConvNetCache,
        d_roots: ArrayView2<f32>,
        d_qualities: ArrayView2<f32>,
    ) -> Result<()> {
        check_dim("root gradient", d_roots.dim(), cache.root_lp.dim())?;
        check_dim("quality gradient", d_qualities.dim(), cache.quality_lp.dim())?;
        let frames = cache.root_lp.nrows();
        let width = self.props.width();

        let d_root_logits = log_softmax_backward(cache.root_lp.view(), d_roots);
        let d_bin_scores = Array3::from_shape_fn((frames, 1, width), |(t, _, bin)| {
            d_root_logits[[t, self.note_of_bin(bin)]]
        });
        self.root_net.backward(&cache.root, d_bin_scores.view());

        let d_quality_logits = log_softmax_backward(cache.quality_lp.view(), d_qualities);
        let d_features = self
            .quality_linear
            .backward(cache.quality_features.view(), d_quality_logits.view());
        let quality_n = self.props.encoding.quality_n();
        let d_maps = d_features.into_shape((frames, quality_n, width))?;
        self.quality_net.backward(&cache.quality, d_maps.view());
        Ok(())
    }

    fn parameters(&mut self) -> Vec<&mut dyn Trainable> {
        let mut params = self.root_net.parameters();
        params.extend(self.quality_net.parameters());
        params.extend(self.quality_linear.parameters());
        params
    }

    fn configure_optimizer(&self) -> Optimizer {
        Optimizer::adam(self.config.learning_rate, self.config.weight_decay)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::music::chord::ChordEncoding;

    fn props() -> DataProperties {
        DataProperties {
            encoding: ChordEncoding::MajMin7,
            octave_n: 2,
            bin_n: 24,
            start_octave: -1,
        }
    }

    #[test]
    fn output_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut net = ConvNet::new(props(), ConvNetConfig::default(), &mut rng);
        let signal = Array::from_shape_fn((5, 48), |(t, b)| ((t + b) % 7) as f32 / 7.0);
        let pass = net.forward(signal.view()).unwrap();
        assert_eq!(pass.roots.dim(), (5, 12));
        assert_eq!(pass.qualities.dim(), (5, 6));
        // 3 + 3 convolutions, one linear layer with bias
        assert_eq!(net.parameters().len(), 8);
    }

    #[test]
    fn bins_map_to_notes_across_octaves() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = ConvNet::new(props(), ConvNetConfig::default(), &mut rng);
        assert_eq!(net.note_of_bin(0), 0);
        assert_eq!(net.note_of_bin(3), 1);
        assert_eq!(net.note_of_bin(23), 11);
        assert_eq!(net.note_of_bin(24), 0);
        assert_eq!(net.note_of_bin(47), 11);
    }

    #[test]
    fn training_step_lowers_loss() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = ConvNet::new(props(), ConvNetConfig::default(), &mut rng);
        let mut optimizer = Optimizer::adam(1e-2, 0.0);
        let signal = Array::from_shape_simple_fn((2, 48), || rng.gen_range(0.0..1.0));
        let target = ndarray::array![[9, 1], [9, 4]];

        let mut losses = Vec::new();
        for _ in 0..20 {
            net.zero_grad();
            let pass = net.forward(signal.view()).unwrap();
            let out = crate::model::loss::sequence_losses(
                pass.roots.view(),
                pass.qualities.view(),
                target.view(),
                props().encoding,
            )
            .unwrap();
            losses.push(out.root_loss + out.quality_loss);
            net.backward(&pass.cache, out.d_roots.view(), out.d_qualities.view())
                .unwrap();
            optimizer.step(net.parameters());
        }
        assert!(losses[19] < losses[0]);
    }
}
