use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::data_type::DataProperties;
use crate::error::{Error, Result};
use crate::model::chordnet::{ChordNet, ChordNetCache, ChordNetConfig};
use crate::model::convnet::{ConvNet, ConvNetCache, ConvNetConfig};
use crate::model::optim::Optimizer;
use crate::model::parameter::Trainable;
use crate::model::trainable::{ForwardPass, TrainableModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    Chord,
    Conv,
}

impl Architecture {
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Chord => "chord",
            Architecture::Conv => "conv",
        }
    }

    /// A freshly initialized model with default hyperparameters.
    pub fn build<R: Rng>(&self, props: DataProperties, rng: &mut R) -> Model {
        match self {
            Architecture::Chord => Model::Chord(ChordNet::new(props, ChordNetConfig::default(), rng)),
            Architecture::Conv => Model::Conv(ConvNet::new(props, ConvNetConfig::default(), rng)),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "chord" => Ok(Architecture::Chord),
            "conv" => Ok(Architecture::Conv),
            other => Err(Error::InvalidParameter {
                name: "model",
                value: other.to_string(),
                reason: "expected `chord` or `conv`".to_string(),
            }),
        }
    }
}

/// Any of the supported models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Model {
    Chord(ChordNet),
    Conv(ConvNet),
}

#[derive(Debug, Clone)]
pub enum ModelCache {
    Chord(ChordNetCache),
    Conv(ConvNetCache),
}

impl Model {
    pub fn architecture(&self) -> Architecture {
        match self {
            Model::Chord(_) => Architecture::Chord,
            Model::Conv(_) => Architecture::Conv,
        }
    }
}

impl TrainableModel for Model {
    type Cache = ModelCache;

    fn props(&self) -> &DataProperties {
        match self {
            Model::Chord(net) => net.props(),
            Model::Conv(net) => net.props(),
        }
    }

    fn forward(&self, signal: ArrayView2<f32>) -> Result<ForwardPass<ModelCache>> {
        Ok(match self {
            Model::Chord(net) => {
                let pass = net.forward(signal)?;
                ForwardPass {
                    roots: pass.roots,
                    qualities: pass.qualities,
                    regularizer: pass.regularizer,
                    cache: ModelCache::Chord(pass.cache),
                }
            }
            Model::Conv(net) => {
                let pass = net.forward(signal)?;
                ForwardPass {
                    roots: pass.roots,
                    qualities: pass.qualities,
                    regularizer: pass.regularizer,
                    cache: ModelCache::Conv(pass.cache),
                }
            }
        })
    }

    fn backward(
        &mut self,
        cache: &ModelCache,
        d_roots: ArrayView2<f32>,
        d_qualities: ArrayView2<f32>,
    ) -> Result<()> {
        match (self, cache) {
            (Model::Chord(net), ModelCache::Chord(cache)) => net.backward(cache, d_roots, d_qualities),
            (Model::Conv(net), ModelCache::Conv(cache)) => net.backward(cache, d_roots, d_qualities),
            (model, _) => Err(Error::ShapeMismatch {
                expected: format!("cache of a {} model", model.architecture()),
                got: "cache of another architecture".to_string(),
            }),
        }
    }

    fn parameters(&mut self) -> Vec<&mut dyn Trainable> {
        match self {
            Model::Chord(net) => net.parameters(),
            Model::Conv(net) => net.parameters(),
        }
    }

    fn configure_optimizer(&self) -> Optimizer {
        match self {
            Model::Chord(net) => net.configure_optimizer(),
            Model::Conv(net) => net.configure_optimizer(),
        }
    }
}
