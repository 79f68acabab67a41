pub mod constants;
pub mod error;
pub mod inference;
pub mod train;
pub mod music {
    pub mod annotation;
    pub mod chord;
}
pub mod preprocessing {
    pub mod beat_features;
    pub mod beats;
    pub mod load_audio;
    pub mod spectral_window;
    pub mod windowed_audio;
}
pub mod dataset {
    pub mod augment;
    pub mod batch;
    pub mod data_type;
    pub mod module;
    pub mod record;
    pub mod stats;
}
pub mod model {
    pub mod architecture;
    pub mod checkpoint;
    pub mod chordnet;
    pub mod convnet;
    pub mod layers;
    pub mod loss;
    pub mod optim;
    pub mod parameter;
    pub mod spectconv;
    pub mod trainable;
}
pub mod postprocessing {
    pub mod chord_events;
}

pub use error::{Error, Result};
