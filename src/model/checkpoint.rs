use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::data_type::DatasetType;
use crate::error::Result;
use crate::model::architecture::Model;

/// Trained weights together with what is needed to feed them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<M = Model> {
    pub dataset_type: DatasetType,
    pub epoch: usize,
    pub val_loss: f32,
    pub model: M,
}

impl<M: Serialize + DeserializeOwned> Checkpoint<M> {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
