use std::path::PathBuf;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::batch::Batch;
use crate::dataset::data_type::DatasetType;
use crate::error::Result;
use crate::model::checkpoint::Checkpoint;
use crate::model::optim::Optimizer;
use crate::model::trainable::{StepOutput, TrainableModel};

pub const CHECKPOINT_FILE: &str = "best.json";

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub epochs: usize,
    /// Where the best model by validation loss is written, if anywhere.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 1000,
            checkpoint_dir: None,
        }
    }
}

/// Mean step metrics over one pass through a split.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochMetrics {
    pub loss: f32,
    pub root_loss: f32,
    pub quality_loss: f32,
    pub root_acc: f32,
    pub quality_acc: f32,
}

impl EpochMetrics {
    fn from_steps(steps: &[StepOutput]) -> Self {
        if steps.is_empty() {
            return Self::default();
        }
        let n = steps.len() as f32;
        let mean = |f: fn(&StepOutput) -> f32| steps.iter().map(f).sum::<f32>() / n;
        Self {
            loss: mean(|s| s.loss),
            root_loss: mean(|s| s.root_loss),
            quality_loss: mean(|s| s.quality_loss),
            root_acc: mean(|s| s.root_acc),
            quality_acc: mean(|s| s.quality_acc),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train: EpochMetrics,
    pub val: Option<EpochMetrics>,
}

/// Runs epochs of optimization over a model.
pub struct Trainer<M: TrainableModel> {
    model: M,
    optimizer: Optimizer,
    config: TrainerConfig,
    dataset_type: DatasetType,
    best_val_loss: Option<f32>,
}

impl<M> Trainer<M>
where
    M: TrainableModel + Clone + Serialize + DeserializeOwned,
{
    pub fn new(model: M, dataset_type: DatasetType, config: TrainerConfig) -> Self {
        let optimizer = model.configure_optimizer();
        Self {
            model,
            optimizer,
            config,
            dataset_type,
            best_val_loss: None,
        }
    }

    /// Replace the model's default optimizer.
    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// One optimizer step per batch.
    pub fn train_epoch(&mut self, batches: &[Batch]) -> Result<EpochMetrics> {
        let mut steps = Vec::with_capacity(batches.len());
        for (i, batch) in batches.iter().enumerate() {
            self.model.zero_grad();
            let out = self.model.compute_losses(batch, true)?;
            self.optimizer.step(self.model.parameters());
            debug!("Step {}: loss {:.4}", i, out.loss);
            steps.push(out);
        }
        Ok(EpochMetrics::from_steps(&steps))
    }

    pub fn evaluate(&mut self, batches: &[Batch]) -> Result<EpochMetrics> {
        let steps = batches
            .iter()
            .map(|batch| self.model.compute_losses(batch, false))
            .collect::<Result<Vec<_>>>()?;
        Ok(EpochMetrics::from_steps(&steps))
    }

    /// Train for the configured number of epochs. `train_batches` is called
    /// once per epoch so it can reshuffle.
    pub fn fit<R, F>(&mut self, mut train_batches: F, val: &[Batch], rng: &mut R) -> Result<Vec<EpochSummary>>
    where
        R: Rng,
        F: FnMut(&mut R) -> Vec<Batch>,
    {
        let mut history = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            self.optimizer.set_epoch(epoch);
            let train = self.train_epoch(&train_batches(rng))?;
            info!(
                "Epoch {}: train loss {:.4} (root {:.4}, quality {:.4}), root acc {:.3}, quality acc {:.3}, lr {:.2e}",
                epoch,
                train.loss,
                train.root_loss,
                train.quality_loss,
                train.root_acc,
                train.quality_acc,
                self.optimizer.learning_rate()
            );

            let val = if val.is_empty() {
                None
            } else {
                let metrics = self.evaluate(val)?;
                info!(
                    "Epoch {}: valid loss {:.4}, root acc {:.3}, quality acc {:.3}",
                    epoch, metrics.loss, metrics.root_acc, metrics.quality_acc
                );
                self.checkpoint_if_best(epoch, metrics.loss)?;
                Some(metrics)
            };

            history.push(EpochSummary { epoch, train, val });
        }

        Ok(history)
    }

    /// Evaluate the test split; `None` when it is empty.
    pub fn test(&mut self, batches: &[Batch]) -> Result<Option<EpochMetrics>> {
        if batches.is_empty() {
            return Ok(None);
        }
        let metrics = self.evaluate(batches)?;
        info!(
            "Test: loss {:.4}, root acc {:.3}, quality acc {:.3}",
            metrics.loss, metrics.root_acc, metrics.quality_acc
        );
        Ok(Some(metrics))
    }

    fn checkpoint_if_best(&mut self, epoch: usize, val_loss: f32) -> Result<()> {
        if self.best_val_loss.map_or(false, |best| best <= val_loss) {
            return Ok(());
        }
        self.best_val_loss = Some(val_loss);

        if let Some(dir) = &self.config.checkpoint_dir {
            let path = dir.join(CHECKPOINT_FILE);
            Checkpoint {
                dataset_type: self.dataset_type,
                epoch,
                val_loss,
                model: self.model.clone(),
            }
            .save(&path)?;
            info!("Saved checkpoint {} (valid loss {:.4})", path.display(), val_loss);
        }
        Ok(())
    }
}
