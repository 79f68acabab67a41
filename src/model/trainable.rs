use ndarray::{Array2, ArrayView2};

use crate::dataset::batch::Batch;
use crate::dataset::data_type::DataProperties;
use crate::error::{Error, Result};
use crate::model::loss::{argmax, sequence_losses};
use crate::model::optim::Optimizer;
use crate::model::parameter::Trainable;
use crate::music::chord::{Chord, ChordEncoding};

/// Output of a model on one `(T, width)` sequence.
#[derive(Debug, Clone)]
pub struct ForwardPass<C> {
    /// `(T, 12)` root log-probabilities.
    pub roots: Array2<f32>,
    /// `(T, quality_n)` quality log-probabilities.
    pub qualities: Array2<f32>,
    pub regularizer: f32,
    pub cache: C,
}

/// Aggregated result of one batch.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// `root_loss + quality_loss + regularizer`.
    pub loss: f32,
    /// Summed over the sequences of the batch.
    pub root_loss: f32,
    pub quality_loss: f32,
    pub regularizer: f32,
    /// Averaged over the sequences of the batch.
    pub root_acc: f32,
    pub quality_acc: f32,
    pub chords_pred: Vec<Vec<String>>,
    pub chords_true: Vec<Vec<String>>,
    pub songs: Vec<String>,
}

/// A chord model trained with explicit forward and backward passes.
pub trait TrainableModel {
    type Cache;

    fn props(&self) -> &DataProperties;

    fn forward(&self, signal: ArrayView2<f32>) -> Result<ForwardPass<Self::Cache>>;

    /// Accumulate parameter gradients given the gradients of the loss with
    /// respect to both log-probability outputs.
    fn backward(
        &mut self,
        cache: &Self::Cache,
        d_roots: ArrayView2<f32>,
        d_qualities: ArrayView2<f32>,
    ) -> Result<()>;

    /// All parameters, always in the same order.
    fn parameters(&mut self) -> Vec<&mut dyn Trainable>;

    fn configure_optimizer(&self) -> Optimizer {
        Optimizer::sgd(1e-3, 1e-3)
    }

    fn zero_grad(&mut self) {
        Optimizer::zero_grad(self.parameters());
    }

    /// Losses and accuracies of a batch; with `train`, gradients are
    /// accumulated as well.
    fn compute_losses(&mut self, batch: &Batch, train: bool) -> Result<StepOutput> {
        let encoding = self.props().encoding;
        let mut out = StepOutput::default();
        let mut root_accs = Vec::with_capacity(batch.len());
        let mut quality_accs = Vec::with_capacity(batch.len());

        for (signal, target, meta) in batch.sequences() {
            let pass = self.forward(signal)?;
            let losses = sequence_losses(pass.roots.view(), pass.qualities.view(), target, encoding)?;

            if train {
                self.backward(&pass.cache, losses.d_roots.view(), losses.d_qualities.view())?;
            }

            out.root_loss += losses.root_loss;
            out.quality_loss += losses.quality_loss;
            out.regularizer += pass.regularizer;
            root_accs.push(losses.root_acc);
            quality_accs.push(losses.quality_acc);

            out.chords_pred.push(predicted_chords(&pass.roots, &pass.qualities, encoding)?);
            out.chords_true.push(
                target
                    .rows()
                    .into_iter()
                    .map(|row| Chord::from_tuple((row[0], row[1]))?.label(encoding))
                    .collect::<Result<Vec<_>>>()?,
            );
            out.songs.push(meta.song.clone());
        }

        out.loss = out.root_loss + out.quality_loss + out.regularizer;
        out.root_acc = mean(&root_accs);
        out.quality_acc = mean(&quality_accs);
        Ok(out)
    }
}

/// Arg-max chord label of every beat.
pub fn predicted_chords(
    roots: &Array2<f32>,
    qualities: &Array2<f32>,
    encoding: ChordEncoding,
) -> Result<Vec<String>> {
    roots
        .rows()
        .into_iter()
        .zip(qualities.rows())
        .map(|(r, q)| {
            let root = argmax(r.iter().copied());
            let quality = argmax(q.iter().copied());
            Chord::new(root, quality, encoding)?.label(encoding)
        })
        .collect()
}

pub(crate) fn check_width(signal: ArrayView2<f32>, width: usize) -> Result<()> {
    if signal.ncols() != width {
        return Err(Error::ShapeMismatch {
            expected: format!("(T, {})", width),
            got: format!("{:?}", signal.dim()),
        });
    }
    Ok(())
}

pub(crate) fn check_dim(what: &str, got: (usize, usize), expected: (usize, usize)) -> Result<()> {
    if got != expected {
        return Err(Error::ShapeMismatch {
            expected: format!("{} of shape {:?}", what, expected),
            got: format!("{:?}", got),
        });
    }
    Ok(())
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
