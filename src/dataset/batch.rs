use ndarray::{s, Array3, ArrayView2};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::constants::PADDED;
use crate::dataset::record::{SequenceMeta, SongSequence};

/// Sequences of one step, padded to the longest one.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `(B, T_max, width)`, padded with `PADDED`.
    pub signals: Array3<f32>,
    /// `(B, T_max, 2)` root and quality, padded with `PADDED`.
    pub targets: Array3<i32>,
    pub metas: Vec<SequenceMeta>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// Iterate over the unpadded `(signal, target, meta)` of every sequence.
    pub fn sequences(
        &self,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, i32>, &SequenceMeta)> + '_ {
        self.metas.iter().enumerate().map(move |(b, meta)| {
            let (signal, target) = remove_padding(
                self.signals.slice(s![b, .., ..]),
                self.targets.slice(s![b, .., ..]),
            );
            (signal, target, meta)
        })
    }
}

/// Stack ragged sequences into one padded batch.
pub fn pad_collate(sequences: &[&SongSequence]) -> Batch {
    let t_max = sequences.iter().map(|seq| seq.len()).max().unwrap_or(0);
    let width = sequences.first().map(|seq| seq.frames.ncols()).unwrap_or(0);
    let b = sequences.len();

    let mut signals = Array3::<f32>::from_elem((b, t_max, width), PADDED as f32);
    let mut targets = Array3::<i32>::from_elem((b, t_max, 2), PADDED);

    for (i, seq) in sequences.iter().enumerate() {
        let t = seq.len();
        signals.slice_mut(s![i, ..t, ..]).assign(&seq.frames.slice(s![..t, ..]));
        for (j, chord) in seq.labels.iter().take(t).enumerate() {
            let (root, quality) = chord.to_tuple();
            targets[[i, j, 0]] = root;
            targets[[i, j, 1]] = quality;
        }
    }

    Batch {
        signals,
        targets,
        metas: sequences.iter().map(|seq| seq.meta.clone()).collect(),
    }
}

/// Cut a padded sequence at the first `PADDED` root.
pub fn remove_padding<'a>(
    signal: ArrayView2<'a, f32>,
    target: ArrayView2<'a, i32>,
) -> (ArrayView2<'a, f32>, ArrayView2<'a, i32>) {
    let end = target
        .column(0)
        .iter()
        .position(|&root| root == PADDED)
        .unwrap_or(target.nrows());
    (signal.slice_move(s![..end, ..]), target.slice_move(s![..end, ..]))
}

/// Group `data` into batches of `batch_size`, shuffled when `rng` is given.
pub fn batches<R: Rng>(data: &[SongSequence], batch_size: usize, rng: Option<&mut R>) -> Vec<Batch> {
    let mut order: Vec<&SongSequence> = data.iter().collect();
    if let Some(rng) = rng {
        order.shuffle(rng);
    }

    order
        .chunks(batch_size.max(1))
        .map(pad_collate)
        .collect()
}
