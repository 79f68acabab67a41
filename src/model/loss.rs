use ndarray::{Array2, ArrayView2};

use crate::constants::NO_ENCODING;
use crate::error::{Error, Result};
use crate::music::chord::ChordEncoding;

/// Losses, accuracies and loss gradients of one unpadded sequence.
#[derive(Debug, Clone)]
pub struct SequenceLosses {
    pub root_loss: f32,
    pub quality_loss: f32,
    pub root_acc: f32,
    pub quality_acc: f32,
    /// Gradient of `root_loss` with respect to the root log-probabilities.
    pub d_roots: Array2<f32>,
    /// Gradient of `quality_loss` with respect to the quality log-probabilities.
    pub d_qualities: Array2<f32>,
}

/// Beats that carry a label.
pub fn quality_mask(target: ArrayView2<i32>) -> Vec<usize> {
    target
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| row[0] != NO_ENCODING)
        .map(|(t, _)| t)
        .collect()
}

/// Beats that carry a label with a root, i.e. not "no chord".
pub fn root_mask(target: ArrayView2<i32>, encoding: ChordEncoding) -> Vec<usize> {
    quality_mask(target)
        .into_iter()
        .filter(|&t| !(encoding.has_no_chord() && target[[t, 1]] == 0))
        .collect()
}

/// Mean negative log-likelihood of `classes[i]` in row `rows[i]` of `lp`,
/// and its gradient with respect to `lp`.
///
/// An empty selection has loss 0.
pub fn nll_loss(lp: ArrayView2<f32>, rows: &[usize], classes: &[usize]) -> (f32, Array2<f32>) {
    let mut grad = Array2::zeros(lp.dim());
    if rows.is_empty() {
        return (0.0, grad);
    }

    let n = rows.len() as f32;
    let mut loss = 0.0;
    for (&t, &class) in rows.iter().zip(classes) {
        loss -= lp[[t, class]];
        grad[[t, class]] -= 1.0 / n;
    }
    (loss / n, grad)
}

/// Fraction of selected rows whose arg-max is the target class; 1 when
/// nothing is selected.
pub fn accuracy(lp: ArrayView2<f32>, rows: &[usize], classes: &[usize]) -> f32 {
    if rows.is_empty() {
        return 1.0;
    }
    let correct = rows
        .iter()
        .zip(classes)
        .filter(|(&t, &class)| argmax(lp.row(t).iter().copied()) == class)
        .count();
    correct as f32 / rows.len() as f32
}

pub fn argmax(values: impl Iterator<Item = f32>) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
        .0
}

/// Root and quality losses of one sequence against its `(T, 2)` targets.
///
/// Unlabeled beats are ignored by both heads; no-chord beats are ignored
/// by the root head.
pub fn sequence_losses(
    roots: ArrayView2<f32>,
    qualities: ArrayView2<f32>,
    target: ArrayView2<i32>,
    encoding: ChordEncoding,
) -> Result<SequenceLosses> {
    let check = |what: &'static str, value: i32, size: usize| -> Result<usize> {
        if value < 0 || value as usize >= size {
            return Err(Error::IndexOutOfRange { what, index: value as i64, size });
        }
        Ok(value as usize)
    };

    let quality_rows = quality_mask(target);
    let quality_classes = quality_rows
        .iter()
        .map(|&t| check("quality", target[[t, 1]], qualities.ncols()))
        .collect::<Result<Vec<_>>>()?;

    let root_rows = root_mask(target, encoding);
    let root_classes = root_rows
        .iter()
        .map(|&t| check("root", target[[t, 0]], roots.ncols()))
        .collect::<Result<Vec<_>>>()?;

    let (root_loss, d_roots) = nll_loss(roots, &root_rows, &root_classes);
    let (quality_loss, d_qualities) = nll_loss(qualities, &quality_rows, &quality_classes);

    Ok(SequenceLosses {
        root_loss,
        quality_loss,
        root_acc: accuracy(roots, &root_rows, &root_classes),
        quality_acc: accuracy(qualities, &quality_rows, &quality_classes),
        d_roots,
        d_qualities,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;
    use crate::constants::PITCH_CLASSES;

    #[test]
    fn masks() {
        let target = array![[3, 1], [0, 0], [NO_ENCODING, NO_ENCODING], [5, 2]];
        assert_eq!(quality_mask(target.view()), vec![0, 1, 3]);
        assert_eq!(root_mask(target.view(), ChordEncoding::MajMin), vec![0, 3]);
        // Quality 0 is a real chord without an `N` quality.
        assert_eq!(root_mask(target.view(), ChordEncoding::Generated), vec![0, 1, 3]);
    }

    #[test]
    fn nll_and_accuracy() {
        let lp = array![[-0.1f32, -2.0, -3.0], [-2.0, -0.2, -1.5]];
        let (loss, grad) = nll_loss(lp.view(), &[0, 1], &[0, 2]);
        assert_abs_diff_eq!(loss, (0.1 + 1.5) / 2.0, epsilon = 1e-6);
        assert_eq!(grad, array![[-0.5, 0.0, 0.0], [0.0, 0.0, -0.5]]);
        assert_abs_diff_eq!(accuracy(lp.view(), &[0, 1], &[0, 2]), 0.5);
    }

    #[test]
    fn all_no_chord_sequence_has_perfect_root_score() {
        let roots = Array2::from_elem((2, PITCH_CLASSES), -(PITCH_CLASSES as f32).ln());
        let qualities = array![[-0.1f32, -3.0, -3.0], [-3.0, -0.1, -3.0]];
        let target = array![[0, 0], [NO_ENCODING, NO_ENCODING]];

        let out = sequence_losses(roots.view(), qualities.view(), target.view(), ChordEncoding::MajMin)
            .unwrap();
        assert_eq!(out.root_loss, 0.0);
        assert_eq!(out.root_acc, 1.0);
        assert!(out.d_roots.iter().all(|&g| g == 0.0));
        assert_abs_diff_eq!(out.quality_loss, 0.1, epsilon = 1e-6);
        assert_eq!(out.quality_acc, 1.0);
    }

    #[test]
    fn unlabeled_sequence_has_empty_quality_set() {
        let roots = Array2::zeros((1, PITCH_CLASSES));
        let qualities = Array2::zeros((1, 3));
        let target = array![[NO_ENCODING, NO_ENCODING]];
        let out = sequence_losses(roots.view(), qualities.view(), target.view(), ChordEncoding::MajMin)
            .unwrap();
        assert_eq!((out.quality_loss, out.quality_acc), (0.0, 1.0));
    }

    #[test]
    fn out_of_vocabulary_target_fails() {
        let roots = Array2::zeros((1, PITCH_CLASSES));
        let qualities = Array2::zeros((1, 3));
        let target = array![[2, 7]];
        let err = sequence_losses(roots.view(), qualities.view(), target.view(), ChordEncoding::MajMin)
            .unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { what: "quality", .. }));
    }
}
