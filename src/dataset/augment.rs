use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::dataset::data_type::DataProperties;
use crate::dataset::record::SongSequence;
use crate::error::{Error, Result};

/// Copy `len` consecutive bins of `frame` starting at `offset`.
///
/// Positions that fall outside `frame` take `fill`.
pub fn window_bins(frame: ArrayView1<f32>, offset: isize, len: usize, fill: f32) -> Array1<f32> {
    Array1::from_shape_fn(len, |i| {
        let source = offset + i as isize;
        if source >= 0 && (source as usize) < frame.len() {
            frame[source as usize]
        } else {
            fill
        }
    })
}

/// Transpose a stored (guard-padded) sequence down by `shift` semitones.
///
/// The frames keep the `octave_n × bin_n` window that starts `shift`
/// semitones above the lowest model octave, so shift 0 simply drops the
/// guard octaves. Roots rotate with [`Chord::transpose`](crate::music::chord::Chord::transpose)
/// and the song name gets a ` (+s)` suffix.
pub fn augment_sequence(
    sequence: &SongSequence,
    shift: i32,
    props: &DataProperties,
) -> Result<SongSequence> {
    let z = props.subtones();
    let needed = shift.unsigned_abs() as usize * z;
    if needed > props.bin_n {
        return Err(Error::InvalidShift {
            shift,
            needed,
            available: props.bin_n,
        });
    }

    let stored = sequence.frames.ncols();
    if stored != props.stored_width() {
        return Err(Error::ShapeMismatch {
            expected: format!("frames of width {}", props.stored_width()),
            got: format!("width {}", stored),
        });
    }

    let offset = props.bin_n as isize + shift as isize * z as isize;
    let width = props.width();
    let mut frames = Array2::<f32>::zeros((sequence.frames.nrows(), width));
    for (mut dst, src) in frames.rows_mut().into_iter().zip(sequence.frames.rows()) {
        dst.assign(&window_bins(src, offset, width, 0.0));
    }

    let labels = sequence
        .labels
        .iter()
        .map(|chord| chord.transpose(shift, props.encoding))
        .collect();

    let mut meta = sequence.meta.clone();
    meta.song = format!("{} ({:+})", meta.song, shift);

    Ok(SongSequence { frames, labels, meta })
}

/// Every sequence transposed by every shift.
///
/// Each shift's copies are shuffled among themselves, then the groups are
/// concatenated in shift order.
pub fn augment_dataset<R: Rng>(
    sequences: &[SongSequence],
    shifts: impl IntoIterator<Item = i32>,
    props: &DataProperties,
    rng: &mut R,
) -> Result<Vec<SongSequence>> {
    let mut augmented = Vec::new();
    if sequences.is_empty() {
        return Ok(augmented);
    }

    for shift in shifts {
        let mut group = sequences
            .iter()
            .map(|sequence| augment_sequence(sequence, shift, props))
            .collect::<Result<Vec<_>>>()?;
        group.shuffle(rng);
        augmented.extend(group);
    }

    Ok(augmented)
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::constants::AUGMENT_SHIFTS;
    use crate::dataset::record::SequenceMeta;
    use crate::music::chord::{Chord, ChordEncoding};

    fn stored_sequence(props: &DataProperties) -> SongSequence {
        let width = props.stored_width();
        let frames = Array2::from_shape_fn((3, width), |(t, i)| (t * 1000 + i) as f32);
        let enc = props.encoding;
        SongSequence {
            frames,
            labels: vec![
                Chord::parse("C:maj", enc).unwrap(),
                Chord::no_chord(enc).unwrap(),
                Chord::Unlabeled,
            ],
            meta: SequenceMeta {
                beats: vec![0.5, 1.0],
                annotations: Vec::new(),
                song: "0007 song".to_string(),
            },
        }
    }

    #[test]
    fn window_fills_outside() {
        let frame = array![1.0, 2.0, 3.0];
        assert_eq!(window_bins(frame.view(), -1, 5, 9.0), array![9.0, 1.0, 2.0, 3.0, 9.0]);
        assert_eq!(window_bins(frame.view(), 1, 1, 9.0), array![2.0]);
    }

    #[test]
    fn zero_shift_drops_guard_octaves() {
        let props = DataProperties::new(ChordEncoding::MajMin);
        let sequence = stored_sequence(&props);
        let out = augment_sequence(&sequence, 0, &props).unwrap();

        assert_eq!(out.frames.dim(), (3, props.width()));
        assert_eq!(out.frames[[0, 0]], props.bin_n as f32);
        assert_eq!(out.frames[[2, props.width() - 1]], (2000 + props.stored_width() - props.bin_n - 1) as f32);
        assert_eq!(out.labels, sequence.labels);
        assert_eq!(out.meta.song, "0007 song (+0)");
    }

    #[test]
    fn shifts_are_invertible() {
        let props = DataProperties::new(ChordEncoding::MajMin);
        let z = props.subtones() as i64;
        let sequence = stored_sequence(&props);
        let base = augment_sequence(&sequence, 0, &props).unwrap();

        for shift in -6..=6 {
            let out = augment_sequence(&sequence, shift, &props).unwrap();

            // Same audio, read `shift` semitones higher.
            for t in 0..out.frames.nrows() {
                for i in 0..props.width() as i64 {
                    let j = i + shift as i64 * z;
                    if (0..props.width() as i64).contains(&j) {
                        assert_eq!(out.frames[[t, i as usize]], base.frames[[t, j as usize]]);
                    }
                }
            }

            let restored: Vec<Chord> = out
                .labels
                .iter()
                .map(|c| c.transpose(-shift, props.encoding))
                .collect();
            assert_eq!(restored, sequence.labels);
            assert_eq!(out.labels[1], sequence.labels[1]);
            assert_eq!(out.labels[2], Chord::Unlabeled);
            assert_eq!(out.meta.song, format!("0007 song ({:+})", shift));
        }
    }

    #[test]
    fn shift_beyond_guard_fails() {
        let props = DataProperties::new(ChordEncoding::MajMin);
        let sequence = stored_sequence(&props);
        assert!(augment_sequence(&sequence, 12, &props).is_ok());
        let err = augment_sequence(&sequence, 13, &props).unwrap_err();
        assert!(matches!(err, Error::InvalidShift { shift: 13, .. }));
    }

    #[test]
    fn dataset_grows_per_shift() {
        let props = DataProperties::new(ChordEncoding::MajMin);
        let sequences = vec![stored_sequence(&props), stored_sequence(&props)];
        let mut rng = StdRng::seed_from_u64(3);
        let out = augment_dataset(&sequences, AUGMENT_SHIFTS, &props, &mut rng).unwrap();
        assert_eq!(out.len(), 24);
        assert!(out[..2].iter().all(|s| s.meta.song.ends_with("(-6)")));
        assert!(out[22..].iter().all(|s| s.meta.song.ends_with("(+5)")));

        let empty = augment_dataset(&[], [0], &props, &mut rng).unwrap();
        assert!(empty.is_empty());
    }
}
