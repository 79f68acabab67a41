use std::path::Path;

use ndarray::s;
use rand::Rng;
use tracing::debug;

use crate::dataset::module::normalized_sequence;
use crate::error::{Error, Result};
use crate::model::trainable::{predicted_chords, TrainableModel};
use crate::preprocessing::beat_features::BeatFeatureBuilder;
use crate::preprocessing::beats::BeatTracker;
use crate::preprocessing::load_audio::load_audio;

/// Chords of a song as predicted by a trained model.
#[derive(Debug, Clone, PartialEq)]
pub struct SongChords {
    /// Start time and chord label of every beat interval.
    pub beat_chords: Vec<(f64, String)>,
    /// Length of the audio in seconds.
    pub duration: f64,
}

/// Predict one chord per beat interval of the audio file at `song_path`.
///
/// The song is parsed without annotations, the guard octaves are trimmed
/// and the frames are scaled so the largest value is 1, matching what the
/// model saw during training.
pub fn run_inference<M, R>(
    model: &M,
    song_path: &Path,
    tracker: &dyn BeatTracker,
    rng: &mut R,
) -> Result<SongChords>
where
    M: TrainableModel,
    R: Rng,
{
    let props = *model.props();
    let audio = load_audio(song_path)?;
    let beat_info = tracker.detect(&audio, Some(song_path))?;

    let song = song_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut builder = BeatFeatureBuilder::new(&props)?;
    let record = builder.parse_song(&audio, &beat_info, None, &song, rng)?;

    let sequence = normalized_sequence(record, song);
    let stored = sequence.frames.ncols();
    if stored != props.stored_width() {
        return Err(Error::ShapeMismatch {
            expected: format!("(T, {})", props.stored_width()),
            got: format!("{:?}", sequence.frames.dim()),
        });
    }
    let signal = sequence.frames.slice(s![.., props.bin_n..stored - props.bin_n]);
    debug!("Running model on {} beats", signal.nrows());

    let pass = model.forward(signal)?;
    let chords = predicted_chords(&pass.roots, &pass.qualities, props.encoding)?;

    let starts = std::iter::once(0.0).chain(sequence.meta.beats.iter().copied());
    Ok(SongChords {
        beat_chords: starts.zip(chords).collect(),
        duration: audio.duration(),
    })
}
