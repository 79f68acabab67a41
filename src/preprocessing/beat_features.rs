use std::path::Path;

use ndarray::Array2;
use rand::Rng;
use tracing::info;

use crate::constants::{
    GENERATED_ANNOTATION_END, GENERATED_WINDOW_SECONDS, SUBWINDOW_EDGE_FACTOR, SUBWINDOW_N,
};
use crate::dataset::data_type::DataProperties;
use crate::dataset::record::SongRecord;
use crate::error::{Error, Result};
use crate::music::annotation::{annotation_mistiming, best_match, Annotation};
use crate::music::chord::Chord;
use crate::preprocessing::beats::BeatInfo;
use crate::preprocessing::load_audio::AudioBuffer;
use crate::preprocessing::spectral_window::SpectralExtractor;
use crate::preprocessing::windowed_audio::{beat_boundaries, window_beats};

/// Offset and length of a random sub-window inside a window of length `win`,
/// given two draws `r1, r2` from `[0, win]`.
///
/// The sub-window starts in the first fifth of the window and ends in the
/// last fifth, so its length lies in `[0.8·win, win]`.
pub fn subwindow(win: f64, r1: f64, r2: f64) -> (f64, f64) {
    let (lo, hi) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };
    let fact = SUBWINDOW_EDGE_FACTOR;
    let start = lo / fact;
    let len = hi - start + (win - hi) * (fact - 1.0) / fact;
    (start, len)
}

/// Builds beat-synchronous spectral frames for whole songs.
pub struct BeatFeatureBuilder {
    extractor: SpectralExtractor,
    octaves: Vec<i32>,
}

impl BeatFeatureBuilder {
    pub fn new(props: &DataProperties) -> Result<Self> {
        Ok(Self {
            extractor: SpectralExtractor::new(props.bin_n)?,
            octaves: props.stored_octaves(),
        })
    }

    /// Width of a produced (flattened) frame.
    pub fn frame_width(&self) -> usize {
        self.octaves.len() * self.extractor.bin_n()
    }

    /// One window's spectrum averaged with `SUBWINDOW_N` random sub-windows
    /// of it, which evens out notes that only sound in part of the window.
    ///
    /// # Arguments
    ///
    /// * `samples` - Mono samples.
    /// * `sample_rate` - Sampling rate of `samples`.
    /// * `t_start` - Start of the window in seconds.
    /// * `win` - Length of the window in seconds.
    /// * `rng` - Source of the sub-window positions.
    ///
    /// # Returns
    ///
    /// * A matrix of shape `(octaves, bin_n)`.
    pub fn parse_spectra_repeated<R: Rng>(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        t_start: f64,
        win: f64,
        rng: &mut R,
    ) -> Array2<f32> {
        let mut spectra = self
            .extractor
            .extract(samples, sample_rate, &self.octaves, t_start, win);

        for _ in 0..SUBWINDOW_N {
            let r1 = rng.gen::<f64>() * win;
            let r2 = rng.gen::<f64>() * win;
            let (start, len) = subwindow(win, r1, r2);
            spectra += &self
                .extractor
                .extract(samples, sample_rate, &self.octaves, t_start + start, len);
        }

        spectra /= (SUBWINDOW_N + 1) as f32;
        spectra
    }

    /// Parse a song into one frame per beat interval.
    ///
    /// With `annotations`, every interval is labeled with its best matching
    /// annotation and the average annotation mistiming is recorded. Without,
    /// `chords` and `annotations` stay empty.
    pub fn parse_song<R: Rng>(
        &mut self,
        audio: &AudioBuffer,
        beat_info: &BeatInfo,
        annotations: Option<&[Annotation]>,
        song: &str,
        rng: &mut R,
    ) -> Result<SongRecord> {
        let duration = audio.duration();
        let (boundaries, beats) = beat_boundaries(&beat_info.beats, duration);
        let samples = audio.downmix();

        let windows = window_beats(&boundaries);
        let mut chromas = Array2::<f32>::zeros((windows.len(), self.frame_width()));
        let mut chords = Vec::new();

        for (t, (t_start, win)) in windows.enumerate() {
            let frame =
                self.parse_spectra_repeated(&samples, audio.sample_rate, t_start, win, rng);
            for (dst, src) in chromas.row_mut(t).iter_mut().zip(frame.iter()) {
                *dst = *src;
            }

            if let Some(annotations) = annotations {
                let chord = best_match(annotations, t_start, t_start + win)
                    .ok_or_else(|| Error::EmptyAnnotations(song.to_string()))?;
                chords.push(chord);
            }
        }

        let annotation_mistiming = match annotations {
            Some(annotations) => {
                let mistiming = annotation_mistiming(annotations, &boundaries, beat_info.bpm)
                    .ok_or_else(|| Error::EmptyAnnotations(song.to_string()))?;
                info!("Parsed: {}, annotation mistiming {:.2}", song, mistiming);
                mistiming
            }
            None => {
                info!("Parsed: {}", song);
                0.0
            }
        };

        Ok(SongRecord {
            chromas,
            chords,
            beats,
            annotations: annotations.map(<[_]>::to_vec).unwrap_or_default(),
            annotation_mistiming,
            song: song.to_string(),
        })
    }

    /// Parse a generated single-chord clip.
    ///
    /// The chord is read from the file stem up to the first `-` or `.`, so
    /// `Cmaj-3.wav` is a C major clip.
    pub fn parse_generated(
        &mut self,
        audio: &AudioBuffer,
        path: &Path,
        props: &DataProperties,
    ) -> Result<SongRecord> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let chord_name = stem.split(['-', '.']).next().unwrap_or_default();
        let chord = Chord::parse(chord_name, props.encoding)?;

        let samples = audio.downmix();
        let frame = self.extractor.extract(
            &samples,
            audio.sample_rate,
            &self.octaves,
            0.0,
            GENERATED_WINDOW_SECONDS,
        );
        let width = self.frame_width();
        let chromas = Array2::from_shape_vec((1, width), frame.iter().copied().collect())
            .map_err(|e| Error::ShapeMismatch {
                expected: format!("(1, {})", width),
                got: e.to_string(),
            })?;

        Ok(SongRecord {
            chromas,
            chords: vec![chord],
            beats: Vec::new(),
            annotations: vec![Annotation {
                chord,
                start: 0.0,
                end: GENERATED_ANNOTATION_END,
            }],
            annotation_mistiming: 0.0,
            song: stem,
        })
    }
}
