use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::preprocessing::load_audio::AudioBuffer;

/// Tempo estimate and beat positions for one piece of audio.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatInfo {
    pub bpm: f64,
    /// Beat timestamps in seconds, ascending, all before the end of the audio.
    pub beats: Vec<f64>,
}

/// Source of beat timestamps.
///
/// Beat tracking itself lives outside this crate; implementations adapt
/// whatever tracker produced the beats. `source` is the file the audio was
/// decoded from, when there is one.
pub trait BeatTracker {
    fn detect(&self, audio: &AudioBuffer, source: Option<&Path>) -> Result<BeatInfo>;
}

/// Reads beats exported by an external tracker into a sidecar file next to
/// the audio (`song.wav` → `song.beats`), one timestamp per line.
///
/// Blank lines and lines starting with `#` are ignored. The tempo is
/// estimated from the median inter-beat interval.
#[derive(Debug, Clone)]
pub struct BeatFileTracker {
    extension: String,
}

impl BeatFileTracker {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }
}

impl Default for BeatFileTracker {
    fn default() -> Self {
        Self::new("beats")
    }
}

impl BeatTracker for BeatFileTracker {
    fn detect(&self, audio: &AudioBuffer, source: Option<&Path>) -> Result<BeatInfo> {
        let source = source.ok_or_else(|| {
            Error::BeatTracking("sidecar beats need the audio file path".to_string())
        })?;
        let beat_path = source.with_extension(&self.extension);
        let contents = fs::read_to_string(&beat_path).map_err(|e| {
            Error::BeatTracking(format!("cannot read {}: {}", beat_path.display(), e))
        })?;

        let mut beats = Vec::new();
        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // Some trackers append a beat-in-bar column
            let field = line.split_whitespace().next().unwrap_or(line);
            let beat: f64 = field.parse().map_err(|_| {
                Error::BeatTracking(format!("bad timestamp `{}` in {}", line, beat_path.display()))
            })?;
            beats.push(beat);
        }
        beats.sort_by(f64::total_cmp);

        let bpm = estimate_bpm(&beats).ok_or_else(|| {
            Error::BeatTracking(format!("fewer than two beats in {}", beat_path.display()))
        })?;

        let duration = audio.duration();
        beats.retain(|&b| b < duration);

        Ok(BeatInfo { bpm, beats })
    }
}

/// Evenly spaced beats at a fixed tempo.
#[derive(Debug, Clone, Copy)]
pub struct FixedTempoTracker {
    pub bpm: f64,
    pub offset: f64,
}

impl BeatTracker for FixedTempoTracker {
    fn detect(&self, audio: &AudioBuffer, _source: Option<&Path>) -> Result<BeatInfo> {
        if !(self.bpm > 0.0) {
            return Err(Error::InvalidParameter {
                name: "bpm",
                value: self.bpm.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let period = 60.0 / self.bpm;
        let duration = audio.duration();
        let beats = (0..)
            .map(|k| self.offset + k as f64 * period)
            .take_while(|&t| t < duration)
            .collect();

        Ok(BeatInfo { bpm: self.bpm, beats })
    }
}

fn estimate_bpm(beats: &[f64]) -> Option<f64> {
    let mut intervals: Vec<f64> = beats
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&d| d > 0.0)
        .collect();
    if intervals.is_empty() {
        return None;
    }
    intervals.sort_by(f64::total_cmp);

    let mid = intervals.len() / 2;
    let median = if intervals.len() % 2 == 0 {
        (intervals[mid - 1] + intervals[mid]) / 2.0
    } else {
        intervals[mid]
    };
    Some(60.0 / median)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn silence(seconds: f64) -> AudioBuffer {
        AudioBuffer::mono(vec![0.0; (seconds * 1000.0) as usize], 1000)
    }

    #[test]
    fn sidecar_file_is_read_and_clipped() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("0003 song.wav");
        fs::write(
            dir.path().join("0003 song.beats"),
            "# exported beats\n0.5\n1.0 2\n\n1.5\n2.0\n9.0\n",
        )
        .unwrap();

        let info = BeatFileTracker::default()
            .detect(&silence(3.0), Some(wav.as_path()))
            .unwrap();
        assert_eq!(info.beats, vec![0.5, 1.0, 1.5, 2.0]);
        assert_relative_eq!(info.bpm, 120.0, epsilon = 1e-9);
    }

    #[test]
    fn sidecar_errors() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("a.wav");
        assert!(BeatFileTracker::default().detect(&silence(1.0), Some(wav.as_path())).is_err());
        assert!(BeatFileTracker::default().detect(&silence(1.0), None).is_err());

        fs::write(dir.path().join("a.beats"), "0.5\n").unwrap();
        let err = BeatFileTracker::default()
            .detect(&silence(1.0), Some(wav.as_path()))
            .unwrap_err();
        assert!(matches!(err, Error::BeatTracking(_)));
    }

    #[test]
    fn fixed_tempo_grid() {
        let tracker = FixedTempoTracker { bpm: 120.0, offset: 0.25 };
        let info = tracker.detect(&silence(2.0), None).unwrap();
        assert_eq!(info.beats, vec![0.25, 0.75, 1.25, 1.75]);
        assert!(FixedTempoTracker { bpm: 0.0, offset: 0.0 }
            .detect(&silence(1.0), None)
            .is_err());
    }
}
