use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::music::chord::{Chord, ChordEncoding};

/// A ground-truth chord over `[start, end)` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub chord: Chord,
    pub start: f64,
    pub end: f64,
}

/// Read a MIREX `.lab` file: one `start<TAB>end<TAB>label` entry per line.
///
/// # Arguments
///
/// * `path` - Path of the annotation file.
/// * `encoding` - Vocabulary the labels must belong to.
///
/// # Returns
///
/// * The annotations in file order. Labels outside the vocabulary are an error.
pub fn load_annotations(path: &Path, encoding: ChordEncoding) -> Result<Vec<Annotation>> {
    let contents = fs::read_to_string(path)?;
    let mut annotations = Vec::new();

    for (line_index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let invalid = |reason: String| Error::InvalidAnnotation {
            path: path.to_path_buf(),
            line: line_index + 1,
            reason,
        };

        let mut parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            parts = line.split_whitespace().collect();
        }
        if parts.len() < 3 {
            return Err(invalid(format!("expected 3 fields, got {}", parts.len())));
        }

        let start: f64 = parts[0]
            .trim()
            .parse()
            .map_err(|_| invalid(format!("bad start time `{}`", parts[0])))?;
        let end: f64 = parts[1]
            .trim()
            .parse()
            .map_err(|_| invalid(format!("bad end time `{}`", parts[1])))?;
        let chord = Chord::parse(parts[2].trim(), encoding)?;

        annotations.push(Annotation { chord, start, end });
    }

    Ok(annotations)
}

pub fn interval_overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.1.min(b.1) - a.0.max(b.0)).max(0.0)
}

/// Pick the chord that covers the most of `[start_time, end_time]`.
///
/// Overlap is accumulated per distinct chord, so two separate annotations of
/// the same chord add up. Equal totals resolve to the chord seen first in
/// `annotations`. Returns `None` only when there are no annotations.
pub fn best_match(annotations: &[Annotation], start_time: f64, end_time: f64) -> Option<Chord> {
    let mut candidates: Vec<(Chord, f64)> = Vec::new();
    for annotation in annotations {
        let overlap = interval_overlap(
            (start_time, end_time),
            (annotation.start, annotation.end),
        );
        match candidates.iter_mut().find(|(chord, _)| *chord == annotation.chord) {
            Some((_, total)) => *total += overlap,
            None => candidates.push((annotation.chord, overlap)),
        }
    }

    candidates
        .into_iter()
        .fold(None, |best: Option<(Chord, f64)>, (chord, overlap)| match best {
            Some((_, best_overlap)) if best_overlap >= overlap => best,
            _ => Some((chord, overlap)),
        })
        .map(|(chord, _)| chord)
}

/// Average distance from each annotation start to its closest beat boundary,
/// scaled by `60 / bpm`.
///
/// Returns `None` when there is nothing to measure.
pub fn annotation_mistiming(annotations: &[Annotation], boundaries: &[f64], bpm: f64) -> Option<f64> {
    if annotations.is_empty() || boundaries.is_empty() {
        return None;
    }

    let total: f64 = annotations
        .iter()
        .map(|annotation| {
            boundaries
                .iter()
                .map(|beat| (beat - annotation.start).abs())
                .fold(f64::INFINITY, f64::min)
        })
        .sum();

    Some(total / annotations.len() as f64 * 60.0 / bpm)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use approx::assert_relative_eq;

    use super::*;

    fn chord(name: &str) -> Chord {
        Chord::parse(name, ChordEncoding::MajMin7).unwrap()
    }

    fn annotation(name: &str, start: f64, end: f64) -> Annotation {
        Annotation { chord: chord(name), start, end }
    }

    #[test]
    fn overlap() {
        assert_eq!(interval_overlap((0.0, 1.0), (0.5, 2.0)), 0.5);
        assert_eq!(interval_overlap((0.0, 1.0), (1.0, 2.0)), 0.0);
        assert_eq!(interval_overlap((0.0, 1.0), (3.0, 4.0)), 0.0);
        assert_relative_eq!(interval_overlap((0.2, 0.4), (0.0, 1.0)), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn best_match_takes_largest_overlap() {
        let annotations = [
            annotation("Amaj", 0.0, 0.3),
            annotation("Dmin", 0.3, 1.0),
        ];
        assert_eq!(best_match(&annotations, 0.0, 1.0), Some(chord("Dmin")));
    }

    #[test]
    fn best_match_accumulates_per_chord() {
        let annotations = [
            annotation("Amaj", 0.0, 0.3),
            annotation("Dmin", 0.3, 0.7),
            annotation("Amaj", 0.7, 1.0),
        ];
        assert_eq!(best_match(&annotations, 0.0, 1.0), Some(chord("Amaj")));
    }

    #[test]
    fn best_match_tie_goes_to_first_seen() {
        let annotations = [annotation("Amaj", 0.0, 0.5), annotation("Bmaj", 0.5, 1.0)];
        assert_eq!(best_match(&annotations, 0.0, 1.0), Some(chord("Amaj")));

        let reversed = [annotation("Bmaj", 0.5, 1.0), annotation("Amaj", 0.0, 0.5)];
        assert_eq!(best_match(&reversed, 0.0, 1.0), Some(chord("Bmaj")));
    }

    #[test]
    fn best_match_distinguishes_quality() {
        // Same root, different quality: separate buckets.
        let annotations = [
            annotation("Amaj", 0.0, 0.4),
            annotation("Amin", 0.4, 0.7),
            annotation("Amin", 0.7, 1.0),
        ];
        assert_eq!(best_match(&annotations, 0.0, 1.0), Some(chord("Amin")));
        assert_eq!(best_match(&[], 0.0, 1.0), None);
    }

    #[test]
    fn mistiming_is_scaled_average_distance() {
        let annotations = [annotation("Amaj", 0.1, 1.0), annotation("Dmin", 1.0, 2.0)];
        let boundaries = [0.0, 0.5, 1.2, 2.0];
        // Distances 0.1 and 0.2, mean 0.15, times 60 / 120.
        let mistiming = annotation_mistiming(&annotations, &boundaries, 120.0).unwrap();
        assert_relative_eq!(mistiming, 0.075, epsilon = 1e-12);
        assert_eq!(annotation_mistiming(&[], &boundaries, 120.0), None);
    }

    #[test]
    fn load_lab_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0\t1.5\tN").unwrap();
        writeln!(file, "1.5\t3.0\tA:min7").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "3.0\t4.25\tX").unwrap();
        writeln!(file, "4.25 5.0 Fb:maj").unwrap();

        let annotations = load_annotations(file.path(), ChordEncoding::MajMin7).unwrap();
        assert_eq!(annotations.len(), 4);
        assert!(annotations[0].chord.is_no_chord(ChordEncoding::MajMin7));
        assert_eq!(annotations[1].chord, chord("Amin7"));
        assert_eq!(annotations[2].chord, Chord::Unlabeled);
        assert_eq!(annotations[3].chord, chord("Emaj"));
        assert_eq!(annotations[3].end, 5.0);
    }

    #[test]
    fn load_lab_file_rejects_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0\tlater\tA:maj").unwrap();
        let err = load_annotations(file.path(), ChordEncoding::MajMin).unwrap_err();
        assert!(matches!(err, Error::InvalidAnnotation { line: 1, .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0\t1.0\tA:sus2").unwrap();
        let err = load_annotations(file.path(), ChordEncoding::MajMin).unwrap_err();
        assert!(matches!(err, Error::UnknownQuality { .. }));
    }
}
