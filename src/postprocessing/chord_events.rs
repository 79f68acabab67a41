#[derive(Debug, Clone, PartialEq)]
pub struct ChordEvent {
    pub start_time_seconds: f64,
    pub duration_seconds: f64,
    pub chord: String,
}

/// Merge per-beat chords into events, joining consecutive beats with the
/// same chord.
///
/// # Arguments
///
/// * `beat_chords` - Start time and chord of every beat, in order.
/// * `end_time_seconds` - End of the last beat.
///
/// # Returns
///
/// * List of time-based chord events.
pub fn beat_chords_to_events(beat_chords: &[(f64, String)], end_time_seconds: f64) -> Vec<ChordEvent> {
    let mut events: Vec<ChordEvent> = Vec::new();

    for (i, (start, chord)) in beat_chords.iter().enumerate() {
        let end = beat_chords
            .get(i + 1)
            .map_or(end_time_seconds, |(next, _)| *next)
            .max(*start);

        match events.last_mut() {
            Some(last) if last.chord == *chord => {
                last.duration_seconds = end - last.start_time_seconds;
            }
            _ => events.push(ChordEvent {
                start_time_seconds: *start,
                duration_seconds: end - start,
                chord: chord.clone(),
            }),
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn consecutive_beats_merge() {
        let beats = vec![
            (0.0, "Amaj".to_string()),
            (0.5, "Amaj".to_string()),
            (1.0, "Dmin".to_string()),
            (1.5, "Amaj".to_string()),
        ];
        let events = beat_chords_to_events(&beats, 2.25);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].chord, "Amaj");
        assert_abs_diff_eq!(events[0].duration_seconds, 1.0);
        assert_abs_diff_eq!(events[1].start_time_seconds, 1.0);
        assert_abs_diff_eq!(events[2].duration_seconds, 0.75);
    }

    #[test]
    fn no_beats_no_events() {
        assert!(beat_chords_to_events(&[], 3.0).is_empty());
    }
}
