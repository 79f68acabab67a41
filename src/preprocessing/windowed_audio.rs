/// Iterator over consecutive beat intervals.
///
/// Yields `(t_start, length)` in seconds for every pair of adjacent
/// boundaries.
pub struct BeatWindows<'a> {
    boundaries: &'a [f64],
    index: usize,
}

impl<'a> Iterator for BeatWindows<'a> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index + 1 >= self.boundaries.len() {
            return None;
        }

        let t_start = self.boundaries[self.index];
        let t_end = self.boundaries[self.index + 1];

        self.index += 1;
        Some((t_start, t_end - t_start))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.boundaries.len().saturating_sub(self.index + 1);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BeatWindows<'_> {}

pub fn window_beats(boundaries: &[f64]) -> BeatWindows {
    BeatWindows {
        boundaries,
        index: 0,
    }
}

/// Interval boundaries for a song: `0`, every detected beat before the end
/// of the audio, and the end of the audio.
///
/// # Arguments
///
/// * `beats` - Beat timestamps in seconds from the beat tracker.
/// * `duration` - Length of the audio in seconds.
///
/// # Returns
///
/// * The boundaries, and the beats that survived the filter.
pub fn beat_boundaries(beats: &[f64], duration: f64) -> (Vec<f64>, Vec<f64>) {
    // Trackers occasionally report a beat past the end of the file
    let kept: Vec<f64> = beats.iter().copied().filter(|&b| b < duration).collect();

    let mut boundaries = Vec::with_capacity(kept.len() + 2);
    boundaries.push(0.0);
    boundaries.extend_from_slice(&kept);
    boundaries.push(duration);

    (boundaries, kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_drop_late_beats() {
        let (boundaries, kept) = beat_boundaries(&[0.5, 1.0, 2.5, 3.1], 3.0);
        assert_eq!(boundaries, vec![0.0, 0.5, 1.0, 2.5, 3.0]);
        assert_eq!(kept, vec![0.5, 1.0, 2.5]);
    }

    #[test]
    fn windows_cover_boundaries() {
        let boundaries = [0.0, 0.5, 1.25, 2.0];
        let windows: Vec<_> = window_beats(&boundaries).collect();
        assert_eq!(windows, vec![(0.0, 0.5), (0.5, 0.75), (1.25, 0.75)]);
        assert_eq!(window_beats(&boundaries).len(), 3);
        assert_eq!(window_beats(&[1.0]).count(), 0);
    }
}
