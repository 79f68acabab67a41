use std::f64::consts::PI;

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::constants::{PITCH_CLASSES, REFERENCE_HZ};
use crate::error::{Error, Result};
use crate::preprocessing::load_audio::AudioBuffer;

/// Orthonormal DCT-II computed through a same-length complex FFT.
///
/// Plans are cached by the underlying planner, so reusing one `DctPlanner`
/// across windows of repeating lengths is cheap.
pub struct DctPlanner {
    planner: FftPlanner<f64>,
}

impl DctPlanner {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// DCT-II with orthonormal scaling (the transform matrix is orthogonal).
    ///
    /// # Arguments
    ///
    /// * `input` - Real input of any length.
    ///
    /// # Returns
    ///
    /// * The `input.len()` transform coefficients.
    pub fn dct2_ortho(&mut self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }

        // Even samples ascending, then odd samples descending
        let mut buffer = vec![Complex::new(0.0, 0.0); n];
        for (i, &x) in input.iter().enumerate() {
            let j = if i % 2 == 0 { i / 2 } else { n - 1 - i / 2 };
            buffer[j] = Complex::new(x, 0.0);
        }

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let scale_dc = (1.0 / n as f64).sqrt();
        let scale = (2.0 / n as f64).sqrt();
        buffer
            .iter()
            .enumerate()
            .map(|(k, &v)| {
                let twiddle = Complex::from_polar(1.0, -PI * k as f64 / (2.0 * n as f64));
                let coefficient = (v * twiddle).re;
                coefficient * if k == 0 { scale_dc } else { scale }
            })
            .collect()
    }
}

impl Default for DctPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a window of audio into an octave × sub-semitone power matrix.
pub struct SpectralExtractor {
    dct: DctPlanner,
    bin_n: usize,
}

impl SpectralExtractor {
    /// # Arguments
    ///
    /// * `bin_n` - Bins per octave; must be a positive multiple of 12.
    pub fn new(bin_n: usize) -> Result<Self> {
        if bin_n == 0 || bin_n % PITCH_CLASSES != 0 {
            return Err(Error::InvalidParameter {
                name: "bin_n",
                value: bin_n.to_string(),
                reason: "must be a positive multiple of 12".to_string(),
            });
        }
        Ok(Self {
            dct: DctPlanner::new(),
            bin_n,
        })
    }

    pub fn bin_n(&self) -> usize {
        self.bin_n
    }

    /// Downmix `audio` and extract one window from it.
    pub fn extract_buffer(
        &mut self,
        audio: &AudioBuffer,
        octaves: &[i32],
        t_start: f64,
        win: f64,
    ) -> Array2<f32> {
        let samples = audio.downmix();
        self.extract(&samples, audio.sample_rate, octaves, t_start, win)
    }

    /// Log-compressed, pitch-binned power of one window of mono audio.
    ///
    /// Every octave offset `o` covers `[440·2^o, 440·2^(o+1))` Hz and is split
    /// into `bin_n` bins whose boundaries sit half a bin off the equal-tempered
    /// pitches, so bin 0 is centered on A and wraps around it. A window that
    /// runs past the end of the audio yields an all-zero matrix.
    ///
    /// # Arguments
    ///
    /// * `samples` - Mono samples.
    /// * `sample_rate` - Sampling rate of `samples`.
    /// * `octaves` - Octave offsets relative to A440, e.g. `[-3, -2, -1, 0]`.
    /// * `t_start` - Start of the window in seconds.
    /// * `win` - Length of the window in seconds.
    ///
    /// # Returns
    ///
    /// * A matrix of shape `(octaves.len(), bin_n)`.
    pub fn extract(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        octaves: &[i32],
        t_start: f64,
        win: f64,
    ) -> Array2<f32> {
        let sr = sample_rate as f64;
        let start = ((sr * t_start).max(0.0) as usize).min(samples.len());
        let win_samps = (win.max(0.0) * sr) as usize;

        let available = &samples[start..];
        let power: Vec<f64> = if win_samps > 0 && win_samps <= available.len() {
            let window: Vec<f64> = available[..win_samps].iter().map(|&s| s as f64).collect();
            self.dct.dct2_ortho(&window).into_iter().map(|c| c * c).collect()
        } else {
            vec![0.0; win_samps]
        };

        let z = self.bin_n / PITCH_CLASSES;
        let to_index = |freq: f64| (freq * 2.0 * win_samps as f64 / sr) as usize;

        let mut binned = Array2::<f32>::zeros((octaves.len(), self.bin_n));
        for (i, &octave) in octaves.iter().enumerate() {
            let base = REFERENCE_HZ * 2f64.powi(octave);
            let notes: Vec<usize> = (0..=PITCH_CLASSES)
                .map(|k| to_index(base * 2f64.powf(k as f64 / 12.0)))
                .collect();
            let subtones: Vec<usize> = (0..self.bin_n)
                .map(|m| {
                    let semitones = 1.0 / (2.0 * z as f64) + m as f64 / z as f64;
                    to_index(base * 2f64.powf(semitones / 12.0))
                })
                .collect();

            let low = notes[0];
            let high = notes[PITCH_CLASSES];
            for j in 0..self.bin_n {
                let (sum, count) = if j == 0 {
                    // Wraps around A: bottom edge of the octave plus its top edge
                    let (s0, c0) = range_power(&power, low, subtones[0]);
                    let (s1, c1) = range_power(&power, subtones[self.bin_n - 1], high);
                    (s0 + s1, c0 + c1)
                } else {
                    range_power(&power, subtones[j - 1], subtones[j])
                };

                let mean = if count > 0 { sum / count as f64 } else { 0.0 };
                binned[[i, j]] = mean.ln_1p() as f32;
            }
        }

        binned
    }
}

fn range_power(power: &[f64], from: usize, to: usize) -> (f64, usize) {
    let from = from.min(power.len());
    let to = to.min(power.len());
    if from >= to {
        return (0.0, 0);
    }
    (power[from..to].iter().sum(), to - from)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;

    fn naive_dct(input: &[f64]) -> Vec<f64> {
        let n = input.len() as f64;
        (0..input.len())
            .map(|k| {
                let sum: f64 = input
                    .iter()
                    .enumerate()
                    .map(|(i, &x)| x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                    .sum();
                let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
                sum * scale
            })
            .collect()
    }

    fn tone(freq: f64, sample_rate: u32, seconds: f64, amplitude: f32) -> Vec<f32> {
        let n = (seconds * sample_rate as f64) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    fn argmax(row: ndarray::ArrayView1<f32>) -> usize {
        row.iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn dct_matches_direct_formula() {
        let mut planner = DctPlanner::new();
        for n in [1usize, 2, 7, 16, 45] {
            let input: Vec<f64> = (0..n).map(|i| ((i * 7 + 3) % 11) as f64 - 5.0).collect();
            let fast = planner.dct2_ortho(&input);
            let slow = naive_dct(&input);
            for (a, b) in fast.iter().zip(slow.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-9);
            }
        }
        assert!(planner.dct2_ortho(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn dct_preserves_energy(input in prop::collection::vec(-1000.0f64..1000.0, 1..128)) {
            let coefficients = DctPlanner::new().dct2_ortho(&input);
            let e_in: f64 = input.iter().map(|x| x * x).sum();
            let e_out: f64 = coefficients.iter().map(|x| x * x).sum();
            prop_assert!((e_in - e_out).abs() <= 1e-6 * e_in.max(1.0));
        }
    }

    #[test]
    fn rejects_bad_resolution() {
        assert!(SpectralExtractor::new(0).is_err());
        assert!(SpectralExtractor::new(18).is_err());
        assert!(SpectralExtractor::new(36).is_ok());
    }

    #[test]
    fn silence_and_overrun_are_zero() {
        let mut extractor = SpectralExtractor::new(24).unwrap();
        let silence = vec![0.0f32; 8000];
        let out = extractor.extract(&silence, 8000, &[-2, -1, 0], 0.0, 0.5);
        assert_eq!(out.dim(), (3, 24));
        assert!(out.iter().all(|&v| v == 0.0));

        let loud = tone(440.0, 8000, 1.0, 1000.0);
        let past_end = extractor.extract(&loud, 8000, &[0], 0.8, 0.5);
        assert!(past_end.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn tone_lands_in_its_pitch_class() {
        let sr = 8000;
        let mut extractor = SpectralExtractor::new(12).unwrap();

        let a = tone(440.0, sr, 1.0, 10000.0);
        let out = extractor.extract(&a, sr, &[-1, 0, 1], 0.0, 1.0);
        assert_eq!(argmax(out.row(1)), 0);

        let c = tone(440.0 * 2f64.powf(3.0 / 12.0), sr, 1.0, 10000.0);
        let out = extractor.extract(&c, sr, &[-1, 0, 1], 0.0, 1.0);
        assert_eq!(argmax(out.row(1)), 3);
        // The octave holding the tone peaks above its neighbours.
        let peak = |i: usize| out.row(i).fold(f32::MIN, |m, &v| m.max(v));
        assert!(peak(1) > peak(0));
        assert!(peak(1) > peak(2));
    }

    #[test]
    fn sub_semitone_bins_center_on_pitches() {
        let sr = 8000;
        let mut extractor = SpectralExtractor::new(24).unwrap();
        let e = tone(440.0 * 2f64.powf(7.0 / 12.0), sr, 1.0, 10000.0);
        let out = extractor.extract(&e, sr, &[0], 0.0, 1.0);
        assert_eq!(argmax(out.row(0)), 14);
    }

    #[test]
    fn empty_bins_stay_zero() {
        // Very short window: several low bins map to no coefficient at all.
        let sr = 8000;
        let mut extractor = SpectralExtractor::new(48).unwrap();
        let noise: Vec<f32> = (0..800).map(|i| ((i * 37 % 101) as f32) - 50.0).collect();
        let out = extractor.extract(&noise, sr, &[-3], 0.0, 0.05);
        assert!(out.iter().all(|v| v.is_finite()));
        assert!(out.iter().any(|&v| v == 0.0));
    }

    #[test]
    fn stereo_is_summed_before_transform() {
        let sr = 8000;
        let mut extractor = SpectralExtractor::new(12).unwrap();
        let left = tone(440.0, sr, 0.5, 3000.0);
        let mono = extractor.extract(&left, sr, &[0], 0.0, 0.5);
        let doubled: Vec<f32> = left.iter().map(|s| s * 2.0).collect();
        let expected = extractor.extract(&doubled, sr, &[0], 0.0, 0.5);

        let stereo = AudioBuffer::stereo(left.clone(), left, sr);
        let out = extractor.extract_buffer(&stereo, &[0], 0.0, 0.5);
        assert_eq!(out, expected);
        assert!(out[[0, 0]] > mono[[0, 0]]);
    }
}
