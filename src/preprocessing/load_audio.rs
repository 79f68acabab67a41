use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::error::{Error, Result};

/// Decoded PCM audio, one sample vector per channel.
///
/// Integer WAV samples keep their native magnitude (a 16-bit file spans
/// roughly ±32768); float WAV samples are kept as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { channels: vec![samples], sample_rate }
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        Self { channels: vec![left, right], sample_rate }
    }

    /// Number of samples per channel.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Collapse all channels into one by summing them.
    ///
    /// Summing (rather than averaging) doubles the amplitude of a stereo file
    /// relative to the same content in mono; extracted features depend on it.
    pub fn downmix(&self) -> Vec<f32> {
        match self.channels.as_slice() {
            [] => Vec::new(),
            [only] => only.clone(),
            [first, rest @ ..] => {
                let mut mixed = first[..self.len()].to_vec();
                for channel in rest {
                    for (m, s) in mixed.iter_mut().zip(channel.iter()) {
                        *m += s;
                    }
                }
                mixed
            }
        }
    }
}

/// Load a WAV file without resampling.
///
/// # Arguments
///
/// * `path` - Path to the WAV file.
///
/// # Returns
///
/// * The de-interleaved channels and the file's sample rate.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channel_n = spec.channels as usize;

    if channel_n == 0 {
        return Err(Error::InvalidParameter {
            name: "channels",
            value: "0".to_string(),
            reason: "WAV file declares no channels".to_string(),
        });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => reader
            .into_samples::<i32>()
            .map(|s| s.map(|s| s as f32))
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_n); channel_n];
    for frame in interleaved.chunks_exact(channel_n) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(AudioBuffer { channels, sample_rate: spec.sample_rate })
}
