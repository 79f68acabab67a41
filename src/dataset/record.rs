use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::music::annotation::Annotation;
use crate::music::chord::{Chord, ChordEncoding};

/// Parsed features and labels of one audio file, persisted as `<stem>.json`.
///
/// `chromas` holds one flattened spectral frame per beat interval, guard
/// octaves included. `chords` has one label per row of `chromas` (empty when
/// the song was parsed without annotations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub chromas: Array2<f32>,
    pub chords: Vec<Chord>,
    pub beats: Vec<f64>,
    pub annotations: Vec<Annotation>,
    pub annotation_mistiming: f64,
    pub song: String,
}

impl SongRecord {
    pub fn frame_n(&self) -> usize {
        self.chromas.nrows()
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Read a record back, rejecting one whose labels do not cover its frames.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let record: SongRecord = serde_json::from_reader(reader)?;
        if !record.chords.is_empty() && record.chords.len() != record.frame_n() {
            return Err(Error::InvalidRecord {
                song: record.song.clone(),
                reason: format!(
                    "{} labels for {} frames",
                    record.chords.len(),
                    record.frame_n()
                ),
            });
        }
        Ok(record)
    }

    /// Check that every label names a quality of `encoding`.
    pub fn check_vocabulary(&self, encoding: ChordEncoding) -> crate::Result<()> {
        let quality_n = encoding.quality_n();
        match self.chords.iter().filter_map(Chord::quality).find(|&q| q >= quality_n) {
            Some(quality) => Err(Error::IndexOutOfRange {
                what: "quality",
                index: quality as i64,
                size: quality_n,
            }),
            None => Ok(()),
        }
    }
}

/// Per-sequence information carried alongside frames and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceMeta {
    pub beats: Vec<f64>,
    pub annotations: Vec<Annotation>,
    pub song: String,
}

/// A song as the model sees it: `(T, width)` frames and `T` labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SongSequence {
    pub frames: Array2<f32>,
    pub labels: Vec<Chord>,
    pub meta: SequenceMeta,
}

impl SongSequence {
    pub fn len(&self) -> usize {
        self.frames.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
