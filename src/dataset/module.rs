use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::constants::{
    ANNOTATIONS_DIR, AUGMENT_SHIFTS, DEFAULT_SPLIT, METADATA_FILE, MISTIMING_THRESHOLD,
    SONG_ID_LEN,
};
use crate::dataset::augment::augment_dataset;
use crate::dataset::batch::{batches, Batch};
use crate::dataset::data_type::{DataProperties, DatasetType};
use crate::dataset::record::{SequenceMeta, SongRecord, SongSequence};
use crate::dataset::stats::report_data_stats;
use crate::error::{Error, Result};
use crate::music::annotation::load_annotations;
use crate::preprocessing::beat_features::BeatFeatureBuilder;
use crate::preprocessing::beats::BeatTracker;
use crate::preprocessing::load_audio::load_audio;

/// Runtime knobs of the data pipeline.
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    /// Only records whose file name contains this string are loaded.
    pub file_filter: String,
    /// Train on all transpositions in `AUGMENT_SHIFTS` instead of the original key.
    pub augment: bool,
    pub batch_size: usize,
    /// Train, validation and test fractions.
    pub split: [f32; 3],
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            file_filter: String::new(),
            augment: false,
            batch_size: 1,
            split: DEFAULT_SPLIT,
        }
    }
}

/// Contents of `metadata.json` in a data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub dataset_type: DatasetType,
}

pub fn read_metadata(data_dir: &Path) -> Result<Option<Metadata>> {
    let path = data_dir.join(METADATA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(Some(serde_json::from_reader(reader)?))
}

pub fn write_metadata(data_dir: &Path, metadata: &Metadata) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let writer = BufWriter::new(File::create(data_dir.join(METADATA_FILE))?);
    serde_json::to_writer_pretty(writer, metadata)?;
    Ok(())
}

/// Parses, loads, splits and batches one data directory.
pub struct ChordDataModule {
    dataset_type: DatasetType,
    props: DataProperties,
    config: DataConfig,
    fetch_data: bool,
    pub train: Vec<SongSequence>,
    pub val: Vec<SongSequence>,
    pub test: Vec<SongSequence>,
}

impl ChordDataModule {
    /// Without a dataset type the type stored in the directory's metadata is
    /// used. With one and `fetch_data == false`, the metadata is rewritten
    /// right away so an interrupted preprocessing run leaves it consistent.
    pub fn new(dataset_type: Option<DatasetType>, fetch_data: bool, config: DataConfig) -> Result<Self> {
        let (dataset_type, fetch_data) = match dataset_type {
            Some(dataset_type) => {
                if !fetch_data {
                    write_metadata(&config.data_dir, &Metadata { dataset_type })?;
                }
                (dataset_type, fetch_data)
            }
            None => {
                let metadata = read_metadata(&config.data_dir)?
                    .ok_or_else(|| Error::MissingDatasetType(config.data_dir.clone()))?;
                info!("Loaded dataset type: {}", metadata.dataset_type);
                (metadata.dataset_type, false)
            }
        };

        Ok(Self {
            dataset_type,
            props: dataset_type.properties(),
            config,
            fetch_data,
            train: Vec::new(),
            val: Vec::new(),
            test: Vec::new(),
        })
    }

    /// Override the feature shape, e.g. for a reduced octave range.
    pub fn with_properties(mut self, props: DataProperties) -> Self {
        self.props = props;
        self
    }

    pub fn dataset_type(&self) -> DatasetType {
        self.dataset_type
    }

    pub fn props(&self) -> &DataProperties {
        &self.props
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Parse every WAV file of the data directory into a `<stem>.json`
    /// record and write the metadata. Does nothing unless fetching was
    /// requested.
    pub fn prepare_data<R: Rng>(&self, tracker: &dyn BeatTracker, rng: &mut R) -> Result<()> {
        if !self.fetch_data {
            return Ok(());
        }

        info!("Parsing spectra in {}...", self.config.data_dir.display());
        let parsed = self.parse_all_spectra(tracker, rng)?;
        info!("Parsed {} files", parsed);

        info!("Writing metadata...");
        write_metadata(&self.config.data_dir, &Metadata { dataset_type: self.dataset_type })
    }

    /// Returns the number of records written. Files that fail to parse are
    /// logged and skipped.
    pub fn parse_all_spectra<R: Rng>(&self, tracker: &dyn BeatTracker, rng: &mut R) -> Result<usize> {
        let mut builder = BeatFeatureBuilder::new(&self.props)?;
        let mut parsed = 0;

        for wav_path in files_with_extension(&self.config.data_dir, "wav") {
            let record = match self.parse_file(&wav_path, &mut builder, tracker, rng) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Got error on parsing {}, skipping: {}", wav_path.display(), e);
                    continue;
                }
            };

            record.save(&wav_path.with_extension("json"))?;
            parsed += 1;
        }

        Ok(parsed)
    }

    fn parse_file<R: Rng>(
        &self,
        wav_path: &Path,
        builder: &mut BeatFeatureBuilder,
        tracker: &dyn BeatTracker,
        rng: &mut R,
    ) -> Result<SongRecord> {
        let audio = load_audio(wav_path)?;
        if self.dataset_type.is_generated() {
            return builder.parse_generated(&audio, wav_path, &self.props);
        }

        let song = file_stem(wav_path);
        let beat_info = tracker.detect(&audio, Some(wav_path))?;
        let annotations = match self.annotation_path(&song) {
            Some(lab_path) => load_annotations(&lab_path, self.props.encoding)?,
            None => return Err(Error::EmptyAnnotations(song)),
        };

        builder.parse_song(&audio, &beat_info, Some(annotations.as_slice()), &song, rng)
    }

    /// `<data>/annotations-mirex/<first 4 chars of the song>/<lab file>`.
    pub fn annotation_path(&self, song: &str) -> Option<PathBuf> {
        let lab_file = self.dataset_type.lab_file()?;
        let song_id: String = song.chars().take(SONG_ID_LEN).collect();
        Some(
            self.config
                .data_dir
                .join(ANNOTATIONS_DIR)
                .join(song_id)
                .join(lab_file),
        )
    }

    /// Load the parsed records, split them and build the augmented splits.
    pub fn setup<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let mut all_data = self.load_sequences()?;

        let n = all_data.len();
        let train_size = (self.config.split[0] * n as f32) as usize;
        let val_size = (self.config.split[1] * n as f32) as usize;

        all_data.shuffle(rng);
        let test = all_data.split_off((train_size + val_size).min(n));
        let val = all_data.split_off(train_size.min(all_data.len()));
        let train = all_data;

        let train_shifts: Vec<i32> = if self.config.augment {
            AUGMENT_SHIFTS.collect()
        } else {
            vec![0]
        };
        self.train = augment_dataset(&train, train_shifts, &self.props, rng)?;
        self.val = augment_dataset(&val, [0], &self.props, rng)?;
        self.test = augment_dataset(&test, [0], &self.props, rng)?;

        report_data_stats(&self.train, &self.val, &self.test, self.props.encoding);
        Ok(())
    }

    /// Records of the data directory that pass the file filter and the
    /// mistiming threshold, each normalized by its largest value.
    pub fn load_sequences(&self) -> Result<Vec<SongSequence>> {
        let mut sequences = Vec::new();

        for path in files_with_extension(&self.config.data_dir, "json") {
            let name = file_stem(&path);
            if !name.contains(&self.config.file_filter) {
                continue;
            }

            let record = SongRecord::load(&path)?;
            record.check_vocabulary(self.props.encoding)?;
            if record.annotation_mistiming > MISTIMING_THRESHOLD {
                debug!(
                    "Skipping {}: annotation mistiming {:.2}",
                    name, record.annotation_mistiming
                );
                continue;
            }

            sequences.push(normalized_sequence(record, name));
        }

        Ok(sequences)
    }

    pub fn train_batches<R: Rng>(&self, rng: &mut R) -> Vec<Batch> {
        batches(&self.train, self.config.batch_size, Some(rng))
    }

    pub fn val_batches(&self) -> Vec<Batch> {
        batches::<rand::rngs::StdRng>(&self.val, 1, None)
    }

    pub fn test_batches(&self) -> Vec<Batch> {
        batches::<rand::rngs::StdRng>(&self.test, 1, None)
    }
}

/// Turn a record into a sequence whose largest value is 1.
pub fn normalized_sequence(record: SongRecord, song: String) -> SongSequence {
    let mut frames = record.chromas;
    let max = frames.iter().copied().fold(f32::MIN, f32::max);
    if max > 0.0 {
        frames /= max;
    }

    SongSequence {
        frames,
        labels: record.chords,
        meta: SequenceMeta {
            beats: record.beats,
            annotations: record.annotations,
            song,
        },
    }
}

fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension().map_or(false, |ext| ext == extension)
                && path.file_name().map_or(true, |name| name != METADATA_FILE)
        })
        .collect();
    files.sort();
    files
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
