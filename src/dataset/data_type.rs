use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{BIN_N, OCTAVE_N, START_OCTAVE};
use crate::error::Error;
use crate::music::chord::ChordEncoding;

/// Which corpus a data directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DatasetType {
    Generated,
    BillboardMajMinTiny,
    BillboardMajMin7Tiny,
    BillboardMajMinSmall,
    BillboardMajMin7Small,
    BillboardMajMinAll,
    BillboardMajMin7All,
}

impl DatasetType {
    pub const ALL: [DatasetType; 7] = [
        DatasetType::Generated,
        DatasetType::BillboardMajMinTiny,
        DatasetType::BillboardMajMin7Tiny,
        DatasetType::BillboardMajMinSmall,
        DatasetType::BillboardMajMin7Small,
        DatasetType::BillboardMajMinAll,
        DatasetType::BillboardMajMin7All,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatasetType::Generated => "gen",
            DatasetType::BillboardMajMinTiny => "bill-mm-tiny",
            DatasetType::BillboardMajMin7Tiny => "bill-mm7-tiny",
            DatasetType::BillboardMajMinSmall => "bill-mm-small",
            DatasetType::BillboardMajMin7Small => "bill-mm7-small",
            DatasetType::BillboardMajMinAll => "bill-mm-all",
            DatasetType::BillboardMajMin7All => "bill-mm7-all",
        }
    }

    pub fn encoding(&self) -> ChordEncoding {
        match self {
            DatasetType::Generated => ChordEncoding::Generated,
            DatasetType::BillboardMajMinTiny
            | DatasetType::BillboardMajMinSmall
            | DatasetType::BillboardMajMinAll => ChordEncoding::MajMin,
            DatasetType::BillboardMajMin7Tiny
            | DatasetType::BillboardMajMin7Small
            | DatasetType::BillboardMajMin7All => ChordEncoding::MajMin7,
        }
    }

    /// Name of the `.lab` file holding this vocabulary's annotations, if the
    /// corpus ships annotation files at all.
    pub fn lab_file(&self) -> Option<&'static str> {
        match self.encoding() {
            ChordEncoding::Generated => None,
            ChordEncoding::MajMin => Some("majmin.lab"),
            ChordEncoding::MajMin7 => Some("majmin7.lab"),
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, DatasetType::Generated)
    }

    pub fn properties(&self) -> DataProperties {
        DataProperties::new(self.encoding())
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownDatasetType(s.to_string()))
    }
}

impl From<DatasetType> for String {
    fn from(value: DatasetType) -> Self {
        value.name().to_string()
    }
}

impl TryFrom<String> for DatasetType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Shape of the features a dataset produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProperties {
    pub encoding: ChordEncoding,
    /// Octaves the model sees; stored frames carry one more on each side.
    pub octave_n: usize,
    /// Bins per octave.
    pub bin_n: usize,
    /// Lowest model octave relative to A440.
    pub start_octave: i32,
}

impl DataProperties {
    pub fn new(encoding: ChordEncoding) -> Self {
        Self {
            encoding,
            octave_n: OCTAVE_N,
            bin_n: BIN_N,
            start_octave: START_OCTAVE,
        }
    }

    /// Bins per pitch class.
    pub fn subtones(&self) -> usize {
        self.bin_n / crate::constants::PITCH_CLASSES
    }

    /// Width of a model input frame.
    pub fn width(&self) -> usize {
        self.octave_n * self.bin_n
    }

    /// Width of a stored frame, guard octaves included.
    pub fn stored_width(&self) -> usize {
        (self.octave_n + 2) * self.bin_n
    }

    /// Octave offsets a stored frame covers, lowest first.
    pub fn stored_octaves(&self) -> Vec<i32> {
        (self.start_octave - 1..=self.start_octave + self.octave_n as i32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for t in DatasetType::ALL {
            assert_eq!(t.name().parse::<DatasetType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(serde_json::from_str::<DatasetType>(&json).unwrap(), t);
        }
        assert!(matches!(
            "bill-huge".parse::<DatasetType>(),
            Err(Error::UnknownDatasetType(_))
        ));
    }

    #[test]
    fn encodings_and_lab_files() {
        assert_eq!(DatasetType::Generated.encoding(), ChordEncoding::Generated);
        assert_eq!(DatasetType::Generated.lab_file(), None);
        assert_eq!(DatasetType::BillboardMajMinSmall.lab_file(), Some("majmin.lab"));
        assert_eq!(
            DatasetType::BillboardMajMin7All.encoding(),
            ChordEncoding::MajMin7
        );
    }

    #[test]
    fn default_properties() {
        let props = DatasetType::BillboardMajMinTiny.properties();
        assert_eq!(props.width(), 168);
        assert_eq!(props.stored_width(), 216);
        assert_eq!(props.subtones(), 2);
        assert_eq!(props.stored_octaves(), vec![-5, -4, -3, -2, -1, 0, 1, 2, 3]);
    }
}
