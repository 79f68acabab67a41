use std::path::PathBuf;

/// Crate-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A quality name that is not part of the active vocabulary.
    #[error("unknown chord quality `{quality}` (vocabulary: {vocabulary:?})")]
    UnknownQuality {
        quality: String,
        vocabulary: &'static [&'static str],
    },

    /// A root spelling that cannot be resolved to a pitch class.
    #[error("unknown root note `{0}`")]
    UnknownRoot(String),

    /// An integer index outside of a vocabulary.
    #[error("index {index} out of range for {what} (size {size})")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        size: usize,
    },

    /// A no-chord label was requested from a vocabulary without `N`.
    #[error("vocabulary {0:?} has no no-chord quality")]
    NoChordUnsupported(&'static [&'static str]),

    /// Sentinel pair that does not describe a valid chord.
    #[error("inconsistent chord encoding ({root}, {quality})")]
    InconsistentChord { root: i32, quality: i32 },

    /// Malformed line in an annotation file.
    #[error("invalid annotation at {path}:{line}: {reason}")]
    InvalidAnnotation {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// No annotations were available where at least one was required.
    #[error("no annotations for song `{0}`")]
    EmptyAnnotations(String),

    /// Parsed record whose frames and labels do not belong together.
    #[error("invalid record `{song}`: {reason}")]
    InvalidRecord { song: String, reason: String },

    /// Beat tracking produced too little to work with.
    #[error("beat tracking failed: {0}")]
    BeatTracking(String),

    /// Invalid parameter value.
    #[error("invalid parameter `{name}`: got {value}, {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Augmentation shift that would leave the guard octaves.
    #[error("shift {shift} needs {needed} guard bins, only {available} stored")]
    InvalidShift {
        shift: i32,
        needed: usize,
        available: usize,
    },

    /// Input array has incorrect shape for the operation.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// Data directory has no metadata and no dataset type was given.
    #[error("no dataset metadata in {0}, specify a dataset type")]
    MissingDatasetType(PathBuf),

    /// Unrecognized dataset name.
    #[error("unknown dataset type `{0}`")]
    UnknownDatasetType(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
