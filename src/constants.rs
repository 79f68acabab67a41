// Chord labels
pub const PADDED: i32 = -1;
pub const NO_ENCODING: i32 = -2;
pub const PITCH_CLASSES: usize = 12;
pub const ROOT_NAMES: [&str; PITCH_CLASSES] = ["A", "Bb", "B", "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab"];

// Spectra
pub const REFERENCE_HZ: f64 = 440.0;
pub const START_OCTAVE: i32 = -4;
pub const OCTAVE_N: usize = 7;
pub const BIN_N: usize = 24;
pub const GUARD_OCTAVES: usize = 1;
pub const SUBWINDOW_N: usize = 10;
pub const SUBWINDOW_EDGE_FACTOR: f64 = 5.0;
pub const GENERATED_WINDOW_SECONDS: f64 = 0.5;
pub const GENERATED_ANNOTATION_END: f64 = 3.0;

// Dataset
pub const MISTIMING_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SPLIT: [f32; 3] = [0.60, 0.25, 0.15];
pub const AUGMENT_SHIFTS: std::ops::Range<i32> = -6..6;
pub const METADATA_FILE: &str = "metadata.json";
pub const ANNOTATIONS_DIR: &str = "annotations-mirex";
pub const SONG_ID_LEN: usize = 4;

// ChordNet
pub const CONTEXT_BEATS: usize = 5;
pub const LR_DECAY_PER_EPOCH: f32 = 0.97;
