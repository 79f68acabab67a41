use serde::{Deserialize, Serialize};

use crate::constants::{NO_ENCODING, PITCH_CLASSES, ROOT_NAMES};
use crate::error::{Error, Result};

const GENERATED_QUALITIES: [&str; 4] = ["maj", "min", "maj7", "dim"];
const MAJMIN_QUALITIES: [&str; 3] = ["N", "maj", "min"];
const MAJMIN7_QUALITIES: [&str; 6] = ["N", "maj", "min", "maj7", "min7", "7"];

/// Label vocabulary: the bijection between chord names and integer indices.
///
/// Roots are always the 12 pitch classes starting at A. The quality list
/// depends on the dataset the vocabulary belongs to; when its first entry is
/// `N` the vocabulary can express "no chord".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordEncoding {
    Generated,
    MajMin,
    MajMin7,
}

impl ChordEncoding {
    pub fn roots(&self) -> &'static [&'static str] {
        &ROOT_NAMES
    }

    pub fn qualities(&self) -> &'static [&'static str] {
        match self {
            ChordEncoding::Generated => &GENERATED_QUALITIES,
            ChordEncoding::MajMin => &MAJMIN_QUALITIES,
            ChordEncoding::MajMin7 => &MAJMIN7_QUALITIES,
        }
    }

    pub fn root_n(&self) -> usize {
        self.roots().len()
    }

    pub fn quality_n(&self) -> usize {
        self.qualities().len()
    }

    /// Whether quality index 0 means "no chord".
    pub fn has_no_chord(&self) -> bool {
        self.qualities()[0] == "N"
    }

    pub fn int_to_note(&self, root_index: usize) -> Result<&'static str> {
        self.roots().get(root_index).copied().ok_or(Error::IndexOutOfRange {
            what: "root",
            index: root_index as i64,
            size: self.root_n(),
        })
    }

    /// Resolve a root spelling to its pitch class.
    ///
    /// Canonical names map directly. Sharps resolve one step above their
    /// natural, flats that are not canonical (`Cb`, `Fb`) one step below.
    ///
    /// # Arguments
    ///
    /// * `root` - Root spelling such as `A`, `C#` or `Fb`.
    ///
    /// # Returns
    ///
    /// * The pitch-class index, 0 being A.
    pub fn note_to_int(&self, root: &str) -> Result<usize> {
        let roots = self.roots();
        let index_of = |name: &str| {
            roots
                .iter()
                .position(|r| *r == name)
                .ok_or_else(|| Error::UnknownRoot(root.to_string()))
        };

        if let Some(natural) = root.strip_suffix('#') {
            return Ok((index_of(natural)? + 1) % PITCH_CLASSES);
        }
        if let Ok(index) = index_of(root) {
            return Ok(index);
        }
        if let Some(natural) = root.strip_suffix('b') {
            return Ok((index_of(natural)? + PITCH_CLASSES - 1) % PITCH_CLASSES);
        }

        Err(Error::UnknownRoot(root.to_string()))
    }

    pub fn int_to_quality(&self, quality_index: usize) -> Result<&'static str> {
        self.qualities()
            .get(quality_index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                what: "quality",
                index: quality_index as i64,
                size: self.quality_n(),
            })
    }

    pub fn quality_to_int(&self, quality: &str) -> Result<usize> {
        self.qualities()
            .iter()
            .position(|q| *q == quality)
            .ok_or_else(|| Error::UnknownQuality {
                quality: quality.to_string(),
                vocabulary: self.qualities(),
            })
    }
}

/// A chord label: either unlabeled, or a root and quality index.
///
/// "No chord" is `Labeled { root: 0, quality: 0 }` in vocabularies whose
/// first quality is `N`. The integer form used in batches and persisted
/// records is `(root, quality)`, with both set to [`NO_ENCODING`] when
/// unlabeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "(i32, i32)", try_from = "(i32, i32)")]
pub enum Chord {
    Unlabeled,
    Labeled { root: usize, quality: usize },
}

impl Chord {
    pub fn new(root: usize, quality: usize, encoding: ChordEncoding) -> Result<Self> {
        encoding.int_to_note(root)?;
        encoding.int_to_quality(quality)?;
        Ok(Chord::Labeled { root, quality })
    }

    pub fn no_chord(encoding: ChordEncoding) -> Result<Self> {
        if !encoding.has_no_chord() {
            return Err(Error::NoChordUnsupported(encoding.qualities()));
        }
        Ok(Chord::Labeled { root: 0, quality: 0 })
    }

    /// Parse a chord name such as `Amaj`, `C#min7`, `Bb:7`, `N` or `X`.
    pub fn parse(string: &str, encoding: ChordEncoding) -> Result<Self> {
        match string {
            "X" => return Ok(Chord::Unlabeled),
            "N" => return Chord::no_chord(encoding),
            _ => {}
        }

        let (root, quality) = match string.split_once(':') {
            Some(parts) => parts,
            None => split_root(string)?,
        };

        let root = encoding.note_to_int(root)?;
        let quality = encoding.quality_to_int(canonical_quality(quality))?;
        Ok(Chord::Labeled { root, quality })
    }

    pub fn is_no_chord(&self, encoding: ChordEncoding) -> bool {
        encoding.has_no_chord() && matches!(self, Chord::Labeled { quality: 0, .. })
    }

    pub fn quality(&self) -> Option<usize> {
        match self {
            Chord::Labeled { quality, .. } => Some(*quality),
            Chord::Unlabeled => None,
        }
    }

    /// Transpose down by `shift` semitones: the root moves to `(root - shift) mod 12`.
    ///
    /// Unlabeled and no-chord labels have no root to move and are returned unchanged.
    pub fn transpose(&self, shift: i32, encoding: ChordEncoding) -> Self {
        match *self {
            Chord::Labeled { root, quality } if !self.is_no_chord(encoding) => {
                let root = (root as i32 - shift).rem_euclid(PITCH_CLASSES as i32) as usize;
                Chord::Labeled { root, quality }
            }
            other => other,
        }
    }

    pub fn to_tuple(&self) -> (i32, i32) {
        match *self {
            Chord::Labeled { root, quality } => (root as i32, quality as i32),
            Chord::Unlabeled => (NO_ENCODING, NO_ENCODING),
        }
    }

    pub fn from_tuple((root, quality): (i32, i32)) -> Result<Self> {
        match (root, quality) {
            (NO_ENCODING, NO_ENCODING) => Ok(Chord::Unlabeled),
            (r, q) if (0..PITCH_CLASSES as i32).contains(&r) && q >= 0 => Ok(Chord::Labeled {
                root: r as usize,
                quality: q as usize,
            }),
            (root, quality) => Err(Error::InconsistentChord { root, quality }),
        }
    }

    /// Human readable label: `X`, `N`, or root followed by quality.
    pub fn label(&self, encoding: ChordEncoding) -> Result<String> {
        match *self {
            Chord::Unlabeled => Ok("X".to_string()),
            _ if self.is_no_chord(encoding) => Ok("N".to_string()),
            Chord::Labeled { root, quality } => Ok(format!(
                "{}{}",
                encoding.int_to_note(root)?,
                encoding.int_to_quality(quality)?
            )),
        }
    }
}

impl From<Chord> for (i32, i32) {
    fn from(chord: Chord) -> Self {
        chord.to_tuple()
    }
}

impl TryFrom<(i32, i32)> for Chord {
    type Error = Error;

    fn try_from(value: (i32, i32)) -> Result<Self> {
        Chord::from_tuple(value)
    }
}

fn split_root(string: &str) -> Result<(&str, &str)> {
    let mut chars = string.char_indices();
    match chars.next() {
        Some((_, letter)) if ('A'..='G').contains(&letter) => {}
        _ => return Err(Error::UnknownRoot(string.to_string())),
    }
    let split = match chars.next() {
        Some((i, '#')) | Some((i, 'b')) => i + 1,
        Some((i, _)) => i,
        None => string.len(),
    };
    Ok(string.split_at(split))
}

fn canonical_quality(quality: &str) -> &str {
    match quality {
        "" => "maj",
        "m" => "min",
        "m7" => "min7",
        "M7" => "maj7",
        other => other,
    }
}
