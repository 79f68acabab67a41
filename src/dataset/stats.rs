use tracing::info;

use crate::dataset::record::SongSequence;
use crate::music::chord::{Chord, ChordEncoding};

/// Label histogram of one split. The last entry of each vector counts
/// unlabeled beats (`X`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCounts {
    pub roots: Vec<usize>,
    pub qualities: Vec<usize>,
}

impl LabelCounts {
    /// Count labels; no-chord beats count toward their quality but not a root.
    pub fn from_sequences(data: &[SongSequence], encoding: ChordEncoding) -> Self {
        let mut roots = vec![0; encoding.root_n() + 1];
        let mut qualities = vec![0; encoding.quality_n() + 1];

        for chord in data.iter().flat_map(|seq| seq.labels.iter()) {
            match *chord {
                Chord::Unlabeled => {
                    roots[encoding.root_n()] += 1;
                    qualities[encoding.quality_n()] += 1;
                }
                Chord::Labeled { root, quality } => {
                    if !chord.is_no_chord(encoding) {
                        if let Some(count) = roots.get_mut(root) {
                            *count += 1;
                        }
                    }
                    if let Some(count) = qualities.get_mut(quality) {
                        *count += 1;
                    }
                }
            }
        }

        Self { roots, qualities }
    }
}

/// Log split sizes and per-split label tables.
pub fn report_data_stats(
    train: &[SongSequence],
    val: &[SongSequence],
    test: &[SongSequence],
    encoding: ChordEncoding,
) {
    info!(
        "Data: {} (train), {} (val), {} (test)",
        train.len(),
        val.len(),
        test.len()
    );

    let splits = [("Train", train), ("Valid", val), ("Test", test)];
    let counts: Vec<(&str, LabelCounts)> = splits
        .iter()
        .map(|(name, data)| (*name, LabelCounts::from_sequences(data, encoding)))
        .collect();

    let root_rows: Vec<(&str, &[usize])> = counts.iter().map(|(n, c)| (*n, c.roots.as_slice())).collect();
    for line in format_table(encoding.roots(), &root_rows) {
        info!("{}", line);
    }

    let quality_rows: Vec<(&str, &[usize])> =
        counts.iter().map(|(n, c)| (*n, c.qualities.as_slice())).collect();
    for line in format_table(encoding.qualities(), &quality_rows) {
        info!("{}", line);
    }
}

fn format_table(headers: &[&str], rows: &[(&str, &[usize])]) -> Vec<String> {
    let headers: Vec<&str> = headers.iter().copied().chain(std::iter::once("X")).collect();
    let width = rows
        .iter()
        .flat_map(|(_, counts)| counts.iter().map(|c| c.to_string().len()))
        .chain(headers.iter().map(|h| h.len()))
        .max()
        .unwrap_or(1);

    let mut lines = Vec::with_capacity(rows.len() + 1);
    let header: Vec<String> = headers.iter().map(|h| format!("{:>width$}", h, width = width)).collect();
    lines.push(format!("{:<6}{}", "", header.join(" ")));
    for (name, counts) in rows {
        let cells: Vec<String> = counts
            .iter()
            .map(|c| format!("{:>width$}", c, width = width))
            .collect();
        lines.push(format!("{:<6}{}", name, cells.join(" ")));
    }
    lines
}
