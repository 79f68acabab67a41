use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chordnet::dataset::data_type::DatasetType;
use chordnet::dataset::module::{ChordDataModule, DataConfig};
use chordnet::inference::run_inference;
use chordnet::model::architecture::{Architecture, Model};
use chordnet::model::checkpoint::Checkpoint;
use chordnet::postprocessing::chord_events::beat_chords_to_events;
use chordnet::preprocessing::beats::BeatFileTracker;
use chordnet::train::{Trainer, TrainerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_architecture(s: &str) -> Result<Architecture> {
    Ok(s.parse()?)
}

fn parse_dataset_type(s: &str) -> Result<DatasetType> {
    Ok(s.parse()?)
}

#[derive(Parser, Debug)]
#[command(name = "chordnet", about = "Beat-synchronous chord recognition")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepares a data directory and trains a model on it.
    Train {
        #[clap(long, default_value = "chord", value_parser = parse_architecture)]
        model: Architecture,

        #[clap(long, default_value_t = 1000)]
        epochs: usize,

        /// Dataset type; read from the directory's metadata when omitted.
        #[clap(long, value_parser = parse_dataset_type)]
        data: Option<DatasetType>,

        /// Only write the metadata, reuse already parsed records.
        #[clap(long)]
        no_fetch_data: bool,

        /// Only use records whose name contains this string.
        #[clap(long, default_value = "")]
        file_filter: String,

        /// Train on all transpositions of the training songs.
        #[clap(long)]
        augment: bool,

        #[clap(long, default_value = "data", value_parser = parse_path)]
        data_dir: PathBuf,

        #[clap(long, default_value = "checkpoints", value_parser = parse_path)]
        checkpoint_dir: PathBuf,

        #[clap(long, default_value_t = 0)]
        seed: u64,
    },

    /// Prints one `(beat_time, chord)` pair per beat of a song.
    Run {
        #[clap(value_parser = parse_path)]
        checkpoint: PathBuf,

        #[clap(value_parser = parse_path)]
        song: PathBuf,

        /// Merge consecutive beats with the same chord.
        #[clap(long)]
        events: bool,

        #[clap(long, default_value_t = 0)]
        seed: u64,
    },
}

#[allow(clippy::too_many_arguments)]
fn train(
    architecture: Architecture,
    epochs: usize,
    data: Option<DatasetType>,
    fetch_data: bool,
    file_filter: String,
    augment: bool,
    data_dir: PathBuf,
    checkpoint_dir: PathBuf,
    seed: u64,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = DataConfig {
        data_dir: data_dir.clone(),
        file_filter,
        augment,
        ..DataConfig::default()
    };

    let mut dataset = ChordDataModule::new(data, fetch_data, config)
        .with_context(|| format!("Failed to open data directory {:?}", data_dir))?;
    dataset
        .prepare_data(&BeatFileTracker::default(), &mut rng)
        .context("Failed to prepare data")?;
    dataset.setup(&mut rng).context("Failed to load data")?;

    info!(
        "Training {} on {} ({} train, {} valid, {} test songs)",
        architecture,
        dataset.dataset_type(),
        dataset.train.len(),
        dataset.val.len(),
        dataset.test.len()
    );

    let model: Model = architecture.build(*dataset.props(), &mut rng);
    let mut trainer = Trainer::new(
        model,
        dataset.dataset_type(),
        TrainerConfig {
            epochs,
            checkpoint_dir: Some(checkpoint_dir),
        },
    );

    let val = dataset.val_batches();
    trainer.fit(|rng| dataset.train_batches(rng), &val, &mut rng)?;
    trainer.test(&dataset.test_batches())?;
    Ok(())
}

fn run(checkpoint: PathBuf, song: PathBuf, events: bool, seed: u64) -> Result<()> {
    let checkpoint: Checkpoint = Checkpoint::load(&checkpoint)
        .with_context(|| format!("Failed to load checkpoint {:?}", checkpoint))?;
    let mut rng = StdRng::seed_from_u64(seed);

    let chords = run_inference(&checkpoint.model, &song, &BeatFileTracker::default(), &mut rng)
        .with_context(|| format!("Failed to recognize chords of {:?}", song))?;

    if events {
        for event in beat_chords_to_events(&chords.beat_chords, chords.duration) {
            println!(
                "{:.3}\t{:.3}\t{}",
                event.start_time_seconds, event.duration_seconds, event.chord
            );
        }
    } else {
        for (time, chord) in &chords.beat_chords {
            println!("({}, '{}')", time, chord);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    match cli_args.command {
        Command::Train {
            model,
            epochs,
            data,
            no_fetch_data,
            file_filter,
            augment,
            data_dir,
            checkpoint_dir,
            seed,
        } => train(
            model,
            epochs,
            data,
            !no_fetch_data,
            file_filter,
            augment,
            data_dir,
            checkpoint_dir,
            seed,
        ),
        Command::Run {
            checkpoint,
            song,
            events,
            seed,
        } => run(checkpoint, song, events, seed),
    }
}
