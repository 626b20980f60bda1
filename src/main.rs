//! Command line entry point: serve the inference API or train a model.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dermalens::backend::{default_device, InferenceBackend, TrainingBackend};
use dermalens::config::AppConfig;
use dermalens::dataset::{
    build_splits, discover_images, eval_dataloader, label_images, load_metadata, train_dataloader,
    EvalTransform, LesionDataset, TrainTransform,
};
use dermalens::error::{Error, Result};
use dermalens::model::build_model;
use dermalens::server;
use dermalens::taxonomy::ClassTaxonomy;
use dermalens::training::Trainer;

#[derive(Parser, Debug)]
#[command(name = "dermalens")]
#[command(version)]
#[command(about = "Skin lesion classification: training and inference API")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "DERMALENS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP inference server
    Serve {
        /// Host to bind to
        #[arg(long, env = "DERMALENS_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, env = "DERMALENS_PORT")]
        port: Option<u16>,

        /// Checkpoint to load at startup
        #[arg(long, env = "DERMALENS_CHECKPOINT")]
        checkpoint: Option<PathBuf>,
    },
    /// Train a classifier on a labeled image directory
    Train {
        /// Directory containing lesion images
        #[arg(long)]
        image_dir: Option<PathBuf>,

        /// Path to the metadata CSV
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Number of epochs to train
        #[arg(long)]
        epochs: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Serve {
            host,
            port,
            checkpoint,
        } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            if let Some(checkpoint) = checkpoint {
                config.model.checkpoint_path = checkpoint;
            }
            config.validate()?;

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(config))?;
        }
        Command::Train {
            image_dir,
            metadata,
            epochs,
        } => {
            if let Some(image_dir) = image_dir {
                config.data.image_dir = image_dir;
            }
            if let Some(metadata) = metadata {
                config.data.metadata_path = metadata;
            }
            if let Some(epochs) = epochs {
                config.training.num_epochs = epochs;
            }
            config.validate()?;

            run_training(&config)?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

fn run_training(config: &AppConfig) -> Result<()> {
    let taxonomy = ClassTaxonomy::ham10000();

    let images = discover_images(&config.data.image_dir);
    let records = load_metadata(&config.data.metadata_path)?.ok_or_else(|| {
        Error::Dataset(format!(
            "metadata file required for training, not found at {}",
            config.data.metadata_path.display()
        ))
    })?;
    let labeled = label_images(&images, &records, &taxonomy);
    if labeled.is_empty() {
        return Err(Error::Dataset("no labeled images to train on".into()));
    }

    let splits = build_splits(
        labeled,
        config.data.validation_fraction,
        config.data.test_fraction,
        config.data.seed,
    )?;

    let device = default_device();
    let image_size = config.data.image_size;
    let batch_size = config.training.batch_size;
    let num_workers = config.training.num_workers;

    let train_set = LesionDataset::for_training(
        splits.train,
        TrainTransform::from_settings(&config.data),
        config.data.seed,
    );
    let val_set =
        LesionDataset::for_evaluation(splits.val, EvalTransform::from_settings(&config.data));

    let train_loader = train_dataloader::<TrainingBackend>(
        train_set,
        device.clone(),
        image_size as usize,
        batch_size,
        num_workers,
        config.data.seed,
    );
    let val_loader = eval_dataloader::<InferenceBackend>(
        val_set,
        device.clone(),
        image_size as usize,
        batch_size,
        num_workers,
    );

    let model = build_model::<TrainingBackend>(&config.model, &device)?;
    let mut trainer = Trainer::new(model, config.training.clone());

    for epoch in 0..trainer.num_epochs() {
        info!("Epoch {}/{}", epoch + 1, trainer.num_epochs());

        let train_batches: Vec<_> = train_loader.iter().collect();
        trainer.train_epoch(&train_batches);
        drop(train_batches);

        let val_batches: Vec<_> = val_loader.iter().collect();
        let val = trainer.validate(&val_batches);
        info!(
            "Epoch {} validation: loss = {:.4}, accuracy = {:.2}%",
            epoch + 1,
            val.loss,
            val.accuracy * 100.0
        );
        trainer.end_epoch(val)?;
    }

    info!(
        "Training complete, best validation loss: {:?}",
        trainer.state.best_val_loss
    );
    Ok(())
}
