use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use burn::config::Config;
use clap::{Parser, Subcommand};

use digit_sketch::evaluate::evaluate;
use digit_sketch::mnist;
use digit_sketch::{
    Bitmap, BurnModelProvider, ModelLocator, Outcome, PipelineConfig, Session, Sketch,
};

#[derive(Parser)]
#[command(name = "digit-sketch", version, about = "Recognize hand-drawn digits")]
struct Cli {
    /// Pipeline configuration (JSON); defaults are used when omitted.
    #[arg(long, global = true, env = "DIGIT_SKETCH_CONFIG")]
    config: Option<PathBuf>,
    /// Model record path or URL.
    #[arg(
        long,
        global = true,
        env = "DIGIT_SKETCH_MODEL",
        default_value = "model/model.mpk"
    )]
    model: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the digit in an image file.
    Predict { image: PathBuf },
    /// Replay a recorded sketch and predict its digit.
    Draw {
        sketch: PathBuf,
        /// Also write the drawn canvas to this image file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Measure accuracy on the MNIST test set.
    Evaluate {
        #[arg(long, default_value = "training_data")]
        data_dir: PathBuf,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Report size, color and polarity of an image.
    Inspect { image: PathBuf },
    /// Manage pipeline configuration files.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the default configuration to a file.
    Init { path: PathBuf },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .map_err(|e| anyhow!("failed to load config {}: {e}", path.display())),
        None => Ok(PipelineConfig::new()),
    }
}

fn open_bitmap(path: &Path) -> anyhow::Result<Bitmap> {
    let image = image::open(path).with_context(|| format!("failed to load image {}", path.display()))?;
    Ok(Bitmap::from(&image))
}

fn session(model: &str, config: PipelineConfig) -> Session<BurnModelProvider> {
    let provider = BurnModelProvider::new(config.input_name.clone(), &config.cache_dir);
    Session::new(provider, ModelLocator::parse(model), config)
}

fn report(outcome: Outcome) -> ExitCode {
    println!("{outcome}");
    match outcome {
        Outcome::Digit(_) => ExitCode::SUCCESS,
        Outcome::Failed => ExitCode::FAILURE,
    }
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Predict { image } => {
            let bitmap = open_bitmap(&image)?;
            let mut session = session(&cli.model, config);
            Ok(report(session.predict_outcome(&bitmap)))
        }
        Commands::Draw { sketch, save } => {
            let json = std::fs::read_to_string(&sketch)
                .with_context(|| format!("failed to read sketch {}", sketch.display()))?;
            let pad = Sketch::from_json(&json)?.replay()?;
            let snapshot = pad.snapshot();
            if let Some(path) = save {
                snapshot
                    .as_image()
                    .save(&path)
                    .with_context(|| format!("failed to save {}", path.display()))?;
                log::info!("Canvas saved to {}", path.display());
            }
            let mut session = session(&cli.model, config);
            Ok(report(session.predict_outcome(&snapshot)))
        }
        Commands::Evaluate { data_dir, limit } => {
            let (images, labels) = mnist::load_test_set(&data_dir)?;
            let mut session = session(&cli.model, config);
            let result = evaluate(&mut session, &images, &labels, limit);
            println!("{result}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Inspect { image } => {
            let bitmap = open_bitmap(&image)?;
            println!("Size: {}x{}", bitmap.width(), bitmap.height());
            println!("Grayscale: {}", bitmap.is_grayscale());
            println!("Average pixel value: {:.2}", bitmap.mean_intensity());
            if bitmap.is_light_background() {
                println!("Image seems to be bright (likely dark on light). Needs inversion for MNIST.");
            } else {
                println!("Image seems to be dark (likely light on dark). Matches MNIST.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config {
            command: ConfigCommand::Init { path },
        } => {
            config
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
