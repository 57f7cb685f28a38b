//! Offline evaluation of a trained model against a labelled test directory.
//!
//! Expects `<data-dir>/<label>/<image>`, where every `<label>` is a name from
//! the label file.

use std::path::PathBuf;

use clap::Parser;
use pawscan_api::config::{InferenceConfig, ServiceConfig};
use pawscan_api::evaluation::evaluate_dir;
use pawscan_api::startup::{StartupError, load_predictor};

#[derive(Parser)]
#[command(name = "pawscan-evaluate")]
#[command(about = "Evaluate the skin disease classifier on a labelled test set")]
struct Args {
    /// Test set root, one sub-directory per label
    #[arg(long, default_value = "data/dataset/test")]
    data_dir: PathBuf,

    /// Model file (defaults to MODEL_PATH or the models directory)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label file (defaults to LABELS_PATH or the models directory)
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Inference YAML config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the report as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Args::parse();

    let service_config = ServiceConfig::from_env().map_err(StartupError::from)?;
    let config_path = args
        .config
        .unwrap_or(service_config.inference_config_path.clone());
    let inference_config = InferenceConfig::load(&config_path).map_err(StartupError::from)?;
    let model_path = args.model.unwrap_or(service_config.model_path);
    let labels_path = args.labels.unwrap_or(service_config.labels_path);

    let predictor = load_predictor(&model_path, &labels_path, &inference_config)?;
    let report = evaluate_dir(&predictor, &args.data_dir)?;
    println!("{}", report);

    if let Some(json_path) = args.json {
        report.write_json(&json_path)?;
        log::info!("Wrote JSON report to {}", json_path.display());
    }

    Ok(())
}
