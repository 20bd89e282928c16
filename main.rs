use clap::Parser;
use plate_blur::config::{DetectionMethod, PipelineConfig};
use plate_blur::error::Result;
use plate_blur::jobs;
use plate_blur::pipeline::Pipeline;
use plate_blur::storage::LocalDirStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Blur license plates in vehicle photos and stamp the marketplace watermark.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image files or directories to process
    #[arg(required = true, value_name = "INPUTS")]
    inputs: Vec<PathBuf>,

    /// Directory that receives the published JPEGs
    #[arg(long, default_value = "published", value_name = "DIR")]
    out_dir: PathBuf,

    /// JSON pipeline config; environment variables override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Worker threads
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Detection method: none, remote-api or local-model
    #[arg(long, value_name = "METHOD")]
    detection: Option<DetectionMethod>,

    /// Path to the plate detection ONNX model
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,
}

fn run(args: Args) -> Result<bool> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(method) = args.detection {
        config.detection_method = Some(method);
    }
    if let Some(model) = args.model {
        config.model_path = model;
    }

    let pipeline = Arc::new(Pipeline::new(config)?);
    let store = Arc::new(LocalDirStore::new(&args.out_dir)?);
    let inputs = jobs::collect_inputs(&args.inputs);
    log::info!(
        "Processing {} photos with {} workers ({} detection) into {}",
        inputs.len(),
        args.workers,
        pipeline.detection_method(),
        store.root().display()
    );

    let report = jobs::run_batch(pipeline, store, inputs, args.workers, args.workers * 4);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.failed == 0)
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            log::error!("{err}");
            eprintln!("plate-blur: {err}");
            ExitCode::FAILURE
        }
    }
}
