use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cxr_vision::logging::{init_file_logging, DEFAULT_LOG_FILE};
use cxr_vision::parallel_pipeline::ParallelExporter;
use cxr_vision::pipeline::{self, LoaderConfig, DEFAULT_IMAGE_DIR, DEFAULT_SAVE_DIR, DEFAULT_XML_DIR};

/// Load samples from the OpenI chest X-ray collection and write them to disk.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory path where XML report files are stored.
    #[arg(long, env = "CXR_XML_DIR", default_value = DEFAULT_XML_DIR)]
    xml_dir: PathBuf,

    /// Directory path where image files are stored.
    #[arg(long, env = "CXR_IMAGE_DIR", default_value = DEFAULT_IMAGE_DIR)]
    image_dir: PathBuf,

    /// Directory the exported samples are written to.
    #[arg(long, env = "CXR_SAVE_DIR", default_value = DEFAULT_SAVE_DIR)]
    save_dir: PathBuf,

    /// Use the data augmentation transforms.
    #[arg(long)]
    augment: bool,

    /// Index of the first sample to export.
    #[arg(long, default_value_t = 0)]
    index: usize,

    /// Number of samples to export. More than one writes a sub-directory per report.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    count: u64,

    /// Seed for reproducible augmentation.
    #[arg(long, env = "CXR_SEED")]
    seed: Option<u64>,

    /// Export workers for batch runs (0 = one per CPU).
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Log file.
    #[arg(long, env = "CXR_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
}

impl Args {
    fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            xml_dir: self.xml_dir.clone(),
            image_dir: self.image_dir.clone(),
            save_dir: self.save_dir.clone(),
            augment: self.augment,
            index: self.index,
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_file_logging(&args.log_file)
        .with_context(|| format!("setting up logging to {}", args.log_file.display()))?;

    let config = args.loader_config();

    if args.count == 1 {
        let summary = pipeline::run(&config).context("exporting sample")?;
        println!(
            "Exported {} image(s) from {} to {}",
            summary.image_files.len(),
            summary.source.display(),
            config.save_dir.display()
        );
        return Ok(());
    }

    pipeline::check_create_paths(&config)?;
    let dataset = Arc::new(config.open_dataset()?);
    let end = args.index.saturating_add(args.count as usize).min(dataset.len());

    let exporter = ParallelExporter::new(dataset, args.workers);
    let summaries = exporter
        .export_range(args.index..end, &config.save_dir)
        .await
        .context("exporting sample batch")?;
    exporter.shutdown().await;

    tracing::info!(samples = summaries.len(), "batch complete");
    println!(
        "Exported {} sample(s) to {}",
        summaries.len(),
        config.save_dir.display()
    );
    Ok(())
}
