use std::path::PathBuf;

use clap::Parser;
use log::info;

use tos_global::config::RunConfig;
use tos_global::pipeline::Pipeline;

/// Latitude-weighted global annual means of CMIP6 model output.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON run configuration; the built-in historical `tos` search when omitted
    config: Option<PathBuf>,

    /// Directory receiving one CSV per dataset
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Collection descriptor to search instead of the configured one
    #[arg(long)]
    catalog_url: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(dir) = cli.output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(url) = &cli.catalog_url {
        config = config.with_catalog_url(url);
    }

    info!("Starting global mean processing...");

    let pipeline = Pipeline::init(config)?;
    let summary = pipeline.run();

    info!("{}", summary);

    Ok(())
}
