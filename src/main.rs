use std::path::PathBuf;

use ::tracing::{error, warn};
use clap::Parser;
use tokio::signal;

mod config;
mod downloader;
mod enumerator;
mod service;
mod tracing;
mod uploader;

use service::Service;
use tracing::setup_tracing;


#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => config::Config::from_path(&path).unwrap(),
        None => config::Config::default(),
    };

    setup_tracing();

    let service = match Service::new(config) {
        Ok(service) => service,
        Err(err) => {
            error!("Error creating service: {:?}", err);
            return;
        }
    };

    let shutdown = service.shutdown_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the blob in flight");
            shutdown.cancel();
        }
    });

    if let Err(err) = service.start().await {
        error!("Error running mirror pipeline: {:?}", err);
        std::process::exit(1);
    }
}
