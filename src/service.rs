use std::sync::Arc;

use anyhow::{Context, Result};
use blob_store::{blob_store_from_config, BlobStore};
use blobsync_utils::human_bytes;
use checkpoint_store::CheckpointStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    config::Config,
    downloader::Downloader,
    enumerator::Enumerator,
    uploader::Uploader,
};

pub struct Service {
    config: Config,
    source: Arc<dyn BlobStore>,
    destination: Arc<dyn BlobStore>,
    checkpoints: Arc<CheckpointStore>,
    shutdown: CancellationToken,
}

impl Service {
    pub fn new(config: Config) -> Result<Self> {
        let source = blob_store_from_config(&config.source)
            .context("error initializing source blob store")?;
        let destination = blob_store_from_config(&config.destination)
            .context("error initializing destination blob store")?;
        let checkpoints = Arc::new(CheckpointStore::new(&config.staging_root));
        Ok(Self {
            config,
            source,
            destination,
            checkpoints,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs one full mirror pass: snapshot (or resume), download, upload.
    pub async fn start(&self) -> Result<()> {
        let mut hierarchy = if self.checkpoints.exists() {
            self.checkpoints.load().await?
        } else {
            Enumerator::new(self.source.clone()).build().await?
        };

        let downloader = Downloader::new(
            self.source.clone(),
            self.checkpoints.clone(),
            self.config.staging_root.clone(),
            self.shutdown.clone(),
        );
        downloader.run(&mut hierarchy).await?;

        let uploader = Uploader::new(
            self.destination.clone(),
            self.config.staging_root.clone(),
            self.config.create_containers,
        );
        let upload = uploader.run(&mut hierarchy).await;
        // The uploader never persists its own flag mutations; they only
        // become durable here.
        let flush = self.checkpoints.save(&hierarchy).await;
        upload?;
        flush?;

        info!(
            containers = hierarchy.container_count(),
            blobs = hierarchy.blob_count(),
            total_size = %human_bytes(hierarchy.total_size()),
            "mirror complete"
        );
        Ok(())
    }
}
