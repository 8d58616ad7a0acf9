use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use blob_store::BlobStore;
use blobsync_utils::human_bytes;
use checkpoint_store::CheckpointStore;
use data_model::{BlobRecord, Hierarchy};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pulls blob content from the source account into the staging tree.
///
/// Records that already carry a staging path are skipped, so re-running
/// after an interruption only transfers what is still missing.
pub struct Downloader {
    store: Arc<dyn BlobStore>,
    checkpoints: Arc<CheckpointStore>,
    staging_root: PathBuf,
    shutdown: CancellationToken,
}

impl Downloader {
    pub fn new(
        store: Arc<dyn BlobStore>,
        checkpoints: Arc<CheckpointStore>,
        staging_root: PathBuf,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            checkpoints,
            staging_root,
            shutdown,
        }
    }

    /// Runs one download pass over the hierarchy.
    ///
    /// The checkpoint is written back whether the pass finishes, fails, or
    /// is cancelled; the single save call below covers every exit path, so
    /// no status mutation made before an abort is lost.
    pub async fn run(&self, hierarchy: &mut Hierarchy) -> Result<()> {
        let pass = self.download_all(hierarchy).await;
        let flush = self.checkpoints.save(hierarchy).await;
        pass?;
        flush?;
        info!("download pass complete");
        Ok(())
    }

    async fn download_all(&self, hierarchy: &mut Hierarchy) -> Result<()> {
        for (container, snapshot) in hierarchy.containers_mut() {
            let total = snapshot.len();
            let base = self.staging_root.join(container);

            for (index, record) in snapshot.values_mut().enumerate() {
                if self.shutdown.is_cancelled() {
                    return Err(anyhow!("download pass cancelled"));
                }
                if record.is_downloaded() {
                    continue;
                }
                info!(
                    container = %container,
                    blob = %record.name(),
                    size = %human_bytes(record.size()),
                    "downloading ({} / {})",
                    index + 1,
                    total
                );
                self.download_one(container, record, &base)
                    .await
                    .with_context(|| {
                        format!("downloading blob \"{}/{}\"", container, record.name())
                    })?;
            }
        }
        Ok(())
    }

    async fn download_one(
        &self,
        container: &str,
        record: &mut BlobRecord,
        base: &Path,
    ) -> Result<()> {
        let file_path = base.join(record.name());
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut stream = self.store.get(container, record.name()).await?;
        let mut file = tokio::fs::File::create(&file_path).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        // The staging path is recorded only after the stream is fully
        // drained; a half-written file is simply overwritten on retry.
        record.mark_downloaded(file_path);
        Ok(())
    }
}
