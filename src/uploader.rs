use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use blob_store::{BlobStore, BlobStoreError, PutResult};
use blobsync_utils::human_bytes;
use data_model::{BlobRecord, Hierarchy};
use futures::{StreamExt, TryStreamExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Pushes staged content to the destination account.
///
/// Only records that are downloaded but not yet uploaded are processed. The
/// destination object carries the source blob's kind, size, metadata and
/// content settings unchanged. Durability of the uploaded flags is the
/// caller's job: this component never writes the checkpoint.
pub struct Uploader {
    store: Arc<dyn BlobStore>,
    staging_root: PathBuf,
    create_containers: bool,
}

impl Uploader {
    pub fn new(store: Arc<dyn BlobStore>, staging_root: PathBuf, create_containers: bool) -> Self {
        Self {
            store,
            staging_root,
            create_containers,
        }
    }

    pub async fn run(&self, hierarchy: &mut Hierarchy) -> Result<()> {
        for (container, snapshot) in hierarchy.containers_mut() {
            let total = snapshot.len();

            for (index, record) in snapshot.values_mut().enumerate() {
                if record.is_uploaded() {
                    continue;
                }
                let Some(staged) = record.local_path().map(Path::to_path_buf) else {
                    continue;
                };
                info!(
                    container = %container,
                    blob = %record.name(),
                    kind = record.properties.kind.as_ref(),
                    size = %human_bytes(record.size()),
                    "uploading ({} / {})",
                    index + 1,
                    total
                );
                self.upload_one(container, &staged, record)
                    .await
                    .with_context(|| {
                        format!("uploading blob \"{}/{}\"", container, record.name())
                    })?;
            }
        }
        info!("upload pass complete");
        Ok(())
    }

    async fn upload_one(
        &self,
        container: &str,
        staged: &Path,
        record: &mut BlobRecord,
    ) -> Result<()> {
        match self.put_staged(container, staged, record).await {
            Ok(result) => {
                debug!(sha256 = %result.sha256_hash, "uploaded {} bytes", result.size_bytes);
            }
            Err(BlobStoreError::ContainerNotFound { .. }) if self.create_containers => {
                warn!(container = %container, "creating container with default settings");
                self.store.create_container(container).await?;
                // One retry after creation; a second failure propagates.
                self.put_staged(container, staged, record).await?;
            }
            Err(e) => return Err(e.into()),
        }
        record.mark_uploaded();
        Ok(())
    }

    async fn put_staged(
        &self,
        container: &str,
        staged: &Path,
        record: &BlobRecord,
    ) -> Result<PutResult, BlobStoreError> {
        let file = tokio::fs::File::open(staged).await?;
        let stream = ReaderStream::new(file)
            .map_err(anyhow::Error::from)
            .boxed();
        self.store
            .put(container, record.name(), stream, &record.properties)
            .await
    }
}
