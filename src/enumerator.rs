use std::sync::Arc;

use anyhow::Result;
use blob_store::BlobStore;
use blobsync_utils::human_bytes;
use data_model::{BlobRecord, Hierarchy};
use tracing::info;

/// Builds the [`Hierarchy`] by querying the source account once.
pub struct Enumerator {
    store: Arc<dyn BlobStore>,
}

impl Enumerator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Snapshots every container of the source account in a single pass.
    ///
    /// A listed blob makes it into the snapshot iff it is not deleted and
    /// either has content or carries a content hash. That drops soft-deleted
    /// entries and zero-length placeholders (directory markers) while
    /// keeping legitimate empty blobs, which record a hash.
    pub async fn build(&self) -> Result<Hierarchy> {
        let mut hierarchy = Hierarchy::new();
        let mut total_size: u64 = 0;

        for container in self.store.list_containers().await? {
            let mut container_size: u64 = 0;
            hierarchy.ensure_container(&container);

            for properties in self.store.list_blobs(&container).await? {
                if properties.deleted {
                    continue;
                }
                if properties.size == 0 && properties.content_settings.content_md5.is_none() {
                    continue;
                }
                container_size += properties.size;
                hierarchy.insert_blob(&container, BlobRecord::new(properties));
            }

            total_size += container_size;
            let count = hierarchy.container(&container).map(|c| c.len()).unwrap_or(0);
            info!(
                container = %container,
                blobs = count,
                size = %human_bytes(container_size),
                "enumerated container"
            );
        }

        info!(
            containers = hierarchy.container_count(),
            total_size = %human_bytes(total_size),
            "enumeration complete"
        );
        Ok(hierarchy)
    }
}

#[cfg(test)]
mod tests {
    use blob_store::MemoryStore;
    use data_model::{BlobProperties, ContentSettings};

    use super::*;

    fn zero_size_no_hash(name: &str) -> BlobProperties {
        BlobProperties {
            name: name.to_string(),
            size: 0,
            ..Default::default()
        }
    }

    fn zero_size_with_hash(name: &str) -> BlobProperties {
        BlobProperties {
            name: name.to_string(),
            size: 0,
            content_settings: ContentSettings {
                content_md5: Some("deadbeef".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn sized(name: &str, size: u64) -> BlobProperties {
        BlobProperties {
            name: name.to_string(),
            size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn directory_markers_are_filtered_out() {
        let store = MemoryStore::new();
        store.seed_blob("c1", sized("a.txt", 10), "aaaaaaaaaa").await;
        store
            .seed_blob("c1", zero_size_with_hash("b.txt"), "")
            .await;
        store.seed_blob("c1", zero_size_no_hash("dir_marker"), "").await;

        let hierarchy = Enumerator::new(Arc::new(store)).build().await.unwrap();

        let snapshot = hierarchy.container("c1").unwrap();
        assert_eq!(
            snapshot.keys().collect::<Vec<_>>(),
            vec!["a.txt", "b.txt"]
        );
    }

    #[tokio::test]
    async fn soft_deleted_blobs_are_excluded() {
        let store = MemoryStore::new();
        let mut deleted = sized("gone.txt", 25);
        deleted.deleted = true;
        store.seed_blob("c1", deleted, "x").await;
        store.seed_blob("c1", sized("kept.txt", 5), "hello").await;

        let hierarchy = Enumerator::new(Arc::new(store)).build().await.unwrap();

        let snapshot = hierarchy.container("c1").unwrap();
        assert!(snapshot.contains_key("kept.txt"));
        assert!(!snapshot.contains_key("gone.txt"));
    }

    #[tokio::test]
    async fn empty_account_yields_empty_hierarchy() {
        let store = MemoryStore::new();
        let hierarchy = Enumerator::new(Arc::new(store)).build().await.unwrap();
        assert!(hierarchy.is_empty());
    }

    #[tokio::test]
    async fn containers_with_only_markers_stay_listed_but_empty() {
        let store = MemoryStore::new();
        store.seed_blob("c1", zero_size_no_hash("marker"), "").await;

        let hierarchy = Enumerator::new(Arc::new(store)).build().await.unwrap();

        assert_eq!(hierarchy.container_count(), 1);
        assert_eq!(hierarchy.blob_count(), 0);
    }
}
