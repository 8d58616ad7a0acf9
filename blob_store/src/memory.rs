use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use data_model::BlobProperties;
use futures::{stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::info;

use crate::{BlobByteStream, BlobStore, BlobStoreError, PutResult};

/// A blob held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Bytes,
    pub properties: BlobProperties,
}

#[derive(Debug, Default)]
struct Inner {
    containers: BTreeMap<String, BTreeMap<String, StoredBlob>>,
    get_calls: usize,
    create_calls: usize,
}

/// In-memory store with real container semantics: writing into a container
/// that was never created fails with `ContainerNotFound`. Listings can be
/// seeded with deleted or zero-length entries, which the object-store
/// backends never report on their own.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_container(&self, container: &str) {
        self.inner
            .lock()
            .await
            .containers
            .entry(container.to_string())
            .or_default();
    }

    pub async fn seed_blob(
        &self,
        container: &str,
        properties: BlobProperties,
        data: impl Into<Bytes>,
    ) {
        let mut inner = self.inner.lock().await;
        inner
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                properties.name.clone(),
                StoredBlob {
                    data: data.into(),
                    properties,
                },
            );
    }

    pub async fn blob(&self, container: &str, name: &str) -> Option<StoredBlob> {
        self.inner
            .lock()
            .await
            .containers
            .get(container)
            .and_then(|blobs| blobs.get(name))
            .cloned()
    }

    pub async fn container_exists(&self, container: &str) -> bool {
        self.inner.lock().await.containers.contains_key(container)
    }

    pub async fn get_calls(&self) -> usize {
        self.inner.lock().await.get_calls
    }

    pub async fn create_calls(&self) -> usize {
        self.inner.lock().await.create_calls
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn list_containers(&self) -> Result<Vec<String>, BlobStoreError> {
        Ok(self.inner.lock().await.containers.keys().cloned().collect())
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobProperties>, BlobStoreError> {
        let inner = self.inner.lock().await;
        let blobs = inner.containers.get(container).ok_or_else(|| {
            BlobStoreError::ContainerNotFound {
                container: container.to_string(),
            }
        })?;
        Ok(blobs.values().map(|b| b.properties.clone()).collect())
    }

    async fn get(&self, container: &str, blob: &str) -> Result<BlobByteStream, BlobStoreError> {
        let mut inner = self.inner.lock().await;
        inner.get_calls += 1;
        let stored = inner
            .containers
            .get(container)
            .ok_or_else(|| BlobStoreError::ContainerNotFound {
                container: container.to_string(),
            })?
            .get(blob)
            .ok_or_else(|| BlobStoreError::BlobNotFound {
                path: format!("{}/{}", container, blob),
            })?;
        let data = stored.data.clone();
        Ok(stream::once(async move { Ok(data) }).boxed())
    }

    async fn put(
        &self,
        container: &str,
        blob: &str,
        mut data: BlobByteStream,
        properties: &BlobProperties,
    ) -> Result<PutResult, BlobStoreError> {
        if !self.container_exists(container).await {
            return Err(BlobStoreError::ContainerNotFound {
                container: container.to_string(),
            });
        }

        let mut hasher = Sha256::new();
        let mut buf = BytesMut::new();
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            buf.extend_from_slice(&chunk);
        }

        let mut inner = self.inner.lock().await;
        let blobs = inner.containers.get_mut(container).ok_or_else(|| {
            BlobStoreError::ContainerNotFound {
                container: container.to_string(),
            }
        })?;
        let size_bytes = buf.len() as u64;
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                data: buf.freeze(),
                properties: properties.clone(),
            },
        );
        Ok(PutResult {
            size_bytes,
            sha256_hash: format!("{:x}", hasher.finalize()),
        })
    }

    async fn create_container(&self, container: &str) -> Result<(), BlobStoreError> {
        let mut inner = self.inner.lock().await;
        inner.create_calls += 1;
        inner.containers.entry(container.to_string()).or_default();
        info!(container = %container, "created container");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use data_model::test_objects::tests::mock_properties;

    use super::*;

    fn body(data: &'static [u8]) -> BlobByteStream {
        stream::once(async move { Ok(Bytes::from_static(data)) }).boxed()
    }

    #[tokio::test]
    async fn put_into_missing_container_is_container_not_found() {
        let store = MemoryStore::new();
        let err = store
            .put("absent", "a.txt", body(b"x"), &mock_properties("a.txt", 1))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BlobStoreError::ContainerNotFound { ref container } if container == "absent"
        ));
    }

    #[tokio::test]
    async fn create_container_then_put() {
        let store = MemoryStore::new();
        store.create_container("c1").await.unwrap();
        let result = store
            .put("c1", "a.txt", body(b"abc"), &mock_properties("a.txt", 3))
            .await
            .unwrap();
        assert_eq!(result.size_bytes, 3);
        assert!(store.container_exists("c1").await);
        assert_eq!(store.blob("c1", "a.txt").await.unwrap().data, "abc");
    }

    #[tokio::test]
    async fn get_of_absent_blob_is_blob_not_found() {
        let store = MemoryStore::new();
        store.seed_container("c1").await;
        let err = store.get("c1", "ghost.txt").await.err().unwrap();
        assert!(matches!(err, BlobStoreError::BlobNotFound { .. }));
    }

    #[tokio::test]
    async fn list_blobs_of_missing_container_fails() {
        let store = MemoryStore::new();
        let err = store.list_blobs("absent").await.err().unwrap();
        assert!(matches!(err, BlobStoreError::ContainerNotFound { .. }));
    }

    #[tokio::test]
    async fn properties_are_stored_verbatim() {
        let store = MemoryStore::new();
        store.seed_container("c1").await;
        let properties = mock_properties("a.txt", 3);
        store
            .put("c1", "a.txt", body(b"abc"), &properties)
            .await
            .unwrap();
        let stored = store.blob("c1", "a.txt").await.unwrap();
        assert_eq!(stored.properties, properties);
    }
}
