pub mod memory;

use std::{env, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use data_model::{AccountCredentials, BlobKind, BlobProperties, ContentSettings};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use object_store::{
    azure::{AzureConfigKey, MicrosoftAzureBuilder},
    parse_url,
    path::Path,
    Attribute,
    Attributes,
    GetOptions,
    ObjectMeta,
    ObjectStore,
    ObjectStoreScheme,
    PutMultipartOpts,
    WriteMultipart,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;
use url::Url;

pub use crate::memory::MemoryStore;

/// Chunked blob content, as produced by [`BlobStore::get`] and consumed by
/// [`BlobStore::put`].
pub type BlobByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("container not found: {container}")]
    ContainerNotFound { container: String },
    #[error("blob not found: {path}")]
    BlobNotFound { path: String },
    #[error(transparent)]
    Store(#[from] object_store::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub size_bytes: u64,
    pub sha256_hash: String,
}

/// The blob-store capability the pipeline runs against: list containers,
/// list blobs with their properties, stream content out, write content with
/// properties, and create a container.
///
/// A missing container must surface as [`BlobStoreError::ContainerNotFound`]
/// so the uploader can tell it apart from other failures.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<String>, BlobStoreError>;

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobProperties>, BlobStoreError>;

    async fn get(&self, container: &str, blob: &str) -> Result<BlobByteStream, BlobStoreError>;

    async fn put(
        &self,
        container: &str,
        blob: &str,
        data: BlobByteStream,
        properties: &BlobProperties,
    ) -> Result<PutResult, BlobStoreError>;

    async fn create_container(&self, container: &str) -> Result<(), BlobStoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    pub url: Option<String>,
    pub credentials: Option<AccountCredentials>,
}

impl BlobStoreConfig {
    pub fn new(url: &str) -> Self {
        BlobStoreConfig {
            url: Some(url.to_string()),
            credentials: None,
        }
    }
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        let url = format!(
            "file://{}",
            env::current_dir()
                .unwrap()
                .join("blobsync_storage/blobs")
                .to_str()
                .unwrap()
        );
        info!("using blob store url: {}", url);
        BlobStoreConfig {
            url: Some(url),
            credentials: None,
        }
    }
}

pub fn blob_store_from_config(config: &BlobStoreConfig) -> Result<Arc<dyn BlobStore>> {
    let url = match &config.url {
        Some(url) => url.clone(),
        None => BlobStoreConfig::default().url.unwrap(),
    };
    let backend = ObjectStoreBackend::new(&url, config.credentials.as_ref())?;
    Ok(Arc::new(backend))
}

/// Account-level store on top of an [`ObjectStore`] root: containers are the
/// first path segment under the root, blobs live below them.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    root: Path,
    // LocalFileSystem rejects put attributes, so they are only attached on
    // backends that accept them.
    supports_attributes: bool,
}

impl ObjectStoreBackend {
    pub fn new(url_str: &str, credentials: Option<&AccountCredentials>) -> Result<Self> {
        let url = url_str.parse::<Url>()?;
        let (scheme, _) = ObjectStoreScheme::parse(&url)?;
        let (store, root) = Self::build_object_store(url_str, credentials)?;
        let supports_attributes = matches!(
            scheme,
            ObjectStoreScheme::Memory | ObjectStoreScheme::MicrosoftAzure
        );
        Ok(Self {
            store: Arc::from(store),
            root,
            supports_attributes,
        })
    }

    pub fn build_object_store(
        url_str: &str,
        credentials: Option<&AccountCredentials>,
    ) -> Result<(Box<dyn ObjectStore>, Path)> {
        let url = url_str.parse::<Url>()?;
        let (scheme, path) = ObjectStoreScheme::parse(&url)?;
        match scheme {
            ObjectStoreScheme::MicrosoftAzure => {
                let creds = credentials
                    .ok_or_else(|| anyhow!("account credentials are required for azure urls"))?;
                let azure = MicrosoftAzureBuilder::new()
                    .with_url(url_str)
                    .with_config(AzureConfigKey::AccountName, &creds.account_name)
                    .with_config(AzureConfigKey::AccessKey, &creds.account_key)
                    .build()?;
                Ok((Box::new(azure), path))
            }
            _ => Ok(parse_url(&url)?),
        }
    }

    fn blob_path(&self, container: &str, blob: &str) -> Path {
        // Blob names may contain '/'; Path::child would escape it, so each
        // segment is appended separately.
        let mut path = self.root.child(container);
        for part in blob.split('/').filter(|s| !s.is_empty()) {
            path = path.child(part);
        }
        path
    }

    async fn properties_for(
        &self,
        container: &str,
        meta: &ObjectMeta,
    ) -> Result<BlobProperties, BlobStoreError> {
        let prefix = format!("{}/", self.root.child(container));
        let name = meta
            .location
            .as_ref()
            .strip_prefix(&prefix)
            .unwrap_or(meta.location.as_ref())
            .to_string();

        let result = self
            .store
            .get_opts(
                &meta.location,
                GetOptions {
                    head: true,
                    ..Default::default()
                },
            )
            .await?;
        let (metadata, mut content_settings) = split_attributes(&result.attributes);
        content_settings.content_md5 = meta
            .e_tag
            .clone()
            .map(|etag| etag.trim_matches('"').to_string());

        Ok(BlobProperties {
            name,
            size: meta.size,
            kind: BlobKind::default(),
            deleted: false,
            metadata,
            content_settings,
        })
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn list_containers(&self) -> Result<Vec<String>, BlobStoreError> {
        let listing = match self.store.list_with_delimiter(Some(&self.root)).await {
            Ok(listing) => listing,
            // A root that was never written to is an empty account.
            Err(object_store::Error::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(listing
            .common_prefixes
            .iter()
            .filter_map(|prefix| prefix.filename().map(str::to_string))
            .collect())
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobProperties>, BlobStoreError> {
        let prefix = self.root.child(container);
        let metas: Vec<ObjectMeta> = match self.store.list(Some(&prefix)).try_collect().await {
            Ok(metas) => metas,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(BlobStoreError::ContainerNotFound {
                    container: container.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let mut blobs = Vec::with_capacity(metas.len());
        for meta in &metas {
            blobs.push(self.properties_for(container, meta).await?);
        }
        Ok(blobs)
    }

    async fn get(&self, container: &str, blob: &str) -> Result<BlobByteStream, BlobStoreError> {
        let location = self.blob_path(container, blob);
        let get_result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(BlobStoreError::BlobNotFound {
                    path: location.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let location = location.to_string();
        tokio::spawn(async move {
            let mut stream = get_result.into_stream();
            while let Some(chunk) = stream.next().await {
                let _ = tx.send(
                    chunk.map_err(|e| anyhow!("error reading object {:?}: {:?}", location, e)),
                );
            }
        });
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn put(
        &self,
        container: &str,
        blob: &str,
        mut data: BlobByteStream,
        properties: &BlobProperties,
    ) -> Result<PutResult, BlobStoreError> {
        let location = self.blob_path(container, blob);
        let mut opts = PutMultipartOpts::default();
        if self.supports_attributes {
            opts.attributes = attributes_from_properties(properties);
        }
        let upload = match self.store.put_multipart_opts(&location, opts).await {
            Ok(upload) => upload,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(BlobStoreError::ContainerNotFound {
                    container: container.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut writer = WriteMultipart::new(upload);
        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;
        while let Some(chunk) = data.next().await {
            writer.wait_for_capacity(1).await?;
            let chunk = chunk?;
            hasher.update(&chunk);
            size_bytes += chunk.len() as u64;
            writer.write(&chunk);
        }
        writer.finish().await?;

        Ok(PutResult {
            size_bytes,
            sha256_hash: format!("{:x}", hasher.finalize()),
        })
    }

    async fn create_container(&self, container: &str) -> Result<(), BlobStoreError> {
        // Object-store namespaces have no explicit create call; the prefix
        // appears with the first written blob.
        info!(container = %container, "container namespace appears on first write");
        Ok(())
    }
}

fn attributes_from_properties(properties: &BlobProperties) -> Attributes {
    let mut attributes = Attributes::new();
    let settings = &properties.content_settings;
    if let Some(v) = &settings.content_type {
        attributes.insert(Attribute::ContentType, v.clone().into());
    }
    if let Some(v) = &settings.content_encoding {
        attributes.insert(Attribute::ContentEncoding, v.clone().into());
    }
    if let Some(v) = &settings.content_language {
        attributes.insert(Attribute::ContentLanguage, v.clone().into());
    }
    if let Some(v) = &settings.cache_control {
        attributes.insert(Attribute::CacheControl, v.clone().into());
    }
    if let Some(v) = &settings.content_disposition {
        attributes.insert(Attribute::ContentDisposition, v.clone().into());
    }
    for (key, value) in &properties.metadata {
        attributes.insert(Attribute::Metadata(key.clone().into()), value.clone().into());
    }
    attributes
}

fn split_attributes(attributes: &Attributes) -> (Vec<(String, String)>, ContentSettings) {
    let mut metadata = Vec::new();
    let mut settings = ContentSettings::default();
    for (attribute, value) in attributes.iter() {
        let value = value.as_ref().to_string();
        match attribute {
            Attribute::ContentType => settings.content_type = Some(value),
            Attribute::ContentEncoding => settings.content_encoding = Some(value),
            Attribute::ContentLanguage => settings.content_language = Some(value),
            Attribute::CacheControl => settings.cache_control = Some(value),
            Attribute::ContentDisposition => settings.content_disposition = Some(value),
            Attribute::Metadata(key) => metadata.push((key.to_string(), value)),
            _ => {}
        }
    }
    (metadata, settings)
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn chunk_stream(chunks: Vec<&'static [u8]>) -> BlobByteStream {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c)))).boxed()
    }

    async fn collect(mut stream: BlobByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    fn disk_backend(dir: &std::path::Path) -> ObjectStoreBackend {
        let url = format!("file://{}", dir.to_str().unwrap());
        ObjectStoreBackend::new(&url, None).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = disk_backend(temp_dir.path());

        let properties = data_model::test_objects::tests::mock_properties("a.txt", 10);
        backend
            .put("c1", "a.txt", chunk_stream(vec![b"hello ", b"world"]), &properties)
            .await
            .unwrap();

        let body = collect(backend.get("c1", "a.txt").await.unwrap()).await;
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn put_reports_size_and_hash() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = disk_backend(temp_dir.path());

        let properties = data_model::test_objects::tests::mock_properties("a.txt", 4);
        let result = backend
            .put("c1", "a.txt", chunk_stream(vec![b"aaaa"]), &properties)
            .await
            .unwrap();
        assert_eq!(result.size_bytes, 4);
        assert_eq!(
            result.sha256_hash,
            "61be55a8e2f6b4e172338bddf184d6dbee29c98853e0a0485ecee7f27b9af0b4"
        );
    }

    #[tokio::test]
    async fn nested_blob_names_form_nested_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = disk_backend(temp_dir.path());

        let properties = data_model::test_objects::tests::mock_properties("nested/deep/b.bin", 3);
        backend
            .put("c1", "nested/deep/b.bin", chunk_stream(vec![b"xyz"]), &properties)
            .await
            .unwrap();

        assert!(temp_dir.path().join("c1/nested/deep/b.bin").is_file());
        let listed = backend.list_blobs("c1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "nested/deep/b.bin");
        assert_eq!(listed[0].size, 3);
    }

    #[tokio::test]
    async fn containers_are_top_level_prefixes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = disk_backend(temp_dir.path());

        let properties = data_model::test_objects::tests::mock_properties("a.txt", 1);
        backend
            .put("c1", "a.txt", chunk_stream(vec![b"x"]), &properties)
            .await
            .unwrap();
        backend
            .put("c2", "b.txt", chunk_stream(vec![b"y"]), &properties)
            .await
            .unwrap();

        let containers = backend.list_containers().await.unwrap();
        assert_eq!(containers, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[tokio::test]
    async fn missing_root_is_an_empty_account() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = disk_backend(&temp_dir.path().join("never_written"));
        assert!(backend.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_of_absent_blob_is_blob_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = disk_backend(temp_dir.path());
        let err = backend.get("c1", "absent.txt").await.err().unwrap();
        assert!(matches!(err, BlobStoreError::BlobNotFound { .. }));
    }

    #[test]
    fn azure_urls_require_credentials() {
        let err = ObjectStoreBackend::new("az://backups", None).err().unwrap();
        assert!(err.to_string().contains("credentials"));
    }
}
