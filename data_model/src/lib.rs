pub mod test_objects;

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::AsRefStr;

pub type ContainerName = String;
pub type BlobName = String;

/// Blob kind reported by the source account, carried to the destination
/// unchanged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, AsRefStr)]
pub enum BlobKind {
    #[default]
    Block,
    Append,
    Page,
}

/// Content headers attached to a blob. All fields are passed through to the
/// destination as-is. `content_md5` doubles as the existence signal for
/// zero-length blobs during enumeration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentSettings {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_md5: Option<String>,
}

/// Everything a listing reports about one blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobProperties {
    pub name: BlobName,
    pub size: u64,
    #[serde(default)]
    pub kind: BlobKind,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub metadata: Vec<(String, String)>,
    #[serde(default)]
    pub content_settings: ContentSettings,
}

/// A blob in the snapshot, plus its transfer status.
///
/// The status fields are monotonic: the staging path is never cleared once
/// set and the uploaded flag is never reset. All mutation goes through the
/// setters below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobRecord {
    pub properties: BlobProperties,
    local_path: Option<PathBuf>,
    uploaded: bool,
}

impl BlobRecord {
    pub fn new(properties: BlobProperties) -> Self {
        Self {
            properties,
            local_path: None,
            uploaded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn size(&self) -> u64 {
        self.properties.size
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some()
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    /// Records where the blob's content landed in the staging tree. Only
    /// called after the content stream has been fully drained.
    pub fn mark_downloaded(&mut self, path: PathBuf) {
        self.local_path = Some(path);
    }

    pub fn mark_uploaded(&mut self) {
        self.uploaded = true;
    }
}

/// Blobs of one container, keyed by blob name.
pub type ContainerSnapshot = BTreeMap<BlobName, BlobRecord>;

/// The full snapshot of containers and blobs to be copied, plus per-blob
/// transfer status.
///
/// Built once by the enumerator and never re-queried from the source
/// account; later runs operate on the checkpointed snapshot, so blobs added
/// to the source after enumeration are invisible to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hierarchy {
    containers: BTreeMap<ContainerName, ContainerSnapshot>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container entry even if no blob of it survives filtering, so
    /// empty containers still show up in summaries.
    pub fn ensure_container(&mut self, container: &str) -> &mut ContainerSnapshot {
        self.containers.entry(container.to_string()).or_default()
    }

    pub fn insert_blob(&mut self, container: &str, record: BlobRecord) {
        self.ensure_container(container)
            .insert(record.name().to_string(), record);
    }

    pub fn container(&self, container: &str) -> Option<&ContainerSnapshot> {
        self.containers.get(container)
    }

    pub fn containers(&self) -> impl Iterator<Item = (&ContainerName, &ContainerSnapshot)> {
        self.containers.iter()
    }

    pub fn containers_mut(
        &mut self,
    ) -> impl Iterator<Item = (&ContainerName, &mut ContainerSnapshot)> {
        self.containers.iter_mut()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn blob_count(&self) -> usize {
        self.containers.values().map(|c| c.len()).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.containers
            .values()
            .flat_map(|c| c.values())
            .map(|r| r.size())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn is_fully_downloaded(&self) -> bool {
        self.containers
            .values()
            .flat_map(|c| c.values())
            .all(|r| r.is_downloaded())
    }

    pub fn is_fully_uploaded(&self) -> bool {
        self.containers
            .values()
            .flat_map(|c| c.values())
            .all(|r| r.is_uploaded())
    }
}

/// Opaque capability pair for one storage account. Source and destination
/// accounts each carry their own pair.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountCredentials {
    pub account_name: String,
    pub account_key: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .finish()
    }
}
