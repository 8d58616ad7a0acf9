pub mod serializer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use data_model::Hierarchy;
use tracing::info;

use crate::serializer::JsonEncoder;

pub const CHECKPOINT_FILE_NAME: &str = "hierarchy.json";

/// Durable home of the [`Hierarchy`]: one file at a well-known name inside
/// the staging root, overwritten on every save.
///
/// `save` is called after every transfer pass, completed or aborted, so the
/// file always reflects the status mutations made before the abort. A loaded
/// hierarchy is indistinguishable from the in-memory one at save time.
pub struct CheckpointStore {
    staging_root: PathBuf,
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        let staging_root = staging_root.into();
        let path = staging_root.join(CHECKPOINT_FILE_NAME);
        Self { staging_root, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub async fn save(&self, hierarchy: &Hierarchy) -> Result<()> {
        info!(path = %self.path.display(), "saving hierarchy checkpoint");
        tokio::fs::create_dir_all(&self.staging_root)
            .await
            .with_context(|| {
                format!("creating staging root {}", self.staging_root.display())
            })?;
        let bytes = JsonEncoder::encode(hierarchy)?;
        // An interrupted save must not leave a torn checkpoint behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("writing checkpoint {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming checkpoint into {}", self.path.display()))?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Hierarchy> {
        info!(path = %self.path.display(), "loading hierarchy checkpoint");
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading checkpoint {}", self.path.display()))?;
        JsonEncoder::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use data_model::test_objects::tests::{mock_hierarchy, TEST_CONTAINER};

    use super::*;

    #[tokio::test]
    async fn load_returns_exactly_what_was_saved() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(temp_dir.path());

        let mut hierarchy = mock_hierarchy();
        // Partially transferred state must survive the round trip too.
        let record = hierarchy
            .containers_mut()
            .find(|(name, _)| name.as_str() == TEST_CONTAINER)
            .and_then(|(_, snapshot)| snapshot.get_mut("a.txt"))
            .unwrap();
        record.mark_downloaded(PathBuf::from("/staging/assets/a.txt"));
        record.mark_uploaded();

        store.save(&hierarchy).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, hierarchy);
    }

    #[tokio::test]
    async fn save_overwrites_the_previous_checkpoint() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(temp_dir.path());

        let mut hierarchy = mock_hierarchy();
        store.save(&hierarchy).await.unwrap();

        hierarchy
            .containers_mut()
            .flat_map(|(_, snapshot)| snapshot.values_mut())
            .for_each(|record| record.mark_downloaded(PathBuf::from("/staging/x")));
        store.save(&hierarchy).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_fully_downloaded());
    }

    #[tokio::test]
    async fn exists_only_after_first_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(temp_dir.path().join("staging"));
        assert!(!store.exists());

        store.save(&mock_hierarchy()).await.unwrap();
        assert!(store.exists());
        assert!(store.path().ends_with(CHECKPOINT_FILE_NAME));
    }

    #[tokio::test]
    async fn save_creates_a_missing_staging_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let staging = temp_dir.path().join("deep/staging");
        let store = CheckpointStore::new(&staging);
        store.save(&mock_hierarchy()).await.unwrap();
        assert!(staging.join(CHECKPOINT_FILE_NAME).is_file());
    }
}
