use std::{env, path::{Path, PathBuf}};

use anyhow::Result;
use blob_store::BlobStoreConfig;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: BlobStoreConfig,
    pub destination: BlobStoreConfig,
    pub staging_root: PathBuf,
    #[serde(default)]
    pub create_containers: bool,
}

impl Default for Config {
    fn default() -> Self {
        let base = env::current_dir().unwrap().join("blobsync_storage");
        Config {
            source: BlobStoreConfig::new(&format!("file://{}", base.join("source").display())),
            destination: BlobStoreConfig::new(&format!(
                "file://{}",
                base.join("destination").display()
            )),
            staging_root: base.join("staging"),
            create_containers: false,
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Config> {
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = Figment::new().merge(Yaml::string(&config_str)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.staging_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("staging_root must not be empty"));
        }
        if self.source.url.is_none() {
            return Err(anyhow::anyhow!("source url must be configured"));
        }
        if self.destination.url.is_none() {
            return Err(anyhow::anyhow!("destination url must be configured"));
        }
        if self.source.url == self.destination.url {
            return Err(anyhow::anyhow!(
                "source and destination must be different accounts: {}",
                self.source.url.as_deref().unwrap_or_default()
            ));
        }
        Ok(())
    }
}
