use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use tokio::fs::{self, File};
use tracing::{debug, info};

use crate::error::ConfigError;

use super::BlockConfig;

/// File backed storage of [BlockConfig].
///
/// Every read-modify-write holds an exclusive advisory lock on a sibling `.lock` file, so a cli
/// invocation and a running daemon never interleave their writes.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the configuration. A missing file is an empty configuration.
    pub async fn load(&self) -> Result<BlockConfig, ConfigError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {:?}, using empty configuration", self.path);
                return Ok(BlockConfig::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes into a temporary file first and renames it over the target, so a crash never
    /// leaves a truncated configuration behind.
    pub async fn save(&self, config: &BlockConfig) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let mut buffer = serde_json::to_vec_pretty(config).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;
        buffer.push(b'\n');

        let temporary = self.sibling("tmp");
        fs::write(&temporary, &buffer).await.map_err(write_error)?;
        fs::rename(&temporary, &self.path).await.map_err(write_error)?;
        debug!("Saved config to {:?}", self.path);
        Ok(())
    }

    /// Runs `change` against the current configuration under the store lock and persists the
    /// result when it differs from what was loaded.
    pub async fn update<T>(
        &self,
        change: impl FnOnce(&mut BlockConfig) -> Result<T, ConfigError>,
    ) -> Result<(BlockConfig, T), ConfigError> {
        let lock = self.lock().await?;
        let result = self.update_locked(change).await;
        lock.unlock_async().await.map_err(|source| ConfigError::Write {
            path: self.sibling("lock"),
            source,
        })?;
        result
    }

    async fn update_locked<T>(
        &self,
        change: impl FnOnce(&mut BlockConfig) -> Result<T, ConfigError>,
    ) -> Result<(BlockConfig, T), ConfigError> {
        let original = self.load().await?;
        let mut config = original.clone();
        let outcome = change(&mut config)?;
        if config != original {
            self.save(&config).await?;
            info!("Configuration at {:?} updated", self.path);
        }
        Ok((config, outcome))
    }

    async fn lock(&self) -> Result<File, ConfigError> {
        let path = self.sibling("lock");
        let lock_error = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(lock_error)?;
        }
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(lock_error)?;
        file.lock_exclusive().map_err(lock_error)?;
        Ok(file)
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(extension);
        self.path.with_file_name(name)
    }

    pub async fn add_site(&self, domain: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.update(|config| config.add_site(domain)).await?.1)
    }

    pub async fn remove_site(&self, domain: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.update(|config| config.remove_site(domain)).await?.1)
    }

    pub async fn add_url(&self, pattern: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.update(|config| config.add_url(pattern)).await?.1)
    }

    pub async fn remove_url(&self, pattern: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.update(|config| config.remove_url(pattern)).await?.1)
    }

    pub async fn add_app(&self, name: &str) -> Result<bool, ConfigError> {
        Ok(self.update(|config| config.add_app(name)).await?.1)
    }

    pub async fn remove_app(&self, name: &str) -> Result<bool, ConfigError> {
        Ok(self.update(|config| config.remove_app(name)).await?.1)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{config::BlockConfig, error::ConfigError};

    use super::ConfigStore;

    #[tokio::test]
    async fn missing_file_loads_empty_config() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore::new(dir.path().join("blocked_sites.json"));
        assert_eq!(store.load().await?, BlockConfig::default());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_json_is_a_config_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("blocked_sites.json");
        std::fs::write(&path, "{ not json")?;
        let store = ConfigStore::new(path);
        assert!(matches!(
            store.load().await,
            Err(ConfigError::Parse { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn added_site_survives_reload() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore::new(dir.path().join("blocked_sites.json"));
        store.add_site("x.com").await?;

        let config = ConfigStore::new(store.path().to_path_buf()).load().await?;
        assert!(config.blocked_sites.contains(&"x.com".to_string()));
        assert!(config.blocked_sites.contains(&"www.x.com".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn added_url_has_wildcard_variant() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore::new(dir.path().join("blocked_sites.json"));
        store.add_url("a.com/b").await?;
        let config = store.load().await?;
        assert_eq!(config.blocked_urls, vec!["a.com/b", "a.com/b/*"]);
        Ok(())
    }

    #[tokio::test]
    async fn save_leaves_no_temporary_file() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore::new(dir.path().join("blocked_sites.json"));
        store.add_app("Game.exe").await?;

        let names = std::fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        assert!(names.contains(&"blocked_sites.json".to_string()));
        assert!(!names.iter().any(|name| name.ends_with(".tmp")));
        Ok(())
    }

    #[tokio::test]
    async fn failed_change_does_not_touch_file() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore::new(dir.path().join("blocked_sites.json"));
        assert!(store.add_site("  ").await.is_err());
        assert!(!store.path().exists());
        Ok(())
    }
}
