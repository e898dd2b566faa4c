use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ServerConfig, SigningConfig};
use crate::atomic;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration document {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read/write access to the server's signing configuration
pub trait ConfigStore: Send + Sync {
    fn signing_config(&self) -> Result<SigningConfig, StoreError>;

    fn save_signing_config(&self, config: &SigningConfig) -> Result<(), StoreError>;
}

impl<S: ConfigStore + ?Sized> ConfigStore for &S {
    fn signing_config(&self) -> Result<SigningConfig, StoreError> {
        (**self).signing_config()
    }

    fn save_signing_config(&self, config: &SigningConfig) -> Result<(), StoreError> {
        (**self).save_signing_config(config)
    }
}

impl<S: ConfigStore + ?Sized> ConfigStore for std::sync::Arc<S> {
    fn signing_config(&self) -> Result<SigningConfig, StoreError> {
        (**self).signing_config()
    }

    fn save_signing_config(&self, config: &SigningConfig) -> Result<(), StoreError> {
        (**self).save_signing_config(config)
    }
}

/// Process-local store, used by embedders that persist configuration elsewhere
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: RwLock<SigningConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: SigningConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn signing_config(&self) -> Result<SigningConfig, StoreError> {
        Ok(self.config.read().clone())
    }

    fn save_signing_config(&self, config: &SigningConfig) -> Result<(), StoreError> {
        *self.config.write() = config.clone();
        Ok(())
    }
}

/// JSON document on disk; a missing file reads as an empty configuration
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<ServerConfig, StoreError> {
        let raw = match atomic::read_text(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No configuration document at {}", self.path.display());
                return Ok(ServerConfig::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }
}

impl ConfigStore for FileConfigStore {
    fn signing_config(&self) -> Result<SigningConfig, StoreError> {
        let _guard = self.lock.read();
        Ok(self.load()?.jwt)
    }

    fn save_signing_config(&self, config: &SigningConfig) -> Result<(), StoreError> {
        let _guard = self.lock.write();

        let mut document = self.load()?;
        document.jwt = config.clone();

        let json = serde_json::to_vec_pretty(&document).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        atomic::write_atomic(&self.path, &json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!("Saved signing configuration to {}", self.path.display());
        Ok(())
    }
}
