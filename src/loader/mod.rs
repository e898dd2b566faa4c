use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::atomic;
use crate::config::store::ConfigStore;
use crate::error::{KeyError, Result};

/// Raw PEM text of the signing keypair, exactly as stored on disk
#[derive(Clone)]
pub struct Keypair {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub private_key: String,
    pub public_key: String,
}

impl Keypair {
    /// (private key, public key)
    pub fn into_parts(self) -> (String, String) {
        (self.private_key, self.public_key)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

pub struct KeyLoader<S> {
    store: S,
}

impl<S: ConfigStore> KeyLoader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Read both key files named by the signing configuration.
    ///
    /// Nothing is parsed or validated; callers get the file contents verbatim.
    pub fn get_keypair(&self) -> Result<Keypair> {
        let config = self.store.signing_config()?;

        let private_key_path = config
            .private_key()
            .ok_or(KeyError::ConfigurationIncomplete("private key path"))?
            .to_path_buf();
        let public_key_path = config
            .public_key()
            .ok_or(KeyError::ConfigurationIncomplete("public key path"))?
            .to_path_buf();

        let private_key = read_key(&private_key_path)?;
        let public_key = read_key(&public_key_path)?;

        Ok(Keypair {
            private_key_path,
            public_key_path,
            private_key,
            public_key,
        })
    }
}

fn read_key(path: &Path) -> Result<String> {
    debug!("Reading key file {}", path.display());
    atomic::read_text(path).map_err(|source| KeyError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}
