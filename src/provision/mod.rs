use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::atomic;
use crate::config::store::ConfigStore;
use crate::config::{SigningConfig, TlsConfig, KEY_FILE_MODE};
use crate::error::{KeyError, PermissionOp, Result};
use crate::identity::ServiceIdentity;
use crate::keys;

pub struct KeyProvisioner<S, I> {
    store: S,
    identity: I,
    default_public_key_path: PathBuf,
}

impl<S: ConfigStore, I: ServiceIdentity> KeyProvisioner<S, I> {
    pub fn new(store: S, identity: I, default_public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            identity,
            default_public_key_path: default_public_key_path.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Make sure a signing keypair is configured, falling back to the TLS key.
    ///
    /// Returns the signing configuration in effect afterwards.
    pub fn ensure_keys(&self, tls: &TlsConfig) -> Result<SigningConfig> {
        let current = self.store.signing_config()?;
        if current.is_provisioned() {
            debug!("Signing keys already configured, nothing to do");
            return Ok(current);
        }

        let config = SigningConfig::new(tls.key_path.clone(), self.default_public_key_path.clone());
        info!(
            "Signing keys not configured, using TLS key {} and public key {}",
            tls.key_path.display(),
            self.default_public_key_path.display()
        );

        self.derive_and_persist_public_key(&self.default_public_key_path, &tls.key_path)?;
        self.store.save_signing_config(&config)?;

        info!("Signing configuration saved");
        Ok(config)
    }

    /// Derive the public key of `private_key_path` into `public_key_path`, then
    /// hand both files to the service account with mode 0640.
    pub fn derive_and_persist_public_key(
        &self,
        public_key_path: &Path,
        private_key_path: &Path,
    ) -> Result<()> {
        let public_pem = keys::derive_public_key(private_key_path)?;
        let uid = self.identity.uid()?;
        let gid = self.identity.gid()?;

        atomic::write_atomic(public_key_path, public_pem.as_bytes()).map_err(|source| {
            KeyError::FileWrite {
                path: public_key_path.to_path_buf(),
                source,
            }
        })?;
        info!("Wrote public key {}", public_key_path.display());

        harden(&[private_key_path, public_key_path], uid, gid)
    }
}

fn harden(paths: &[&Path], uid: u32, gid: u32) -> Result<()> {
    for path in paths {
        skip_if_not_permitted(chown(path, uid, gid))?;
    }
    for path in paths {
        skip_if_not_permitted(chmod(path, KEY_FILE_MODE))?;
    }

    Ok(())
}

// Unprivileged deployments cannot chown; that alone must not stop the server.
fn skip_if_not_permitted(result: Result<()>) -> Result<()> {
    match result {
        Err(err @ KeyError::PermissionAdjustment { .. }) if err.is_permission_denied() => {
            warn!("{}; leaving it as is", err);
            Ok(())
        }
        other => other,
    }
}

#[cfg(unix)]
fn chown(path: &Path, uid: u32, gid: u32) -> Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|source| {
        KeyError::PermissionAdjustment {
            path: path.to_path_buf(),
            op: PermissionOp::Chown,
            source,
        }
    })
}

#[cfg(unix)]
fn chmod(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        KeyError::PermissionAdjustment {
            path: path.to_path_buf(),
            op: PermissionOp::Chmod,
            source,
        }
    })
}

#[cfg(not(unix))]
fn chown(path: &Path, _uid: u32, _gid: u32) -> Result<()> {
    debug!("Ownership not supported on this platform, skipping {}", path.display());
    Ok(())
}

#[cfg(not(unix))]
fn chmod(path: &Path, _mode: u32) -> Result<()> {
    debug!("File modes not supported on this platform, skipping {}", path.display());
    Ok(())
}
