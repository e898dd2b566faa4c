use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::config::store::StoreError;
use crate::keys::KeyAlgorithm;

pub type Result<T> = std::result::Result<T, KeyError>;

/// Errors raised while provisioning or loading the signing keypair
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Signing configuration incomplete: {0} is not set")]
    ConfigurationIncomplete(&'static str),

    #[error("Failed to load private key {}: {reason}", path.display())]
    KeyLoad { path: PathBuf, reason: KeyLoadReason },

    #[error("Failed to write public key {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to {op} {}: {source}", path.display())]
    PermissionAdjustment {
        path: PathBuf,
        op: PermissionOp,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read key file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),

    #[error("Service identity error: {0}")]
    Identity(String),

    #[error("Key encoding error: {0}")]
    Encoding(String),

    #[error("{0} keys cannot sign tokens")]
    UnsupportedSigningKey(KeyAlgorithm),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Why a private key could not be turned into a usable key
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadReason {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("encrypted private keys are not supported")]
    Encrypted,

    #[error("unsupported PEM label \"{0}\"")]
    UnsupportedLabel(String),

    #[error("unsupported key algorithm {0}")]
    UnsupportedAlgorithm(String),

    #[error("malformed key: {0}")]
    Malformed(String),
}

/// Ownership/mode operations applied to key files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOp {
    Chown,
    Chmod,
}

impl fmt::Display for PermissionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionOp::Chown => f.write_str("change owner of"),
            PermissionOp::Chmod => f.write_str("change mode of"),
        }
    }
}

impl KeyError {
    pub(crate) fn key_load(path: impl Into<PathBuf>, reason: impl Into<KeyLoadReason>) -> Self {
        KeyError::KeyLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the underlying cause is the process lacking privilege
    pub fn is_permission_denied(&self) -> bool {
        match self {
            KeyError::PermissionAdjustment { source, .. }
            | KeyError::FileWrite { source, .. }
            | KeyError::FileRead { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}
