use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::identity::{ProcessIdentity, ServiceIdentity, StaticIdentity, UserDbIdentity};

pub mod store;

/// File name of the derived public key inside `<etc>/certs`
pub const PUBLIC_KEY_FILENAME: &str = "public-key.pem";

/// Algorithm the token layer signs with; the configured private key must be compatible
pub const JWT_ALGORITHM: jsonwebtoken::Algorithm = jsonwebtoken::Algorithm::ES256;

/// Default token issuer
pub const JWT_ISSUER: &str = "authkeys";

/// Mode applied to both key files: owner rw, group r, others nothing
pub const KEY_FILE_MODE: u32 = 0o640;

/// Paths of the token signing keypair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default, rename = "private_key", skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    #[serde(default, rename = "public_key", skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<PathBuf>,
}

impl SigningConfig {
    pub fn new(private_key_path: impl Into<PathBuf>, public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: Some(private_key_path.into()),
            public_key_path: Some(public_key_path.into()),
        }
    }

    /// Private key path, treating an empty path as unset
    pub fn private_key(&self) -> Option<&Path> {
        non_empty(&self.private_key_path)
    }

    /// Public key path, treating an empty path as unset
    pub fn public_key(&self) -> Option<&Path> {
        non_empty(&self.public_key_path)
    }

    pub fn is_provisioned(&self) -> bool {
        self.private_key().is_some() && self.public_key().is_some()
    }
}

fn non_empty(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

/// TLS settings of the server; `key_path` is the fallback signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(rename = "key")]
    pub key_path: PathBuf,
    #[serde(default, rename = "cert", skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
}

impl TlsConfig {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
            cert_path: None,
        }
    }
}

/// Server-side configuration document held by the config store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub jwt: SigningConfig,
    /// Settings owned by other subsystems, carried through untouched
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    // Installation layout
    pub install_root: PathBuf,
    pub config_path: PathBuf,

    // TLS
    pub tls_key_path: PathBuf,
    pub tls_cert_path: Option<PathBuf>,

    // Service account owning the key files
    pub service_user: Option<String>,
    pub service_group: Option<String>,
    pub service_uid: Option<u32>,
    pub service_gid: Option<u32>,

    // Tokens
    pub jwt_issuer: String,
    pub token_ttl_secs: u64,
}

impl Settings {
    pub fn new() -> Self {
        let install_root = PathBuf::from(get_env("AUTHKEYS_INSTALL_ROOT", "/var/lib/authkeys"));
        let etc_dir = install_root.join("etc");

        Settings {
            config_path: get_env_path("AUTHKEYS_CONFIG_PATH")
                .unwrap_or_else(|| etc_dir.join("server-config.json")),

            tls_key_path: get_env_path("AUTHKEYS_TLS_KEY")
                .unwrap_or_else(|| etc_dir.join("certs").join("server-key.pem")),
            tls_cert_path: get_env_path("AUTHKEYS_TLS_CERT"),

            service_user: get_env_opt("AUTHKEYS_SERVICE_USER"),
            service_group: get_env_opt("AUTHKEYS_SERVICE_GROUP"),
            service_uid: get_env_parsed("AUTHKEYS_SERVICE_UID"),
            service_gid: get_env_parsed("AUTHKEYS_SERVICE_GID"),

            jwt_issuer: get_env("AUTHKEYS_JWT_ISSUER", JWT_ISSUER),
            token_ttl_secs: get_env_parsed("AUTHKEYS_TOKEN_TTL").unwrap_or(900),

            install_root,
        }
    }

    pub fn etc_dir(&self) -> PathBuf {
        self.install_root.join("etc")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.etc_dir().join("certs")
    }

    /// `<install_root>/etc/certs/public-key.pem`
    pub fn default_public_key_path(&self) -> PathBuf {
        self.certs_dir().join(PUBLIC_KEY_FILENAME)
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig {
            key_path: self.tls_key_path.clone(),
            cert_path: self.tls_cert_path.clone(),
        }
    }

    /// Numeric ids win, then a user database lookup by name, then the running process
    pub fn identity(&self) -> Box<dyn ServiceIdentity> {
        if let (Some(uid), Some(gid)) = (self.service_uid, self.service_gid) {
            return Box::new(StaticIdentity::new(uid, gid));
        }

        match &self.service_user {
            Some(user) => {
                let group = self.service_group.clone().unwrap_or_else(|| user.clone());
                Box::new(UserDbIdentity::new(user.clone(), group))
            }
            None => Box::new(ProcessIdentity),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_env_path(key: &str) -> Option<PathBuf> {
    get_env_opt(key).map(PathBuf::from)
}

fn get_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "AUTHKEYS_INSTALL_ROOT",
        "AUTHKEYS_CONFIG_PATH",
        "AUTHKEYS_TLS_KEY",
        "AUTHKEYS_TLS_CERT",
        "AUTHKEYS_SERVICE_USER",
        "AUTHKEYS_SERVICE_GROUP",
        "AUTHKEYS_SERVICE_UID",
        "AUTHKEYS_SERVICE_GID",
        "AUTHKEYS_JWT_ISSUER",
        "AUTHKEYS_TOKEN_TTL",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_derive_from_install_root() {
        clear_env();
        env::set_var("AUTHKEYS_INSTALL_ROOT", "/opt/authkeys");

        let settings = Settings::new();
        assert_eq!(
            settings.default_public_key_path(),
            PathBuf::from("/opt/authkeys/etc/certs/public-key.pem")
        );
        assert_eq!(
            settings.config_path,
            PathBuf::from("/opt/authkeys/etc/server-config.json")
        );
        assert_eq!(
            settings.tls_config().key_path,
            PathBuf::from("/opt/authkeys/etc/certs/server-key.pem")
        );
        assert_eq!(settings.jwt_issuer, JWT_ISSUER);
        assert_eq!(settings.token_ttl_secs, 900);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("AUTHKEYS_TLS_KEY", "/srv/tls/key.pem");
        env::set_var("AUTHKEYS_SERVICE_UID", "999");
        env::set_var("AUTHKEYS_SERVICE_GID", "998");
        env::set_var("AUTHKEYS_TOKEN_TTL", "not-a-number");

        let settings = Settings::new();
        assert_eq!(settings.tls_key_path, PathBuf::from("/srv/tls/key.pem"));
        assert_eq!(settings.service_uid, Some(999));
        assert_eq!(settings.service_gid, Some(998));
        assert_eq!(settings.token_ttl_secs, 900);

        let identity = settings.identity();
        assert_eq!(identity.uid().unwrap(), 999);
        assert_eq!(identity.gid().unwrap(), 998);

        clear_env();
    }

    #[test]
    fn test_empty_paths_count_as_unset() {
        let config = SigningConfig {
            private_key_path: Some(PathBuf::from("/etc/certs/key.pem")),
            public_key_path: Some(PathBuf::new()),
        };
        assert!(config.private_key().is_some());
        assert!(config.public_key().is_none());
        assert!(!config.is_provisioned());

        assert!(SigningConfig::new("a.pem", "b.pem").is_provisioned());
        assert!(!SigningConfig::default().is_provisioned());
    }

    #[test]
    fn test_server_config_json_shape() {
        let config = ServerConfig {
            jwt: SigningConfig::new("/etc/certs/key.pem", "/etc/certs/public-key.pem"),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["jwt"]["private_key"], "/etc/certs/key.pem");
        assert_eq!(json["jwt"]["public_key"], "/etc/certs/public-key.pem");

        let empty: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ServerConfig::default());
    }
}
