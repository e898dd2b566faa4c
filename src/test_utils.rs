#[cfg(test)]
pub mod helpers {
    use pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Once;
    use tempfile::TempDir;

    static INIT: Once = Once::new();

    const RSA_FIXTURE: &str = include_str!("../testdata/rsa-2048.pem");

    /// Install the test subscriber once for the whole test binary
    pub fn setup() {
        INIT.call_once(|| {
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_test_writer()
                .try_init()
                .ok();
        });
    }

    /// Fresh P-256 key, PKCS#8 PEM
    pub fn p256_pkcs8_pem() -> String {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        secret
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode P-256 key")
            .to_string()
    }

    /// Fresh P-256 key, SEC1 (`EC PRIVATE KEY`) PEM as written by `openssl ecparam -genkey`
    pub fn p256_sec1_pem() -> String {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        secret
            .to_sec1_pem(LineEnding::LF)
            .expect("Failed to encode P-256 key")
            .to_string()
    }

    /// Fresh P-384 key, PKCS#8 PEM
    pub fn p384_pkcs8_pem() -> String {
        let secret = p384::SecretKey::random(&mut rand::rngs::OsRng);
        secret
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode P-384 key")
            .to_string()
    }

    /// Fresh P-521 key, SEC1 PEM
    pub fn p521_sec1_pem() -> String {
        let secret = p521::SecretKey::random(&mut rand::rngs::OsRng);
        secret
            .to_sec1_pem(LineEnding::LF)
            .expect("Failed to encode P-521 key")
            .to_string()
    }

    /// Fresh Ed25519 key, PKCS#8 PEM
    pub fn ed25519_pkcs8_pem() -> String {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode Ed25519 key")
            .to_string()
    }

    /// The RSA fixture as (PKCS#1 PEM, PKCS#8 PEM); generating RSA keys in tests is too slow
    pub fn rsa_pems() -> (String, String) {
        let key = rsa::RsaPrivateKey::from_pkcs1_pem(RSA_FIXTURE).expect("Invalid RSA fixture");
        let pkcs8 = key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode RSA key")
            .to_string();
        (RSA_FIXTURE.to_string(), pkcs8)
    }

    /// Temporary installation tree: `<root>/etc/certs`
    pub struct KeyDir {
        root: TempDir,
    }

    impl KeyDir {
        pub fn new() -> Self {
            let root = tempfile::tempdir().expect("Failed to create temp dir");
            fs::create_dir_all(root.path().join("etc").join("certs"))
                .expect("Failed to create certs dir");
            KeyDir { root }
        }

        pub fn root(&self) -> &Path {
            self.root.path()
        }

        pub fn certs(&self) -> PathBuf {
            self.root.path().join("etc").join("certs")
        }

        pub fn public_key_path(&self) -> PathBuf {
            self.certs().join(crate::config::PUBLIC_KEY_FILENAME)
        }

        /// Write `pem` to `certs/<name>` and return its path
        pub fn write_key(&self, name: &str, pem: &str) -> PathBuf {
            let path = self.certs().join(name);
            fs::write(&path, pem).expect("Failed to write key");
            path
        }
    }
}
