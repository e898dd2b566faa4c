use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pkcs8::EncodePrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, Result};
use crate::keys::PrivateKey;
use crate::loader::Keypair;

/// Claims carried by every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user or client name)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Signs and verifies access tokens with the provisioned keypair
pub struct TokenSigner {
    issuer: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenSigner {
    /// Build a signer from the raw keypair returned by the key loader.
    ///
    /// The JWT algorithm follows the private key type: P-256 signs ES256,
    /// P-384 signs ES384, Ed25519 signs EdDSA and RSA signs RS256. P-521 keys
    /// have no JWT algorithm here and are refused.
    pub fn from_keypair(keypair: &Keypair, issuer: impl Into<String>) -> Result<Self> {
        let private_key = PrivateKey::from_pem(&keypair.private_key)
            .map_err(|reason| KeyError::key_load(&keypair.private_key_path, reason))?;

        let algorithm = private_key
            .algorithm()
            .jwt_algorithm()
            .ok_or(KeyError::UnsupportedSigningKey(private_key.algorithm()))?;

        let public_pem = keypair.public_key.as_bytes();
        let (encoding_key, decoding_key) = match &private_key {
            PrivateKey::P256(secret) => {
                let der = secret.to_pkcs8_der().map_err(encoding)?;
                (
                    EncodingKey::from_ec_der(der.as_bytes()),
                    DecodingKey::from_ec_pem(public_pem)?,
                )
            }
            PrivateKey::P384(secret) => {
                let der = secret.to_pkcs8_der().map_err(encoding)?;
                (
                    EncodingKey::from_ec_der(der.as_bytes()),
                    DecodingKey::from_ec_pem(public_pem)?,
                )
            }
            PrivateKey::P521(_) => {
                return Err(KeyError::UnsupportedSigningKey(private_key.algorithm()))
            }
            PrivateKey::Ed25519(signing_key) => {
                let der = signing_key.to_pkcs8_der().map_err(encoding)?;
                (
                    EncodingKey::from_ed_der(der.as_bytes()),
                    DecodingKey::from_ed_pem(public_pem)?,
                )
            }
            PrivateKey::Rsa(key) => {
                let der = key.to_pkcs1_der().map_err(encoding)?;
                (
                    EncodingKey::from_rsa_der(der.as_bytes()),
                    DecodingKey::from_rsa_pem(public_pem)?,
                )
            }
        };

        Ok(Self {
            issuer: issuer.into(),
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Issue a token for `subject` valid for `ttl` from now
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let exp = now + ttl;

        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;

        Ok(token)
    }

    /// Verify signature, issuer and validity window of a token
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_nbf = true;

        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &validation)?;

        Ok(token_data.claims)
    }
}

fn encoding(err: impl std::fmt::Display) -> KeyError {
    KeyError::Encoding(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JWT_ISSUER;
    use crate::test_utils::helpers;
    use jsonwebtoken::errors::ErrorKind;
    use std::path::PathBuf;

    fn keypair(private_pem: String) -> Keypair {
        let public_key = PrivateKey::from_pem(&private_pem)
            .unwrap()
            .public_key_pem()
            .unwrap();
        Keypair {
            private_key_path: PathBuf::from("/etc/certs/server-key.pem"),
            public_key_path: PathBuf::from("/etc/certs/public-key.pem"),
            private_key: private_pem,
            public_key,
        }
    }

    #[test]
    fn test_es256_round_trip() {
        let signer = TokenSigner::from_keypair(&keypair(helpers::p256_pkcs8_pem()), JWT_ISSUER).unwrap();
        assert_eq!(signer.algorithm(), Algorithm::ES256);

        let token = signer.issue("alice", Duration::minutes(15)).unwrap();
        let claims = signer.verify(&token).unwrap();

        assert_eq!(claims.iss, JWT_ISSUER);
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_sec1_key_signs_es256() {
        let signer = TokenSigner::from_keypair(&keypair(helpers::p256_sec1_pem()), JWT_ISSUER).unwrap();
        let token = signer.issue("bob", Duration::minutes(1)).unwrap();
        assert_eq!(signer.verify(&token).unwrap().sub, "bob");
    }

    #[test]
    fn test_eddsa_and_rsa() {
        let signer = TokenSigner::from_keypair(&keypair(helpers::ed25519_pkcs8_pem()), JWT_ISSUER).unwrap();
        assert_eq!(signer.algorithm(), Algorithm::EdDSA);
        let token = signer.issue("carol", Duration::minutes(1)).unwrap();
        assert!(signer.verify(&token).is_ok());

        let (pkcs1, _) = helpers::rsa_pems();
        let signer = TokenSigner::from_keypair(&keypair(pkcs1), JWT_ISSUER).unwrap();
        assert_eq!(signer.algorithm(), Algorithm::RS256);
        let token = signer.issue("dave", Duration::minutes(1)).unwrap();
        assert!(signer.verify(&token).is_ok());
    }

    #[test]
    fn test_p384_signs_es384() {
        let signer = TokenSigner::from_keypair(&keypair(helpers::p384_pkcs8_pem()), JWT_ISSUER).unwrap();
        assert_eq!(signer.algorithm(), Algorithm::ES384);

        let token = signer.issue("erin", Duration::minutes(1)).unwrap();
        assert_eq!(signer.verify(&token).unwrap().sub, "erin");
    }

    #[test]
    fn test_p521_is_refused() {
        match TokenSigner::from_keypair(&keypair(helpers::p521_sec1_pem()), JWT_ISSUER) {
            Err(KeyError::UnsupportedSigningKey(algorithm)) => {
                assert_eq!(algorithm, crate::keys::KeyAlgorithm::P521)
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("P-521 key accepted for signing"),
        }
    }

    #[test]
    fn test_token_from_other_key_is_rejected() {
        let ours = TokenSigner::from_keypair(&keypair(helpers::p256_pkcs8_pem()), JWT_ISSUER).unwrap();
        let theirs = TokenSigner::from_keypair(&keypair(helpers::p256_pkcs8_pem()), JWT_ISSUER).unwrap();

        let token = theirs.issue("mallory", Duration::minutes(5)).unwrap();
        match ours.verify(&token) {
            Err(KeyError::Token(e)) => assert!(matches!(e.kind(), ErrorKind::InvalidSignature)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let signer = TokenSigner::from_keypair(&keypair(helpers::p256_pkcs8_pem()), JWT_ISSUER).unwrap();
        let token = signer.issue("alice", Duration::minutes(-10)).unwrap();

        match signer.verify(&token) {
            Err(KeyError::Token(e)) => assert!(matches!(e.kind(), ErrorKind::ExpiredSignature)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_issuer_is_rejected() {
        let pair = keypair(helpers::p256_pkcs8_pem());
        let issuer = TokenSigner::from_keypair(&pair, "someone-else").unwrap();
        let verifier = TokenSigner::from_keypair(&pair, JWT_ISSUER).unwrap();

        let token = issuer.issue("alice", Duration::minutes(5)).unwrap();
        match verifier.verify(&token) {
            Err(KeyError::Token(e)) => assert!(matches!(e.kind(), ErrorKind::InvalidIssuer)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_private_key() {
        let pair = Keypair {
            private_key_path: PathBuf::from("/etc/certs/server-key.pem"),
            public_key_path: PathBuf::from("/etc/certs/public-key.pem"),
            private_key: "not a key".to_string(),
            public_key: String::new(),
        };
        assert!(matches!(
            TokenSigner::from_keypair(&pair, JWT_ISSUER),
            Err(KeyError::KeyLoad { .. })
        ));
    }
}
