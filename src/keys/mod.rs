use p256::elliptic_curve::ALGORITHM_OID as EC_ALGORITHM_OID;
use pkcs8::der::asn1::ObjectIdentifier;
use pkcs8::der::{Document, SecretDocument};
use pkcs8::{AssociatedOid, DecodePrivateKey, EncodePublicKey, LineEnding, PrivateKeyInfo};
use rsa::pkcs1::DecodeRsaPrivateKey;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::atomic;
use crate::error::{KeyError, KeyLoadReason, Result};

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_BOUNDARY_END: &str = "-----";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    P256,
    P384,
    P521,
    Ed25519,
    Rsa,
}

impl KeyAlgorithm {
    /// JWT algorithm used when signing with a key of this type, if there is one
    pub fn jwt_algorithm(&self) -> Option<jsonwebtoken::Algorithm> {
        match self {
            KeyAlgorithm::P256 => Some(jsonwebtoken::Algorithm::ES256),
            KeyAlgorithm::P384 => Some(jsonwebtoken::Algorithm::ES384),
            KeyAlgorithm::P521 => None,
            KeyAlgorithm::Ed25519 => Some(jsonwebtoken::Algorithm::EdDSA),
            KeyAlgorithm::Rsa => Some(jsonwebtoken::Algorithm::RS256),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::P256 => f.write_str("ECDSA P-256"),
            KeyAlgorithm::P384 => f.write_str("ECDSA P-384"),
            KeyAlgorithm::P521 => f.write_str("ECDSA P-521"),
            KeyAlgorithm::Ed25519 => f.write_str("Ed25519"),
            KeyAlgorithm::Rsa => f.write_str("RSA"),
        }
    }
}

/// A decoded, unencrypted private key
pub enum PrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
    Rsa(rsa::RsaPrivateKey),
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Read and decode the private key stored at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let pem = atomic::read_text(path).map_err(|e| KeyError::key_load(path, e))?;
        Self::from_pem(&pem).map_err(|reason| KeyError::key_load(path, reason))
    }

    /// Decode the first private key block in `pem`.
    ///
    /// Certificates and comments around the key are skipped, so a TLS bundle
    /// holding the key next to its chain is accepted as is.
    pub fn from_pem(pem: &str) -> std::result::Result<Self, KeyLoadReason> {
        let mut skipped = None;

        for (label, block) in pem_blocks(pem) {
            match label {
                "PRIVATE KEY" | "EC PRIVATE KEY" | "RSA PRIVATE KEY" => {
                    return Self::from_pem_block(block)
                }
                "ENCRYPTED PRIVATE KEY" => return Err(KeyLoadReason::Encrypted),
                other => {
                    skipped.get_or_insert(other);
                }
            }
        }

        match skipped {
            Some(label) => Err(KeyLoadReason::UnsupportedLabel(label.to_string())),
            None => Err(malformed("no PEM block found")),
        }
    }

    fn from_pem_block(block: &str) -> std::result::Result<Self, KeyLoadReason> {
        if block.contains("Proc-Type: 4,ENCRYPTED") {
            return Err(KeyLoadReason::Encrypted);
        }

        let (label, doc) = SecretDocument::from_pem(block).map_err(malformed)?;

        match label {
            "EC PRIVATE KEY" => Self::from_sec1_der(doc.as_bytes()),
            "RSA PRIVATE KEY" => rsa::RsaPrivateKey::from_pkcs1_der(doc.as_bytes())
                .map(PrivateKey::Rsa)
                .map_err(malformed),
            _ => Self::from_pkcs8_der(doc.as_bytes()),
        }
    }

    fn from_sec1_der(der: &[u8]) -> std::result::Result<Self, KeyLoadReason> {
        let ec_key = sec1::EcPrivateKey::try_from(der).map_err(malformed)?;

        let curve = match ec_key.parameters.and_then(|p| p.named_curve()) {
            Some(oid) => oid,
            // parameters are optional; the scalar width then names the curve
            None => match ec_key.private_key.len() {
                32 => p256::NistP256::OID,
                48 => p384::NistP384::OID,
                66 => p521::NistP521::OID,
                n => {
                    return Err(malformed(format!(
                        "{}-byte EC private key without curve parameters",
                        n
                    )))
                }
            },
        };

        let key = match curve {
            c if c == p256::NistP256::OID => {
                p256::SecretKey::from_sec1_der(der).map(PrivateKey::P256)
            }
            c if c == p384::NistP384::OID => {
                p384::SecretKey::from_sec1_der(der).map(PrivateKey::P384)
            }
            c if c == p521::NistP521::OID => {
                p521::SecretKey::from_sec1_der(der).map(PrivateKey::P521)
            }
            other => return Err(unsupported_curve(other)),
        };

        key.map_err(malformed)
    }

    fn from_pkcs8_der(der: &[u8]) -> std::result::Result<Self, KeyLoadReason> {
        let info = PrivateKeyInfo::try_from(der).map_err(malformed)?;
        let oid = info.algorithm.oid;

        if oid == EC_ALGORITHM_OID {
            let curve = info.algorithm.parameters_oid().map_err(malformed)?;
            let key = match curve {
                c if c == p256::NistP256::OID => {
                    p256::SecretKey::from_pkcs8_der(der).map(PrivateKey::P256)
                }
                c if c == p384::NistP384::OID => {
                    p384::SecretKey::from_pkcs8_der(der).map(PrivateKey::P384)
                }
                c if c == p521::NistP521::OID => {
                    p521::SecretKey::from_pkcs8_der(der).map(PrivateKey::P521)
                }
                other => return Err(unsupported_curve(other)),
            };
            key.map_err(malformed)
        } else if oid == ed25519_dalek::pkcs8::ALGORITHM_OID {
            ed25519_dalek::SigningKey::from_pkcs8_der(der)
                .map(PrivateKey::Ed25519)
                .map_err(malformed)
        } else if oid == rsa::pkcs1::ALGORITHM_OID {
            rsa::RsaPrivateKey::from_pkcs8_der(der)
                .map(PrivateKey::Rsa)
                .map_err(malformed)
        } else {
            Err(KeyLoadReason::UnsupportedAlgorithm(oid.to_string()))
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PrivateKey::P256(_) => KeyAlgorithm::P256,
            PrivateKey::P384(_) => KeyAlgorithm::P384,
            PrivateKey::P521(_) => KeyAlgorithm::P521,
            PrivateKey::Ed25519(_) => KeyAlgorithm::Ed25519,
            PrivateKey::Rsa(_) => KeyAlgorithm::Rsa,
        }
    }

    /// Public half as PEM SubjectPublicKeyInfo
    pub fn public_key_pem(&self) -> Result<String> {
        let pem = match self {
            PrivateKey::P256(key) => key.public_key().to_public_key_pem(LineEnding::LF),
            PrivateKey::P384(key) => key.public_key().to_public_key_pem(LineEnding::LF),
            PrivateKey::P521(key) => key.public_key().to_public_key_pem(LineEnding::LF),
            PrivateKey::Ed25519(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
            PrivateKey::Rsa(key) => key.to_public_key().to_public_key_pem(LineEnding::LF),
        };

        pem.map_err(|e| KeyError::Encoding(e.to_string()))
    }
}

/// Split `pem` into `(label, block)` pairs, each block running from its BEGIN
/// line through the matching END line. Text between blocks is dropped.
fn pem_blocks(pem: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = pem;

    while let Some(start) = rest.find(PEM_BEGIN) {
        let block = &rest[start..];
        let after_begin = &block[PEM_BEGIN.len()..];

        let label = match after_begin.find(PEM_BOUNDARY_END) {
            Some(n) if !after_begin[..n].contains('\n') => &after_begin[..n],
            _ => {
                rest = after_begin;
                continue;
            }
        };

        let end_marker = format!("-----END {}-----", label);
        match block.find(&end_marker) {
            Some(end) => {
                let len = end + end_marker.len();
                blocks.push((label, &block[..len]));
                rest = &block[len..];
            }
            None => {
                blocks.push((label, block));
                break;
            }
        }
    }

    blocks
}

fn unsupported_curve(curve: ObjectIdentifier) -> KeyLoadReason {
    KeyLoadReason::UnsupportedAlgorithm(format!("EC curve {}", curve))
}

fn malformed(err: impl fmt::Display) -> KeyLoadReason {
    KeyLoadReason::Malformed(err.to_string())
}

/// Derive the SPKI PEM public key for the private key at `private_key_path`
pub fn derive_public_key(private_key_path: &Path) -> Result<String> {
    PrivateKey::load(private_key_path)?.public_key_pem()
}

fn spki_der(public_pem: &str) -> Result<Document> {
    let (label, doc) = Document::from_pem(public_pem.trim_start())
        .map_err(|e| KeyError::Encoding(format!("invalid public key PEM: {}", e)))?;

    if label != "PUBLIC KEY" {
        return Err(KeyError::Encoding(format!(
            "expected PUBLIC KEY block, found {}",
            label
        )));
    }

    Ok(doc)
}

/// SHA-256 over the SubjectPublicKeyInfo DER, lowercase hex
pub fn fingerprint(public_pem: &str) -> Result<String> {
    let doc = spki_der(public_pem)?;
    Ok(hex::encode(Sha256::digest(doc.as_bytes())))
}

/// Whether `public_pem` is the public half of `private_key`
pub fn verify_pair(private_key: &PrivateKey, public_pem: &str) -> Result<bool> {
    let expected = spki_der(&private_key.public_key_pem()?)?;
    let actual = spki_der(public_pem)?;

    Ok(expected.as_bytes() == actual.as_bytes())
}
