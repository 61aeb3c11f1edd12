//! Capability handshake payload builder
//!
//! Protected catalogs only become visible after the client submits an
//! encrypted capability probe. The probe is a small JSON document (e.g. the
//! WebGL vendor/renderer pair a real browser would report), encrypted with
//! RSA-OAEP/SHA-256 under the server's public key and base64-encoded for use
//! as a form field.
//!
//! A construction failure here is never retried: a key that does not parse
//! or a probe that does not fit the key will not improve on a second try.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

/// Public key published by the catalog for probe encryption
pub const DEFAULT_PUBLIC_KEY: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEApgjwxZd4I6YnOE1GGCdnKIatX71CyGpssvAAH7udNLcBVr0WzIP1t+KZ7mDzLMyZE9MJmSsEgKidzaVRikarUQ6MUWnyJQxe8DlUNrSmK4ZrnLBD/5rVBcepZo1mPj1MdQWie4AYHUt++lLpPrXqEJ7xugSGIt7ORVGgcKO5ku5RSS1Ssy5iUhYtQo4VCb2UxYuMbpt2YF8LOaR8KtPIQENtNH2Jj7akQTna4I5lixOB0jme03lR5n94SqACUAZ+rFBDKgrC9eVWX8xdfMERxcKuD9NxFCV65tdNiH64CHWaDU13j9v2XGHKFkEORgRn+RQBintX5fEqt7GTTIzvoQIDAQAB";

/// Errors raised while building the encrypted probe
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("failed to serialize capability probe: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to encrypt capability probe: {0}")]
    Encrypt(String),
}

/// Declared client capabilities
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityProbe {
    fields: Map<String, Value>,
}

impl CapabilityProbe {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Serializes the probe to its compact JSON plaintext
    pub fn to_json(&self) -> Result<String, HandshakeError> {
        Ok(serde_json::to_string(&self.fields)?)
    }
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        let mut fields = Map::new();
        fields.insert("vendor".to_string(), Value::from("Intel"));
        fields.insert(
            "renderer".to_string(),
            Value::from("Intel Iris OpenGL Engine"),
        );
        Self { fields }
    }
}

impl From<Map<String, Value>> for CapabilityProbe {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// Encrypts a capability probe under the server public key
#[derive(Debug, Clone)]
pub struct HandshakeBuilder {
    key: RsaPublicKey,
    probe: CapabilityProbe,
}

impl HandshakeBuilder {
    /// Parses `key` and pairs it with `probe`
    ///
    /// `key` may be a PEM document or the bare base64 body of a
    /// SubjectPublicKeyInfo; line wrapping is ignored either way.
    pub fn from_key(key: &str, probe: CapabilityProbe) -> Result<Self, HandshakeError> {
        Ok(Self {
            key: parse_public_key(key)?,
            probe,
        })
    }

    /// Builds the form-field value: base64(RSA-OAEP-SHA256(json(probe)))
    pub fn build_payload(&self) -> Result<String, HandshakeError> {
        let plaintext = self.probe.to_json()?;
        let mut rng = rand::thread_rng();
        let ciphertext = self
            .key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext.as_bytes())
            .map_err(|e| HandshakeError::Encrypt(e.to_string()))?;
        Ok(STANDARD.encode(ciphertext))
    }
}

fn parse_public_key(key: &str) -> Result<RsaPublicKey, HandshakeError> {
    let body: String = key
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace())
        .collect();

    if body.is_empty() {
        return Err(HandshakeError::InvalidKey("key is empty".to_string()));
    }

    let der = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| HandshakeError::InvalidKey(e.to_string()))?;

    RsaPublicKey::from_public_key_der(&der).map_err(|e| HandshakeError::InvalidKey(e.to_string()))
}
