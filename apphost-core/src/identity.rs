//! Node identity: public keys as addresses, hex text form, keypair generation.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Length of an identity in bytes (X25519 public key).
pub const IDENTITY_LEN: usize = 32;

/// Node identity (32-byte public key). Text form is 64 lowercase hex characters.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Create an `Identity` from raw bytes.
    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Identity(bytes)
    }

    /// Parse the hex text form. Rejects anything that is not exactly 32 hex-encoded bytes.
    pub fn from_hex(s: &str) -> Result<Self, IdentityParseError> {
        let bytes = hex::decode(s).map_err(|_| IdentityParseError::NotHex(s.to_string()))?;
        let arr: [u8; IDENTITY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| IdentityParseError::Length(b.len()))?;
        Ok(Identity(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::from_hex(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Identity::from_hex(&s)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.to_hex()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityParseError {
    #[error("identity is not valid hex: {0:?}")]
    NotHex(String),
    #[error("identity must be 32 bytes, got {0}")]
    Length(usize),
}

/// X25519 keypair. The public half is the node's identity; the secret never leaves the node.
pub struct Keypair {
    #[allow(dead_code)]
    secret: StaticSecret,
    identity: Identity,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self {
            secret,
            identity: Identity(public.to_bytes()),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }
}
