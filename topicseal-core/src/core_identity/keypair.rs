//! Keypair module
//!
//! Key material for identities. X25519 for topic key wrapping, Ed25519 for
//! signatures. Secret halves are zeroized on drop.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::error::IdentityError;

/// Length of every public and secret key component in bytes
pub const KEY_LEN: usize = 32;

/// Key type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// Ed25519 for signatures
    Ed25519,
    /// X25519 for wrapping topic keys
    X25519,
}

/// Keypair structure holding public and secret keys
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    key_type: KeyType,
    public: [u8; KEY_LEN],
    secret: Zeroizing<[u8; KEY_LEN]>,
}

impl Keypair {
    /// Generate a new keypair of the specified type
    pub fn generate(key_type: KeyType) -> Self {
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(&mut seed[..]);
        Self::from_secret(key_type, *seed)
    }

    /// Rebuild a keypair from its secret half
    pub fn from_secret(key_type: KeyType, secret: [u8; KEY_LEN]) -> Self {
        let public = match key_type {
            KeyType::Ed25519 => SigningKey::from_bytes(&secret).verifying_key().to_bytes(),
            KeyType::X25519 => X25519PublicKey::from(&StaticSecret::from(secret)).to_bytes(),
        };

        Keypair {
            key_type,
            public,
            secret: Zeroizing::new(secret),
        }
    }

    /// Rebuild a keypair from both halves, checking they belong together
    pub fn from_parts(
        key_type: KeyType,
        public: [u8; KEY_LEN],
        secret: [u8; KEY_LEN],
    ) -> Result<Self, IdentityError> {
        let keypair = Self::from_secret(key_type, secret);
        if keypair.public != public {
            return Err(IdentityError::MalformedIdentity(format!(
                "{:?} public key does not match its secret key",
                key_type
            )));
        }
        Ok(keypair)
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn public_key(&self) -> &[u8; KEY_LEN] {
        &self.public
    }

    /// Secret key bytes (use carefully!)
    pub fn secret_key(&self) -> &[u8; KEY_LEN] {
        &self.secret
    }

    /// Sign a message (Ed25519 only)
    pub fn sign(&self, msg: &[u8]) -> Option<[u8; 64]> {
        match self.key_type {
            KeyType::Ed25519 => Some(SigningKey::from_bytes(&self.secret).sign(msg).to_bytes()),
            KeyType::X25519 => None,
        }
    }

    /// Verify an Ed25519 signature against a public key
    pub fn verify(public: &[u8; KEY_LEN], msg: &[u8], sig: &[u8; 64]) -> bool {
        match VerifyingKey::from_bytes(public) {
            Ok(vk) => vk.verify(msg, &Signature::from_bytes(sig)).is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("key_type", &self.key_type)
            .field("public", &STANDARD.encode(self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}
