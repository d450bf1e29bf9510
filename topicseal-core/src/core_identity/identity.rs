//! Identity model
//!
//! An identity is a versioned bundle of an encryption keypair and, from
//! version 1 onward, a signing keypair. Version 0 identities are legacy and
//! carry no signing keys.

use super::error::IdentityError;
use super::keypair::{KeyType, Keypair, KEY_LEN};

/// Version produced by fresh generation and by upgrades
pub const CURRENT_IDENTITY_VERSION: u32 = 1;

/// Version tag of legacy identities without signing keys
pub const LEGACY_IDENTITY_VERSION: u32 = 0;

/// A user's full identity, including private halves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    version: u32,
    encryption: Keypair,
    signing: Option<Keypair>,
}

/// Public half of an identity, as shared with other users
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicIdentity {
    version: u32,
    encryption_key: [u8; KEY_LEN],
    signing_key: Option<[u8; KEY_LEN]>,
}

fn check_signing_presence(version: u32, has_signing: bool) -> Result<(), IdentityError> {
    match (version == LEGACY_IDENTITY_VERSION, has_signing) {
        (true, true) => Err(IdentityError::MalformedIdentity(
            "legacy identity cannot carry signing keys".to_string(),
        )),
        (false, false) => Err(IdentityError::MalformedIdentity(format!(
            "version {} identity requires signing keys",
            version
        ))),
        _ => Ok(()),
    }
}

impl Identity {
    /// Generate fresh key material for `version`.
    ///
    /// Versions >= 1 always include a signing keypair.
    pub fn generate(version: u32) -> Self {
        let signing =
            (version != LEGACY_IDENTITY_VERSION).then(|| Keypair::generate(KeyType::Ed25519));
        Identity {
            version,
            encryption: Keypair::generate(KeyType::X25519),
            signing,
        }
    }

    pub fn new(
        version: u32,
        encryption: Keypair,
        signing: Option<Keypair>,
    ) -> Result<Self, IdentityError> {
        check_signing_presence(version, signing.is_some())?;
        if encryption.key_type() != KeyType::X25519 {
            return Err(IdentityError::MalformedIdentity(
                "encryption keypair must be X25519".to_string(),
            ));
        }
        if signing.as_ref().is_some_and(|kp| kp.key_type() != KeyType::Ed25519) {
            return Err(IdentityError::MalformedIdentity(
                "signing keypair must be Ed25519".to_string(),
            ));
        }

        Ok(Identity {
            version,
            encryption,
            signing,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_legacy(&self) -> bool {
        self.version == LEGACY_IDENTITY_VERSION
    }

    pub fn encryption(&self) -> &Keypair {
        &self.encryption
    }

    pub fn signing(&self) -> Option<&Keypair> {
        self.signing.as_ref()
    }

    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            version: self.version,
            encryption_key: *self.encryption.public_key(),
            signing_key: self.signing.as_ref().map(|kp| *kp.public_key()),
        }
    }

    /// Upgrade a legacy identity to [`CURRENT_IDENTITY_VERSION`].
    ///
    /// The encryption keypair is carried over and a fresh signing keypair is
    /// generated. Non-legacy identities are returned unchanged.
    pub fn upgrade(self) -> Self {
        if !self.is_legacy() {
            return self;
        }
        Identity {
            version: CURRENT_IDENTITY_VERSION,
            encryption: self.encryption,
            signing: Some(Keypair::generate(KeyType::Ed25519)),
        }
    }

    /// Sign `msg` with the signing key; `None` for legacy identities
    pub fn sign(&self, msg: &[u8]) -> Option<[u8; 64]> {
        self.signing.as_ref().and_then(|kp| kp.sign(msg))
    }
}

impl PublicIdentity {
    pub fn new(
        version: u32,
        encryption_key: [u8; KEY_LEN],
        signing_key: Option<[u8; KEY_LEN]>,
    ) -> Result<Self, IdentityError> {
        check_signing_presence(version, signing_key.is_some())?;
        Ok(PublicIdentity {
            version,
            encryption_key,
            signing_key,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// X25519 key used to wrap topic keys for this user
    pub fn encryption_key(&self) -> &[u8; KEY_LEN] {
        &self.encryption_key
    }

    pub fn signing_key(&self) -> Option<&[u8; KEY_LEN]> {
        self.signing_key.as_ref()
    }

    /// Verify a signature made by [`Identity::sign`]
    pub fn verify(&self, msg: &[u8], sig: &[u8; 64]) -> bool {
        self.signing_key
            .as_ref()
            .is_some_and(|key| Keypair::verify(key, msg, sig))
    }
}
