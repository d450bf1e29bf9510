//! Identity codec
//!
//! Transport format, `$`-delimited with base64 key fields:
//! ```text
//! full:    version$encPub$encPriv[$signPub$signPriv]
//! public:  version$encPub[$signPub]
//! ```
//! Version 0 omits the signing fields. Trailing fields beyond what a version
//! needs are ignored so newer writers stay readable.
//!
//! Export blob, `private` field:
//! ```text
//! base64( salt (16) || nonce (12) || AES-256-GCM(encode(identity)) )
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::error::IdentityError;
use super::identity::{Identity, PublicIdentity, LEGACY_IDENTITY_VERSION};
use super::keypair::{KeyType, Keypair, KEY_LEN};
use crate::crypto::{self, derive_passphrase_key, CryptoError, SALT_LEN};

const DELIMITER: char = '$';

/// Passphrase-protected identity as stored on the key server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedIdentity {
    /// Public identity in transport encoding
    pub public: String,
    /// Encrypted full identity
    pub private: String,
}

fn malformed(msg: impl Into<String>) -> IdentityError {
    IdentityError::MalformedIdentity(msg.into())
}

fn encode_key(key: &[u8; KEY_LEN]) -> String {
    STANDARD.encode(key)
}

fn decode_key(field: &str, name: &str) -> Result<[u8; KEY_LEN], IdentityError> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(field)
            .map_err(|e| malformed(format!("{}: invalid base64: {}", name, e)))?,
    );
    let mut key = [0u8; KEY_LEN];
    if bytes.len() != KEY_LEN {
        return Err(malformed(format!(
            "{}: expected {} bytes, got {}",
            name,
            KEY_LEN,
            bytes.len()
        )));
    }
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Split an encoded identity into its version and the fields that version needs
fn split_fields(
    encoded: &str,
    legacy_fields: usize,
    current_fields: usize,
) -> Result<(u32, Vec<&str>), IdentityError> {
    let mut parts = encoded.trim().split(DELIMITER);
    let version = parts
        .next()
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| malformed("unparseable version token"))?;

    let expected = if version == LEGACY_IDENTITY_VERSION {
        legacy_fields
    } else {
        current_fields
    };
    let fields: Vec<&str> = parts.take(expected).collect();
    if fields.len() < expected {
        return Err(malformed(format!(
            "version {} needs {} fields, found {}",
            version,
            expected,
            fields.len()
        )));
    }

    Ok((version, fields))
}

/// Encode a full identity, private halves included
pub fn encode(identity: &Identity) -> Zeroizing<String> {
    let enc = identity.encryption();
    let mut out = format!(
        "{}{d}{}{d}{}",
        identity.version(),
        encode_key(enc.public_key()),
        encode_key(enc.secret_key()),
        d = DELIMITER
    );
    if let Some(sig) = identity.signing() {
        out.push(DELIMITER);
        out.push_str(&encode_key(sig.public_key()));
        out.push(DELIMITER);
        out.push_str(&encode_key(sig.secret_key()));
    }
    Zeroizing::new(out)
}

/// Decode a full identity produced by [`encode`]
pub fn decode(encoded: &str) -> Result<Identity, IdentityError> {
    let (version, fields) = split_fields(encoded, 2, 4)?;

    let encryption = Keypair::from_parts(
        KeyType::X25519,
        decode_key(fields[0], "encryption public key")?,
        decode_key(fields[1], "encryption private key")?,
    )?;
    let signing = if version == LEGACY_IDENTITY_VERSION {
        None
    } else {
        Some(Keypair::from_parts(
            KeyType::Ed25519,
            decode_key(fields[2], "signing public key")?,
            decode_key(fields[3], "signing private key")?,
        )?)
    };

    Identity::new(version, encryption, signing)
}

/// Encode only the public half of an identity
pub fn encode_public(public: &PublicIdentity) -> String {
    let mut out = format!(
        "{}{}{}",
        public.version(),
        DELIMITER,
        encode_key(public.encryption_key())
    );
    if let Some(key) = public.signing_key() {
        out.push(DELIMITER);
        out.push_str(&encode_key(key));
    }
    out
}

pub fn decode_public(encoded: &str) -> Result<PublicIdentity, IdentityError> {
    let (version, fields) = split_fields(encoded, 1, 2)?;

    let encryption_key = decode_key(fields[0], "encryption public key")?;
    let signing_key = if version == LEGACY_IDENTITY_VERSION {
        None
    } else {
        Some(decode_key(fields[1], "signing public key")?)
    };

    PublicIdentity::new(version, encryption_key, signing_key)
}

/// Export an identity under a passphrase.
///
/// Every export uses a fresh salt, so two exports of the same identity differ.
pub fn export_encrypted(
    identity: &Identity,
    passphrase: &str,
) -> Result<ExportedIdentity, IdentityError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);

    let key = derive_passphrase_key(passphrase, &salt)?;
    let sealed = crypto::seal(&key, encode(identity).as_bytes())?;

    let mut blob = Vec::with_capacity(SALT_LEN + sealed.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&sealed);

    Ok(ExportedIdentity {
        public: encode_public(&identity.public_identity()),
        private: STANDARD.encode(blob),
    })
}

/// Import an identity exported by [`export_encrypted`].
///
/// A wrong passphrase fails the AEAD tag check and surfaces as
/// [`IdentityError::DecryptionFailed`].
pub fn import_encrypted(
    exported: &ExportedIdentity,
    passphrase: &str,
) -> Result<Identity, IdentityError> {
    let blob = STANDARD
        .decode(exported.private.trim())
        .map_err(|e| malformed(format!("export blob: invalid base64: {}", e)))?;
    if blob.len() <= SALT_LEN {
        return Err(malformed("export blob too short"));
    }
    let (salt, sealed) = blob.split_at(SALT_LEN);

    let key = derive_passphrase_key(passphrase, salt)?;
    let plaintext = Zeroizing::new(crypto::open(&key, sealed).map_err(|e| match e {
        CryptoError::AuthenticationFailed => IdentityError::DecryptionFailed,
        other => IdentityError::Crypto(other),
    })?);

    let encoded =
        std::str::from_utf8(&plaintext).map_err(|_| malformed("export payload is not UTF-8"))?;
    let identity = decode(encoded)?;

    if decode_public(&exported.public)? != identity.public_identity() {
        return Err(malformed("public half does not match the encrypted identity"));
    }

    Ok(identity)
}
