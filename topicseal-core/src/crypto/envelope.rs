//! Topic key wrapping for a single participant
//!
//! X25519 ephemeral-static ECDH, HKDF-SHA256 and AES-256-GCM.
//! Wire format (base64): `ephemeral_pk (32) || nonce (12) || ciphertext + tag`

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::aead::{open, seal};
use super::{CryptoError, TopicKey};

const WRAP_INFO: &[u8] = b"topicseal topic key wrap v1";
const EPHEMERAL_LEN: usize = 32;

fn derive_wrapping_key(
    shared_secret: &[u8],
    ephemeral_pk: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(ephemeral_pk), shared_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(WRAP_INFO, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {}", e)))?;
    Ok(key)
}

/// Wrap `key` for the holder of `recipient_public` (an X25519 public key)
pub fn wrap_key(recipient_public: &[u8; 32], key: &TopicKey) -> Result<String, CryptoError> {
    let recipient = PublicKey::from(*recipient_public);

    let mut ephemeral_bytes = Zeroizing::new([0u8; 32]);
    rand::rng().fill_bytes(&mut ephemeral_bytes[..]);
    let ephemeral_sk = StaticSecret::from(*ephemeral_bytes);
    let ephemeral_pk = PublicKey::from(&ephemeral_sk);

    let shared = ephemeral_sk.diffie_hellman(&recipient);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("low-order recipient public key".to_string()));
    }
    let wrapping_key = derive_wrapping_key(shared.as_bytes(), ephemeral_pk.as_bytes())?;

    let sealed = seal(&wrapping_key, key.as_bytes())?;
    let mut out = Vec::with_capacity(EPHEMERAL_LEN + sealed.len());
    out.extend_from_slice(ephemeral_pk.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(STANDARD.encode(out))
}

/// Unwrap a topic key with the recipient's X25519 private key
pub fn unwrap_key(recipient_private: &[u8; 32], wrapped: &str) -> Result<TopicKey, CryptoError> {
    let data = STANDARD
        .decode(wrapped.trim())
        .map_err(|e| CryptoError::Malformed(format!("invalid base64: {}", e)))?;
    if data.len() <= EPHEMERAL_LEN {
        return Err(CryptoError::Malformed("wrapped key too short".to_string()));
    }

    let (ephemeral, sealed) = data.split_at(EPHEMERAL_LEN);
    let mut ephemeral_bytes = [0u8; EPHEMERAL_LEN];
    ephemeral_bytes.copy_from_slice(ephemeral);
    let ephemeral_pk = PublicKey::from(ephemeral_bytes);

    let recipient_sk = StaticSecret::from(*recipient_private);
    let shared = recipient_sk.diffie_hellman(&ephemeral_pk);
    let wrapping_key = derive_wrapping_key(shared.as_bytes(), ephemeral)?;

    let raw = Zeroizing::new(open(&wrapping_key, sealed)?);
    TopicKey::from_slice(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> ([u8; 32], [u8; 32]) {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        let public = PublicKey::from(&StaticSecret::from(secret));
        (*public.as_bytes(), secret)
    }

    #[test]
    fn test_wrap_unwrap() {
        let (public, secret) = recipient();
        let key = TopicKey::generate();

        let wrapped = wrap_key(&public, &key).unwrap();
        assert_eq!(unwrap_key(&secret, &wrapped).unwrap(), key);
    }

    #[test]
    fn test_other_recipient_cannot_unwrap() {
        let (public, _) = recipient();
        let (_, other_secret) = recipient();

        let wrapped = wrap_key(&public, &TopicKey::generate()).unwrap();
        assert_eq!(
            unwrap_key(&other_secret, &wrapped),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_rejects_all_zero_public_key() {
        let result = wrap_key(&[0u8; 32], &TopicKey::generate());
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_short_input_is_malformed() {
        let (_, secret) = recipient();
        assert!(matches!(unwrap_key(&secret, "AAAA"), Err(CryptoError::Malformed(_))));
    }
}
