use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::CryptoError;

/// Salt length for passphrase derivation (16 bytes = 128 bits)
pub const SALT_LEN: usize = 16;

/// Derive a 256-bit key from a passphrase with Argon2id.
///
/// The comparison of the derived key happens inside the AEAD tag check, so
/// timing does not depend on passphrase content beyond what Argon2 exposes.
pub fn derive_passphrase_key(
    passphrase: &str,
    salt: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // iterations
        1,         // lanes
        Some(32),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(key)
}
