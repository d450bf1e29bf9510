//! Identity management module
//!
//! API that we are exposing:
//! - `Identity` / `PublicIdentity` -> versioned encryption (+ signing) keypairs
//! - `codec` -> `$`-delimited transport strings and passphrase-protected exports
//! - `IdentityManager` -> the current user's identity slot (load, activate, upgrade)
//! - `Keystore` -> local persistent store the manager writes through
//! - `KeyServer` / `IdentityLookup` -> remote capabilities

pub mod codec;
mod error;
mod identity;
pub mod keypair;
pub mod keystore;
mod manager;
mod remote;

pub use codec::{
    decode, decode_public, encode, encode_public, export_encrypted, import_encrypted,
    ExportedIdentity,
};
pub use error::IdentityError;
pub use identity::{Identity, PublicIdentity, CURRENT_IDENTITY_VERSION, LEGACY_IDENTITY_VERSION};
pub use keypair::{KeyType, Keypair};
pub use keystore::{FileKeystore, Keystore, KeystoreError, MemoryKeystore};
pub use manager::{IdentityManager, KeyLabel, LabeledPrivateKey, ServerKeyMaterial};
pub use remote::{IdentityLookup, KeyServer, KeySubmission, RemoteError};
