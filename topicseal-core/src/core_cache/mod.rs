//! Client-side caches
//!
//! Both caches apply the same single-flight rule: the first caller for an
//! entry installs a shared pending resolution and later callers await it.

pub mod debounce;
mod error;
mod topic_keys;
mod user_identities;

pub use debounce::{DebounceRound, Debouncer};
pub use error::CacheError;
pub use topic_keys::{KeySource, TopicKeyCache, TopicKeyMaterial};
pub use user_identities::UserIdentityCache;
