//! End-to-end encrypted topic key distribution
//!
//! Client side: the current user's identity ([`core_identity`]), caches of
//! topic keys and other users' public identities ([`core_cache`]) and the
//! encryption status resolver ([`core_status`]). Server side: key and
//! participant records plus the consistency reconciler ([`core_server`]).

pub mod config;
pub mod core_cache;
pub mod core_identity;
pub mod core_server;
pub mod core_status;
pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use logging::{init_logging, LogLevel};
pub use types::{TopicId, UserId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let _ = TopicId(1);
        assert_eq!(core_identity::CURRENT_IDENTITY_VERSION, 1);
    }
}
