//! Encryption status resolution
//!
//! Pure functions; the inputs come from server-declared capability flags and
//! from whether the identity manager holds a local identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::FeatureFlags;

/// Encryption state of the current user on this device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionStatus {
    /// Feature off, or the user never set up keys
    Disabled,
    /// Keys exist server-side but this device has no identity yet
    Enabled,
    /// Keys exist and this device can decrypt
    Active,
}

impl fmt::Display for EncryptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EncryptionStatus::Disabled => "disabled",
            EncryptionStatus::Enabled => "enabled",
            EncryptionStatus::Active => "active",
        })
    }
}

/// Server-declared capability flags for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub encryption_enabled: bool,
    pub has_public_key: bool,
    pub has_private_key: bool,
}

impl CapabilityFlags {
    /// Both halves of the user's key material are on the server
    pub fn has_server_keys(&self) -> bool {
        self.has_public_key && self.has_private_key
    }
}

pub fn status(flags: &CapabilityFlags, identity_present: bool) -> EncryptionStatus {
    if !flags.encryption_enabled || !flags.has_server_keys() {
        EncryptionStatus::Disabled
    } else if !identity_present {
        EncryptionStatus::Enabled
    } else {
        EncryptionStatus::Active
    }
}

/// Whether the user may turn encryption on (or already has).
///
/// An empty `allowed_groups` means no group restriction.
pub fn can_enable<S: AsRef<str>>(
    status: EncryptionStatus,
    feature_enabled: bool,
    allowed_groups: &[S],
    user_groups: &[S],
) -> bool {
    if status != EncryptionStatus::Disabled {
        return true;
    }
    feature_enabled
        && (allowed_groups.is_empty()
            || user_groups
                .iter()
                .any(|g| allowed_groups.iter().any(|a| a.as_ref() == g.as_ref())))
}

/// [`can_enable`] with the site's configured feature flags
pub fn can_enable_with<S: AsRef<str>>(
    status: EncryptionStatus,
    features: &FeatureFlags,
    user_groups: &[S],
) -> bool {
    status != EncryptionStatus::Disabled
        || (features.encryption_enabled && features.allows_groups(user_groups))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(enabled: bool, keys: bool) -> CapabilityFlags {
        CapabilityFlags {
            encryption_enabled: enabled,
            has_public_key: keys,
            has_private_key: keys,
        }
    }

    #[test]
    fn test_status_resolution() {
        assert_eq!(status(&flags(false, true), true), EncryptionStatus::Disabled);
        assert_eq!(status(&flags(false, false), false), EncryptionStatus::Disabled);
        assert_eq!(status(&flags(true, false), true), EncryptionStatus::Disabled);
        assert_eq!(status(&flags(true, true), false), EncryptionStatus::Enabled);
        assert_eq!(status(&flags(true, true), true), EncryptionStatus::Active);
    }

    #[test]
    fn test_half_server_keys_is_disabled() {
        let only_public = CapabilityFlags {
            encryption_enabled: true,
            has_public_key: true,
            has_private_key: false,
        };
        assert_eq!(status(&only_public, true), EncryptionStatus::Disabled);
    }

    #[test]
    fn test_can_enable() {
        let none: [&str; 0] = [];

        assert!(can_enable(EncryptionStatus::Active, false, &["staff"], &none));
        assert!(can_enable(EncryptionStatus::Enabled, false, &none, &none));

        assert!(!can_enable(EncryptionStatus::Disabled, false, &none, &none));
        assert!(can_enable(EncryptionStatus::Disabled, true, &none, &none));
        assert!(can_enable(EncryptionStatus::Disabled, true, &["staff"], &["staff", "mods"]));
        assert!(!can_enable(EncryptionStatus::Disabled, true, &["staff"], &["mods"]));
    }

    #[test]
    fn test_can_enable_with_feature_flags() {
        let features = FeatureFlags {
            encryption_enabled: true,
            allowed_groups: vec!["staff".to_string()],
        };

        assert!(can_enable_with(EncryptionStatus::Disabled, &features, &["staff"]));
        assert!(!can_enable_with(EncryptionStatus::Disabled, &features, &["guests"]));
        assert!(can_enable_with(EncryptionStatus::Active, &features, &["guests"]));
    }
}
