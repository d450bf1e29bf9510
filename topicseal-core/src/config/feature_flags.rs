//! Capability flags the site declares for end-to-end encryption

use serde::{Deserialize, Serialize};

/// Feature flags consumed by the encryption status resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Site-wide switch for encrypted topics
    pub encryption_enabled: bool,

    /// Groups allowed to enable encryption; empty means everyone
    pub allowed_groups: Vec<String>,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            encryption_enabled: true,
            allowed_groups: Vec::new(),
        }
    }
}

impl FeatureFlags {
    /// Whether a user in `user_groups` passes the group restriction
    pub fn allows_groups<S: AsRef<str>>(&self, user_groups: &[S]) -> bool {
        self.allowed_groups.is_empty()
            || user_groups
                .iter()
                .any(|g| self.allowed_groups.iter().any(|allowed| allowed == g.as_ref()))
    }

    /// Parse a comma separated group list, as used by environment overrides
    pub fn parse_groups(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        let flags = FeatureFlags::default();
        assert!(flags.encryption_enabled);
        assert!(flags.allowed_groups.is_empty());
        assert!(flags.allows_groups::<&str>(&[]));
    }

    #[test]
    fn test_group_restriction() {
        let flags = FeatureFlags {
            encryption_enabled: true,
            allowed_groups: vec!["staff".to_string(), "trust_level_2".to_string()],
        };

        assert!(flags.allows_groups(&["everyone", "staff"]));
        assert!(!flags.allows_groups(&["everyone"]));
        assert!(!flags.allows_groups::<&str>(&[]));
    }

    #[test]
    fn test_parse_groups() {
        assert_eq!(
            FeatureFlags::parse_groups(" staff, ,admins "),
            vec!["staff".to_string(), "admins".to_string()]
        );
        assert!(FeatureFlags::parse_groups("").is_empty());
    }
}
