//! Strongly typed identifiers.
//!
//! Newtype wrappers around [`Uuid`] so that different entity IDs cannot be
//! confused at compile time. All IDs serialize as plain UUID strings.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Identifier for a customer organization.
    ///
    /// Every piece of tenant-scoped data (SSO configurations, memberships,
    /// sessions) is keyed by an `OrgId`.
    ///
    /// # Example
    ///
    /// ```
    /// use loopline_core::OrgId;
    ///
    /// let org_id = OrgId::new();
    /// let parsed: OrgId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
    /// assert_ne!(org_id, parsed);
    /// ```
    OrgId
);

define_id!(
    /// Identifier for a user account.
    UserId
);

define_id!(
    /// Identifier for a team within an organization.
    TeamId
);

define_id!(
    /// Identifier for an SSO provider configuration.
    SsoConfigId
);

define_id!(
    /// Identifier for an SSO session issued after a successful federation.
    SsoSessionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_valid_id() {
        let id = OrgId::new();
        let id_str = id.to_string();
        // UUID format: 8-4-4-4-12 hex digits
        assert_eq!(id_str.len(), 36);
        assert!(id_str.contains('-'));
    }

    #[test]
    fn test_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = SsoConfigId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn test_display_returns_uuid_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = OrgId::from_uuid(uuid);
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = UserId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = SsoSessionId::new();
        let json = serde_json::to_string(&original).unwrap();
        let deserialized: SsoSessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_parse_invalid_uuid_returns_error() {
        let result: std::result::Result<TeamId, _> = "not-a-uuid".parse();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "TeamId");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_can_use_as_hashmap_key() {
        use std::collections::HashMap;

        let mut map: HashMap<SsoConfigId, String> = HashMap::new();
        let id1 = SsoConfigId::new();
        let id2 = SsoConfigId::new();

        map.insert(id1, "acme".to_string());
        map.insert(id2, "globex".to_string());

        assert_eq!(map.get(&id1), Some(&"acme".to_string()));
        assert_eq!(map.get(&id2), Some(&"globex".to_string()));
    }

    #[test]
    fn test_copy_semantics() {
        let id1 = UserId::new();
        let id2 = id1; // Copy
        assert_eq!(id1, id2);
    }
}
