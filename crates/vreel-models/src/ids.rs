//! Strongly typed identifiers.
//!
//! Every id is a transparent string newtype so it serializes as a bare string
//! in queue payloads and Firestore documents.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of an uploaded footage asset.
    AssetId
);
string_id!(
    /// Identifier of a template slot.
    SlotId
);
string_id!(
    /// Identifier of a viral template.
    TemplateId
);
string_id!(
    /// Identifier of the owning video record.
    VideoId
);
string_id!(
    /// Identifier of a render job (ours, not the engine's).
    RenderJobId
);
string_id!(
    /// Identifier of a queued job message.
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let id = AssetId::from_string("asset-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"asset-1\"");
        let back: AssetId = serde_json::from_str("\"asset-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(RenderJobId::new(), RenderJobId::new());
    }
}
