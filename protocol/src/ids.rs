use serde::Deserialize;
use serde::Serialize;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Blank identifiers never match anything.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a monitoring group (stage id, `<desk>:output`, saved search id, ...).
    GroupId
);
string_id!(
    /// Stable identity of a content item; distinct from its version token.
    ItemId
);
string_id!(StageId);
string_id!(DeskId);
string_id!(UserId);
string_id!(
    /// Highlight collection identifier.
    HighlightId
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ItemId::new("urn:item:1");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"urn:item:1\"");
        let back: ItemId = serde_json::from_str("\"urn:item:1\"").expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn whitespace_only_ids_are_blank() {
        assert!(StageId::new("  ").is_blank());
        assert!(!StageId::new("s1").is_blank());
    }
}
