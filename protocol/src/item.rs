use crate::ids::ItemId;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Field name under which an item's id is exposed to predicates.
pub const ID_FIELD: &str = "_id";

/// One content item as returned by the query service.
///
/// `id` is the stable identity used for diffing and merging; `version`
/// changes on every edit and is never used for identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Highlighted fragments when the criteria asked for them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,
    /// Set when the item no longer belongs to the group but is kept on
    /// screen until the next applied refresh.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub gone: bool,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields = fields;
        self
    }

    /// Identity used for diffing. Items without a usable id have none and
    /// are never matched against anything.
    pub fn key(&self) -> Option<&ItemId> {
        self.id.as_ref().filter(|id| !id.is_blank())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field map as seen by predicates, with the id exposed as [`ID_FIELD`].
    pub fn indexed_fields(&self) -> Map<String, Value> {
        let mut fields = self.fields.clone();
        if let Some(id) = self.key() {
            fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        }
        fields
    }
}

/// One immutable answer from the query service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub items: Vec<Item>,
    /// Total matching items in the backend, which may exceed `items.len()`.
    pub total: usize,
}

impl ResultSnapshot {
    pub fn new(items: Vec<Item>, total: usize) -> Self {
        Self { items, total }
    }

    pub fn keys(&self) -> impl Iterator<Item = &ItemId> {
        self.items.iter().filter_map(Item::key)
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.key() == Some(id))
    }
}
