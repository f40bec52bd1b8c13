use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ResourceKind;

/// Kind of change a [`ChangeEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record mutation, as carried on the wire in both directions.
///
/// Outbound events announce local writes with a `{ id, name }` summary
/// payload. Inbound events originate elsewhere and carry whatever payload
/// the mutation needs (a full record for create/update).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(rename = "resourceType")]
    pub resource: ResourceKind,
    pub id: String,
    pub payload: Value,
}

impl ChangeEvent {
    pub fn new(
        kind: ChangeKind,
        resource: ResourceKind,
        id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            resource,
            id: id.into(),
            payload,
        }
    }

    /// Announcement for a created record.
    pub fn created(resource: ResourceKind, id: &str, name: &str) -> Self {
        Self::summary(ChangeKind::Create, resource, id, name)
    }

    /// Announcement for an updated record.
    pub fn updated(resource: ResourceKind, id: &str, name: &str) -> Self {
        Self::summary(ChangeKind::Update, resource, id, name)
    }

    /// Announcement for a deleted record.
    pub fn deleted(resource: ResourceKind, id: &str, name: &str) -> Self {
        Self::summary(ChangeKind::Delete, resource, id, name)
    }

    fn summary(kind: ChangeKind, resource: ResourceKind, id: &str, name: &str) -> Self {
        Self {
            kind,
            resource,
            id: id.to_string(),
            payload: serde_json::json!({ "id": id, "name": name }),
        }
    }
}
