use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A free-text annotation owned by exactly one component at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "description")]
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Description {
    pub fn content(&self) -> DescriptionContent {
        DescriptionContent {
            name: self.name.clone(),
            text: self.text.clone(),
        }
    }

    pub fn snapshot(&self) -> DescriptionSnapshot {
        DescriptionSnapshot {
            id: self.id,
            name: self.name.clone(),
            text: self.text.clone(),
        }
    }
}

/// One entry of a submitted description list.
///
/// With an `id` the entry refers to a stored description and any supplied
/// content replaces the stored content. Without an `id` both `name` and
/// `description` are required and a new record is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "description", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DescriptionInput {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            text: Some(text.into()),
        }
    }

    pub fn existing(id: Uuid) -> Self {
        Self {
            id: Some(id),
            name: None,
            text: None,
        }
    }

    pub fn edit(id: Uuid, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
            text: Some(text.into()),
        }
    }
}

/// Partial update of a single description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "description")]
    pub text: Option<String>,
}

/// The user-visible content of a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionContent {
    pub name: String,
    #[serde(rename = "description")]
    pub text: String,
}

/// A description as it looked when a history entry was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionSnapshot {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "description")]
    pub text: String,
}

/// Before/after content of an edited description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionEdit {
    pub id: Uuid,
    pub before: DescriptionContent,
    pub after: DescriptionContent,
}

/// Summary of a description reconciliation, recorded in history details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionChanges {
    #[serde(default)]
    pub edited: Vec<DescriptionEdit>,
    #[serde(default)]
    pub added: Vec<DescriptionSnapshot>,
    #[serde(default)]
    pub deleted: Vec<DescriptionSnapshot>,
}

impl DescriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.edited.is_empty() && self.added.is_empty() && self.deleted.is_empty()
    }
}
