use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::description::{Description, DescriptionInput};

/// A node in the asset hierarchy.
///
/// Components are stored as self-contained documents: the ordered list of
/// owned description ids and the set of child ids live on the component
/// itself, while `parent_id` points back up the tree. The two directions are
/// kept in agreement by the hierarchy manager, never by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ComponentStatus,
    #[serde(rename = "parent")]
    pub parent_id: Option<Uuid>,
    #[serde(rename = "descriptions")]
    pub description_ids: Vec<Uuid>,
    #[serde(rename = "components")]
    pub child_ids: Vec<Uuid>,
    /// Bumped by the store on every successful write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Component {
    pub fn summary(&self) -> ComponentSummary {
        ComponentSummary {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind.clone(),
            status: self.status,
        }
    }
}

/// Whether a component is still in service.
///
/// The legacy labels `activo` and `de baja` are accepted on input.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    #[default]
    #[serde(alias = "activo")]
    Active,
    #[serde(alias = "de baja")]
    Decommissioned,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Decommissioned => "decommissioned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" | "activo" => Some(Self::Active),
            "decommissioned" | "de baja" => Some(Self::Decommissioned),
            _ => None,
        }
    }
}

/// Fields for a component row that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewComponent {
    pub name: String,
    pub kind: String,
    pub status: ComponentStatus,
    pub parent_id: Option<Uuid>,
    pub description_ids: Vec<Uuid>,
    pub child_ids: Vec<Uuid>,
}

/// Minimal component info embedded in populated views and history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ComponentStatus,
}

/// A component with its description and child references resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentView {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ComponentStatus,
    #[serde(rename = "parent")]
    pub parent_id: Option<Uuid>,
    pub descriptions: Vec<Description>,
    pub components: Vec<ComponentSummary>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentView {
    pub fn child_ids(&self) -> Vec<Uuid> {
        self.components.iter().map(|c| c.id).collect()
    }
}

/// Input for creating a new component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateComponentInput {
    /// Missing and blank names are both rejected by validation.
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Defaults to `Active` if not specified.
    #[serde(default)]
    pub status: Option<ComponentStatus>,
    /// Inline descriptions to create, or references to existing unowned ones.
    #[serde(default)]
    pub descriptions: Vec<DescriptionInput>,
    /// Parent to link the new component under.
    #[serde(default, rename = "parent")]
    pub parent_id: Option<Uuid>,
}

impl CreateComponentInput {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }
}

/// Input for updating a component. Absent fields are left untouched.
///
/// `parent` distinguishes "absent" from an explicit `null`, which detaches the
/// component from its current parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateComponentInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<ComponentStatus>,
    /// Replacement description list, in display order.
    #[serde(default)]
    pub descriptions: Option<Vec<DescriptionInput>>,
    #[serde(
        default,
        rename = "parent",
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<Uuid>>,
}

impl UpdateComponentInput {
    /// Split the input into one patch per present field.
    pub fn into_patches(self) -> Vec<ComponentPatch> {
        let mut patches = Vec::new();
        if let Some(name) = self.name {
            patches.push(ComponentPatch::Name(name));
        }
        if let Some(kind) = self.kind {
            patches.push(ComponentPatch::Kind(kind));
        }
        if let Some(status) = self.status {
            patches.push(ComponentPatch::Status(status));
        }
        if let Some(descriptions) = self.descriptions {
            patches.push(ComponentPatch::Descriptions(descriptions));
        }
        if let Some(parent) = self.parent_id {
            patches.push(ComponentPatch::Parent(parent));
        }
        patches
    }
}

/// One field-level change to a component.
#[derive(Debug, Clone)]
pub enum ComponentPatch {
    Name(String),
    Kind(String),
    Status(ComponentStatus),
    Descriptions(Vec<DescriptionInput>),
    Parent(Option<Uuid>),
}

/// A component with its nested children, used for tree responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentTreeNode {
    #[serde(flatten)]
    pub component: ComponentSummary,
    pub children: Vec<ComponentTreeNode>,
}

/// Returned when a component has been removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteConfirmation {
    pub message: String,
    pub id: Uuid,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
