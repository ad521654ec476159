use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::component::ComponentSummary;
use super::description::DescriptionChanges;

/// An append-only audit record of one mutating operation.
///
/// The component's name and type are copied into the entry when it is
/// written, so history stays readable after the component is renamed or
/// deleted. The hierarchy manager only ever appends entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub component_id: Uuid,
    pub component_name: String,
    pub component_type: String,
    /// Opaque identity of whoever performed the operation.
    pub actor_id: String,
    pub action: HistoryAction,
    /// Present only for association actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcomponent: Option<SubcomponentSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HistoryDetails>,
    pub created_at: DateTime<Utc>,
}

/// The fixed vocabulary of audited actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HistoryAction {
    #[serde(rename = "create component")]
    CreateComponent,
    #[serde(rename = "edit component")]
    EditComponent,
    #[serde(rename = "delete component")]
    DeleteComponent,
    #[serde(rename = "associate subcomponent")]
    AssociateSubcomponent,
    #[serde(rename = "disassociate subcomponent")]
    DisassociateSubcomponent,
    #[serde(rename = "add description")]
    AddDescription,
    #[serde(rename = "edit description")]
    EditDescription,
    #[serde(rename = "delete description")]
    DeleteDescription,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateComponent => "create component",
            Self::EditComponent => "edit component",
            Self::DeleteComponent => "delete component",
            Self::AssociateSubcomponent => "associate subcomponent",
            Self::DisassociateSubcomponent => "disassociate subcomponent",
            Self::AddDescription => "add description",
            Self::EditDescription => "edit description",
            Self::DeleteDescription => "delete description",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create component" => Some(Self::CreateComponent),
            "edit component" => Some(Self::EditComponent),
            "delete component" => Some(Self::DeleteComponent),
            "associate subcomponent" => Some(Self::AssociateSubcomponent),
            "disassociate subcomponent" => Some(Self::DisassociateSubcomponent),
            "add description" => Some(Self::AddDescription),
            "edit description" => Some(Self::EditDescription),
            "delete description" => Some(Self::DeleteDescription),
            _ => None,
        }
    }

    pub fn is_association(&self) -> bool {
        matches!(
            self,
            Self::AssociateSubcomponent | Self::DisassociateSubcomponent
        )
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the subcomponent involved in an association action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcomponentSnapshot {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&ComponentSummary> for SubcomponentSnapshot {
    fn from(summary: &ComponentSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name.clone(),
            kind: summary.kind.clone(),
        }
    }
}

/// Field-level before/after values for an audited change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDetails {
    /// Scalar field changes keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, FieldChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<DescriptionChanges>,
}

impl HistoryDetails {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.descriptions.as_ref().map_or(true, |d| d.is_empty())
    }

    pub fn from_descriptions(descriptions: DescriptionChanges) -> Self {
        Self {
            changes: BTreeMap::new(),
            descriptions: Some(descriptions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// Input for appending a history entry.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub component: ComponentSummary,
    pub actor_id: String,
    pub action: HistoryAction,
    pub subcomponent: Option<SubcomponentSnapshot>,
    pub details: Option<HistoryDetails>,
}

/// Administrative correction of a stored history entry.
///
/// Only the transport layer exposes this; the hierarchy manager never
/// rewrites history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateHistoryInput {
    #[serde(default)]
    pub action: Option<HistoryAction>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub details: Option<HistoryDetails>,
}
