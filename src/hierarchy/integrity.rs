//! Consistency scan over the whole catalog.
//!
//! Multi-document operations can leave one-sided links behind when a
//! compensation fails. This scan finds them so an operator can repair them.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::CatalogStore;
use crate::error::Result;
use crate::models::{Component, Description};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// The child names a parent that does not list it.
    ParentMismatch { child_id: Uuid, parent_id: Uuid },
    /// The parent lists a child that points elsewhere (or nowhere).
    OrphanedChildRef { parent_id: Uuid, child_id: Uuid },
    /// The parent lists a child that does not exist.
    DanglingChild { parent_id: Uuid, child_id: Uuid },
    /// The component names a parent that does not exist.
    DanglingParent { child_id: Uuid, parent_id: Uuid },
    DanglingDescription {
        component_id: Uuid,
        description_id: Uuid,
    },
    /// Following parent links from any member leads back to it.
    Cycle { members: Vec<Uuid> },
    /// A description listed by more than one component.
    SharedDescription {
        description_id: Uuid,
        component_ids: Vec<Uuid>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub components_checked: usize,
    pub descriptions_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub(crate) fn check<S: CatalogStore + ?Sized>(store: &S) -> Result<IntegrityReport> {
    let components = store.find_all_components()?;
    let descriptions = store.find_all_descriptions()?;
    let report = analyze(&components, &descriptions);

    if report.is_healthy() {
        tracing::debug!(components = report.components_checked, "Integrity check passed");
    } else {
        tracing::warn!(issues = report.issues.len(), "Integrity check found issues");
    }
    Ok(report)
}

fn analyze(components: &[Component], descriptions: &[Description]) -> IntegrityReport {
    let by_id: HashMap<Uuid, &Component> = components.iter().map(|c| (c.id, c)).collect();
    let known_descriptions: HashSet<Uuid> = descriptions.iter().map(|d| d.id).collect();
    let mut issues = Vec::new();
    let mut owners: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();

    for component in components {
        if let Some(parent_id) = component.parent_id {
            match by_id.get(&parent_id) {
                Some(parent) if !parent.child_ids.contains(&component.id) => {
                    issues.push(IntegrityIssue::ParentMismatch {
                        child_id: component.id,
                        parent_id,
                    });
                }
                Some(_) => {}
                None => issues.push(IntegrityIssue::DanglingParent {
                    child_id: component.id,
                    parent_id,
                }),
            }
        }

        for child_id in &component.child_ids {
            match by_id.get(child_id) {
                Some(child) if child.parent_id != Some(component.id) => {
                    issues.push(IntegrityIssue::OrphanedChildRef {
                        parent_id: component.id,
                        child_id: *child_id,
                    });
                }
                Some(_) => {}
                None => issues.push(IntegrityIssue::DanglingChild {
                    parent_id: component.id,
                    child_id: *child_id,
                }),
            }
        }

        for description_id in &component.description_ids {
            if !known_descriptions.contains(description_id) {
                issues.push(IntegrityIssue::DanglingDescription {
                    component_id: component.id,
                    description_id: *description_id,
                });
            }
            owners.entry(*description_id).or_default().push(component.id);
        }
    }

    issues.extend(find_cycles(components, &by_id));

    for (description_id, component_ids) in owners {
        if component_ids.len() > 1 {
            issues.push(IntegrityIssue::SharedDescription {
                description_id,
                component_ids,
            });
        }
    }

    IntegrityReport {
        components_checked: components.len(),
        descriptions_checked: descriptions.len(),
        issues,
    }
}

/// Each parent-link cycle, reported once with its members sorted.
fn find_cycles(components: &[Component], by_id: &HashMap<Uuid, &Component>) -> Vec<IntegrityIssue> {
    let mut reported: HashSet<Vec<Uuid>> = HashSet::new();
    let mut cycles = Vec::new();

    for start in components {
        let mut path = vec![start.id];
        let mut cursor = start.parent_id;
        while let Some(id) = cursor {
            if id == start.id {
                let mut members = path.clone();
                members.sort();
                if reported.insert(members.clone()) {
                    cycles.push(IntegrityIssue::Cycle { members });
                }
                break;
            }
            if path.contains(&id) {
                // A cycle further up; it is reported from one of its members.
                break;
            }
            path.push(id);
            cursor = by_id.get(&id).and_then(|c| c.parent_id);
        }
    }
    cycles
}
