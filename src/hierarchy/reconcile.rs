//! Diffing a submitted description list against a component's current one.
//!
//! Planning is pure: it decides which descriptions are edited, created,
//! adopted or deleted, and the final order, without touching the store.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::models::{Description, DescriptionContent, DescriptionInput};

/// One position in the reconciled description list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    /// An already-stored description, kept or adopted.
    Existing(Uuid),
    /// A description to be created.
    New(DescriptionContent),
}

#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub slots: Vec<Slot>,
    /// Owned descriptions whose content changes: `(before, new content)`.
    pub edited: Vec<(Description, DescriptionContent)>,
    /// Descriptions taken over from outside this component, with new content
    /// when the submission changed it.
    pub adopted: Vec<(Description, Option<DescriptionContent>)>,
    /// Owned descriptions that are no longer listed.
    pub deleted: Vec<Description>,
}

impl Plan {
    pub fn new_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::New(_)))
            .count()
    }
}

/// Plan the transition from `current` to `submitted`.
///
/// `adoptable` must hold every description referenced by id in `submitted`
/// that is not already in `current`; the caller resolves and vets those.
pub(crate) fn plan(
    current: &[Description],
    adoptable: &HashMap<Uuid, Description>,
    submitted: Vec<DescriptionInput>,
) -> Result<Plan> {
    let owned: HashMap<Uuid, &Description> = current.iter().map(|d| (d.id, d)).collect();
    let mut seen = HashSet::new();
    let mut plan = Plan::default();

    for (position, input) in submitted.into_iter().enumerate() {
        match input.id {
            Some(id) => {
                if !seen.insert(id) {
                    return Err(CatalogError::validation(format!(
                        "description {} is listed more than once",
                        id
                    )));
                }

                let (stored, is_owned) = match owned.get(&id) {
                    Some(stored) => (*stored, true),
                    None => match adoptable.get(&id) {
                        Some(stored) => (stored, false),
                        None => {
                            return Err(CatalogError::not_found(
                                crate::error::Entity::Description,
                                id,
                            ))
                        }
                    },
                };

                let content = merged_content(stored, input.name, input.text, position)?;
                let changed = content != stored.content();

                if is_owned {
                    if changed {
                        plan.edited.push((stored.clone(), content));
                    }
                } else {
                    plan.adopted
                        .push((stored.clone(), changed.then_some(content)));
                }
                plan.slots.push(Slot::Existing(id));
            }
            None => {
                let name = required(input.name, "name", position)?;
                let text = required(input.text, "description", position)?;
                plan.slots.push(Slot::New(DescriptionContent { name, text }));
            }
        }
    }

    plan.deleted = current
        .iter()
        .filter(|d| !seen.contains(&d.id))
        .cloned()
        .collect();

    Ok(plan)
}

fn merged_content(
    stored: &Description,
    name: Option<String>,
    text: Option<String>,
    position: usize,
) -> Result<DescriptionContent> {
    let name = match name {
        Some(name) => non_blank(name, "name", position)?,
        None => stored.name.clone(),
    };
    let text = match text {
        Some(text) => non_blank(text, "description", position)?,
        None => stored.text.clone(),
    };
    Ok(DescriptionContent { name, text })
}

fn required(value: Option<String>, field: &str, position: usize) -> Result<String> {
    match value {
        Some(value) => non_blank(value, field, position),
        None => Err(CatalogError::validation(format!(
            "description at position {} is missing '{}'",
            position, field
        ))),
    }
}

fn non_blank(value: String, field: &str, position: usize) -> Result<String> {
    if value.trim().is_empty() {
        return Err(CatalogError::validation(format!(
            "description at position {} has a blank '{}'",
            position, field
        )));
    }
    Ok(value)
}
