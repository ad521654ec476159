//! Persistence contracts consumed by the hierarchy manager.
//!
//! Each method is a single-document operation: it either fully applies or
//! fails, but nothing spans two calls. Multi-step consistency is the
//! caller's job.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

pub trait ComponentStore {
    fn insert_component(&self, input: NewComponent) -> Result<Component>;

    fn find_component(&self, id: Uuid) -> Result<Component>;

    /// All components in insertion order.
    fn find_all_components(&self) -> Result<Vec<Component>>;

    /// Write every mutable field of `component`.
    ///
    /// The write only applies if the stored version still equals
    /// `component.version`; otherwise it fails with `StaleWrite`. On success
    /// the version and `updated_at` of `component` are advanced in place.
    fn update_component(&self, component: &mut Component) -> Result<()>;

    fn delete_component(&self, id: Uuid) -> Result<()>;

    /// The component whose description list contains `description_id`.
    fn find_description_owner(&self, description_id: Uuid) -> Result<Option<Uuid>>;
}

pub trait DescriptionStore {
    fn insert_description(&self, content: DescriptionContent) -> Result<Description>;

    fn find_description(&self, id: Uuid) -> Result<Description>;

    fn find_all_descriptions(&self) -> Result<Vec<Description>>;

    fn update_description(&self, id: Uuid, content: DescriptionContent) -> Result<Description>;

    /// Remove the record and return it as it was.
    fn delete_description(&self, id: Uuid) -> Result<Description>;
}

pub trait HistoryStore {
    fn insert_history(&self, entry: NewHistoryEntry) -> Result<HistoryEntry>;

    fn find_all_history(&self) -> Result<Vec<HistoryEntry>>;

    /// Entries for one component, oldest first. Unknown ids yield an empty list.
    fn find_history_by_component(&self, component_id: Uuid) -> Result<Vec<HistoryEntry>>;

    fn find_history(&self, id: Uuid) -> Result<HistoryEntry>;

    fn update_history(&self, id: Uuid, input: UpdateHistoryInput) -> Result<HistoryEntry>;

    fn delete_history(&self, id: Uuid) -> Result<()>;
}

/// Everything the hierarchy manager needs from persistence, plus the
/// relation-populating reads built on top of it.
pub trait CatalogStore: ComponentStore + DescriptionStore + HistoryStore {
    fn find_component_populated(&self, id: Uuid) -> Result<ComponentView> {
        let component = self.find_component(id)?;
        let mut children = HashMap::new();
        for child_id in &component.child_ids {
            match self.find_component(*child_id) {
                Ok(child) => {
                    children.insert(child.id, child.summary());
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        populate(self, component, &children)
    }

    /// Every component with references resolved, in repository order.
    fn find_all_populated(&self) -> Result<Vec<ComponentView>> {
        let components = self.find_all_components()?;
        let summaries: HashMap<Uuid, ComponentSummary> =
            components.iter().map(|c| (c.id, c.summary())).collect();

        components
            .into_iter()
            .map(|component| populate(self, component, &summaries))
            .collect()
    }
}

impl<T: ComponentStore + DescriptionStore + HistoryStore> CatalogStore for T {}

/// Resolve description ids to records and child ids to summaries.
///
/// References that no longer resolve are dropped from the view and logged;
/// the integrity check reports them in detail.
fn populate<S: DescriptionStore + ?Sized>(
    store: &S,
    component: Component,
    summaries: &HashMap<Uuid, ComponentSummary>,
) -> Result<ComponentView> {
    let mut descriptions = Vec::with_capacity(component.description_ids.len());
    for id in &component.description_ids {
        match store.find_description(*id) {
            Ok(description) => descriptions.push(description),
            Err(e) if e.is_not_found() => {
                tracing::warn!(component_id = %component.id, description_id = %id, "Dangling description reference");
            }
            Err(e) => return Err(e),
        }
    }

    let mut components = Vec::with_capacity(component.child_ids.len());
    for id in &component.child_ids {
        match summaries.get(id) {
            Some(summary) => components.push(summary.clone()),
            None => {
                tracing::warn!(component_id = %component.id, child_id = %id, "Dangling child reference");
            }
        }
    }

    Ok(ComponentView {
        id: component.id,
        name: component.name,
        kind: component.kind,
        status: component.status,
        parent_id: component.parent_id,
        descriptions,
        components,
        version: component.version,
        created_at: component.created_at,
        updated_at: component.updated_at,
    })
}
