//! The component hierarchy manager.
//!
//! [`Hierarchy`] is the only writer of components and history. Every
//! mutating operation follows the same shape:
//!
//! 1. Load and validate everything up front, so most failures happen before
//!    any write.
//! 2. Apply the writes through a [`saga::Saga`], which undoes completed steps
//!    if a later one fails.
//! 3. Hand the resulting events to the audit recorder in a single call.
//!
//! Parent/child links are only ever changed through [`links::set_parent`].

mod audit;
mod integrity;
mod links;
mod reconcile;
mod saga;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::json;
use uuid::Uuid;

use crate::db::{CatalogStore, Database};
use crate::error::{CatalogError, Entity, Result};
use crate::models::*;
use crate::search;

use audit::{AuditEvent, AuditRecorder};
use reconcile::{Plan, Slot};
use saga::Saga;

pub use integrity::{IntegrityIssue, IntegrityReport};

/// Hierarchy manager over any [`CatalogStore`].
#[derive(Clone)]
pub struct Hierarchy<S = Database> {
    store: S,
}

/// Result of executing a reconciliation plan, before released descriptions
/// are deleted.
struct AppliedPlan {
    ids: Vec<Uuid>,
    changes: DescriptionChanges,
    released: Vec<Description>,
}

impl<S: CatalogStore> Hierarchy<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn get(&self, id: Uuid) -> Result<ComponentView> {
        self.store.find_component_populated(id)
    }

    pub fn list(&self) -> Result<Vec<ComponentView>> {
        self.store.find_all_populated()
    }

    /// Components matching every whitespace-separated term of `query`.
    pub fn search(&self, query: &str) -> Result<Vec<ComponentView>> {
        let components = self.store.find_all_populated()?;
        Ok(search::filter(components, query))
    }

    pub fn history(&self, component_id: Uuid) -> Result<Vec<HistoryEntry>> {
        self.store.find_history_by_component(component_id)
    }

    /// The whole catalog as nested nodes, roots in repository order.
    pub fn tree(&self) -> Result<Vec<ComponentTreeNode>> {
        let components = self.store.find_all_components()?;
        let by_id: HashMap<Uuid, &Component> = components.iter().map(|c| (c.id, c)).collect();

        fn build(
            component: &Component,
            by_id: &HashMap<Uuid, &Component>,
            placed: &mut HashSet<Uuid>,
        ) -> ComponentTreeNode {
            let mut children = Vec::new();
            for child_id in &component.child_ids {
                if let Some(child) = by_id.get(child_id) {
                    if placed.insert(child.id) {
                        children.push(build(child, by_id, placed));
                    }
                }
            }
            ComponentTreeNode {
                component: component.summary(),
                children,
            }
        }

        let mut placed = HashSet::new();
        let mut roots = Vec::new();
        for component in &components {
            let is_root = component
                .parent_id
                .map_or(true, |parent_id| !by_id.contains_key(&parent_id));
            if is_root && placed.insert(component.id) {
                roots.push(build(component, &by_id, &mut placed));
            }
        }
        Ok(roots)
    }

    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        integrity::check(&self.store)
    }

    // ============================================================
    // Component lifecycle
    // ============================================================

    pub fn create(&self, input: CreateComponentInput, actor: &str) -> Result<ComponentView> {
        let name = required_field(input.name, "name")?;
        let kind = required_field(input.kind, "type")?;
        let mut parent = input
            .parent_id
            .map(|id| self.store.find_component(id))
            .transpose()?;
        let adoptable = self.resolve_adoptable(None, &[], &input.descriptions)?;
        let plan = reconcile::plan(&[], &adoptable, input.descriptions)?;
        let status = input.status.unwrap_or_default();

        let (component, changes) = Saga::new("create component", &self.store).run(|saga| {
            let mut component = saga.insert_component(NewComponent {
                name,
                kind,
                status,
                parent_id: None,
                description_ids: Vec::new(),
                child_ids: Vec::new(),
            })?;

            let applied = apply_plan(saga, plan)?;
            if !applied.ids.is_empty() {
                component.description_ids = applied.ids;
                saga.update_component(&mut component)?;
            }

            if let Some(parent) = parent.as_mut() {
                links::set_parent(saga, &mut component, Some(parent))?;
            }
            Ok((component, applied.changes))
        })?;

        tracing::info!(component_id = %component.id, name = %component.name, "Created component");

        let mut events = vec![AuditEvent::new(HistoryAction::CreateComponent, &component)
            .with_details(HistoryDetails::from_descriptions(changes))];
        if let Some(parent) = &parent {
            events.push(AuditEvent::association(
                HistoryAction::AssociateSubcomponent,
                parent,
                &component,
            ));
        }
        self.record_audit(actor, events);

        self.get(component.id)
    }

    pub fn update(
        &self,
        id: Uuid,
        input: UpdateComponentInput,
        actor: &str,
    ) -> Result<ComponentView> {
        let mut component = self.store.find_component(id)?;
        let current = self.load_descriptions(&component)?;

        let mut changes = BTreeMap::new();
        let mut description_plan: Option<Plan> = None;
        let mut parent_patch: Option<Option<Uuid>> = None;

        for patch in input.into_patches() {
            match patch {
                ComponentPatch::Name(name) => {
                    let name = required_field(name, "name")?;
                    if name != component.name {
                        changes.insert("name".to_string(), field_change(&component.name, &name));
                        component.name = name;
                    }
                }
                ComponentPatch::Kind(kind) => {
                    let kind = required_field(kind, "type")?;
                    if kind != component.kind {
                        changes.insert("type".to_string(), field_change(&component.kind, &kind));
                        component.kind = kind;
                    }
                }
                ComponentPatch::Status(status) => {
                    if status != component.status {
                        changes.insert(
                            "status".to_string(),
                            field_change(component.status.as_str(), status.as_str()),
                        );
                        component.status = status;
                    }
                }
                ComponentPatch::Descriptions(submitted) => {
                    let adoptable = self.resolve_adoptable(
                        Some(id),
                        &component.description_ids,
                        &submitted,
                    )?;
                    description_plan = Some(reconcile::plan(&current, &adoptable, submitted)?);
                }
                ComponentPatch::Parent(parent_id) => parent_patch = Some(parent_id),
            }
        }

        // Outer `Some` means the parent changes; inner is the new parent.
        let mut new_parent: Option<Option<Component>> = match parent_patch {
            Some(Some(parent_id)) if Some(parent_id) != component.parent_id => {
                if parent_id == id {
                    return Err(CatalogError::validation(format!(
                        "component {} cannot be its own parent",
                        id
                    )));
                }
                let parent = self.store.find_component(parent_id)?;
                links::ensure_acyclic(&self.store, &parent, id)?;
                Some(Some(parent))
            }
            Some(None) if component.parent_id.is_some() => Some(None),
            _ => None,
        };

        let scalar_changed = !changes.is_empty();
        let ids_before = component.description_ids.clone();
        let parent_before = component.parent_id;

        let (summary, former_parent) = Saga::new("edit component", &self.store).run(|saga| {
            let mut summary = DescriptionChanges::default();
            let mut released = Vec::new();
            if let Some(plan) = description_plan {
                let applied = apply_plan(saga, plan)?;
                component.description_ids = applied.ids;
                summary = applied.changes;
                released = applied.released;
            }

            if scalar_changed || component.description_ids != ids_before {
                saga.update_component(&mut component)?;
            }

            let mut former_parent = None;
            if let Some(target) = new_parent.as_mut() {
                let link = links::set_parent(saga, &mut component, target.as_mut())?;
                former_parent = link.former_parent;
            }

            summary.deleted = delete_released(saga, released);
            Ok((summary, former_parent))
        })?;

        if component.description_ids != ids_before && summary.is_empty() {
            changes.insert(
                "descriptions".to_string(),
                field_change(&ids_before, &component.description_ids),
            );
        }
        if component.parent_id != parent_before {
            changes.insert(
                "parent".to_string(),
                field_change(&parent_before, &component.parent_id),
            );
        }

        let details = HistoryDetails {
            changes,
            descriptions: (!summary.is_empty()).then_some(summary),
        };

        if details.is_empty() {
            tracing::debug!(component_id = %id, "Update changed nothing; no history recorded");
            return self.get(id);
        }

        let mut events = Vec::new();
        if let Some(former) = &former_parent {
            events.push(AuditEvent::association(
                HistoryAction::DisassociateSubcomponent,
                former,
                &component,
            ));
        }
        if let Some(Some(parent)) = &new_parent {
            events.push(AuditEvent::association(
                HistoryAction::AssociateSubcomponent,
                parent,
                &component,
            ));
        }
        events.push(AuditEvent::new(HistoryAction::EditComponent, &component).with_details(details));
        self.record_audit(actor, events);

        self.get(id)
    }

    /// Delete a leaf component, detaching it from its parent first.
    ///
    /// Descriptions owned by the component are retained.
    pub fn delete(&self, id: Uuid, actor: &str) -> Result<DeleteConfirmation> {
        let mut component = self.store.find_component(id)?;
        let mut live_children = 0;
        for child_id in &component.child_ids {
            match self.store.find_component(*child_id) {
                Ok(_) => live_children += 1,
                Err(e) if e.is_not_found() => tracing::warn!(
                    component_id = %id,
                    child_id = %child_id,
                    "Ignoring dangling child reference"
                ),
                Err(e) => return Err(e),
            }
        }
        if live_children > 0 {
            return Err(CatalogError::conflict(format!(
                "cannot delete a component with subcomponents ({} has {})",
                id, live_children
            )));
        }

        let former_parent = Saga::new("delete component", &self.store).run(|saga| {
            let link = links::set_parent(saga, &mut component, None)?;
            saga.delete_component(component.id)?;
            Ok(link.former_parent)
        })?;

        if !component.description_ids.is_empty() {
            tracing::debug!(
                component_id = %id,
                count = component.description_ids.len(),
                "Retaining descriptions of deleted component"
            );
        }
        tracing::info!(component_id = %id, "Deleted component");

        let mut events = Vec::new();
        if let Some(former) = &former_parent {
            events.push(AuditEvent::association(
                HistoryAction::DisassociateSubcomponent,
                former,
                &component,
            ));
        }
        events.push(AuditEvent::new(HistoryAction::DeleteComponent, &component));
        self.record_audit(actor, events);

        Ok(DeleteConfirmation {
            message: format!("component {} deleted", id),
            id,
        })
    }

    // ============================================================
    // Subcomponents
    // ============================================================

    /// Create a new component directly under `parent_id`. Returns the parent.
    pub fn add_subcomponent(
        &self,
        parent_id: Uuid,
        input: CreateComponentInput,
        actor: &str,
    ) -> Result<ComponentView> {
        self.store.find_component(parent_id)?;
        self.create(
            CreateComponentInput {
                parent_id: Some(parent_id),
                ..input
            },
            actor,
        )?;
        self.get(parent_id)
    }

    /// Attach an existing, unparented component under `parent_id`.
    ///
    /// Associating a child that is already linked to this parent changes
    /// nothing and records no history.
    pub fn associate_child(
        &self,
        parent_id: Uuid,
        child_id: Uuid,
        actor: &str,
    ) -> Result<ComponentView> {
        let mut parent = self.store.find_component(parent_id)?;
        let mut child = self.store.find_component(child_id)?;

        if let Some(existing) = child.parent_id {
            if existing != parent_id {
                return Err(CatalogError::conflict(format!(
                    "component {} already belongs to {}; disassociate it first",
                    child_id, existing
                )));
            }
        }

        let change = Saga::new("associate subcomponent", &self.store)
            .run(|saga| links::set_parent(saga, &mut child, Some(&mut parent)))?;

        if change.is_noop() {
            tracing::debug!(parent_id = %parent_id, child_id = %child_id, "Already associated");
        } else {
            self.record_audit(
                actor,
                vec![AuditEvent::association(
                    HistoryAction::AssociateSubcomponent,
                    &parent,
                    &child,
                )],
            );
        }

        self.get(parent_id)
    }

    /// Detach `child_id` from `parent_id`. Idempotent: detaching a component
    /// that is not linked succeeds without writing anything.
    pub fn disassociate_child(
        &self,
        parent_id: Uuid,
        child_id: Uuid,
        actor: &str,
    ) -> Result<ComponentView> {
        let mut parent = self.store.find_component(parent_id)?;
        let mut child = self.store.find_component(child_id)?;

        let changed = Saga::new("disassociate subcomponent", &self.store)
            .run(|saga| links::detach(saga, &mut parent, &mut child))?;

        if changed {
            self.record_audit(
                actor,
                vec![AuditEvent::association(
                    HistoryAction::DisassociateSubcomponent,
                    &parent,
                    &child,
                )],
            );
        } else {
            tracing::debug!(parent_id = %parent_id, child_id = %child_id, "Not associated");
        }

        self.get(parent_id)
    }

    // ============================================================
    // Descriptions of a single component
    // ============================================================

    /// Append a description, either new or adopted by id.
    pub fn add_description(
        &self,
        component_id: Uuid,
        input: DescriptionInput,
        actor: &str,
    ) -> Result<ComponentView> {
        let mut component = self.store.find_component(component_id)?;
        let current = self.load_descriptions(&component)?;

        let mut submitted: Vec<DescriptionInput> = current
            .iter()
            .map(|d| DescriptionInput::existing(d.id))
            .collect();
        submitted.push(input);

        let adoptable =
            self.resolve_adoptable(Some(component_id), &component.description_ids, &submitted)?;
        let plan = reconcile::plan(&current, &adoptable, submitted)?;

        let changes = Saga::new("add description", &self.store).run(|saga| {
            let applied = apply_plan(saga, plan)?;
            component.description_ids = applied.ids;
            saga.update_component(&mut component)?;
            Ok(applied.changes)
        })?;

        self.record_audit(
            actor,
            vec![AuditEvent::new(HistoryAction::AddDescription, &component)
                .with_details(HistoryDetails::from_descriptions(changes))],
        );

        self.get(component_id)
    }

    pub fn edit_description(
        &self,
        component_id: Uuid,
        description_id: Uuid,
        patch: DescriptionPatch,
        actor: &str,
    ) -> Result<ComponentView> {
        let component = self.store.find_component(component_id)?;
        if !component.description_ids.contains(&description_id) {
            return Err(CatalogError::not_found(Entity::Description, description_id));
        }

        let before = self.store.find_description(description_id)?;
        let content = DescriptionContent {
            name: match patch.name {
                Some(name) => required_field(name, "name")?,
                None => before.name.clone(),
            },
            text: match patch.text {
                Some(text) => required_field(text, "description")?,
                None => before.text.clone(),
            },
        };

        if content == before.content() {
            return self.get(component_id);
        }

        let after = Saga::new("edit description", &self.store)
            .run(|saga| saga.update_description(description_id, content))?;

        let changes = DescriptionChanges {
            edited: vec![DescriptionEdit {
                id: description_id,
                before: before.content(),
                after: after.content(),
            }],
            ..Default::default()
        };
        self.record_audit(
            actor,
            vec![AuditEvent::new(HistoryAction::EditDescription, &component)
                .with_details(HistoryDetails::from_descriptions(changes))],
        );

        self.get(component_id)
    }

    pub fn remove_description(
        &self,
        component_id: Uuid,
        description_id: Uuid,
        actor: &str,
    ) -> Result<ComponentView> {
        let mut component = self.store.find_component(component_id)?;
        if !component.description_ids.contains(&description_id) {
            return Err(CatalogError::not_found(Entity::Description, description_id));
        }
        let released = match self.store.find_description(description_id) {
            Ok(description) => vec![description],
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let deleted = Saga::new("delete description", &self.store).run(|saga| {
            component.description_ids.retain(|id| *id != description_id);
            saga.update_component(&mut component)?;
            Ok(delete_released(saga, released))
        })?;

        let changes = DescriptionChanges {
            deleted,
            ..Default::default()
        };
        self.record_audit(
            actor,
            vec![AuditEvent::new(HistoryAction::DeleteDescription, &component)
                .with_details(HistoryDetails::from_descriptions(changes))],
        );

        self.get(component_id)
    }

    // ============================================================
    // Helpers
    // ============================================================

    fn record_audit(&self, actor: &str, events: Vec<AuditEvent>) {
        AuditRecorder::new(&self.store).record(actor, events);
    }

    fn load_descriptions(&self, component: &Component) -> Result<Vec<Description>> {
        let mut descriptions = Vec::with_capacity(component.description_ids.len());
        for id in &component.description_ids {
            match self.store.find_description(*id) {
                Ok(description) => descriptions.push(description),
                Err(e) if e.is_not_found() => {
                    tracing::warn!(component_id = %component.id, description_id = %id, "Dropping dangling description reference");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(descriptions)
    }

    /// Load descriptions referenced by id that `owner` does not hold yet.
    ///
    /// A description owned by another component cannot be taken over.
    fn resolve_adoptable(
        &self,
        owner: Option<Uuid>,
        held: &[Uuid],
        submitted: &[DescriptionInput],
    ) -> Result<HashMap<Uuid, Description>> {
        let mut adoptable = HashMap::new();
        for id in submitted.iter().filter_map(|input| input.id) {
            if held.contains(&id) || adoptable.contains_key(&id) {
                continue;
            }
            let description = self.store.find_description(id)?;
            if let Some(current_owner) = self.store.find_description_owner(id)? {
                if Some(current_owner) != owner {
                    return Err(CatalogError::conflict(format!(
                        "description {} belongs to component {}",
                        id, current_owner
                    )));
                }
            }
            adoptable.insert(id, description);
        }
        Ok(adoptable)
    }
}

/// Execute the create/edit/adopt part of a plan. Deletions are returned in
/// `released` so the caller can run them after the component is written.
fn apply_plan<S: CatalogStore + ?Sized>(saga: &mut Saga<'_, S>, plan: Plan) -> Result<AppliedPlan> {
    tracing::debug!(
        edited = plan.edited.len(),
        adopted = plan.adopted.len(),
        created = plan.new_count(),
        released = plan.deleted.len(),
        "Applying description plan"
    );
    let mut changes = DescriptionChanges::default();

    for (before, content) in plan.edited {
        let after = saga.update_description(before.id, content)?;
        changes.edited.push(DescriptionEdit {
            id: before.id,
            before: before.content(),
            after: after.content(),
        });
    }

    for (description, content) in plan.adopted {
        let description = match content {
            Some(content) => saga.update_description(description.id, content)?,
            None => description,
        };
        changes.added.push(description.snapshot());
    }

    let mut ids = Vec::with_capacity(plan.slots.len());
    for slot in plan.slots {
        match slot {
            Slot::Existing(id) => ids.push(id),
            Slot::New(content) => {
                let description = saga.insert_description(content)?;
                changes.added.push(description.snapshot());
                ids.push(description.id);
            }
        }
    }

    Ok(AppliedPlan {
        ids,
        changes,
        released: plan.deleted,
    })
}

/// Delete descriptions a component no longer lists.
///
/// Runs after the component write has committed, so a failure here only
/// leaves an unreferenced record behind; it is logged, not propagated.
fn delete_released<S: CatalogStore + ?Sized>(
    saga: &mut Saga<'_, S>,
    released: Vec<Description>,
) -> Vec<DescriptionSnapshot> {
    released
        .into_iter()
        .map(|description| {
            match saga.delete_description(description.id) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::warn!(
                    description_id = %description.id,
                    error = %e,
                    "Released description could not be deleted and is now orphaned"
                ),
            }
            description.snapshot()
        })
        .collect()
}

fn required_field(value: String, field: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(CatalogError::validation(format!("'{}' is required", field)));
    }
    Ok(value)
}

fn field_change<T: serde::Serialize + ?Sized, U: serde::Serialize + ?Sized>(
    before: &T,
    after: &U,
) -> FieldChange {
    FieldChange {
        before: json!(before),
        after: json!(after),
    }
}
