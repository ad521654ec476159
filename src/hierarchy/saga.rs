//! Compensating execution of multi-step mutations.
//!
//! The store only guarantees single-document atomicity, so an operation that
//! touches several documents is a sequence of independent writes. Each write
//! made through a [`Saga`] registers how to undo it. If a later step fails,
//! the registered undos run newest first. An undo that itself fails leaves a
//! partially applied mutation behind; it is logged with enough context for an
//! operator to reconcile by hand (see the integrity check).
//!
//! A component written more than once is restored from its first snapshot,
//! stamped with the last version the saga wrote.
//!
//! Deletes are not undoable and must be the last writes of an operation.

use std::collections::HashMap;

use uuid::Uuid;

use crate::db::CatalogStore;
use crate::error::Result;
use crate::models::*;

enum Undo {
    DeleteComponent(Uuid),
    /// Content before the saga first wrote the component.
    RestoreComponent(Component),
    DeleteDescription(Uuid),
    RestoreDescription(Description),
}

impl Undo {
    fn target(&self) -> Uuid {
        match self {
            Self::DeleteComponent(id) | Self::DeleteDescription(id) => *id,
            Self::RestoreComponent(c) => c.id,
            Self::RestoreDescription(d) => d.id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::DeleteComponent(_) => "delete inserted component",
            Self::RestoreComponent(_) => "restore component",
            Self::DeleteDescription(_) => "delete inserted description",
            Self::RestoreDescription(_) => "restore description",
        }
    }
}

pub(crate) struct Saga<'s, S: ?Sized> {
    operation: &'static str,
    store: &'s S,
    undo: Vec<Undo>,
    /// Latest version written per component.
    versions: HashMap<Uuid, i64>,
}

impl<'s, S: CatalogStore + ?Sized> Saga<'s, S> {
    pub fn new(operation: &'static str, store: &'s S) -> Self {
        Self {
            operation,
            store,
            undo: Vec::new(),
            versions: HashMap::new(),
        }
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    /// Run `steps`, compensating every completed write if they fail.
    pub fn run<T>(mut self, steps: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match steps(&mut self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.compensate(&e);
                Err(e)
            }
        }
    }

    pub fn insert_component(&mut self, input: NewComponent) -> Result<Component> {
        let component = self.store.insert_component(input)?;
        self.undo.push(Undo::DeleteComponent(component.id));
        Ok(component)
    }

    pub fn update_component(&mut self, component: &mut Component) -> Result<()> {
        let before = if self.versions.contains_key(&component.id) {
            None
        } else {
            Some(self.store.find_component(component.id)?)
        };
        self.store.update_component(component)?;
        self.versions.insert(component.id, component.version);
        if let Some(before) = before {
            self.undo.push(Undo::RestoreComponent(before));
        }
        Ok(())
    }

    /// Irreversible; only call once every undoable step has succeeded.
    pub fn delete_component(&mut self, id: Uuid) -> Result<()> {
        self.store.delete_component(id)
    }

    pub fn insert_description(&mut self, content: DescriptionContent) -> Result<Description> {
        let description = self.store.insert_description(content)?;
        self.undo.push(Undo::DeleteDescription(description.id));
        Ok(description)
    }

    pub fn update_description(
        &mut self,
        id: Uuid,
        content: DescriptionContent,
    ) -> Result<Description> {
        let before = self.store.find_description(id)?;
        let after = self.store.update_description(id, content)?;
        self.undo.push(Undo::RestoreDescription(before));
        Ok(after)
    }

    /// Irreversible; only call once every undoable step has succeeded.
    pub fn delete_description(&mut self, id: Uuid) -> Result<Description> {
        self.store.delete_description(id)
    }

    fn compensate(&mut self, cause: &crate::error::CatalogError) {
        let total = self.undo.len();
        while let Some(step) = self.undo.pop() {
            let index = self.undo.len();
            let target = step.target();
            let label = step.label();
            let result = match step {
                Undo::DeleteComponent(id) => self.store.delete_component(id),
                Undo::RestoreComponent(mut snapshot) => {
                    if let Some(version) = self.versions.get(&snapshot.id) {
                        snapshot.version = *version;
                    }
                    self.store.update_component(&mut snapshot)
                }
                Undo::DeleteDescription(id) => self.store.delete_description(id).map(|_| ()),
                Undo::RestoreDescription(snapshot) => self
                    .store
                    .update_description(snapshot.id, snapshot.content())
                    .map(|_| ()),
            };

            match result {
                Ok(()) => tracing::debug!(
                    operation = self.operation,
                    step = index,
                    target = %target,
                    "Compensated: {}",
                    label
                ),
                Err(e) => tracing::warn!(
                    operation = self.operation,
                    step = index,
                    of = total,
                    target = %target,
                    cause = %cause,
                    error = %e,
                    "Partial mutation: could not {}; manual reconciliation required",
                    label
                ),
            }
        }
    }
}
