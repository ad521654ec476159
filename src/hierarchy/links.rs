//! Parent/child link maintenance.
//!
//! A link lives in two documents: `child.parent_id` and the parent's
//! `child_ids`. [`set_parent`] is the only code that writes either side.
//!
//! Attaching writes the parent first, then the child. Detaching writes the
//! child first, then the old parent. Every write is skipped when the document
//! already has the target value, so replaying an interrupted operation
//! converges instead of failing.

use std::collections::HashSet;

use uuid::Uuid;

use super::saga::Saga;
use crate::db::CatalogStore;
use crate::error::{CatalogError, Result};
use crate::models::Component;

/// What [`set_parent`] actually changed.
#[derive(Debug, Default)]
pub(crate) struct LinkChange {
    /// Id of the former parent the child was detached from.
    pub detached_from: Option<Uuid>,
    /// The former parent as written after the child was removed from it.
    /// `None` if the former parent no longer exists.
    pub former_parent: Option<Component>,
    /// Whether any write was needed to link the new parent.
    pub attached: bool,
}

impl LinkChange {
    pub fn is_noop(&self) -> bool {
        self.detached_from.is_none() && !self.attached
    }
}

/// Make `new_parent` the parent of `child`, updating both sides of the link.
///
/// `child` and `new_parent` are updated in place. The former parent, if any
/// and if different, is loaded, unlinked and returned.
pub(crate) fn set_parent<S: CatalogStore + ?Sized>(
    saga: &mut Saga<'_, S>,
    child: &mut Component,
    mut new_parent: Option<&mut Component>,
) -> Result<LinkChange> {
    let target = new_parent.as_deref().map(|p| p.id);

    if let Some(parent) = new_parent.as_deref() {
        ensure_acyclic(saga.store(), parent, child.id)?;
    }

    let mut change = LinkChange::default();

    if child.parent_id == target {
        if let Some(parent) = new_parent {
            if !parent.child_ids.contains(&child.id) {
                tracing::warn!(
                    parent_id = %parent.id,
                    child_id = %child.id,
                    "Repairing one-sided link: parent did not list child"
                );
                parent.child_ids.push(child.id);
                saga.update_component(parent)?;
                change.attached = true;
            }
        }
        return Ok(change);
    }

    if let Some(old_parent_id) = child.parent_id {
        child.parent_id = None;
        saga.update_component(child)?;
        change.detached_from = Some(old_parent_id);
        change.former_parent = unlink_old_parent(saga, old_parent_id, child.id)?;
    }

    if let Some(parent) = new_parent.as_deref_mut() {
        if !parent.child_ids.contains(&child.id) {
            parent.child_ids.push(child.id);
            saga.update_component(parent)?;
        }
        child.parent_id = Some(parent.id);
        saga.update_component(child)?;
        change.attached = true;
    }

    Ok(change)
}

/// Remove the link between `parent` and `child`, whichever side still
/// records it. Returns whether anything was written.
pub(crate) fn detach<S: CatalogStore + ?Sized>(
    saga: &mut Saga<'_, S>,
    parent: &mut Component,
    child: &mut Component,
) -> Result<bool> {
    if child.parent_id == Some(parent.id) {
        let change = set_parent(saga, child, None)?;
        if let Some(former) = change.former_parent.as_ref() {
            *parent = former.clone();
        }
        return Ok(!change.is_noop());
    }

    if parent.child_ids.contains(&child.id) {
        tracing::warn!(
            parent_id = %parent.id,
            child_id = %child.id,
            "Repairing one-sided link: child does not point back at parent"
        );
        parent.child_ids.retain(|id| *id != child.id);
        saga.update_component(parent)?;
        return Ok(true);
    }

    Ok(false)
}

/// Drop `child_id` from the former parent's child list.
fn unlink_old_parent<S: CatalogStore + ?Sized>(
    saga: &mut Saga<'_, S>,
    old_parent_id: Uuid,
    child_id: Uuid,
) -> Result<Option<Component>> {
    let mut old_parent = match saga.store().find_component(old_parent_id) {
        Ok(parent) => parent,
        Err(e) if e.is_not_found() => {
            tracing::warn!(
                parent_id = %old_parent_id,
                child_id = %child_id,
                "Former parent no longer exists; child detached from dangling reference"
            );
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if old_parent.child_ids.contains(&child_id) {
        old_parent.child_ids.retain(|id| *id != child_id);
        saga.update_component(&mut old_parent)?;
    }
    Ok(Some(old_parent))
}

/// Reject links that would make `child_id` its own ancestor.
pub(crate) fn ensure_acyclic<S: CatalogStore + ?Sized>(
    store: &S,
    parent: &Component,
    child_id: Uuid,
) -> Result<()> {
    if parent.id == child_id {
        return Err(CatalogError::validation(format!(
            "component {} cannot be its own parent",
            child_id
        )));
    }

    let mut visited = HashSet::from([parent.id]);
    let mut cursor = parent.parent_id;
    while let Some(ancestor_id) = cursor {
        if ancestor_id == child_id {
            return Err(CatalogError::validation(format!(
                "linking {} under {} would create a cycle",
                child_id, parent.id
            )));
        }
        if !visited.insert(ancestor_id) {
            return Err(CatalogError::validation(format!(
                "ancestry of {} already contains a cycle at {}",
                parent.id, ancestor_id
            )));
        }
        cursor = match store.find_component(ancestor_id) {
            Ok(ancestor) => ancestor.parent_id,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
    }
    Ok(())
}
