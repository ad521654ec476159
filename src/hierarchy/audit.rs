//! Best-effort audit trail.
//!
//! Audit entries are written after the primary mutation has committed. A
//! failed audit write is logged as [`CatalogError::AuditWriteFailure`] and
//! never undoes the mutation.

use crate::db::HistoryStore;
use crate::error::CatalogError;
use crate::models::*;

/// One history entry an operation wants recorded.
#[derive(Debug, Clone)]
pub(crate) struct AuditEvent {
    pub action: HistoryAction,
    pub component: ComponentSummary,
    pub subcomponent: Option<SubcomponentSnapshot>,
    pub details: Option<HistoryDetails>,
}

impl AuditEvent {
    pub fn new(action: HistoryAction, component: &Component) -> Self {
        Self {
            action,
            component: component.summary(),
            subcomponent: None,
            details: None,
        }
    }

    pub fn association(action: HistoryAction, parent: &Component, child: &Component) -> Self {
        debug_assert!(action.is_association());
        Self {
            action,
            component: parent.summary(),
            subcomponent: Some(SubcomponentSnapshot::from(&child.summary())),
            details: None,
        }
    }

    pub fn with_details(mut self, details: HistoryDetails) -> Self {
        if !details.is_empty() {
            self.details = Some(details);
        }
        self
    }
}

pub(crate) struct AuditRecorder<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S: HistoryStore + ?Sized> AuditRecorder<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Append one entry per event, in order. Returns the entries that were
    /// written; failures are logged and skipped.
    pub fn record(&self, actor: &str, events: Vec<AuditEvent>) -> Vec<HistoryEntry> {
        let mut written = Vec::with_capacity(events.len());
        for event in events {
            let action = event.action;
            let component_id = event.component.id;
            let entry = NewHistoryEntry {
                component: event.component,
                actor_id: actor.to_string(),
                action,
                subcomponent: event.subcomponent,
                details: event.details,
            };

            match self.store.insert_history(entry) {
                Ok(entry) => {
                    tracing::debug!(
                        history_id = %entry.id,
                        component_id = %component_id,
                        actor = actor,
                        "Recorded '{}'",
                        action
                    );
                    written.push(entry);
                }
                Err(source) => {
                    let err = CatalogError::AuditWriteFailure {
                        action,
                        component_id,
                        source: Box::new(source),
                    };
                    tracing::error!(actor = actor, "{}", err);
                }
            }
        }
        written
    }
}
