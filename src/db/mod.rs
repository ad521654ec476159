mod schema;
mod store;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{CatalogError, Entity, Result};
use crate::models::*;

pub use store::{CatalogStore, ComponentStore, DescriptionStore, HistoryStore};

const COMPONENT_COLUMNS: &str =
    "id, name, type, status, parent_id, description_ids, child_ids, version, created_at, updated_at";

const DESCRIPTION_COLUMNS: &str = "id, name, description, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, component_id, component_name, component_type, actor_id, action, subcomponent, details, created_at";

/// SQLite-backed store for components, descriptions and history.
///
/// Every public operation runs as a single statement against a single row,
/// mirroring a document store with per-document atomic writes.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::debug!(path = %path.display(), "Opened catalog database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "component-catalog")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("catalog.db"))
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        schema::run_migrations(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }
}

// ============================================================
// Component operations
// ============================================================

impl ComponentStore for Database {
    fn insert_component(&self, input: NewComponent) -> Result<Component> {
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO components (id, name, type, status, parent_id, description_ids, child_ids, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.kind,
                input.status.as_str(),
                input.parent_id.map(|u| u.to_string()),
                serde_json::to_string(&input.description_ids)?,
                serde_json::to_string(&input.child_ids)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Component {
            id,
            name: input.name,
            kind: input.kind,
            status: input.status,
            parent_id: input.parent_id,
            description_ids: input.description_ids,
            child_ids: input.child_ids,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    fn find_component(&self, id: Uuid) -> Result<Component> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {COMPONENT_COLUMNS} FROM components WHERE id = ?"),
            [id.to_string()],
            component_from_row,
        )
        .optional()?
        .ok_or_else(|| CatalogError::not_found(Entity::Component, id))
    }

    fn find_all_components(&self) -> Result<Vec<Component>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {COMPONENT_COLUMNS} FROM components ORDER BY rowid"))?;

        let components = stmt
            .query_map([], component_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(components)
    }

    fn update_component(&self, component: &mut Component) -> Result<()> {
        let conn = self.lock();
        let now = Utc::now();

        let rows = conn.execute(
            "UPDATE components
             SET name = ?, type = ?, status = ?, parent_id = ?, description_ids = ?, child_ids = ?,
                 version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
            (
                &component.name,
                &component.kind,
                component.status.as_str(),
                component.parent_id.map(|u| u.to_string()),
                serde_json::to_string(&component.description_ids)?,
                serde_json::to_string(&component.child_ids)?,
                now.to_rfc3339(),
                component.id.to_string(),
                component.version,
            ),
        )?;

        if rows == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM components WHERE id = ?)",
                [component.id.to_string()],
                |row| row.get(0),
            )?;
            return Err(if exists {
                CatalogError::StaleWrite {
                    id: component.id,
                    expected: component.version,
                }
            } else {
                CatalogError::not_found(Entity::Component, component.id)
            });
        }

        component.version += 1;
        component.updated_at = now;
        Ok(())
    }

    fn delete_component(&self, id: Uuid) -> Result<()> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM components WHERE id = ?", [id.to_string()])?;
        if rows == 0 {
            return Err(CatalogError::not_found(Entity::Component, id));
        }
        Ok(())
    }

    fn find_description_owner(&self, description_id: Uuid) -> Result<Option<Uuid>> {
        let conn = self.lock();
        let owner = conn
            .query_row(
                "SELECT c.id FROM components c, json_each(c.description_ids) d
                 WHERE d.value = ? ORDER BY c.rowid LIMIT 1",
                [description_id.to_string()],
                |row| parse_uuid(row, 0),
            )
            .optional()?;
        Ok(owner)
    }
}

// ============================================================
// Description operations
// ============================================================

impl DescriptionStore for Database {
    fn insert_description(&self, content: DescriptionContent) -> Result<Description> {
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO descriptions (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &content.name,
                &content.text,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Description {
            id,
            name: content.name,
            text: content.text,
            created_at: now,
            updated_at: now,
        })
    }

    fn find_description(&self, id: Uuid) -> Result<Description> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {DESCRIPTION_COLUMNS} FROM descriptions WHERE id = ?"),
            [id.to_string()],
            description_from_row,
        )
        .optional()?
        .ok_or_else(|| CatalogError::not_found(Entity::Description, id))
    }

    fn find_all_descriptions(&self) -> Result<Vec<Description>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DESCRIPTION_COLUMNS} FROM descriptions ORDER BY rowid"
        ))?;

        let descriptions = stmt
            .query_map([], description_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(descriptions)
    }

    fn update_description(&self, id: Uuid, content: DescriptionContent) -> Result<Description> {
        let existing = self.find_description(id)?;

        let conn = self.lock();
        let now = Utc::now();
        let rows = conn.execute(
            "UPDATE descriptions SET name = ?, description = ?, updated_at = ? WHERE id = ?",
            (&content.name, &content.text, now.to_rfc3339(), id.to_string()),
        )?;
        if rows == 0 {
            return Err(CatalogError::not_found(Entity::Description, id));
        }

        Ok(Description {
            id,
            name: content.name,
            text: content.text,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    fn delete_description(&self, id: Uuid) -> Result<Description> {
        let existing = self.find_description(id)?;

        let conn = self.lock();
        let rows = conn.execute("DELETE FROM descriptions WHERE id = ?", [id.to_string()])?;
        if rows == 0 {
            return Err(CatalogError::not_found(Entity::Description, id));
        }
        Ok(existing)
    }
}

// ============================================================
// History operations
// ============================================================

impl HistoryStore for Database {
    fn insert_history(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        let subcomponent_json = entry
            .subcomponent
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let details_json = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO history (id, component_id, component_name, component_type, actor_id, action, subcomponent, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                entry.component.id.to_string(),
                &entry.component.name,
                &entry.component.kind,
                &entry.actor_id,
                entry.action.as_str(),
                &subcomponent_json,
                &details_json,
                now.to_rfc3339(),
            ),
        )?;

        Ok(HistoryEntry {
            id,
            component_id: entry.component.id,
            component_name: entry.component.name,
            component_type: entry.component.kind,
            actor_id: entry.actor_id,
            action: entry.action,
            subcomponent: entry.subcomponent,
            details: entry.details,
            created_at: now,
        })
    }

    fn find_all_history(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {HISTORY_COLUMNS} FROM history ORDER BY rowid"))?;

        let entries = stmt
            .query_map([], history_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn find_history_by_component(&self, component_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE component_id = ? ORDER BY rowid"
        ))?;

        let entries = stmt
            .query_map([component_id.to_string()], history_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn find_history(&self, id: Uuid) -> Result<HistoryEntry> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {HISTORY_COLUMNS} FROM history WHERE id = ?"),
            [id.to_string()],
            history_from_row,
        )
        .optional()?
        .ok_or_else(|| CatalogError::not_found(Entity::HistoryEntry, id))
    }

    fn update_history(&self, id: Uuid, input: UpdateHistoryInput) -> Result<HistoryEntry> {
        let mut entry = self.find_history(id)?;
        if let Some(action) = input.action {
            entry.action = action;
        }
        if let Some(actor_id) = input.actor_id {
            entry.actor_id = actor_id;
        }
        if let Some(details) = input.details {
            entry.details = Some(details);
        }

        let details_json = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE history SET action = ?, actor_id = ?, details = ? WHERE id = ?",
            (
                entry.action.as_str(),
                &entry.actor_id,
                &details_json,
                id.to_string(),
            ),
        )?;
        if rows == 0 {
            return Err(CatalogError::not_found(Entity::HistoryEntry, id));
        }

        Ok(entry)
    }

    fn delete_history(&self, id: Uuid) -> Result<()> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM history WHERE id = ?", [id.to_string()])?;
        if rows == 0 {
            return Err(CatalogError::not_found(Entity::HistoryEntry, id));
        }
        Ok(())
    }
}

// ============================================================
// Row mapping
// ============================================================

fn component_from_row(row: &Row<'_>) -> rusqlite::Result<Component> {
    Ok(Component {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        status: ComponentStatus::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
        parent_id: parse_optional_uuid(row, 4)?,
        description_ids: parse_json(row, 5)?,
        child_ids: parse_json(row, 6)?,
        version: row.get(7)?,
        created_at: parse_datetime(row, 8)?,
        updated_at: parse_datetime(row, 9)?,
    })
}

fn description_from_row(row: &Row<'_>) -> rusqlite::Result<Description> {
    Ok(Description {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        text: row.get(2)?,
        created_at: parse_datetime(row, 3)?,
        updated_at: parse_datetime(row, 4)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let action: String = row.get(5)?;
    let action = HistoryAction::from_str(&action).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown history action '{action}'").into(),
        )
    })?;

    Ok(HistoryEntry {
        id: parse_uuid(row, 0)?,
        component_id: parse_uuid(row, 1)?,
        component_name: row.get(2)?,
        component_type: row.get(3)?,
        actor_id: row.get(4)?,
        action,
        subcomponent: parse_optional_json(row, 6)?,
        details: parse_optional_json(row, 7)?,
        created_at: parse_datetime(row, 8)?,
    })
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_optional_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn parse_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_optional_json<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}
