//! Object metadata index
//!
//! Two tables: `lfs_objects` records each stored object once, keyed by its
//! content hash; `lfs_objects_projects` links objects to the projects that
//! reference them. The UNIQUE constraints make both inserts idempotent, which
//! is what lets concurrent commits of the same object reconcile cleanly.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::types::Result;

/// A committed object: `(oid, size)` is immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub id: i64,
    pub oid: String,
    pub size: u64,
}

/// Sqlite-backed index, serialized behind a mutex. Lookups and inserts are
/// single indexed statements; contention stays negligible at this scale.
pub struct ObjectIndex {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS lfs_objects (
        id   INTEGER PRIMARY KEY,
        oid  TEXT NOT NULL UNIQUE,
        size INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS lfs_objects_projects (
        lfs_object_id INTEGER NOT NULL REFERENCES lfs_objects(id),
        project_id    INTEGER NOT NULL,
        UNIQUE (lfs_object_id, project_id)
    );
";

impl ObjectIndex {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory index for tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn find(&self, oid: &str) -> Result<Option<StoredObject>> {
        let conn = self.conn.lock().expect("object index poisoned");
        let row = conn
            .query_row(
                "SELECT id, oid, size FROM lfs_objects WHERE oid = ?1",
                params![oid],
                |row| {
                    Ok(StoredObject {
                        id: row.get(0)?,
                        oid: row.get(1)?,
                        size: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Record an object, tolerating a concurrent insert of the same oid.
    /// Returns the surviving row either way.
    pub fn insert(&self, oid: &str, size: u64) -> Result<StoredObject> {
        let conn = self.conn.lock().expect("object index poisoned");
        conn.execute(
            "INSERT INTO lfs_objects (oid, size) VALUES (?1, ?2)
             ON CONFLICT (oid) DO NOTHING",
            params![oid, size as i64],
        )?;
        let row = conn.query_row(
            "SELECT id, oid, size FROM lfs_objects WHERE oid = ?1",
            params![oid],
            |row| {
                Ok(StoredObject {
                    id: row.get(0)?,
                    oid: row.get(1)?,
                    size: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        Ok(row)
    }

    /// Idempotent project link.
    pub fn associate(&self, object_id: i64, project_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("object index poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO lfs_objects_projects (lfs_object_id, project_id)
             VALUES (?1, ?2)",
            params![object_id, project_id],
        )?;
        Ok(())
    }

    /// Look up an object scoped to one project's associations.
    pub fn find_for_project(&self, project_id: i64, oid: &str) -> Result<Option<StoredObject>> {
        let conn = self.conn.lock().expect("object index poisoned");
        let row = conn
            .query_row(
                "SELECT o.id, o.oid, o.size
                 FROM lfs_objects o
                 JOIN lfs_objects_projects p ON p.lfs_object_id = o.id
                 WHERE p.project_id = ?1 AND o.oid = ?2",
                params![project_id, oid],
                |row| {
                    Ok(StoredObject {
                        id: row.get(0)?,
                        oid: row.get(1)?,
                        size: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
