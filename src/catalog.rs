use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::params;

use crate::models::Item;

const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    remote_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    local_path TEXT,
    existing INTEGER NOT NULL,
    is_folder INTEGER NOT NULL,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    content_hash TEXT,
    parent_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_items_sibling_path
    ON items(parent_id, local_path) WHERE local_path IS NOT NULL;
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO items (remote_id, name, local_path, existing, is_folder, size, mtime, content_hash, parent_id)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(remote_id) DO UPDATE SET
    name = excluded.name,
    local_path = excluded.local_path,
    existing = excluded.existing,
    is_folder = excluded.is_folder,
    size = excluded.size,
    mtime = excluded.mtime,
    content_hash = excluded.content_hash,
    parent_id = excluded.parent_id
"#;

/// Durable index of known remote items. Single-writer within a service
/// cycle: mutations land in memory immediately (so every query sees them
/// before `commit`) and are flushed to the database in one transaction.
pub struct Catalog {
    conn: rusqlite::Connection,
    items: HashMap<String, Item>,
    dirty: HashSet<String>,
    deleted: HashSet<String>,
}

impl Catalog {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let conn = rusqlite::Connection::open(db_path)
            .with_context(|| format!("open catalog {}", db_path.display()))?;
        conn.execute_batch(CATALOG_SCHEMA)
            .context("init catalog schema")?;

        let mut items = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT remote_id, name, local_path, existing, is_folder, size, mtime, \
                 content_hash, parent_id FROM items",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let item = row_to_item(row)?;
                items.insert(item.remote_id.clone(), item);
            }
        }

        Ok(Catalog {
            conn,
            items,
            dirty: HashSet::new(),
            deleted: HashSet::new(),
        })
    }

    /// Insert or replace by remote id.
    pub fn upsert(&mut self, mut item: Item) {
        item.normalize();
        let id = item.remote_id.clone();
        self.items.insert(id.clone(), item);
        self.deleted.remove(&id);
        self.dirty.insert(id);
    }

    pub fn delete<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in ids {
            self.items.remove(id);
            self.dirty.remove(id);
            self.deleted.insert(id.to_string());
        }
    }

    pub fn get(&self, remote_id: &str) -> Option<&Item> {
        self.items.get(remote_id)
    }

    /// All items with the given parent; `None` matches sync roots.
    pub fn children(&self, parent_id: Option<&str>) -> Vec<Item> {
        self.children_where(parent_id, |_| true)
    }

    pub fn children_where<F>(&self, parent_id: Option<&str>, predicate: F) -> Vec<Item>
    where
        F: Fn(&Item) -> bool,
    {
        self.items
            .values()
            .filter(|item| item.parent_id.as_deref() == parent_id)
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    /// The sync root with the given remote name, if known.
    pub fn root(&self, name: &str) -> Option<Item> {
        self.items
            .values()
            .find(|item| item.parent_id.is_none() && item.name == name)
            .cloned()
    }

    /// Refresh helper: clear the existence flag on every row. Re-observed
    /// entries get it back through `upsert`; the rest are swept afterwards.
    pub fn mark_all_not_existing(&mut self) -> Result<()> {
        self.conn
            .execute("UPDATE items SET existing = 0", [])
            .context("mark items not existing")?;
        for item in self.items.values_mut() {
            item.existing = false;
        }
        Ok(())
    }

    /// Refresh helper: drop every row never re-observed since the mark.
    /// Returns how many rows went away.
    pub fn sweep_not_existing(&mut self) -> Result<usize> {
        let stale: Vec<String> = self
            .items
            .values()
            .filter(|item| !item.existing)
            .map(|item| item.remote_id.clone())
            .collect();
        for id in &stale {
            self.items.remove(id);
            self.dirty.remove(id);
        }
        self.conn
            .execute("DELETE FROM items WHERE existing = 0", [])
            .context("sweep items not existing")?;
        Ok(stale.len())
    }

    /// Durably flush batched mutations. A row whose upsert violates the
    /// sibling-path uniqueness index is logged and dropped; the commit
    /// continues with the rest.
    pub fn commit(&mut self) -> Result<()> {
        if self.dirty.is_empty() && self.deleted.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction().context("begin catalog tx")?;
        {
            let mut delete_stmt = tx.prepare("DELETE FROM items WHERE remote_id = ?1")?;
            for id in &self.deleted {
                delete_stmt.execute(params![id])?;
            }
        }
        {
            let mut upsert_stmt = tx.prepare(UPSERT_SQL)?;
            for id in &self.dirty {
                let Some(item) = self.items.get(id) else {
                    continue;
                };
                let result = upsert_stmt.execute(params![
                    item.remote_id,
                    item.name,
                    item.local_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                    item.existing as i64,
                    item.is_folder as i64,
                    item.size as i64,
                    item.mtime,
                    item.content_hash,
                    item.parent_id,
                ]);
                match result {
                    Ok(_) => {}
                    Err(err) if is_constraint_violation(&err) => {
                        crate::logging::error(format!(
                            "could not store item {}: {err}",
                            item.remote_id
                        ));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        tx.commit().context("commit catalog tx")?;

        self.dirty.clear();
        self.deleted.clear();
        Ok(())
    }

    /// Reclaim space. Runs outside any transaction.
    pub fn compact(&mut self) -> Result<()> {
        self.conn.execute("VACUUM", []).context("vacuum catalog")?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    let local_path: Option<String> = row.get(2)?;
    Ok(Item {
        remote_id: row.get(0)?,
        name: row.get(1)?,
        local_path: local_path.map(PathBuf::from),
        existing: row.get::<_, i64>(3)? != 0,
        is_folder: row.get::<_, i64>(4)? != 0,
        size: row.get::<_, i64>(5)? as u64,
        mtime: row.get(6)?,
        content_hash: row.get(7)?,
        parent_id: row.get(8)?,
    })
}
