use chrono::Utc;
use sqlx::Row;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::db::Db;
use crate::models::FileRecord;
use crate::storage::{Storage, StorageError};

/// Authoritative view over the uploads directory. The only caller of
/// Storage mutations; listings are reconciled from the filesystem on
/// every call, with display names joined in from the sqlite side-index.
///
/// There is no registry-wide lock: storage keys are unique at generation
/// time and single-entry create/delete is atomic at the filesystem, so
/// operations on distinct keys run fully in parallel.
#[derive(Clone)]
pub struct Registry {
    storage: Storage,
    db: Db,
}

impl Registry {
    pub fn new(storage: Storage, db: Db) -> Self {
        Self { storage, db }
    }

    /// Stores the content and records the display name. Nothing is
    /// registered on a failed save. An index write failure only costs
    /// display-name fidelity, so it is logged rather than propagated.
    pub async fn register(
        &self,
        display_name: &str,
        content: &[u8],
    ) -> Result<FileRecord, StorageError> {
        let storage_key = self.storage.save(display_name, content)?;
        let created_at = Utc::now();
        let res = sqlx::query(
            "INSERT INTO files(storage_key, display_name, created_at) VALUES (?, ?, ?)",
        )
        .bind(&storage_key)
        .bind(display_name)
        .bind(created_at)
        .execute(&self.db.0)
        .await;
        if let Err(e) = res {
            log::warn!("side-index insert failed for {storage_key}: {e}");
        }
        Ok(FileRecord {
            storage_key,
            display_name: display_name.to_string(),
            size_bytes: content.len() as u64,
            created_at,
        })
    }

    /// Current files, newest-first. Size and mtime come from the
    /// filesystem; a file the index has never seen falls back to its
    /// storage key as display name.
    pub async fn list(&self) -> Vec<FileRecord> {
        let names = self.display_names().await;
        let mut records: Vec<FileRecord> = self
            .storage
            .list()
            .into_iter()
            .map(|entry| {
                let display_name = names
                    .get(&entry.storage_key)
                    .cloned()
                    .unwrap_or_else(|| entry.storage_key.clone());
                FileRecord {
                    storage_key: entry.storage_key,
                    display_name,
                    size_bytes: entry.size_bytes,
                    created_at: entry.modified_at,
                }
            })
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.storage_key.cmp(&b.storage_key))
        });
        records
    }

    /// Two deletes racing on the same key are safe: the loser sees
    /// `NotFound` from the filesystem.
    pub async fn delete(&self, storage_key: &str) -> Result<String, StorageError> {
        self.storage.remove(storage_key)?;
        let res = sqlx::query("DELETE FROM files WHERE storage_key = ?")
            .bind(storage_key)
            .execute(&self.db.0)
            .await;
        if let Err(e) = res {
            log::warn!("side-index cleanup failed for {storage_key}: {e}");
        }
        Ok(storage_key.to_string())
    }

    /// Path and display name for a download response. Key validation
    /// happens in the storage layer before any filesystem access.
    pub async fn resolve(&self, storage_key: &str) -> Result<(PathBuf, String), StorageError> {
        let path = self.storage.open(storage_key)?;
        let display_name = sqlx::query("SELECT display_name FROM files WHERE storage_key = ?")
            .bind(storage_key)
            .fetch_optional(&self.db.0)
            .await
            .ok()
            .flatten()
            .map(|row| row.get::<String, _>("display_name"))
            .unwrap_or_else(|| storage_key.to_string());
        Ok((path, display_name))
    }

    async fn display_names(&self) -> HashMap<String, String> {
        match sqlx::query("SELECT storage_key, display_name FROM files")
            .fetch_all(&self.db.0)
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .map(|row| (row.get("storage_key"), row.get("display_name")))
                .collect(),
            Err(e) => {
                log::warn!("side-index read failed: {e}");
                HashMap::new()
            }
        }
    }
}
