//! Rotating, checksummed snapshots of the data store.

use crate::error::{CanvasError, CanvasResult};
use crate::export::parse_import;
use crate::merge::{merge_data, MergeStats, MergeStrategy};
use crate::models::{validate_store, BackupRecord, DataStore};
use crate::store::{Storage, BACKUP_PREFIX};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupInfo {
    pub key: String,
    pub timestamp: i64,
    pub date: Option<DateTime<Utc>>,
    /// Length of the serialized snapshot.
    pub size: usize,
}

fn checksum_of(data: &Value) -> CanvasResult<String> {
    let canonical = serde_json::to_string(data)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn backup_key(timestamp: i64) -> String {
    format!("{}{}", BACKUP_PREFIX, timestamp)
}

fn record_timestamp(key: &str, record: &Value) -> Option<i64> {
    record
        .get("timestamp")
        .and_then(Value::as_i64)
        .or_else(|| key.strip_prefix(BACKUP_PREFIX)?.parse().ok())
}

impl Storage {
    async fn backup_records(&self) -> CanvasResult<HashMap<String, Value>> {
        let all = self.kv().get(None).await?;
        Ok(all
            .into_iter()
            .filter(|(key, _)| key.starts_with(BACKUP_PREFIX))
            .collect())
    }

    /// Newest first.
    pub async fn list_backups(&self) -> CanvasResult<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for (key, record) in self.backup_records().await? {
            let Some(timestamp) = record_timestamp(&key, &record) else {
                tracing::warn!("Ignoring backup without timestamp: {}", key);
                continue;
            };
            let date = record
                .get("date")
                .and_then(|d| serde_json::from_value(d.clone()).ok());
            let size = record
                .get("data")
                .and_then(|d| serde_json::to_string(d).ok())
                .map(|s| s.len())
                .unwrap_or(0);
            backups.push(BackupInfo {
                key,
                timestamp,
                date,
                size,
            });
        }
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.key.cmp(&a.key)));
        Ok(backups)
    }

    /// Snapshot `data` under a fresh timestamped key, then rotate.
    ///
    /// Timestamps only move forward, so a burst of backups within one
    /// millisecond still rotates oldest first.
    pub async fn create_auto_backup(&self, data: &DataStore) -> CanvasResult<String> {
        let newest = self
            .backup_records()
            .await?
            .iter()
            .filter_map(|(key, record)| record_timestamp(key, record))
            .max();
        let now = Utc::now().timestamp_millis();
        let timestamp = match newest {
            Some(newest) if newest >= now => newest + 1,
            _ => now,
        };
        let key = backup_key(timestamp);

        let snapshot = serde_json::to_value(data)?;
        let checksum = checksum_of(&snapshot)?;
        let record = serde_json::json!({
            "timestamp": timestamp,
            "date": Utc::now(),
            "data": snapshot,
            "checksum": checksum,
        });

        self.kv().set(HashMap::from([(key.clone(), record)])).await?;
        tracing::info!("Created backup {}", key);

        self.cleanup_old_backups().await;
        Ok(key)
    }

    /// Drop every backup beyond the newest `max_backups`. Best effort:
    /// failures are logged and the count of removed records is returned.
    pub async fn cleanup_old_backups(&self) -> usize {
        let backups = match self.list_backups().await {
            Ok(backups) => backups,
            Err(e) => {
                tracing::warn!("Backup rotation skipped: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for stale in backups.iter().skip(self.max_backups()) {
            match self.kv().remove(&stale.key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove backup {}: {:#}", stale.key, e),
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Rotated old backups");
        }
        removed
    }

    /// Read a backup's snapshot, verifying its checksum when it has one.
    pub async fn restore_backup(&self, key: &str) -> CanvasResult<DataStore> {
        let mut found = self.kv().get(Some(key)).await?;
        let record = found
            .remove(key)
            .ok_or_else(|| CanvasError::not_found("Backup not found"))?;

        let data = record
            .get("data")
            .ok_or_else(|| CanvasError::integrity(format!("Backup {} has no data", key)))?;
        if !validate_store(data) {
            return Err(CanvasError::integrity(format!("Backup {} is corrupt", key)));
        }

        if let Some(expected) = record.get("checksum").and_then(Value::as_str) {
            let actual = checksum_of(data)?;
            if actual != expected {
                return Err(CanvasError::integrity(format!(
                    "Backup {} failed checksum verification",
                    key
                )));
            }
        }

        let record: BackupRecord = serde_json::from_value(record)
            .map_err(|e| CanvasError::integrity(format!("Backup {} is corrupt: {}", key, e)))?;
        Ok(record.data)
    }

    /// Replace the live store with a backup. The current state is backed up
    /// first, so the restore can itself be undone.
    pub async fn restore_backup_into_live(&self, key: &str) -> CanvasResult<String> {
        let snapshot = self.restore_backup(key).await?;
        let current = self.load().await?;
        let undo_key = self.create_auto_backup(&current).await?;
        self.save(&snapshot).await?;
        tracing::info!("Restored backup {} (previous state in {})", key, undo_key);
        Ok(undo_key)
    }

    /// Parse an export file, back up the current state, merge and save.
    pub async fn import_json(&self, json: &str, strategy: MergeStrategy) -> CanvasResult<MergeStats> {
        let imported = parse_import(json)?;
        let current = self.load().await?;
        self.create_auto_backup(&current).await?;

        let outcome = merge_data(&current, &imported, strategy);
        self.save(&outcome.data).await?;
        Ok(outcome.stats)
    }
}
