//! Self-describing JSON envelopes for full exports and single packs.

use crate::error::{CanvasError, CanvasResult};
use crate::models::{validate_store, DataStore, PackVariable};
use crate::util::slugify;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EXPORT_VERSION: &str = "1.0.0";
pub const PACK_EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub version: String,
    #[serde(alias = "exported")]
    pub export_date: DateTime<Utc>,
    pub data: DataStore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub variables: Vec<PackVariable>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackEnvelope {
    pub version: String,
    pub exported: DateTime<Utc>,
    pub pack: PackPayload,
}

/// Pretty-printed export of the whole store.
pub fn export_to_json(data: &DataStore) -> CanvasResult<String> {
    let envelope = ExportEnvelope {
        version: EXPORT_VERSION.to_string(),
        export_date: Utc::now(),
        data: data.clone(),
    };
    let value = serde_json::to_value(&envelope)?;
    if !value.get("data").map(validate_store).unwrap_or(false) {
        return Err(CanvasError::validation("Invalid data structure for export"));
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

/// `ai-prompt-manager-backup-<YYYY-MM-DD>.json`
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("ai-prompt-manager-backup-{}.json", at.format("%Y-%m-%d"))
}

/// `variable-pack-<slug>.json`
pub fn pack_filename(name: &str) -> String {
    format!("variable-pack-{}.json", slugify(name))
}

/// Decode an export file. Anything malformed is an `Integrity` error.
pub fn parse_import(json: &str) -> CanvasResult<DataStore> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| CanvasError::integrity(format!("Failed to parse JSON: {}", e)))?;

    let Some(data) = value.get("data") else {
        return Err(CanvasError::integrity("Invalid data structure in import file"));
    };
    if !validate_store(data) {
        return Err(CanvasError::integrity("Invalid data structure in import file"));
    }

    serde_json::from_value(data.clone())
        .map_err(|e| CanvasError::integrity(format!("Invalid records in import file: {}", e)))
}

pub fn pack_to_json(payload: PackPayload) -> CanvasResult<String> {
    let envelope = PackEnvelope {
        version: PACK_EXPORT_VERSION.to_string(),
        exported: Utc::now(),
        pack: payload,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Decode a pack file. Requires `pack.name` and a `pack.variables` list.
pub fn parse_pack(json: &str) -> CanvasResult<PackPayload> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| CanvasError::integrity(format!("Failed to parse JSON: {}", e)))?;

    let pack = value
        .get("pack")
        .ok_or_else(|| CanvasError::integrity("Invalid pack file format"))?;
    let has_name = pack.get("name").map(Value::is_string).unwrap_or(false);
    let has_vars = pack.get("variables").map(Value::is_array).unwrap_or(false);
    if !has_name || !has_vars {
        return Err(CanvasError::integrity("Invalid pack file format"));
    }

    serde_json::from_value(pack.clone())
        .map_err(|e| CanvasError::integrity(format!("Invalid pack file format: {}", e)))
}
