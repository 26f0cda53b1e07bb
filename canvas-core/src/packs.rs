//! Named, persisted sets of custom variable bindings.
//!
//! The manager caches the pack list after [`VariablePackManager::load`] and
//! writes the whole list back through [`Storage`] after every mutation.

use crate::error::{CanvasError, CanvasResult};
use crate::export::{pack_filename, pack_to_json, parse_pack, PackPayload};
use crate::models::{PackStats, PackVariable, VariablePack};
use crate::store::Storage;
use crate::util::generate_id;
use crate::variables::{validate_name, VariableEngine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

pub const MAX_PACK_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPack {
    pub name: String,
    pub description: String,
    pub variables: Vec<PackVariable>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub variables: Option<Vec<PackVariable>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStrategy {
    /// Report conflicts instead of applying them.
    #[default]
    Prompt,
    /// Keep the engine's value on conflict.
    Skip,
    /// Write every variable.
    Overwrite,
}

impl std::str::FromStr for ApplyStrategy {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(ApplyStrategy::Prompt),
            "skip" => Ok(ApplyStrategy::Skip),
            "overwrite" => Ok(ApplyStrategy::Overwrite),
            other => Err(CanvasError::validation(format!(
                "Unknown apply strategy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackConflict {
    pub name: String,
    pub old_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ApplyResult {
    pub applied: usize,
    pub conflicts: Vec<PackConflict>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    Overwrite,
    New,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub name: String,
    pub action: ResolutionAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    #[default]
    LastWins,
    FirstWins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackStatsReport {
    pub variable_count: usize,
    pub tag_count: usize,
    pub last_used: Option<DateTime<Utc>>,
    pub use_count: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Milliseconds since creation.
    pub age: i64,
}

pub fn validate_pack(name: &str, variables: &[PackVariable]) -> PackValidation {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push("Pack name is required".to_string());
    }
    if name.chars().count() > MAX_PACK_NAME_LENGTH {
        errors.push(format!(
            "Pack name too long (max {} characters)",
            MAX_PACK_NAME_LENGTH
        ));
    }
    for (index, var) in variables.iter().enumerate() {
        if var.name.is_empty() {
            errors.push(format!("Variable at index {} has no name", index));
        } else if !validate_name(&var.name).valid {
            errors.push(format!("Variable \"{}\" has an invalid name", var.name));
        }
    }

    PackValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Structural check for untyped pack data, e.g. straight from a file.
pub fn validate_pack_value(value: &Value) -> PackValidation {
    let mut errors = Vec::new();

    match value.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {
            if name.chars().count() > MAX_PACK_NAME_LENGTH {
                errors.push(format!(
                    "Pack name too long (max {} characters)",
                    MAX_PACK_NAME_LENGTH
                ));
            }
        }
        _ => errors.push("Pack name is required".to_string()),
    }

    match value.get("variables") {
        None | Some(Value::Null) => {}
        Some(Value::Array(vars)) => {
            for (index, var) in vars.iter().enumerate() {
                let name = var.get("name").and_then(Value::as_str).unwrap_or("");
                if name.is_empty() {
                    errors.push(format!("Variable at index {} has no name", index));
                }
                if var.get("value").is_none() {
                    errors.push(format!("Variable \"{}\" has no value", name));
                }
            }
        }
        Some(_) => errors.push("Variables must be an array".to_string()),
    }

    PackValidation {
        valid: errors.is_empty(),
        errors,
    }
}

pub struct VariablePackManager {
    storage: Storage,
    packs: Vec<VariablePack>,
}

impl VariablePackManager {
    /// A manager with the stored packs already loaded.
    pub async fn open(storage: Storage) -> CanvasResult<Self> {
        let mut manager = Self {
            storage,
            packs: Vec::new(),
        };
        manager.load().await?;
        Ok(manager)
    }

    /// Refresh the cached pack list from storage.
    pub async fn load(&mut self) -> CanvasResult<&[VariablePack]> {
        self.packs = self.storage.load_all_packs().await?;
        Ok(&self.packs)
    }

    /// Writes one pack by id. Packs stored by anyone else are left alone.
    async fn persist(&self, index: usize) -> CanvasResult<()> {
        self.storage.save_pack(&self.packs[index]).await
    }

    fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        let needle = name.trim().to_lowercase();
        self.packs
            .iter()
            .any(|p| Some(p.id.as_str()) != except && p.name.to_lowercase() == needle)
    }

    fn index_of(&self, id: &str) -> CanvasResult<usize> {
        self.packs
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| CanvasError::not_found("Pack not found"))
    }

    pub fn get(&self, id: &str) -> Option<&VariablePack> {
        self.packs.iter().find(|p| p.id == id)
    }

    pub async fn create(&mut self, input: NewPack) -> CanvasResult<VariablePack> {
        let validation = validate_pack(&input.name, &input.variables);
        if !validation.valid {
            return Err(CanvasError::validation(validation.errors.join(", ")));
        }
        self.load().await?;
        if self.name_taken(&input.name, None) {
            return Err(CanvasError::validation("A pack with this name already exists"));
        }

        let now = Utc::now();
        let pack = VariablePack {
            id: generate_id("pack"),
            name: input.name.trim().to_string(),
            description: input.description.trim().to_string(),
            stats: PackStats {
                variable_count: input.variables.len(),
                last_used: None,
                use_count: 0,
            },
            variables: input.variables,
            tags: input.tags,
            created: now,
            modified: now,
        };

        self.packs.push(pack.clone());
        self.persist(self.packs.len() - 1).await?;
        tracing::info!(pack = %pack.id, "Created variable pack {}", pack.name);
        Ok(pack)
    }

    pub async fn update(&mut self, id: &str, update: PackUpdate) -> CanvasResult<VariablePack> {
        let index = self.index_of(id)?;

        if let Some(name) = &update.name {
            let check = validate_pack(name, update.variables.as_deref().unwrap_or_default());
            if !check.valid {
                return Err(CanvasError::validation(check.errors.join(", ")));
            }
            if self.name_taken(name, Some(id)) {
                return Err(CanvasError::validation("A pack with this name already exists"));
            }
        } else if let Some(vars) = &update.variables {
            let check = validate_pack(&self.packs[index].name, vars);
            if !check.valid {
                return Err(CanvasError::validation(check.errors.join(", ")));
            }
        }

        let pack = &mut self.packs[index];
        if let Some(name) = update.name {
            pack.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            pack.description = description.trim().to_string();
        }
        if let Some(variables) = update.variables {
            pack.variables = variables;
        }
        if let Some(tags) = update.tags {
            pack.tags = tags;
        }
        pack.stats.variable_count = pack.variables.len();
        pack.modified = Utc::now();

        let updated = pack.clone();
        self.persist(index).await?;
        Ok(updated)
    }

    pub async fn delete(&mut self, id: &str) -> CanvasResult<()> {
        let index = self.index_of(id)?;
        let removed = self.packs.remove(index);
        self.storage.delete_pack(&removed.id).await?;
        tracing::info!(pack = %removed.id, "Deleted variable pack {}", removed.name);
        Ok(())
    }

    /// Write the pack into `engine`. Use statistics are bumped however many
    /// variables end up applied.
    pub async fn apply(
        &mut self,
        id: &str,
        engine: &mut VariableEngine,
        strategy: ApplyStrategy,
    ) -> CanvasResult<ApplyResult> {
        let index = self.index_of(id)?;
        let mut result = ApplyResult::default();

        for var in &self.packs[index].variables {
            let existing = engine.get(&var.name).map(str::to_string);
            match existing {
                Some(old_value) if strategy == ApplyStrategy::Prompt => {
                    result.conflicts.push(PackConflict {
                        name: var.name.clone(),
                        old_value,
                        new_value: var.value.clone(),
                    });
                }
                Some(_) if strategy == ApplyStrategy::Skip => {
                    result.skipped += 1;
                }
                _ => match engine.set_value(&var.name, var.value.clone()) {
                    Ok(()) => result.applied += 1,
                    Err(e) => {
                        tracing::warn!("Skipping pack variable {}: {}", var.name, e);
                        result.skipped += 1;
                    }
                },
            }
        }

        let pack = &mut self.packs[index];
        pack.stats.last_used = Some(Utc::now());
        pack.stats.use_count += 1;
        self.persist(index).await?;

        tracing::debug!(
            pack = %id,
            applied = result.applied,
            conflicts = result.conflicts.len(),
            skipped = result.skipped,
            "Applied variable pack"
        );
        Ok(result)
    }

    /// Follow-up to a `Prompt` apply. Returns how many values were written.
    pub fn resolve_conflicts(
        &self,
        id: &str,
        engine: &mut VariableEngine,
        resolutions: &[Resolution],
    ) -> CanvasResult<usize> {
        let pack = self
            .get(id)
            .ok_or_else(|| CanvasError::not_found("Pack not found"))?;

        let mut applied = 0;
        for resolution in resolutions {
            if resolution.action == ResolutionAction::Skip {
                continue;
            }
            let Some(var) = pack.variables.iter().find(|v| v.name == resolution.name) else {
                continue;
            };
            engine.set_value(&var.name, var.value.clone())?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Copy under `"<name> (Copy)"`, then `"(Copy 2)"` and up until unused.
    pub async fn duplicate(&mut self, id: &str) -> CanvasResult<VariablePack> {
        let original = self
            .get(id)
            .cloned()
            .ok_or_else(|| CanvasError::not_found("Pack not found"))?;

        let mut name = format!("{} (Copy)", original.name);
        let mut counter = 1;
        while self.name_taken(&name, None) {
            counter += 1;
            name = format!("{} (Copy {})", original.name, counter);
        }

        self.create(NewPack {
            name,
            description: original.description,
            variables: original.variables,
            tags: original.tags,
        })
        .await
    }

    /// Combine packs into a new one. Unknown ids are ignored; tags are unioned
    /// in first-seen order.
    pub async fn merge(
        &mut self,
        ids: &[String],
        new_name: &str,
        policy: MergePolicy,
    ) -> CanvasResult<VariablePack> {
        let sources: Vec<VariablePack> = ids.iter().filter_map(|id| self.get(id).cloned()).collect();
        if sources.is_empty() {
            return Err(CanvasError::validation("No valid packs selected"));
        }

        let mut variables: Vec<PackVariable> = Vec::new();
        let mut tags: Vec<String> = Vec::new();
        for pack in &sources {
            for var in &pack.variables {
                match variables.iter_mut().find(|v| v.name == var.name) {
                    Some(existing) => {
                        if policy == MergePolicy::LastWins {
                            existing.value = var.value.clone();
                        }
                    }
                    None => variables.push(var.clone()),
                }
            }
            for tag in &pack.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        self.create(NewPack {
            name: new_name.to_string(),
            description: format!("Merged from {} packs", sources.len()),
            variables,
            tags,
        })
        .await
    }

    /// Case-insensitive match over name, description, tags and variable names.
    pub fn search(&self, query: &str) -> Vec<&VariablePack> {
        let q = query.to_lowercase();
        self.packs
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&q)
                    || p.description.to_lowercase().contains(&q)
                    || p.tags.iter().any(|t| t.to_lowercase().contains(&q))
                    || p.variables.iter().any(|v| v.name.to_lowercase().contains(&q))
            })
            .collect()
    }

    pub fn filter_by_tag(&self, tag: &str) -> Vec<&VariablePack> {
        let needle = tag.to_lowercase();
        self.packs
            .iter()
            .filter(|p| p.tags.iter().any(|t| t.to_lowercase() == needle))
            .collect()
    }

    /// Most recently modified first.
    pub fn all_packs(&self) -> Vec<&VariablePack> {
        let mut packs: Vec<&VariablePack> = self.packs.iter().collect();
        packs.sort_by(|a, b| b.modified.cmp(&a.modified));
        packs
    }

    pub fn pack_stats(&self, id: &str) -> Option<PackStatsReport> {
        let pack = self.get(id)?;
        Some(PackStatsReport {
            variable_count: pack.variables.len(),
            tag_count: pack.tags.len(),
            last_used: pack.stats.last_used,
            use_count: pack.stats.use_count,
            created: pack.created,
            modified: pack.modified,
            age: (Utc::now() - pack.created).num_milliseconds(),
        })
    }

    pub fn all_tags(&self) -> Vec<String> {
        self.packs
            .iter()
            .flat_map(|p| p.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Returns `(filename, json)`.
    pub fn export_pack(&self, id: &str) -> CanvasResult<(String, String)> {
        let pack = self
            .get(id)
            .ok_or_else(|| CanvasError::not_found("Pack not found"))?;
        let json = pack_to_json(PackPayload {
            name: pack.name.clone(),
            description: pack.description.clone(),
            variables: pack.variables.clone(),
            tags: pack.tags.clone(),
        })?;
        Ok((pack_filename(&pack.name), json))
    }

    /// Re-create a pack from an export file, under the usual create rules.
    pub async fn import_pack(&mut self, json: &str) -> CanvasResult<VariablePack> {
        let payload = parse_pack(json)?;
        self.create(NewPack {
            name: payload.name,
            description: payload.description,
            variables: payload.variables,
            tags: payload.tags,
        })
        .await
    }
}
