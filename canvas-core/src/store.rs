//! Persistence of the single data-store blob over an async key-value store.
//!
//! Every mutating helper is a load, mutate, save cycle. There is no locking:
//! two concurrent cycles against the same store would clobber each other.

use crate::error::{CanvasError, CanvasResult};
use crate::integrity;
use crate::models::{
    validate_store, Category, DataStore, Draft, NewPrompt, Prompt, Tag, TemplateInstance,
    VariablePack,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const STORAGE_KEY: &str = "aiPromptManager_data";
pub const BACKUP_PREFIX: &str = "aiPromptManager_backup_";
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Minimal async key-value contract. `get(None)` returns every key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: Option<&str>) -> Result<HashMap<String, Value>>;
    async fn set(&self, items: HashMap<String, Value>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub is_default: Option<bool>,
    pub matchers: Option<Vec<String>>,
    pub description: Option<String>,
}

/// `category_id: Some(None)` clears the category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<Option<String>>,
    pub tag_ids: Option<Vec<String>>,
}

fn non_empty(value: &str, message: &str) -> CanvasResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CanvasError::validation(message));
    }
    Ok(trimmed.to_string())
}

#[derive(Clone)]
pub struct Storage {
    kv: Arc<dyn KeyValueStore>,
    max_backups: usize,
}

impl Storage {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// A missing or structurally invalid blob loads as an empty store.
    /// Only failures of the key-value store itself are returned.
    pub async fn load(&self) -> CanvasResult<DataStore> {
        let mut result = self.kv.get(Some(STORAGE_KEY)).await?;
        let Some(raw) = result.remove(STORAGE_KEY) else {
            return Ok(DataStore::empty());
        };

        if !validate_store(&raw) {
            tracing::warn!("Stored data failed validation, starting empty");
            return Ok(DataStore::empty());
        }

        match serde_json::from_value(raw) {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::warn!("Stored data could not be decoded, starting empty: {}", e);
                Ok(DataStore::empty())
            }
        }
    }

    pub async fn save(&self, data: &DataStore) -> CanvasResult<()> {
        let value = serde_json::to_value(data)?;
        if !validate_store(&value) {
            return Err(CanvasError::validation("Invalid data structure"));
        }
        self.kv
            .set(HashMap::from([(STORAGE_KEY.to_string(), value)]))
            .await?;
        tracing::debug!(
            prompts = data.prompts.len(),
            drafts = data.drafts.len(),
            "Saved data store"
        );
        Ok(())
    }

    pub async fn clear(&self) -> CanvasResult<()> {
        self.kv.remove(STORAGE_KEY).await?;
        tracing::info!("Cleared data store");
        Ok(())
    }

    /// Load, apply `f`, save. Nothing is written when `f` fails.
    pub async fn update<T, F>(&self, f: F) -> CanvasResult<T>
    where
        F: FnOnce(&mut DataStore) -> CanvasResult<T> + Send,
        T: Send,
    {
        let mut data = self.load().await?;
        let out = f(&mut data)?;
        self.save(&data).await?;
        Ok(out)
    }

    // Categories

    pub async fn add_category(&self, name: &str, color: Option<&str>) -> CanvasResult<Category> {
        let category = Category::new(name, color)?;
        let created = category.clone();
        self.update(move |data| {
            data.categories.push(category);
            Ok(())
        })
        .await?;
        Ok(created)
    }

    pub async fn update_category(&self, id: &str, update: CategoryUpdate) -> CanvasResult<Category> {
        self.update(|data| {
            let category = data
                .categories
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| CanvasError::not_found("Category not found"))?;
            if let Some(name) = update.name {
                category.name = non_empty(&name, "Category name must not be empty")?;
            }
            if let Some(color) = update.color {
                category.color = color;
            }
            Ok(category.clone())
        })
        .await
    }

    pub async fn delete_category(&self, id: &str) -> CanvasResult<()> {
        self.update(|data| {
            if !data.categories.iter().any(|c| c.id == id) {
                return Err(CanvasError::not_found("Category not found"));
            }
            integrity::detach_category(data, id);
            data.categories.retain(|c| c.id != id);
            Ok(())
        })
        .await
    }

    // Tags and profiles

    pub async fn add_tag(&self, name: &str, color: Option<&str>, is_profile: bool) -> CanvasResult<Tag> {
        let tag = Tag::new(name, color, is_profile)?;
        let created = tag.clone();
        self.update(move |data| {
            data.tags.push(tag);
            Ok(())
        })
        .await?;
        Ok(created)
    }

    pub async fn update_tag(&self, id: &str, update: TagUpdate) -> CanvasResult<Tag> {
        self.update(|data| {
            let tag = data
                .tags
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| CanvasError::not_found("Tag not found"))?;
            if let Some(name) = update.name {
                tag.name = non_empty(&name, "Tag name must not be empty")?;
            }
            if let Some(color) = update.color {
                tag.color = color;
            }
            if let Some(is_default) = update.is_default {
                tag.is_default = Some(is_default);
            }
            if let Some(matchers) = update.matchers {
                tag.matchers = matchers;
            }
            if let Some(description) = update.description {
                tag.description = Some(description);
            }
            Ok(tag.clone())
        })
        .await
    }

    pub async fn delete_tag(&self, id: &str) -> CanvasResult<()> {
        self.update(|data| {
            if !data.tags.iter().any(|t| t.id == id) {
                return Err(CanvasError::not_found("Tag not found"));
            }
            integrity::detach_tag(data, id);
            data.tags.retain(|t| t.id != id);
            Ok(())
        })
        .await
    }

    // Prompts

    pub async fn add_prompt(&self, input: NewPrompt) -> CanvasResult<Prompt> {
        let prompt = Prompt::new(input)?;
        let created = prompt.clone();
        self.update(move |data| {
            data.prompts.push(prompt);
            Ok(())
        })
        .await?;
        Ok(created)
    }

    pub async fn update_prompt(&self, id: &str, update: PromptUpdate) -> CanvasResult<Prompt> {
        self.update(|data| {
            let prompt = data
                .prompts
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| CanvasError::not_found("Prompt not found"))?;
            if let Some(title) = update.title {
                prompt.title = non_empty(&title, "Prompt title must not be empty")?;
            }
            if let Some(content) = update.content {
                prompt.content = non_empty(&content, "Prompt content must not be empty")?;
            }
            if let Some(description) = update.description {
                prompt.description = description.trim().to_string();
            }
            if let Some(category_id) = update.category_id {
                prompt.category_id = category_id.filter(|c| !c.is_empty());
            }
            if let Some(tag_ids) = update.tag_ids {
                prompt.tag_ids = tag_ids;
            }
            prompt.modified = Utc::now();
            Ok(prompt.clone())
        })
        .await
    }

    pub async fn delete_prompt(&self, id: &str) -> CanvasResult<()> {
        self.update(|data| {
            let before = data.prompts.len();
            data.prompts.retain(|p| p.id != id);
            if data.prompts.len() == before {
                return Err(CanvasError::not_found("Prompt not found"));
            }
            Ok(())
        })
        .await
    }

    // Bulk operations. Unknown ids are ignored; each returns how many prompts changed.

    pub async fn delete_prompts(&self, ids: &[String]) -> CanvasResult<usize> {
        self.update(|data| {
            let before = data.prompts.len();
            data.prompts.retain(|p| !ids.contains(&p.id));
            Ok(before - data.prompts.len())
        })
        .await
    }

    pub async fn bulk_set_category(&self, ids: &[String], category_id: Option<&str>) -> CanvasResult<usize> {
        self.update(|data| {
            if let Some(cat) = category_id {
                if !data.categories.iter().any(|c| c.id == cat) {
                    return Err(CanvasError::not_found("Category not found"));
                }
            }
            let now = Utc::now();
            let mut changed = 0;
            for prompt in data.prompts.iter_mut().filter(|p| ids.contains(&p.id)) {
                prompt.category_id = category_id.map(str::to_string);
                prompt.modified = now;
                changed += 1;
            }
            Ok(changed)
        })
        .await
    }

    pub async fn bulk_add_tag(&self, ids: &[String], tag_id: &str) -> CanvasResult<usize> {
        self.update(|data| {
            if !data.tags.iter().any(|t| t.id == tag_id) {
                return Err(CanvasError::not_found("Tag not found"));
            }
            let now = Utc::now();
            let mut changed = 0;
            for prompt in data.prompts.iter_mut().filter(|p| ids.contains(&p.id)) {
                if !prompt.tag_ids.iter().any(|t| t == tag_id) {
                    prompt.tag_ids.push(tag_id.to_string());
                    prompt.modified = now;
                    changed += 1;
                }
            }
            Ok(changed)
        })
        .await
    }

    pub async fn bulk_remove_tag(&self, ids: &[String], tag_id: &str) -> CanvasResult<usize> {
        self.update(|data| {
            let now = Utc::now();
            let mut changed = 0;
            for prompt in data.prompts.iter_mut().filter(|p| ids.contains(&p.id)) {
                let before = prompt.tag_ids.len();
                prompt.tag_ids.retain(|t| t != tag_id);
                if prompt.tag_ids.len() != before {
                    prompt.modified = now;
                    changed += 1;
                }
            }
            Ok(changed)
        })
        .await
    }

    // Drafts

    /// Insert or replace by id. Oversized drafts are saved with a warning.
    pub async fn save_draft(&self, draft: &Draft) -> CanvasResult<()> {
        let validation = draft.validate();
        if !validation.valid {
            tracing::warn!(draft = %draft.id, "Saving invalid draft: {}", validation.errors.join("; "));
        }
        let draft = draft.clone();
        self.update(move |data| {
            match data.drafts.iter_mut().find(|d| d.id == draft.id) {
                Some(existing) => *existing = draft,
                None => data.drafts.push(draft),
            }
            Ok(())
        })
        .await
    }

    pub async fn load_draft(&self, id: &str) -> CanvasResult<Option<Draft>> {
        Ok(self.load().await?.drafts.into_iter().find(|d| d.id == id))
    }

    pub async fn load_all_drafts(&self) -> CanvasResult<Vec<Draft>> {
        Ok(self.load().await?.drafts)
    }

    /// Returns whether a draft was removed.
    pub async fn delete_draft(&self, id: &str) -> CanvasResult<bool> {
        self.update(|data| {
            let before = data.drafts.len();
            data.drafts.retain(|d| d.id != id);
            Ok(data.drafts.len() != before)
        })
        .await
    }

    // Template instances

    pub async fn save_template(&self, template: &TemplateInstance) -> CanvasResult<()> {
        let mut template = template.clone();
        template.modified = Utc::now();
        self.update(move |data| {
            match data.templates.iter_mut().find(|t| t.id == template.id) {
                Some(existing) => *existing = template,
                None => data.templates.push(template),
            }
            Ok(())
        })
        .await
    }

    pub async fn load_all_templates(&self) -> CanvasResult<Vec<TemplateInstance>> {
        Ok(self.load().await?.templates)
    }

    pub async fn delete_template(&self, id: &str) -> CanvasResult<bool> {
        self.update(|data| {
            let before = data.templates.len();
            data.templates.retain(|t| t.id != id);
            Ok(data.templates.len() != before)
        })
        .await
    }

    // Variable packs

    pub async fn load_all_packs(&self) -> CanvasResult<Vec<VariablePack>> {
        Ok(self.load().await?.variable_packs)
    }

    pub async fn save_pack(&self, pack: &VariablePack) -> CanvasResult<()> {
        let pack = pack.clone();
        self.update(move |data| {
            match data.variable_packs.iter_mut().find(|p| p.id == pack.id) {
                Some(existing) => *existing = pack,
                None => data.variable_packs.push(pack),
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_pack(&self, id: &str) -> CanvasResult<bool> {
        self.update(|data| {
            let before = data.variable_packs.len();
            data.variable_packs.retain(|p| p.id != id);
            Ok(data.variable_packs.len() != before)
        })
        .await
    }
}
