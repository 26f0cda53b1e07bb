//! Reconciles an imported data store with the local one.
//!
//! Collections are processed categories, then tags, then prompts, so prompt
//! references can be translated through the id maps built for the first two.

use crate::error::CanvasError;
use crate::integrity::{remap_category, remap_tags};
use crate::models::DataStore;
use crate::util::generate_id;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Adopt the import wholesale.
    Replace,
    /// Add what is new, leave matches untouched.
    #[default]
    Merge,
    /// Add what is new, overwrite matches.
    Overwrite,
}

impl std::str::FromStr for MergeStrategy {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(MergeStrategy::Replace),
            "merge" => Ok(MergeStrategy::Merge),
            "overwrite" => Ok(MergeStrategy::Overwrite),
            other => Err(CanvasError::validation(format!(
                "Unknown merge strategy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CollectionStats {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl CollectionStats {
    fn added(count: usize) -> Self {
        Self {
            added: count,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MergeStats {
    pub categories: CollectionStats,
    pub tags: CollectionStats,
    pub prompts: CollectionStats,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub data: DataStore,
    pub stats: MergeStats,
}

/// Merge `imported` into a copy of `existing`.
///
/// Categories and tags match on case-insensitive name. Prompts match only
/// when the title matches case-insensitively and the content is identical.
/// Drafts, templates and packs of `existing` are kept as they are.
pub fn merge_data(existing: &DataStore, imported: &DataStore, strategy: MergeStrategy) -> MergeOutcome {
    if strategy == MergeStrategy::Replace {
        return MergeOutcome {
            data: imported.clone(),
            stats: MergeStats {
                categories: CollectionStats::added(imported.categories.len()),
                tags: CollectionStats::added(imported.tags.len()),
                prompts: CollectionStats::added(imported.prompts.len()),
            },
        };
    }

    let overwrite = strategy == MergeStrategy::Overwrite;
    let mut result = existing.clone();
    let mut stats = MergeStats::default();
    let now = Utc::now();

    let mut category_map: HashMap<String, String> = HashMap::new();
    for incoming in &imported.categories {
        let needle = incoming.name.to_lowercase();
        match result
            .categories
            .iter_mut()
            .find(|c| c.name.to_lowercase() == needle)
        {
            None => {
                let mut category = incoming.clone();
                category.id = generate_id("cat");
                category.created = now;
                category_map.insert(incoming.id.clone(), category.id.clone());
                result.categories.push(category);
                stats.categories.added += 1;
            }
            Some(local) if overwrite => {
                category_map.insert(incoming.id.clone(), local.id.clone());
                local.name = incoming.name.clone();
                local.color = incoming.color.clone();
                stats.categories.updated += 1;
            }
            Some(local) => {
                category_map.insert(incoming.id.clone(), local.id.clone());
                stats.categories.skipped += 1;
            }
        }
    }

    let mut tag_map: HashMap<String, String> = HashMap::new();
    for incoming in &imported.tags {
        let needle = incoming.name.to_lowercase();
        match result.tags.iter_mut().find(|t| t.name.to_lowercase() == needle) {
            None => {
                let mut tag = incoming.clone();
                tag.id = generate_id("tag");
                tag_map.insert(incoming.id.clone(), tag.id.clone());
                result.tags.push(tag);
                stats.tags.added += 1;
            }
            Some(local) if overwrite => {
                tag_map.insert(incoming.id.clone(), local.id.clone());
                local.name = incoming.name.clone();
                local.color = incoming.color.clone();
                stats.tags.updated += 1;
            }
            Some(local) => {
                tag_map.insert(incoming.id.clone(), local.id.clone());
                stats.tags.skipped += 1;
            }
        }
    }

    for incoming in &imported.prompts {
        let title = incoming.title.to_lowercase();
        let tag_ids = remap_tags(&incoming.tag_ids, &tag_map);

        match result
            .prompts
            .iter_mut()
            .find(|p| p.title.to_lowercase() == title && p.content == incoming.content)
        {
            None => {
                let mut prompt = incoming.clone();
                prompt.id = generate_id("prompt");
                prompt.category_id = remap_category(incoming.category_id.as_deref(), &category_map);
                prompt.tag_ids = tag_ids;
                prompt.created = now;
                prompt.modified = now;
                result.prompts.push(prompt);
                stats.prompts.added += 1;
            }
            Some(local) if overwrite => {
                // An unmapped category keeps the local one; an absent one clears it.
                local.category_id = match incoming.category_id.as_deref() {
                    Some(id) => category_map
                        .get(id)
                        .cloned()
                        .or_else(|| local.category_id.clone()),
                    None => None,
                };
                local.title = incoming.title.clone();
                local.description = incoming.description.clone();
                local.content = incoming.content.clone();
                local.tag_ids = tag_ids;
                local.modified = now;
                stats.prompts.updated += 1;
            }
            Some(_) => {
                stats.prompts.skipped += 1;
            }
        }
    }

    tracing::info!(
        ?strategy,
        categories_added = stats.categories.added,
        tags_added = stats.tags.added,
        prompts_added = stats.prompts.added,
        prompts_updated = stats.prompts.updated,
        "Merged imported data"
    );

    MergeOutcome { data: result, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewPrompt, Prompt, Tag};

    #[test]
    fn test_replace_adopts_import() {
        let mut existing = DataStore::empty();
        existing.categories.push(Category::new("Old", None).unwrap());
        let mut imported = DataStore::empty();
        imported.categories.push(Category::new("New", None).unwrap());
        imported.categories.push(Category::new("Newer", None).unwrap());

        let out = merge_data(&existing, &imported, MergeStrategy::Replace);
        assert_eq!(out.data, imported);
        assert_eq!(out.stats.categories, CollectionStats { added: 2, updated: 0, skipped: 0 });
    }

    #[test]
    fn test_new_records_get_fresh_ids_and_remapped_refs() {
        let existing = DataStore::empty();
        let mut imported = DataStore::empty();
        let cat = Category::new("Work", None).unwrap();
        let tag = Tag::new("urgent", None, false).unwrap();
        let prompt = Prompt::new(NewPrompt {
            title: "T".to_string(),
            content: "C".to_string(),
            category_id: Some(cat.id.clone()),
            tag_ids: vec![tag.id.clone(), "tag_dropped".to_string()],
            ..Default::default()
        })
        .unwrap();
        imported.categories.push(cat.clone());
        imported.tags.push(tag.clone());
        imported.prompts.push(prompt.clone());

        let out = merge_data(&existing, &imported, MergeStrategy::Merge);
        let new_cat = &out.data.categories[0];
        let new_tag = &out.data.tags[0];
        let new_prompt = &out.data.prompts[0];
        assert_ne!(new_cat.id, cat.id);
        assert_ne!(new_prompt.id, prompt.id);
        assert_eq!(new_prompt.category_id.as_deref(), Some(new_cat.id.as_str()));
        assert_eq!(new_prompt.tag_ids, vec![new_tag.id.clone()]);
    }

    #[test]
    fn test_import_duplicates_collapse() {
        let mut imported = DataStore::empty();
        imported.tags.push(Tag::new("dup", None, false).unwrap());
        imported.tags.push(Tag::new("DUP", None, false).unwrap());

        let out = merge_data(&DataStore::empty(), &imported, MergeStrategy::Merge);
        assert_eq!(out.data.tags.len(), 1);
        assert_eq!(out.stats.tags, CollectionStats { added: 1, updated: 0, skipped: 1 });
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("overwrite".parse::<MergeStrategy>().unwrap(), MergeStrategy::Overwrite);
        assert!("bogus".parse::<MergeStrategy>().is_err());
    }
}
