//! Referential rules for the weak references held by prompts.
//!
//! Every delete path and the import merge go through these helpers so the
//! cascade rules live in one place: deleting a category nulls `category_id`,
//! deleting a tag prunes it from `tag_ids`, deletes never cascade further.

use crate::models::{DataStore, Prompt};
use std::collections::{HashMap, HashSet};

/// Null every reference to `category_id`. Returns the number of prompts touched.
pub fn detach_category(store: &mut DataStore, category_id: &str) -> usize {
    let mut touched = 0;
    for prompt in &mut store.prompts {
        if prompt.category_id.as_deref() == Some(category_id) {
            prompt.category_id = None;
            touched += 1;
        }
    }
    touched
}

/// Remove `tag_id` from every prompt. Returns the number of prompts touched.
pub fn detach_tag(store: &mut DataStore, tag_id: &str) -> usize {
    let mut touched = 0;
    for prompt in &mut store.prompts {
        let before = prompt.tag_ids.len();
        prompt.tag_ids.retain(|t| t != tag_id);
        if prompt.tag_ids.len() != before {
            touched += 1;
        }
    }
    touched
}

/// Translate a foreign category id through an import map; unknown ids become `None`.
pub fn remap_category(
    category_id: Option<&str>,
    id_map: &HashMap<String, String>,
) -> Option<String> {
    category_id.and_then(|id| id_map.get(id).cloned())
}

/// Translate foreign tag ids, dropping any that did not survive the import.
pub fn remap_tags(tag_ids: &[String], id_map: &HashMap<String, String>) -> Vec<String> {
    tag_ids
        .iter()
        .filter_map(|id| id_map.get(id).cloned())
        .collect()
}

/// Prompts whose references point at records that no longer exist.
pub fn dangling_references(store: &DataStore) -> Vec<&Prompt> {
    let categories: HashSet<&str> = store.categories.iter().map(|c| c.id.as_str()).collect();
    let tags: HashSet<&str> = store.tags.iter().map(|t| t.id.as_str()).collect();

    store
        .prompts
        .iter()
        .filter(|p| {
            let bad_category = p
                .category_id
                .as_deref()
                .map(|id| !categories.contains(id))
                .unwrap_or(false);
            let bad_tag = p.tag_ids.iter().any(|t| !tags.contains(t.as_str()));
            bad_category || bad_tag
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewPrompt, Tag};

    fn store_with_refs() -> (DataStore, String, String) {
        let mut store = DataStore::empty();
        let cat = Category::new("Work", None).unwrap();
        let tag = Tag::new("urgent", None, false).unwrap();
        let prompt = Prompt::new(NewPrompt {
            title: "A".to_string(),
            content: "B".to_string(),
            category_id: Some(cat.id.clone()),
            tag_ids: vec![tag.id.clone()],
            ..Default::default()
        })
        .unwrap();
        let (cat_id, tag_id) = (cat.id.clone(), tag.id.clone());
        store.categories.push(cat);
        store.tags.push(tag);
        store.prompts.push(prompt);
        (store, cat_id, tag_id)
    }

    #[test]
    fn test_detach_category_and_tag() {
        let (mut store, cat_id, tag_id) = store_with_refs();
        assert!(dangling_references(&store).is_empty());

        store.categories.clear();
        assert_eq!(dangling_references(&store).len(), 1);
        assert_eq!(detach_category(&mut store, &cat_id), 1);
        assert_eq!(store.prompts[0].category_id, None);

        assert_eq!(detach_tag(&mut store, &tag_id), 1);
        assert!(store.prompts[0].tag_ids.is_empty());
        assert_eq!(detach_tag(&mut store, &tag_id), 0);
    }

    #[test]
    fn test_remap() {
        let mut map = HashMap::new();
        map.insert("old".to_string(), "new".to_string());
        assert_eq!(remap_category(Some("old"), &map), Some("new".to_string()));
        assert_eq!(remap_category(Some("gone"), &map), None);
        assert_eq!(remap_category(None, &map), None);

        let tags = vec!["old".to_string(), "gone".to_string()];
        assert_eq!(remap_tags(&tags, &map), vec!["new".to_string()]);
    }
}
