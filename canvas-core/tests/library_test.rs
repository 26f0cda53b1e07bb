use canvas_core::export::export_to_json;
use canvas_core::merge::CollectionStats;
use canvas_core::packs::{NewPack, Resolution, ResolutionAction};
use canvas_core::{
    ApplyStrategy, Category, DataStore, MemoryStore, MergeStrategy, NewPrompt, PackVariable,
    Prompt, Storage, Tag, VariableEngine, VariablePackManager,
};
use std::sync::Arc;

fn storage() -> Storage {
    Storage::new(Arc::new(MemoryStore::new()))
}

fn prompt(title: &str, description: &str, content: &str, tag_ids: Vec<String>) -> Prompt {
    Prompt::new(NewPrompt {
        title: title.to_string(),
        description: description.to_string(),
        content: content.to_string(),
        tag_ids,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_merge_matches_category_names_case_insensitively() -> anyhow::Result<()> {
    let storage = storage();
    storage.add_category("Work", None).await?;

    let mut imported = DataStore::empty();
    imported.categories.push(Category::new("work", None)?);
    let json = export_to_json(&imported)?;

    let stats = storage.import_json(&json, MergeStrategy::Merge).await?;
    assert_eq!(
        stats.categories,
        CollectionStats { added: 0, updated: 0, skipped: 1 }
    );

    let data = storage.load().await?;
    assert_eq!(data.categories.len(), 1);
    assert_eq!(data.categories[0].name, "Work");

    // The pre-import state was backed up.
    assert_eq!(storage.list_backups().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_prompt_merge_then_overwrite() -> anyhow::Result<()> {
    let storage = storage();
    let local = storage
        .add_prompt(NewPrompt {
            title: "Summarize".to_string(),
            description: "old".to_string(),
            content: "Sum it up".to_string(),
            ..Default::default()
        })
        .await?;

    let urgent = Tag::new("Urgent", None, false)?;
    let mut imported = DataStore::empty();
    imported.prompts.push(prompt(
        "SUMMARIZE",
        "new",
        "Sum it up",
        vec![urgent.id.clone()],
    ));
    imported.tags.push(urgent);
    let json = export_to_json(&imported)?;

    let stats = storage.import_json(&json, MergeStrategy::Merge).await?;
    assert_eq!(stats.prompts.skipped, 1);
    let data = storage.load().await?;
    assert_eq!(data.prompts.len(), 1);
    assert_eq!(data.prompts[0].description, "old");

    let stats = storage.import_json(&json, MergeStrategy::Overwrite).await?;
    assert_eq!(stats.prompts.updated, 1);
    let data = storage.load().await?;
    let updated = &data.prompts[0];
    assert_eq!(data.prompts.len(), 1);
    assert_eq!(updated.id, local.id);
    assert_eq!(updated.description, "new");
    assert_eq!(updated.tag_ids, vec![data.tags[0].id.clone()]);
    assert!(updated.modified >= local.modified);
    Ok(())
}

#[tokio::test]
async fn test_malformed_import_leaves_store_untouched() -> anyhow::Result<()> {
    let storage = storage();
    storage.add_category("Keep", None).await?;

    let err = storage
        .import_json("{\"data\": {\"prompts\": 3}}", MergeStrategy::Replace)
        .await
        .unwrap_err();
    assert!(matches!(err, canvas_core::CanvasError::Integrity(_)));
    assert_eq!(storage.load().await?.categories.len(), 1);
    assert!(storage.list_backups().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_backup_rotation_keeps_newest_five() -> anyhow::Result<()> {
    let storage = storage();
    let data = DataStore::empty();

    let mut keys = Vec::new();
    for _ in 0..7 {
        keys.push(storage.create_auto_backup(&data).await?);
    }

    let backups = storage.list_backups().await?;
    assert_eq!(backups.len(), 5);
    let mut kept: Vec<String> = backups.into_iter().map(|b| b.key).collect();
    kept.reverse();
    assert_eq!(kept, keys[2..].to_vec());
    Ok(())
}

#[tokio::test]
async fn test_restore_into_live_is_undoable() -> anyhow::Result<()> {
    let storage = storage();
    storage.add_category("Before", None).await?;
    let before = storage.create_auto_backup(&storage.load().await?).await?;

    storage.add_category("After", None).await?;
    let undo = storage.restore_backup_into_live(&before).await?;
    assert_eq!(storage.load().await?.categories.len(), 1);

    storage.restore_backup_into_live(&undo).await?;
    let names: Vec<String> = storage
        .load()
        .await?
        .categories
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Before", "After"]);
    Ok(())
}

#[tokio::test]
async fn test_pack_conflict_then_overwrite() -> anyhow::Result<()> {
    let storage = storage();
    let mut manager = VariablePackManager::open(storage.clone()).await?;
    let pack = manager
        .create(NewPack {
            name: "Team".to_string(),
            variables: vec![
                PackVariable::new("user_name", "Bob"),
                PackVariable::new("team", "Compilers"),
            ],
            ..Default::default()
        })
        .await?;

    let mut engine = VariableEngine::default();
    engine.set_value("user_name", "Alice")?;

    let result = manager.apply(&pack.id, &mut engine, ApplyStrategy::Prompt).await?;
    assert_eq!(result.applied, 1);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].name, "user_name");
    assert_eq!(result.conflicts[0].old_value, "Alice");
    assert_eq!(result.conflicts[0].new_value, "Bob");
    assert_eq!(engine.get("user_name"), Some("Alice"));
    assert_eq!(engine.get("team"), Some("Compilers"));

    let written = manager.resolve_conflicts(
        &pack.id,
        &mut engine,
        &[Resolution {
            name: "user_name".to_string(),
            action: ResolutionAction::Overwrite,
        }],
    )?;
    assert_eq!(written, 1);
    assert_eq!(engine.get("user_name"), Some("Bob"));

    // Usage stats were persisted with the pack.
    let reopened = VariablePackManager::open(storage).await?;
    assert_eq!(reopened.get(&pack.id).map(|p| p.stats.use_count), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_pack_export_import() -> anyhow::Result<()> {
    let mut manager = VariablePackManager::open(storage()).await?;
    let pack = manager
        .create(NewPack {
            name: "Client Alpha".to_string(),
            description: "Alpha defaults".to_string(),
            variables: vec![PackVariable::new("client", "Alpha Corp")],
            tags: vec!["clients".to_string()],
        })
        .await?;

    let (filename, json) = manager.export_pack(&pack.id)?;
    assert!(filename.ends_with(".json"));

    let mut other = VariablePackManager::open(storage()).await?;
    let imported = other.import_pack(&json).await?;
    assert_ne!(imported.id, pack.id);
    assert_eq!(imported.name, "Client Alpha");
    assert_eq!(imported.variables, pack.variables);
    assert_eq!(other.all_tags(), vec!["clients".to_string()]);
    Ok(())
}

fn named_pack(name: &str) -> NewPack {
    NewPack {
        name: name.to_string(),
        variables: vec![PackVariable::new("client", name)],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_stale_manager_keeps_packs_stored_by_others() -> anyhow::Result<()> {
    let storage = storage();
    let mut stale = VariablePackManager::open(storage.clone()).await?;

    let mut other = VariablePackManager::open(storage.clone()).await?;
    other.create(named_pack("First")).await?;
    other.create(named_pack("Second")).await?;

    // The stale manager sees the stored names before creating.
    let err = stale.create(named_pack("first")).await.unwrap_err();
    assert!(err.is_validation());

    let third = stale.create(named_pack("Third")).await?;
    let mut names: Vec<String> = storage
        .load_all_packs()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["First", "Second", "Third"]);

    // Deleting through one manager leaves the rest in place.
    stale.delete(&third.id).await?;
    assert_eq!(storage.load_all_packs().await?.len(), 2);
    Ok(())
}
