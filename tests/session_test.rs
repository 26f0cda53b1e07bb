use prompt_canvas_lib::canvas_core::{
    ApplyStrategy, CanvasConfig, MemoryStore, MergeStrategy, NewPrompt, PackVariable,
};
use prompt_canvas_lib::canvas_core::packs::{NewPack, Resolution, ResolutionAction};
use prompt_canvas_lib::{ComposeRequest, Session};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tempfile::tempdir;

fn config_for(name: &str) -> CanvasConfig {
    let mut config = CanvasConfig::default();
    config.user.name = Some(name.to_string());
    config
}

async fn memory_session() -> anyhow::Result<Session> {
    Ok(Session::with_store(config_for("Ada"), Arc::new(MemoryStore::new())).await?)
}

#[tokio::test]
async fn test_compose_draft_from_library() -> anyhow::Result<()> {
    let mut session = memory_session().await?;
    let prompt = session
        .storage()
        .add_prompt(NewPrompt {
            title: "Greeting".to_string(),
            content: "Hello {{user.name}}, today we cover {{topic}}.".to_string(),
            ..Default::default()
        })
        .await?;
    session.reload().await?;

    let draft = session.new_draft("Lesson").await?;
    session.add_prompt_part(&draft.id, &prompt.id).await?;
    session
        .add_framework_part(
            &draft.id,
            "TAG",
            BTreeMap::from([("task".to_string(), "Explain {{topic}}".to_string())]),
        )
        .await?;

    let request = ComposeRequest {
        include_headers: Some(false),
        resolve: true,
        extra: HashMap::from([("topic".to_string(), "lifetimes".to_string())]),
        ..Default::default()
    };
    let text = session.compose(&draft.id, &request).await?;
    assert!(text.starts_with("Hello Ada, today we cover lifetimes."));
    assert!(text.contains("Explain lifetimes"));
    assert!(!text.contains("###"));

    // The draft was stamped as copied and persisted.
    let stored = session.storage().load_draft(&draft.id).await?.unwrap();
    assert!(stored.metadata.last_copied.is_some());
    assert_eq!(stored.parts.len(), 2);
    assert_eq!(session.current_draft().map(|d| d.id.clone()), Some(draft.id));
    Ok(())
}

#[tokio::test]
async fn test_compose_unknown_draft() -> anyhow::Result<()> {
    let mut session = memory_session().await?;
    let err = session
        .compose("draft_missing", &ComposeRequest::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_pack_values_feed_resolution() -> anyhow::Result<()> {
    let mut session = memory_session().await?;
    let pack = {
        let mut manager =
            prompt_canvas_lib::canvas_core::VariablePackManager::open(session.storage().clone())
                .await?;
        manager
            .create(NewPack {
                name: "Client".to_string(),
                variables: vec![PackVariable::new("client", "Initech")],
                ..Default::default()
            })
            .await?
    };
    session.reload().await?;

    let draft = session.new_draft("Pitch").await?;
    session
        .add_part(&draft.id, prompt_canvas_lib::canvas_core::PartSpec::free("Dear {{client}}"))
        .await?;

    let request = ComposeRequest {
        resolve: true,
        pack_id: Some(pack.id.clone()),
        include_headers: Some(false),
        ..Default::default()
    };
    assert_eq!(session.compose(&draft.id, &request).await?, "Dear Initech");

    let again = session.apply_pack(&pack.id, ApplyStrategy::Skip).await?;
    assert_eq!(again.skipped, 1);
    assert_eq!(session.packs()[0].stats.use_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_export_import_and_restore_on_disk() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut session = Session::open(CanvasConfig::default(), Some(dir.path())).await?;
    session.storage().add_category("Work", None).await?;
    session.reload().await?;
    let json = session.export_json()?;

    let other_dir = tempdir()?;
    let mut other = Session::open(CanvasConfig::default(), Some(other_dir.path())).await?;
    other.storage().add_category("work", None).await?;
    other.reload().await?;

    let stats = other.import_json(&json, MergeStrategy::Merge).await?;
    assert_eq!(stats.categories.skipped, 1);
    assert_eq!(other.data().categories.len(), 1);

    let stats = other.import_json(&json, MergeStrategy::Replace).await?;
    assert_eq!(stats.categories.added, 1);
    assert_eq!(other.data().categories[0].name, "Work");

    // Each import backed up the state before it.
    let backups = other.list_backups().await?;
    assert_eq!(backups.len(), 2);
    let oldest = backups.last().unwrap().key.clone();
    other.restore_backup(&oldest).await?;
    assert_eq!(other.data().categories[0].name, "work");
    Ok(())
}

#[tokio::test]
async fn test_seed_profiles_is_idempotent() -> anyhow::Result<()> {
    let mut session = memory_session().await?;
    let added = session.seed_profiles().await?;
    assert_eq!(added, 7);
    assert_eq!(session.data().profiles().len(), 7);
    assert_eq!(session.seed_profiles().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_find_prompts_by_text_and_page() -> anyhow::Result<()> {
    let mut session = memory_session().await?;
    let github = session.storage().add_tag("GitHub", None, true).await?;
    for (title, tag_ids) in [
        ("Review pull request", vec![github.id.clone()]),
        ("Review essay", vec![]),
        ("Write issue", vec![github.id.clone()]),
    ] {
        session
            .storage()
            .add_prompt(NewPrompt {
                title: title.to_string(),
                content: format!("{} for me", title),
                tag_ids,
                ..Default::default()
            })
            .await?;
    }
    session.reload().await?;

    let listing = session.find_prompts("review", None);
    assert_eq!(listing.prompts.len(), 2);
    assert!(listing.filter.is_none());

    let listing = session.find_prompts("", Some("https://github.com/org/repo/pulls"));
    assert_eq!(listing.prompts.len(), 2);
    let stats = listing.filter.unwrap();
    assert_eq!(stats.profiles, vec!["GitHub".to_string()]);
    assert_eq!((stats.total, stats.hidden), (3, 1));

    let listing = session.find_prompts("REVIEW", Some("https://github.com/org/repo"));
    assert_eq!(listing.prompts.len(), 1);
    assert_eq!(listing.prompts[0].title, "Review pull request");

    // No stored profile for the detected name: nothing is hidden.
    assert_eq!(session.find_prompts("", Some("https://gitlab.com/x")).prompts.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_resolve_pack_conflicts_after_prompt_apply() -> anyhow::Result<()> {
    let mut session = memory_session().await?;
    let pack = {
        let mut manager =
            prompt_canvas_lib::canvas_core::VariablePackManager::open(session.storage().clone())
                .await?;
        manager
            .create(NewPack {
                name: "Tone".to_string(),
                variables: vec![
                    PackVariable::new("tone", "formal"),
                    PackVariable::new("length", "short"),
                ],
                ..Default::default()
            })
            .await?
    };
    session.reload().await?;
    session.engine_mut().set_value("tone", "casual")?;
    session.engine_mut().set_value("length", "long")?;

    let result = session.apply_pack(&pack.id, ApplyStrategy::Prompt).await?;
    assert_eq!(result.conflicts.len(), 2);
    assert_eq!(session.engine().get("tone"), Some("casual"));

    let written = session.resolve_pack_conflicts(
        &pack.id,
        &[
            Resolution { name: "tone".to_string(), action: ResolutionAction::Overwrite },
            Resolution { name: "length".to_string(), action: ResolutionAction::Skip },
        ],
    )?;
    assert_eq!(written, 1);
    assert_eq!(session.engine().get("tone"), Some("formal"));
    assert_eq!(session.engine().get("length"), Some("long"));
    Ok(())
}
