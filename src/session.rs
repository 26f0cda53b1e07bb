//! Session context: the one place that owns the live data store, the engine
//! and the pack manager for a run of the application.

use canvas_core::backup::BackupInfo;
use canvas_core::megadraft::DraftStats;
use canvas_core::megaprompt::{self, DraftBuildOptions};
use canvas_core::packs::{ApplyResult, Resolution};
use canvas_core::profiles::{merge_with_user_profiles, AutoFilter, FilterStats};
use canvas_core::{
    export, search, templates, ApplyStrategy, CanvasConfig, CanvasError, CanvasResult,
    DataStore, Draft, FileStore, KeyValueStore, MergeStats, MergeStrategy, PartSpec, Prompt, Storage,
    VariableEngine, VariablePack, VariablePackManager,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// How `compose` renders a draft.
#[derive(Debug, Clone, Default)]
pub struct ComposeRequest {
    /// `None` uses the configured default.
    pub include_headers: Option<bool>,
    pub resolve: bool,
    /// Pack applied (overwriting) before resolution.
    pub pack_id: Option<String>,
    pub extra: HashMap<String, String>,
}

/// Result of `find_prompts`.
#[derive(Debug)]
pub struct PromptListing<'a> {
    pub prompts: Vec<&'a Prompt>,
    /// Set when the listing was narrowed by page URL.
    pub filter: Option<FilterStats>,
}

pub struct Session {
    config: CanvasConfig,
    storage: Storage,
    data: DataStore,
    current_draft: Option<String>,
    engine: VariableEngine,
    packs: VariablePackManager,
}

impl Session {
    /// Open the file-backed store under `data_dir` (or the configured one).
    pub async fn open(config: CanvasConfig, data_dir: Option<&Path>) -> CanvasResult<Self> {
        let dir = data_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.data_dir());
        let store = FileStore::open(&dir)?;
        tracing::debug!("Using data directory {}", dir.display());
        Self::with_store(config, Arc::new(store)).await
    }

    pub async fn with_store(config: CanvasConfig, kv: Arc<dyn KeyValueStore>) -> CanvasResult<Self> {
        let storage = Storage::new(kv).with_max_backups(config.storage.max_backups);
        let data = storage.load().await?;
        let engine = VariableEngine::new(Arc::new(config.user_context()));
        let packs = VariablePackManager::open(storage.clone()).await?;
        Ok(Self {
            config,
            storage,
            data,
            current_draft: None,
            engine,
            packs,
        })
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub fn engine(&self) -> &VariableEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut VariableEngine {
        &mut self.engine
    }

    pub fn current_draft(&self) -> Option<&Draft> {
        self.current_draft
            .as_deref()
            .and_then(|id| self.data.draft(id))
    }

    /// Re-read everything after a write that bypassed the session.
    pub async fn reload(&mut self) -> CanvasResult<()> {
        self.data = self.storage.load().await?;
        self.packs.load().await?;
        Ok(())
    }

    fn draft(&self, id: &str) -> CanvasResult<&Draft> {
        self.data
            .draft(id)
            .ok_or_else(|| CanvasError::not_found(format!("Draft not found: {}", id)))
    }

    async fn store_draft(&mut self, draft: Draft) -> CanvasResult<()> {
        self.storage.save_draft(&draft).await?;
        self.current_draft = Some(draft.id.clone());
        match self.data.drafts.iter_mut().find(|d| d.id == draft.id) {
            Some(existing) => *existing = draft,
            None => self.data.drafts.push(draft),
        }
        Ok(())
    }

    // Drafts

    pub async fn new_draft(&mut self, title: &str) -> CanvasResult<Draft> {
        let draft = Draft::create(title);
        self.store_draft(draft.clone()).await?;
        tracing::info!(draft = %draft.id, "Created draft {}", draft.title);
        Ok(draft)
    }

    pub async fn add_part(&mut self, draft_id: &str, spec: PartSpec) -> CanvasResult<String> {
        let mut draft = self.draft(draft_id)?.clone();
        let part_id = draft.add_part(spec);
        self.store_draft(draft).await?;
        Ok(part_id)
    }

    /// Snapshot a library prompt into the draft.
    pub async fn add_prompt_part(&mut self, draft_id: &str, prompt_id: &str) -> CanvasResult<String> {
        let prompt = self
            .data
            .prompt(prompt_id)
            .ok_or_else(|| CanvasError::not_found(format!("Prompt not found: {}", prompt_id)))?;
        let spec = PartSpec::prompt(&prompt.id, &prompt.title, &prompt.content);
        self.add_part(draft_id, spec).await
    }

    /// Render a framework with `values` and add it as a template part.
    pub async fn add_framework_part(
        &mut self,
        draft_id: &str,
        key: &str,
        values: BTreeMap<String, String>,
    ) -> CanvasResult<String> {
        let instance = templates::instantiate(key, values)?;
        let check = instance.validate();
        if !check.valid {
            tracing::warn!(framework = key, "Missing required fields: {}", check.missing.join(", "));
        }
        self.add_part(draft_id, instance.to_part_spec()).await
    }

    /// Compose a draft for copying and stamp `lastCopied`.
    pub async fn compose(&mut self, draft_id: &str, request: &ComposeRequest) -> CanvasResult<String> {
        let mut draft = self.draft(draft_id)?.clone();

        if let Some(pack_id) = &request.pack_id {
            self.apply_pack(pack_id, ApplyStrategy::Overwrite).await?;
        }

        let mut compose = self.config.compose_options();
        if let Some(include_headers) = request.include_headers {
            compose.include_headers = include_headers;
        }
        let options = DraftBuildOptions::from(compose);
        let engine = request.resolve.then_some(&self.engine);
        let text = megaprompt::build_resolved(&draft, &options, engine, &request.extra).await;

        let limits = draft.check_limits();
        if limits.exceeds {
            tracing::warn!(
                draft = %draft.id,
                "Draft is {}% of the size limit ({} chars)",
                limits.percentage,
                limits.size
            );
        }

        draft.mark_copied();
        self.store_draft(draft).await?;
        Ok(text)
    }

    pub fn draft_stats(&self, draft_id: &str) -> CanvasResult<DraftStats> {
        Ok(self.draft(draft_id)?.stats())
    }

    /// Placeholders in the draft that neither the engine nor `extra` can fill.
    pub fn unresolved(&self, draft_id: &str, extra: &HashMap<String, String>) -> CanvasResult<Vec<String>> {
        let draft = self.draft(draft_id)?;
        Ok(megaprompt::unresolved_variables(draft, Some(&self.engine))
            .into_iter()
            .filter(|name| !extra.contains_key(name))
            .collect())
    }

    // Import / export

    pub fn export_json(&self) -> CanvasResult<String> {
        export::export_to_json(&self.data)
    }

    pub async fn import_json(&mut self, json: &str, strategy: MergeStrategy) -> CanvasResult<MergeStats> {
        let stats = self.storage.import_json(json, strategy).await?;
        self.reload().await?;
        tracing::info!(?strategy, "Imported data");
        Ok(stats)
    }

    // Backups

    pub async fn create_backup(&self) -> CanvasResult<String> {
        let current = self.storage.load().await?;
        self.storage.create_auto_backup(&current).await
    }

    pub async fn list_backups(&self) -> CanvasResult<Vec<BackupInfo>> {
        self.storage.list_backups().await
    }

    /// Returns the key holding the pre-restore state.
    pub async fn restore_backup(&mut self, key: &str) -> CanvasResult<String> {
        let undo_key = self.storage.restore_backup_into_live(key).await?;
        self.reload().await?;
        self.current_draft = None;
        Ok(undo_key)
    }

    // Library

    /// Prompts whose title or description contains `query`. With a `url`, only
    /// prompts tagged with a profile detected for that page are kept, unless
    /// no stored profile matches.
    pub fn find_prompts(&self, query: &str, url: Option<&str>) -> PromptListing<'_> {
        let prompts = &self.data.prompts;
        let (base, filter) = match url {
            Some(url) => {
                let mut auto = AutoFilter::new();
                auto.set_enabled(true);
                auto.set_current_url(url);
                let hits = auto.filter_prompts(prompts, &self.data.tags);
                let stats = auto.filter_stats(prompts.len(), hits.len());
                (hits, Some(stats))
            }
            None => (prompts.iter().collect(), None),
        };
        PromptListing {
            prompts: search::filter_refs(base, query),
            filter,
        }
    }

    // Variable packs

    pub fn packs(&self) -> Vec<&VariablePack> {
        self.packs.all_packs()
    }

    /// Apply into the session engine. Pack usage stats are persisted.
    pub async fn apply_pack(&mut self, id: &str, strategy: ApplyStrategy) -> CanvasResult<ApplyResult> {
        let result = self.packs.apply(id, &mut self.engine, strategy).await?;
        self.data = self.storage.load().await?;
        Ok(result)
    }

    /// Settle the conflicts left by a `Prompt` apply. Returns how many values
    /// were written.
    pub fn resolve_pack_conflicts(&mut self, id: &str, resolutions: &[Resolution]) -> CanvasResult<usize> {
        self.packs.resolve_conflicts(id, &mut self.engine, resolutions)
    }

    pub fn export_pack(&self, id: &str) -> CanvasResult<(String, String)> {
        self.packs.export_pack(id)
    }

    pub async fn import_pack(&mut self, json: &str) -> CanvasResult<VariablePack> {
        let pack = self.packs.import_pack(json).await?;
        self.data = self.storage.load().await?;
        Ok(pack)
    }

    // Profiles

    /// Add the built-in AI profiles that are missing. Returns how many were added.
    pub async fn seed_profiles(&mut self) -> CanvasResult<usize> {
        let added = self
            .storage
            .update(|data| {
                let before = data.tags.len();
                data.tags = merge_with_user_profiles(&data.tags);
                Ok(data.tags.len() - before)
            })
            .await?;
        self.data = self.storage.load().await?;
        tracing::info!(added, "Seeded default profiles");
        Ok(added)
    }
}
