// Prompt Canvas: command line entry point

use anyhow::{bail, Context, Result};
use canvas_core::config::load_config;
use canvas_core::export::export_filename;
use canvas_core::packs::{Resolution, ResolutionAction};
use canvas_core::{templates, ApplyStrategy, CanvasConfig, MergeStrategy, PartSpec};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use prompt_canvas_lib::{
    assignments_to_map, assignments_to_values, init_logging, parse_assignment, ComposeRequest,
    Session,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prompt-canvas")]
#[command(about = "Prompt library, draft composer and variable resolver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search ./prompt-canvas.toml and the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in prompt frameworks
    Frameworks,

    /// Render a framework
    Framework {
        /// Framework key (CRISE, CRAFT, TAG)
        key: String,

        /// Field value, repeatable
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// Print a draft as one prompt and mark it copied
    Compose {
        draft_id: String,

        /// Leave out part headers
        #[arg(long)]
        no_headers: bool,

        /// Resolve {{variables}}
        #[arg(long)]
        resolve: bool,

        /// Variable pack applied before resolving
        #[arg(long)]
        pack: Option<String>,

        /// Variable value, repeatable
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// List library prompts
    Prompts {
        /// Keep prompts whose title or description contains this text
        #[arg(short, long, default_value = "")]
        search: String,

        /// Keep prompts tagged with a profile detected for this page URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Manage drafts
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Write the whole library to a JSON export file
    Export {
        /// Output file (default: ai-prompt-manager-backup-<date>.json)
        path: Option<PathBuf>,
    },

    /// Import a JSON export file
    Import {
        path: PathBuf,

        /// replace, merge or overwrite
        #[arg(long, default_value = "merge")]
        strategy: String,
    },

    /// Manage automatic backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Manage variable packs
    Packs {
        #[command(subcommand)]
        action: PackAction,
    },

    /// Add the built-in AI platform profiles
    SeedProfiles,
}

#[derive(Subcommand)]
enum DraftAction {
    /// Create an empty draft
    New { title: String },

    /// List drafts
    List,

    /// Append a part
    Add {
        draft_id: String,

        /// Library prompt id
        #[arg(long, conflicts_with_all = ["framework", "text"])]
        prompt: Option<String>,

        /// Framework key
        #[arg(long, conflicts_with = "text")]
        framework: Option<String>,

        /// Free text
        #[arg(long)]
        text: Option<String>,

        /// Framework field value, repeatable
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// Show size and token estimates
    Stats { draft_id: String },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Snapshot the current library
    Create,
    /// List backups, newest first
    List,
    /// Replace the library with a backup
    Restore { key: String },
}

#[derive(Subcommand)]
enum PackAction {
    /// List packs, most recently modified first
    List,

    /// Apply a pack and print the resulting variables
    Apply {
        id: String,

        /// prompt, skip or overwrite
        #[arg(long, default_value = "prompt")]
        strategy: String,

        /// How to settle conflicts reported by the prompt strategy
        #[arg(long, value_enum)]
        resolve: Option<ConflictChoice>,
    },

    /// Write a pack to a JSON file
    Export {
        id: String,

        /// Output file (default: variable-pack-<name>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a pack file
    Import { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConflictChoice {
    /// Take the pack's value
    Overwrite,
    /// Keep the current value
    Keep,
}

impl From<ConflictChoice> for ResolutionAction {
    fn from(choice: ConflictChoice) -> Self {
        match choice {
            ConflictChoice::Overwrite => ResolutionAction::Overwrite,
            ConflictChoice::Keep => ResolutionAction::Skip,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let workdir = std::env::current_dir().context("Failed to read the working directory")?;
    let (config, source) = load_config(cli.config.as_deref(), &workdir)?;
    init_logging(&config.log.filter);
    if let Some(path) = source {
        tracing::debug!("Config loaded from {}", path.display());
    }

    // Commands that never touch the library.
    match &cli.command {
        Commands::Frameworks => {
            list_frameworks();
            return Ok(());
        }
        Commands::Framework { key, set } => return render_framework(key, set),
        _ => {}
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dispatch(cli.command, config, cli.data_dir))
}

fn list_frameworks() {
    for framework in templates::FRAMEWORKS {
        println!("{:<6} {} - {}", framework.key, framework.name, framework.description);
        for var in framework.variables {
            let marker = if var.required { "*" } else { " " };
            println!("    {}{:<12} {}", marker, var.name, var.description);
        }
    }
}

fn render_framework(key: &str, set: &[(String, String)]) -> Result<()> {
    let instance = templates::instantiate(key, assignments_to_values(set))?;
    let check = instance.validate();
    if !check.valid {
        tracing::warn!("Missing required fields: {}", check.missing.join(", "));
    }
    println!("{}", instance.preview());
    Ok(())
}

async fn dispatch(command: Commands, config: CanvasConfig, data_dir: Option<PathBuf>) -> Result<()> {
    let mut session = Session::open(config, data_dir.as_deref()).await?;

    match command {
        Commands::Frameworks | Commands::Framework { .. } => {}

        Commands::Compose {
            draft_id,
            no_headers,
            resolve,
            pack,
            set,
        } => {
            let request = ComposeRequest {
                include_headers: no_headers.then_some(false),
                resolve,
                pack_id: pack,
                extra: assignments_to_map(&set),
            };
            let text = session.compose(&draft_id, &request).await?;
            if resolve {
                let missing = session.unresolved(&draft_id, &request.extra)?;
                if !missing.is_empty() {
                    tracing::warn!("Unresolved variables: {}", missing.join(", "));
                }
            }
            println!("{}", text);
        }

        Commands::Prompts { search, url } => {
            let listing = session.find_prompts(&search, url.as_deref());
            if let Some(stats) = &listing.filter {
                if stats.profiles.is_empty() {
                    tracing::info!("No profile detected for this URL");
                } else {
                    tracing::info!(
                        "Profiles {}: showing {} of {} prompts",
                        stats.profiles.join(", "),
                        stats.filtered,
                        stats.total
                    );
                }
            }
            for prompt in &listing.prompts {
                println!("{}  {}", prompt.id, prompt.title);
            }
        }

        Commands::Draft { action } => match action {
            DraftAction::New { title } => {
                let draft = session.new_draft(&title).await?;
                println!("{}", draft.id);
            }
            DraftAction::List => {
                for draft in &session.data().drafts {
                    println!(
                        "{}  {}  ({} parts, {} chars)",
                        draft.id, draft.title, draft.metadata.part_count, draft.metadata.char_count
                    );
                }
            }
            DraftAction::Add {
                draft_id,
                prompt,
                framework,
                text,
                set,
            } => {
                let part_id = match (prompt, framework, text) {
                    (Some(prompt_id), _, _) => session.add_prompt_part(&draft_id, &prompt_id).await?,
                    (_, Some(key), _) => {
                        session
                            .add_framework_part(&draft_id, &key, assignments_to_values(&set))
                            .await?
                    }
                    (_, _, Some(text)) => session.add_part(&draft_id, PartSpec::free(text)).await?,
                    _ => bail!("Provide one of --prompt, --framework or --text"),
                };
                println!("{}", part_id);
            }
            DraftAction::Stats { draft_id } => {
                let stats = session.draft_stats(&draft_id)?;
                println!("Parts:      {}", stats.parts);
                println!("Characters: {}", stats.characters);
                println!("Words:      {}", stats.words);
                println!("Lines:      {}", stats.lines);
                println!("Tokens:     ~{}", stats.tokens);
                if let Some(copied) = stats.last_copied {
                    println!("Copied:     {}", copied.to_rfc3339());
                }
            }
        },

        Commands::Export { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(export_filename(Utc::now())));
            let json = session.export_json()?;
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported to {}", path.display());
        }

        Commands::Import { path, strategy } => {
            let strategy: MergeStrategy = strategy.parse()?;
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let stats = session.import_json(&json, strategy).await?;
            for (label, s) in [
                ("categories", stats.categories),
                ("tags", stats.tags),
                ("prompts", stats.prompts),
            ] {
                println!(
                    "{:<11} added {}, updated {}, skipped {}",
                    label, s.added, s.updated, s.skipped
                );
            }
        }

        Commands::Backup { action } => match action {
            BackupAction::Create => {
                let key = session.create_backup().await?;
                println!("{}", key);
            }
            BackupAction::List => {
                for backup in session.list_backups().await? {
                    let date = backup
                        .date
                        .map(|d| d.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}  {}  {} bytes", backup.key, date, backup.size);
                }
            }
            BackupAction::Restore { key } => {
                let undo = session.restore_backup(&key).await?;
                println!("Restored {} (previous state saved as {})", key, undo);
            }
        },

        Commands::Packs { action } => match action {
            PackAction::List => {
                for pack in session.packs() {
                    println!(
                        "{}  {}  ({} variables, used {} times)",
                        pack.id,
                        pack.name,
                        pack.variables.len(),
                        pack.stats.use_count
                    );
                }
            }
            PackAction::Apply {
                id,
                strategy,
                resolve,
            } => {
                let strategy: ApplyStrategy = strategy.parse()?;
                let result = session.apply_pack(&id, strategy).await?;
                println!("Applied {}, skipped {}", result.applied, result.skipped);
                match resolve {
                    Some(choice) if !result.conflicts.is_empty() => {
                        let resolutions: Vec<Resolution> = result
                            .conflicts
                            .iter()
                            .map(|c| Resolution {
                                name: c.name.clone(),
                                action: choice.into(),
                            })
                            .collect();
                        let written = session.resolve_pack_conflicts(&id, &resolutions)?;
                        println!(
                            "Resolved {} conflicts, overwrote {}",
                            resolutions.len(),
                            written
                        );
                    }
                    _ => {
                        for conflict in &result.conflicts {
                            println!(
                                "Conflict {}: {:?} -> {:?} (rerun with --resolve)",
                                conflict.name, conflict.old_value, conflict.new_value
                            );
                        }
                    }
                }
                for var in session.engine().custom_variables() {
                    println!("{}={}", var.name, var.value);
                }
            }
            PackAction::Export { id, output } => {
                let (filename, json) = session.export_pack(&id)?;
                let path = output.unwrap_or_else(|| PathBuf::from(filename));
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Exported to {}", path.display());
            }
            PackAction::Import { path } => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let pack = session.import_pack(&json).await?;
                println!("{}", pack.id);
            }
        },

        Commands::SeedProfiles => {
            let added = session.seed_profiles().await?;
            println!("Added {} profiles", added);
        }
    }

    Ok(())
}
