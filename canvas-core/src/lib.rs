pub mod backup;
pub mod config;
pub mod error;
pub mod export;
pub mod file_store;
pub mod fs;
pub mod integrity;
pub mod megadraft;
pub mod megaprompt;
pub mod memory_store;
pub mod merge;
pub mod models;
pub mod packs;
pub mod profiles;
pub mod search;
pub mod store;
pub mod templates;
pub mod util;
pub mod variables;

pub use models::*;

pub use error::{CanvasError, CanvasResult};
pub use store::{KeyValueStore, Storage};

pub use fs::{FileSystem, StdFileSystem};

pub use file_store::FileStore;
pub use memory_store::MemoryStore;

pub use config::CanvasConfig;
pub use megadraft::{ComposeOptions, HeaderStyle, PartSpec, PartUpdate};
pub use merge::{MergeStats, MergeStrategy};
pub use packs::{ApplyStrategy, VariablePackManager};
pub use variables::{ContextSource, StaticContext, VariableEngine};
