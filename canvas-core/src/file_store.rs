//! Directory-backed key-value store: one `<key>.json` file per key.

use crate::fs::{FileSystem, StdFileSystem};
use crate::store::KeyValueStore;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXTENSION: &str = "json";

pub struct FileStore {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_fs(dir, Arc::new(StdFileSystem))
    }

    pub fn with_fs(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let dir = dir.into();
        fs.create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        Ok(Self { dir, fs })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            bail!("Invalid storage key: {:?}", key);
        }
        Ok(self.dir.join(format!("{}.{}", key, EXTENSION)))
    }

    fn read_key(&self, key: &str, path: &Path) -> Result<Value> {
        let raw = self
            .fs
            .read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Corrupt record for key {}", key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: Option<&str>) -> Result<HashMap<String, Value>> {
        let mut out = HashMap::new();

        match key {
            Some(key) => {
                let path = self.path_for(key)?;
                if self.fs.exists(&path) {
                    out.insert(key.to_string(), self.read_key(key, &path)?);
                }
            }
            None => {
                for path in self.fs.list_files(&self.dir)? {
                    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                        continue;
                    }
                    let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    match self.read_key(key, &path) {
                        Ok(value) => {
                            out.insert(key.to_string(), value);
                        }
                        Err(e) => tracing::warn!("Skipping unreadable record {}: {:#}", key, e),
                    }
                }
            }
        }

        Ok(out)
    }

    async fn set(&self, items: HashMap<String, Value>) -> Result<()> {
        for (key, value) in items {
            let path = self.path_for(&key)?;
            let tmp = path.with_extension("json.tmp");
            let bytes = serde_json::to_vec_pretty(&value)?;
            self.fs.write(&tmp, &bytes)?;
            self.fs.rename(&tmp, &path)?;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if self.fs.exists(&path) {
            self.fs.remove_file(&path)?;
        }
        Ok(())
    }
}
