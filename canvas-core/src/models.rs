use crate::error::{CanvasError, CanvasResult};
use crate::util::generate_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_CATEGORY_COLOR: &str = "#6B7280";
pub const DEFAULT_TAG_COLOR: &str = "#8B5CF6";
pub const DEFAULT_SEPARATOR: &str = "\n\n";
pub const DEFAULT_DRAFT_TITLE: &str = "Untitled Draft";
pub const DEFAULT_PART_TITLE: &str = "Untitled";

fn default_category_color() -> String {
    DEFAULT_CATEGORY_COLOR.to_string()
}

fn default_tag_color() -> String {
    DEFAULT_TAG_COLOR.to_string()
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category_color")]
    pub color: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

/// A tag, or a profile when `is_profile` is set. Both live in one collection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default = "default_tag_color")]
    pub color: String,
    #[serde(default)]
    pub is_profile: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,

    /// Domain substrings used for URL based auto-filtering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,

    /// Weak reference, nulled when the category is deleted.
    #[serde(default)]
    pub category_id: Option<String>,

    /// Weak references, pruned when a tag is deleted.
    #[serde(default)]
    pub tag_ids: Vec<String>,

    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

/// Input for [`Prompt::new`].
#[derive(Debug, Clone, Default)]
pub struct NewPrompt {
    pub title: String,
    pub description: String,
    pub content: String,
    pub category_id: Option<String>,
    pub tag_ids: Vec<String>,
}

/// Where a draft part came from. Only `Prompt` and `Template` parts carry a
/// reference; the content itself is always a snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PartSource {
    Prompt {
        #[serde(rename = "refId", default)]
        prompt_id: Option<String>,
    },
    Template {
        #[serde(rename = "refId", default)]
        framework_key: Option<String>,
    },
    Free,
}

impl Default for PartSource {
    fn default() -> Self {
        PartSource::Prompt { prompt_id: None }
    }
}

impl PartSource {
    pub fn label(&self) -> &'static str {
        match self {
            PartSource::Prompt { .. } => "prompt",
            PartSource::Template { .. } => "template",
            PartSource::Free => "free",
        }
    }

    pub fn ref_id(&self) -> Option<&str> {
        match self {
            PartSource::Prompt { prompt_id } => prompt_id.as_deref(),
            PartSource::Template { framework_key } => framework_key.as_deref(),
            PartSource::Free => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub id: String,
    #[serde(flatten)]
    pub source: PartSource,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Inserted after this part unless it is the last one.
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub order: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftMetadata {
    pub char_count: usize,
    pub part_count: usize,
    pub last_edited: DateTime<Utc>,
    #[serde(default)]
    pub last_copied: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub parts: Vec<Part>,
    pub metadata: DraftMetadata,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

/// A saved, possibly partial, filling of a framework.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstance {
    pub id: String,
    pub framework_key: String,
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PackVariable {
    pub name: String,
    pub value: String,
}

impl PackVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackStats {
    pub variable_count: usize,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariablePack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: Vec<PackVariable>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stats: PackStats,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

/// The single persisted blob.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataStore {
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub drafts: Vec<Draft>,
    #[serde(default)]
    pub templates: Vec<TemplateInstance>,
    #[serde(default)]
    pub variable_packs: Vec<VariablePack>,
}

/// A timestamped snapshot of the whole data store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupRecord {
    pub timestamp: i64,
    pub date: DateTime<Utc>,
    pub data: DataStore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

fn required(value: &str, message: &str) -> CanvasResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CanvasError::validation(message));
    }
    Ok(trimmed.to_string())
}

impl Category {
    pub fn new(name: &str, color: Option<&str>) -> CanvasResult<Self> {
        let name = required(name, "Category name must not be empty")?;
        Ok(Self {
            id: generate_id("cat"),
            name,
            color: color.unwrap_or(DEFAULT_CATEGORY_COLOR).to_string(),
            created: Utc::now(),
        })
    }
}

impl Tag {
    pub fn new(name: &str, color: Option<&str>, is_profile: bool) -> CanvasResult<Self> {
        let name = required(name, "Tag name must not be empty")?;
        Ok(Self {
            id: generate_id("tag"),
            name,
            color: color.unwrap_or(DEFAULT_TAG_COLOR).to_string(),
            is_profile,
            is_default: None,
            matchers: Vec::new(),
            description: None,
            created: None,
        })
    }
}

impl Prompt {
    pub fn new(input: NewPrompt) -> CanvasResult<Self> {
        let title = required(&input.title, "Prompt title must not be empty")?;
        let content = required(&input.content, "Prompt content must not be empty")?;
        let now = Utc::now();
        Ok(Self {
            id: generate_id("prompt"),
            title,
            description: input.description.trim().to_string(),
            content,
            category_id: input.category_id.filter(|id| !id.is_empty()),
            tag_ids: input.tag_ids,
            created: now,
            modified: now,
        })
    }
}

impl Draft {
    pub fn new(title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id("draft"),
            title: title.trim().to_string(),
            parts: Vec::new(),
            metadata: DraftMetadata {
                char_count: 0,
                part_count: 0,
                last_edited: now,
                last_copied: None,
            },
            created: now,
            modified: now,
        }
    }
}

impl TemplateInstance {
    pub fn new(framework_key: &str, name: &str, values: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id("template"),
            framework_key: framework_key.to_string(),
            name: name.trim().to_string(),
            values,
            created: now,
            modified: now,
        }
    }
}

impl DataStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn profiles(&self) -> Vec<&Tag> {
        self.tags.iter().filter(|t| t.is_profile).collect()
    }

    pub fn normal_tags(&self) -> Vec<&Tag> {
        self.tags.iter().filter(|t| !t.is_profile).collect()
    }

    pub fn prompt(&self, id: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    pub fn draft(&self, id: &str) -> Option<&Draft> {
        self.drafts.iter().find(|d| d.id == id)
    }
}

/// Structural gate run before any load or import: the three library
/// collections must be arrays. Never panics, never errors.
pub fn validate_store(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    ["categories", "tags", "prompts"]
        .iter()
        .all(|key| obj.get(*key).map(Value::is_array).unwrap_or(false))
}

/// Structural gate for a single draft record.
pub fn validate_draft_value(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has_id = obj.get("id").map(Value::is_string).unwrap_or(false);
    let has_title = obj.get("title").map(Value::is_string).unwrap_or(false);
    let has_parts = obj.get("parts").map(Value::is_array).unwrap_or(false);
    let has_metadata = obj.get("metadata").map(Value::is_object).unwrap_or(false);
    has_id && has_title && has_parts && has_metadata
}
