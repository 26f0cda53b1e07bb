//! Placeholder parsing and two-tier variable resolution.
//!
//! Smart variables are computed from ambient context on every lookup and are
//! never cached. Custom variables are plain name/value pairs held by the engine
//! for the session; they outlive it only through a variable pack.

use crate::error::{CanvasError, CanvasResult};
use crate::models::PackVariable;
use async_trait::async_trait;
use chrono::{DateTime, Local, Locale, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const MAX_NAME_LENGTH: usize = 100;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern"));

static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("name pattern"));

/// Built-in variables with their descriptions.
pub const SMART_VARIABLES: &[(&str, &str)] = &[
    ("date", "Current date (DD.MM.YYYY)"),
    ("date.iso", "Current date (ISO: YYYY-MM-DD)"),
    ("date.us", "Current date (US: MM/DD/YYYY)"),
    ("date.long", "Current date (long format)"),
    ("time", "Current time (HH:MM)"),
    ("time.full", "Current time (HH:MM:SS)"),
    ("datetime", "Current date and time"),
    ("timestamp", "Unix timestamp"),
    ("year", "Current year"),
    ("month", "Current month (01-12)"),
    ("day", "Current day (01-31)"),
    ("weekday", "Current weekday name"),
    ("user.name", "Your name"),
    ("user.email", "Your email"),
    ("user.company", "Your company"),
    ("doc.title", "Document title"),
    ("doc.url", "Current URL"),
    ("uuid", "Generate UUID v4"),
    ("random.number", "Random 6-digit number"),
    ("random.hex", "Random hex color"),
    ("clipboard", "Content from clipboard"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    DateTime,
    User,
    Document,
    Random,
    Clipboard,
    Custom,
}

/// Ambient values behind the smart variables.
///
/// Document and clipboard lookups are best effort: `None` resolves to an
/// empty string.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Local persisted preference, keyed by the variable name (`user.name`, ...).
    fn preference(&self, key: &str) -> Option<String>;
    fn document_title(&self) -> Option<String>;
    fn document_url(&self) -> Option<String>;
    async fn read_clipboard(&self) -> Option<String>;
}

/// Fixed context, for sessions without a host page and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_company: Option<String>,
    pub doc_title: Option<String>,
    pub doc_url: Option<String>,
    pub clipboard: Option<String>,
}

#[async_trait]
impl ContextSource for StaticContext {
    fn preference(&self, key: &str) -> Option<String> {
        match key {
            "user.name" => self.user_name.clone(),
            "user.email" => self.user_email.clone(),
            "user.company" => self.user_company.clone(),
            _ => None,
        }
    }

    fn document_title(&self) -> Option<String> {
        self.doc_title.clone()
    }

    fn document_url(&self) -> Option<String> {
        self.doc_url.clone()
    }

    async fn read_clipboard(&self) -> Option<String> {
        self.clipboard.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVariable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", default = "custom_kind")]
    pub kind: VariableKind,
}

fn custom_kind() -> VariableKind {
    VariableKind::Custom
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableKind,
    pub smart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableExport {
    pub variables: Vec<CustomVariable>,
    #[serde(default = "Utc::now")]
    pub exported: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Clear, then load.
    Replace,
    /// Keep the existing value on conflict.
    Skip,
    /// Overwrite on conflict.
    #[default]
    Merge,
}

impl std::str::FromStr for ImportMode {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(ImportMode::Replace),
            "skip" => Ok(ImportMode::Skip),
            "merge" => Ok(ImportMode::Merge),
            other => Err(CanvasError::validation(format!(
                "Unknown import mode: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportStats {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Distinct placeholder names in first-occurrence order, whitespace trimmed.
pub fn parse(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = caps[1].trim();
        if !name.is_empty() && !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    }
    found
}

/// Wrap every placeholder in a highlight span for display.
pub fn highlight(text: &str) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            format!(
                "<span class=\"variable-highlight\" data-var=\"{}\">{}</span>",
                caps[1].trim(),
                &caps[0]
            )
        })
        .into_owned()
}

pub fn is_smart(name: &str) -> bool {
    SMART_VARIABLES.iter().any(|(n, _)| *n == name)
}

pub fn detect_kind(name: &str) -> VariableKind {
    if name == "date"
        || name.starts_with("date.")
        || name == "time"
        || name.starts_with("time.")
        || name == "datetime"
        || name == "timestamp"
        || name == "year"
        || name == "month"
        || name == "day"
        || name == "weekday"
    {
        VariableKind::DateTime
    } else if name.starts_with("user.") {
        VariableKind::User
    } else if name.starts_with("doc.") {
        VariableKind::Document
    } else if name.starts_with("random.") || name == "uuid" {
        VariableKind::Random
    } else if name == "clipboard" {
        VariableKind::Clipboard
    } else {
        VariableKind::Custom
    }
}

pub fn description(name: &str) -> &'static str {
    SMART_VARIABLES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
        .unwrap_or("Custom variable")
}

pub fn validate_name(name: &str) -> NameValidation {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push("Variable name cannot be empty".to_string());
    }
    if !VALID_NAME.is_match(name) {
        errors.push(
            "Variable name must start with letter/underscore and contain only letters, numbers, dots, underscores"
                .to_string(),
        );
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        errors.push(format!(
            "Variable name too long (max {} characters)",
            MAX_NAME_LENGTH
        ));
    }

    NameValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Date and time variables, formatted the German way (`de_DE`) except for the
/// ISO and US variants.
fn date_value<Tz: TimeZone>(name: &str, now: &DateTime<Tz>) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    let value = match name {
        "date" => now.format("%-d.%-m.%Y").to_string(),
        "date.iso" => now.format("%Y-%m-%d").to_string(),
        "date.us" => now.format("%-m/%-d/%Y").to_string(),
        "date.long" => now
            .format_localized("%A, %-d. %B %Y", Locale::de_DE)
            .to_string(),
        "time" => now.format("%H:%M").to_string(),
        "time.full" => now.format("%H:%M:%S").to_string(),
        "datetime" => now.format("%-d.%-m.%Y, %H:%M:%S").to_string(),
        "year" => now.format("%Y").to_string(),
        "month" => now.format("%m").to_string(),
        "day" => now.format("%d").to_string(),
        "weekday" => now.format_localized("%A", Locale::de_DE).to_string(),
        _ => return None,
    };
    Some(value)
}

pub struct VariableEngine {
    values: BTreeMap<String, String>,
    context: Arc<dyn ContextSource>,
}

impl Default for VariableEngine {
    fn default() -> Self {
        Self::new(Arc::new(StaticContext::default()))
    }
}

impl VariableEngine {
    pub fn new(context: Arc<dyn ContextSource>) -> Self {
        Self {
            values: BTreeMap::new(),
            context,
        }
    }

    pub fn parse(&self, text: &str) -> Vec<String> {
        parse(text)
    }

    pub fn is_smart(&self, name: &str) -> bool {
        is_smart(name)
    }

    /// Computed fresh on every call.
    async fn smart_value(&self, name: &str) -> Option<String> {
        if let Some(value) = date_value(name, &Local::now()) {
            return Some(value);
        }
        let value = match name {
            "timestamp" => Utc::now().timestamp_millis().to_string(),
            "user.name" => self
                .context
                .preference(name)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "User".to_string()),
            "user.email" | "user.company" => self.context.preference(name).unwrap_or_default(),
            "doc.title" => self.context.document_title().unwrap_or_default(),
            "doc.url" => self.context.document_url().unwrap_or_default(),
            "uuid" => uuid::Uuid::new_v4().to_string(),
            "random.number" => fastrand::u32(0..1_000_000).to_string(),
            "random.hex" => format!("{:x}", fastrand::u32(0..16_777_215)),
            "clipboard" => match self.context.read_clipboard().await {
                Some(text) => text,
                None => {
                    tracing::warn!("Clipboard read failed, resolving {{{{clipboard}}}} to empty");
                    String::new()
                }
            },
            _ => return None,
        };
        Some(value)
    }

    /// Smart variables are computed; custom ones return the stored value or "".
    pub async fn get_value(&self, name: &str) -> String {
        if let Some(value) = self.smart_value(name).await {
            return value;
        }
        self.values.get(name).cloned().unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<String>) -> CanvasResult<()> {
        let check = validate_name(name);
        if !check.valid {
            return Err(CanvasError::validation(check.errors.join(", ")));
        }
        self.values.insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn custom_variables(&self) -> Vec<CustomVariable> {
        self.values
            .iter()
            .map(|(name, value)| CustomVariable {
                name: name.clone(),
                value: value.clone(),
                kind: detect_kind(name),
            })
            .collect()
    }

    pub fn to_pack_variables(&self) -> Vec<PackVariable> {
        self.values
            .iter()
            .map(|(name, value)| PackVariable::new(name.clone(), value.clone()))
            .collect()
    }

    /// Substitute every placeholder that is smart or has a value in the
    /// engine merged with `extra` (extra wins). Anything else stays as written.
    pub async fn resolve(&self, text: &str, extra: &HashMap<String, String>) -> String {
        let mut resolved: HashMap<String, String> = HashMap::new();
        for name in parse(text) {
            let value = if let Some(smart) = self.smart_value(&name).await {
                Some(smart)
            } else if let Some(v) = extra.get(&name) {
                Some(v.clone())
            } else {
                self.values.get(&name).cloned()
            };
            if let Some(value) = value {
                resolved.insert(name, value);
            }
        }

        if resolved.is_empty() {
            return text.to_string();
        }

        // One pass, so substituted values are never re-scanned for placeholders.
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| match resolved.get(caps[1].trim()) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Names that are neither smart nor defined in the engine.
    pub fn unresolved(&self, text: &str) -> Vec<String> {
        parse(text)
            .into_iter()
            .filter(|name| !is_smart(name) && !self.values.contains_key(name))
            .collect()
    }

    pub fn validate_name(&self, name: &str) -> NameValidation {
        validate_name(name)
    }

    pub fn suggestions(&self, prefix: &str) -> Vec<Suggestion> {
        let needle = prefix.to_lowercase();
        let mut out: Vec<Suggestion> = SMART_VARIABLES
            .iter()
            .filter(|(name, _)| name.to_lowercase().contains(&needle))
            .map(|(name, desc)| Suggestion {
                name: name.to_string(),
                kind: detect_kind(name),
                smart: true,
                description: Some(desc.to_string()),
                value: None,
            })
            .collect();

        for (name, value) in &self.values {
            if !name.to_lowercase().contains(&needle) {
                continue;
            }
            let preview = if value.chars().count() > 50 {
                format!("{}...", crate::util::truncate_chars(value, 50))
            } else {
                value.clone()
            };
            out.push(Suggestion {
                name: name.clone(),
                kind: VariableKind::Custom,
                smart: false,
                description: None,
                value: Some(preview),
            });
        }

        out.sort_by(|a, b| b.smart.cmp(&a.smart).then_with(|| a.name.cmp(&b.name)));
        out
    }

    pub fn export_json(&self) -> VariableExport {
        VariableExport {
            variables: self.custom_variables(),
            exported: Utc::now(),
        }
    }

    /// Entries with invalid names are counted as skipped, never raised.
    pub fn import_json(&mut self, data: &VariableExport, mode: ImportMode) -> ImportStats {
        let mut stats = ImportStats::default();

        if mode == ImportMode::Replace {
            self.clear();
        }

        for var in &data.variables {
            if !validate_name(&var.name).valid {
                stats.skipped += 1;
                continue;
            }
            let existed = self.values.contains_key(&var.name);
            if mode == ImportMode::Skip && existed {
                stats.skipped += 1;
                continue;
            }
            self.values.insert(var.name.clone(), var.value.clone());
            if existed {
                stats.updated += 1;
            } else {
                stats.added += 1;
            }
        }

        tracing::debug!(
            added = stats.added,
            updated = stats.updated,
            skipped = stats.skipped,
            "Imported custom variables"
        );
        stats
    }

    /// Like [`import_json`](Self::import_json) but from raw JSON, failing when
    /// `variables` is not a list.
    pub fn import_value(
        &mut self,
        value: &serde_json::Value,
        mode: ImportMode,
    ) -> CanvasResult<ImportStats> {
        if !value
            .get("variables")
            .map(serde_json::Value::is_array)
            .unwrap_or(false)
        {
            return Err(CanvasError::validation("Invalid variable data"));
        }
        let data: VariableExport = serde_json::from_value(value.clone())?;
        Ok(self.import_json(&data, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> VariableEngine {
        VariableEngine::new(Arc::new(StaticContext {
            user_name: Some("Ada".to_string()),
            clipboard: Some("copied".to_string()),
            ..Default::default()
        }))
    }

    #[test]
    fn test_parse_distinct_trimmed() {
        let names = parse("{{ a }} and {{b}} and {{a}} {{}}");
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_variable_left_untouched() {
        let e = engine();
        let out = e.resolve("Hello {{unknownVar}}", &HashMap::new()).await;
        assert_eq!(out, "Hello {{unknownVar}}");
    }

    #[tokio::test]
    async fn test_resolve_custom_and_extra() {
        let mut e = engine();
        e.set_value("topic", "Rust").unwrap();
        let mut extra = HashMap::new();
        extra.insert("tone".to_string(), "dry".to_string());
        let out = e
            .resolve("Write about {{ topic }} in a {{tone}} tone, {{topic}}!", &extra)
            .await;
        assert_eq!(out, "Write about Rust in a dry tone, Rust!");
    }

    #[tokio::test]
    async fn test_resolved_text_is_stable() {
        let e = engine();
        let text = "Nothing to replace here.";
        assert_eq!(e.resolve(text, &HashMap::new()).await, text);
    }

    #[tokio::test]
    async fn test_values_are_not_rescanned() {
        let mut e = engine();
        e.set_value("a", "{{b}}").unwrap();
        e.set_value("b", "x").unwrap();
        assert_eq!(e.resolve("{{a}}", &HashMap::new()).await, "{{b}}");
    }

    #[tokio::test]
    async fn test_smart_values() {
        let e = engine();
        assert_eq!(e.get_value("user.name").await, "Ada");
        assert_eq!(e.get_value("user.email").await, "");
        assert_eq!(e.get_value("clipboard").await, "copied");
        assert_eq!(e.get_value("date.iso").await.len(), 10);
        assert_eq!(e.get_value("uuid").await.len(), 36);
        assert_eq!(e.get_value("missing").await, "");

        let anon = VariableEngine::default();
        assert_eq!(anon.get_value("user.name").await, "User");
        assert_eq!(anon.get_value("clipboard").await, "");
    }

    #[test]
    fn test_date_values_use_german_names() {
        let at = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 5, 14, 3, 7)
            .unwrap();
        assert_eq!(date_value("date", &at).unwrap(), "5.1.2026");
        assert_eq!(date_value("date.long", &at).unwrap(), "Montag, 5. Januar 2026");
        assert_eq!(date_value("weekday", &at).unwrap(), "Montag");
        assert_eq!(date_value("datetime", &at).unwrap(), "5.1.2026, 14:03:07");
        assert_eq!(date_value("date.us", &at).unwrap(), "1/5/2026");
        assert_eq!(date_value("day", &at).unwrap(), "05");
        assert!(date_value("uuid", &at).is_none());
    }

    #[tokio::test]
    async fn test_smart_wins_over_extra() {
        let e = engine();
        let mut extra = HashMap::new();
        extra.insert("user.name".to_string(), "Mallory".to_string());
        assert_eq!(e.resolve("{{user.name}}", &extra).await, "Ada");
    }

    #[test]
    fn test_unresolved() {
        let mut e = engine();
        e.set_value("known", "1").unwrap();
        assert_eq!(
            e.unresolved("{{known}} {{date}} {{unknown}}"),
            vec!["unknown".to_string()]
        );
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("user_name").valid);
        assert!(validate_name("a.b_c1").valid);
        assert!(!validate_name("1abc").valid);
        assert!(!validate_name("has space").valid);
        assert!(!validate_name("").valid);
        assert!(!validate_name(&"a".repeat(101)).valid);
        assert!(validate_name(&"a".repeat(100)).valid);
    }

    #[test]
    fn test_set_value_rejects_invalid_name() {
        let mut e = engine();
        assert!(e.set_value("bad name", "x").is_err());
        assert!(e.is_empty());
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind("date.iso"), VariableKind::DateTime);
        assert_eq!(detect_kind("user.email"), VariableKind::User);
        assert_eq!(detect_kind("doc.url"), VariableKind::Document);
        assert_eq!(detect_kind("uuid"), VariableKind::Random);
        assert_eq!(detect_kind("clipboard"), VariableKind::Clipboard);
        assert_eq!(detect_kind("project"), VariableKind::Custom);
    }

    #[test]
    fn test_import_modes() {
        let mut e = engine();
        e.set_value("keep", "old").unwrap();
        let data: VariableExport = serde_json::from_value(json!({
            "variables": [
                {"name": "keep", "value": "new"},
                {"name": "fresh", "value": "1"},
                {"name": "bad name", "value": "x"}
            ]
        }))
        .unwrap();

        let stats = e.import_json(&data, ImportMode::Skip);
        assert_eq!(stats, ImportStats { added: 1, updated: 0, skipped: 2 });
        assert_eq!(e.get("keep"), Some("old"));

        let stats = e.import_json(&data, ImportMode::Merge);
        assert_eq!(stats, ImportStats { added: 0, updated: 2, skipped: 1 });
        assert_eq!(e.get("keep"), Some("new"));

        e.set_value("other", "z").unwrap();
        let stats = e.import_json(&data, ImportMode::Replace);
        assert_eq!(stats.added, 2);
        assert!(!e.contains("other"));
    }

    #[test]
    fn test_import_value_requires_list() {
        let mut e = engine();
        assert!(e
            .import_value(&json!({"variables": "nope"}), ImportMode::Merge)
            .is_err());
    }

    #[test]
    fn test_suggestions_order() {
        let mut e = engine();
        e.set_value("date_of_launch", "x".repeat(60)).unwrap();
        let s = e.suggestions("DATE");
        assert!(s[0].smart);
        let custom = s.iter().find(|s| !s.smart).unwrap();
        assert_eq!(custom.name, "date_of_launch");
        assert!(custom.value.as_ref().unwrap().ends_with("..."));
    }

    #[test]
    fn test_highlight() {
        let out = highlight("Hi {{ name }}");
        assert_eq!(
            out,
            "Hi <span class=\"variable-highlight\" data-var=\"name\">{{ name }}</span>"
        );
    }
}
