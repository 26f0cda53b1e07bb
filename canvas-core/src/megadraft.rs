//! Draft composer: ordered parts in, flat canvas text out, and back again.
//!
//! Everything here is synchronous and works on a borrowed [`Draft`]. Drafts
//! are never persisted implicitly; callers save through [`crate::store`].

use crate::error::CanvasError;
use crate::models::{
    Draft, Part, PartSource, DEFAULT_DRAFT_TITLE, DEFAULT_PART_TITLE, DEFAULT_SEPARATOR,
};
use crate::util::generate_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Slice size used when a persistence layer caps record size.
pub const CHUNK_SIZE: usize = 50_000;
/// Soft ceiling on the header-less canvas length.
pub const MAX_DRAFT_SIZE: usize = 500_000;
/// Rough characters-per-token ratio used for estimates.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderStyle {
    #[default]
    Markdown,
    Comment,
    None,
}

impl HeaderStyle {
    pub fn header(&self, position: usize, title: &str) -> Option<String> {
        match self {
            HeaderStyle::Markdown => Some(format!("### {}. {}\n\n", position, title)),
            HeaderStyle::Comment => Some(format!("// {}. {}\n\n", position, title)),
            HeaderStyle::None => None,
        }
    }
}

impl std::str::FromStr for HeaderStyle {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(HeaderStyle::Markdown),
            "comment" => Ok(HeaderStyle::Comment),
            "none" => Ok(HeaderStyle::None),
            other => Err(CanvasError::validation(format!(
                "Unknown header style: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeOptions {
    pub include_headers: bool,
    pub header_style: HeaderStyle,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            include_headers: true,
            header_style: HeaderStyle::Markdown,
        }
    }
}

impl ComposeOptions {
    pub fn plain() -> Self {
        Self {
            include_headers: false,
            header_style: HeaderStyle::None,
        }
    }
}

/// Input for [`Draft::add_part`]. Missing fields take the part defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartSpec {
    pub source: PartSource,
    pub title: Option<String>,
    pub content: String,
    pub separator: Option<String>,
}

impl PartSpec {
    pub fn free(content: impl Into<String>) -> Self {
        Self {
            source: PartSource::Free,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn prompt(prompt_id: &str, title: &str, content: &str) -> Self {
        Self {
            source: PartSource::Prompt {
                prompt_id: Some(prompt_id.to_string()),
            },
            title: Some(title.to_string()),
            content: content.to_string(),
            separator: None,
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }
}

/// Field-wise update for [`Draft::update_part`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartUpdate {
    pub source: Option<PartSource>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub separator: Option<String>,
}

impl PartUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeLimits {
    pub size: usize,
    pub max_size: usize,
    pub exceeds: bool,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStats {
    pub characters: usize,
    pub words: usize,
    pub lines: usize,
    pub parts: usize,
    pub tokens: usize,
    pub last_edited: DateTime<Utc>,
    pub last_copied: Option<DateTime<Utc>>,
}

/// `ceil(chars / 4)`.
pub fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Join parts in array order. Each part's own separator follows it, except
/// after the last part.
pub fn compose_parts(parts: &[Part], options: ComposeOptions) -> String {
    let mut canvas = String::new();
    let last = parts.len().saturating_sub(1);

    for (index, part) in parts.iter().enumerate() {
        if options.include_headers {
            if let Some(header) = options.header_style.header(index + 1, &part.title) {
                canvas.push_str(&header);
            }
        }

        canvas.push_str(&part.content);

        if index < last {
            canvas.push_str(&part.separator);
        }
    }

    canvas
}

/// Fold edited canvas text back into `existing` parts.
///
/// Every part but the last takes the text up to the first occurrence of its
/// own separator. When that separator is missing, the part takes everything
/// left and the parts after it come back empty. Headers are not stripped, so
/// text composed with headers does not round-trip.
pub fn parse_canvas(text: &str, existing: &[Part]) -> Vec<Part> {
    let mut parts = Vec::with_capacity(existing.len());
    let mut remaining = text;
    let last = existing.len().saturating_sub(1);

    for (index, part) in existing.iter().enumerate() {
        let mut updated = part.clone();

        if index == last {
            updated.content = remaining.trim().to_string();
        } else {
            match remaining.find(part.separator.as_str()) {
                Some(pos) => {
                    updated.content = remaining[..pos].trim().to_string();
                    remaining = &remaining[pos + part.separator.len()..];
                }
                None => {
                    updated.content = remaining.trim().to_string();
                    remaining = "";
                }
            }
        }

        parts.push(updated);
    }

    parts
}

/// Split into `CHUNK_SIZE`-character slices, never inside a code point.
pub fn chunk_content(text: &str) -> Vec<String> {
    chunk_content_by(text, CHUNK_SIZE)
}

pub fn chunk_content_by(text: &str, size: usize) -> Vec<String> {
    if size == 0 || text.chars().count() <= size {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

pub fn reassemble_chunks(chunks: &[String]) -> String {
    chunks.concat()
}

impl Draft {
    /// Empty draft; a blank title becomes the default one.
    pub fn create(title: &str) -> Self {
        if title.trim().is_empty() {
            Draft::new(DEFAULT_DRAFT_TITLE)
        } else {
            Draft::new(title)
        }
    }

    fn touch(&mut self) {
        self.update_metadata();
        self.modified = Utc::now();
    }

    /// Append a part and return its id.
    pub fn add_part(&mut self, spec: PartSpec) -> String {
        let title = spec
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_PART_TITLE.to_string());
        let separator = spec
            .separator
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string());

        let part = Part {
            id: generate_id("part"),
            source: spec.source,
            title,
            content: spec.content,
            separator,
            order: self.parts.len(),
        };
        let id = part.id.clone();

        tracing::debug!(draft = %self.id, part = %id, kind = part.source.label(), "Added part");
        self.parts.push(part);
        self.touch();
        id
    }

    /// Unknown ids are ignored. Returns whether a part changed.
    pub fn update_part(&mut self, part_id: &str, update: PartUpdate) -> bool {
        let Some(part) = self.parts.iter_mut().find(|p| p.id == part_id) else {
            return false;
        };

        if let Some(source) = update.source {
            part.source = source;
        }
        if let Some(title) = update.title {
            part.title = title;
        }
        if let Some(content) = update.content {
            part.content = content;
        }
        if let Some(separator) = update.separator {
            part.separator = separator;
        }

        self.touch();
        true
    }

    /// Unknown ids are ignored. Remaining `order` values are left as they are.
    pub fn remove_part(&mut self, part_id: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| p.id != part_id);
        let removed = self.parts.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Replace the part list with the parts named in `ordered_ids`, in that
    /// order. Unknown ids are skipped, and parts whose id is not listed are
    /// dropped from the draft.
    pub fn reorder_parts(&mut self, ordered_ids: &[String]) {
        let mut by_id: HashMap<String, Part> = self
            .parts
            .drain(..)
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut parts = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if let Some(mut part) = by_id.remove(id) {
                part.order = parts.len();
                parts.push(part);
            }
        }

        if !by_id.is_empty() {
            tracing::debug!(draft = %self.id, dropped = by_id.len(), "Reorder dropped unlisted parts");
        }

        self.parts = parts;
        self.touch();
    }

    pub fn compose(&self, options: ComposeOptions) -> String {
        compose_parts(&self.parts, options)
    }

    /// Fold hand-edited canvas text back into the parts.
    pub fn apply_canvas(&mut self, text: &str) {
        self.parts = parse_canvas(text, &self.parts);
        self.touch();
    }

    pub fn update_metadata(&mut self) {
        let canvas = self.compose(ComposeOptions::plain());
        self.metadata.char_count = canvas.chars().count();
        self.metadata.part_count = self.parts.len();
        self.metadata.last_edited = Utc::now();
    }

    pub fn mark_copied(&mut self) {
        self.metadata.last_copied = Some(Utc::now());
    }

    pub fn check_limits(&self) -> SizeLimits {
        let size = self.compose(ComposeOptions::plain()).chars().count();
        let percentage = ((size as f64 / MAX_DRAFT_SIZE as f64) * 100.0).round() as u32;
        SizeLimits {
            size,
            max_size: MAX_DRAFT_SIZE,
            exceeds: size > MAX_DRAFT_SIZE,
            percentage,
        }
    }

    /// Reports problems; never blocks further edits.
    pub fn validate(&self) -> DraftValidation {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("Draft title is required".to_string());
        }

        let limits = self.check_limits();
        if limits.exceeds {
            errors.push(format!(
                "Draft size ({} chars) exceeds maximum ({})",
                limits.size, limits.max_size
            ));
        }

        DraftValidation {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Deep copy with fresh ids for the draft and every part.
    pub fn duplicate(&self, new_title: Option<&str>) -> Draft {
        let now = Utc::now();
        let mut copy = self.clone();
        copy.id = generate_id("draft");
        copy.title = match new_title.filter(|t| !t.trim().is_empty()) {
            Some(title) => title.to_string(),
            None => format!("{} (Copy)", self.title),
        };
        for part in &mut copy.parts {
            part.id = generate_id("part");
        }
        copy.created = now;
        copy.modified = now;
        copy
    }

    pub fn stats(&self) -> DraftStats {
        let canvas = self.compose(ComposeOptions::plain());
        let characters = canvas.chars().count();
        DraftStats {
            characters,
            words: canvas.split_whitespace().count(),
            lines: canvas.split('\n').count(),
            parts: self.parts.len(),
            tokens: estimate_tokens(characters),
            last_edited: self.metadata.last_edited,
            last_copied: self.metadata.last_copied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_with(contents: &[&str]) -> Draft {
        let mut draft = Draft::create("Plan");
        for (i, content) in contents.iter().enumerate() {
            draft.add_part(PartSpec {
                title: Some(format!("P{}", i + 1)),
                content: content.to_string(),
                ..Default::default()
            });
        }
        draft
    }

    #[test]
    fn test_add_part_defaults() {
        let mut draft = Draft::create("  ");
        assert_eq!(draft.title, DEFAULT_DRAFT_TITLE);

        draft.add_part(PartSpec::default());
        let part = &draft.parts[0];
        assert_eq!(part.source, PartSource::Prompt { prompt_id: None });
        assert_eq!(part.title, DEFAULT_PART_TITLE);
        assert_eq!(part.separator, DEFAULT_SEPARATOR);
        assert_eq!(part.order, 0);
        assert!(part.id.starts_with("part_"));
    }

    #[test]
    fn test_compose_uses_preceding_separator() {
        let mut draft = Draft::create("Plan");
        draft.add_part(PartSpec::free("A").with_separator(" | "));
        draft.add_part(PartSpec::free("B").with_separator(" ## "));
        draft.add_part(PartSpec::free("C").with_separator(" !! "));
        assert_eq!(draft.compose(ComposeOptions::plain()), "A | B ## C");
    }

    #[test]
    fn test_compose_headers() {
        let draft = draft_with(&["one", "two"]);
        assert_eq!(
            draft.compose(ComposeOptions::default()),
            "### 1. P1\n\none\n\n### 2. P2\n\ntwo"
        );
        let comment = ComposeOptions {
            include_headers: true,
            header_style: HeaderStyle::Comment,
        };
        assert_eq!(draft.compose(comment), "// 1. P1\n\none\n\n// 2. P2\n\ntwo");
        let none = ComposeOptions {
            include_headers: true,
            header_style: HeaderStyle::None,
        };
        assert_eq!(draft.compose(none), "one\n\ntwo");
    }

    #[test]
    fn test_round_trip_without_headers() {
        let draft = draft_with(&["alpha", "beta gamma", "delta"]);
        let text = draft.compose(ComposeOptions::plain());
        let parsed = parse_canvas(&text, &draft.parts);
        let contents: Vec<&str> = parsed.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["alpha", "beta gamma", "delta"]);
    }

    #[test]
    fn test_parse_missing_separator_empties_later_parts() {
        let draft = draft_with(&["a", "b", "c"]);
        let parsed = parse_canvas("everything in one block", &draft.parts);
        assert_eq!(parsed[0].content, "everything in one block");
        assert_eq!(parsed[1].content, "");
        assert_eq!(parsed[2].content, "");
    }

    #[test]
    fn test_parse_separator_inside_content_is_lossy() {
        let draft = draft_with(&["first\n\nstill first", "second"]);
        let text = draft.compose(ComposeOptions::plain());
        let parsed = parse_canvas(&text, &draft.parts);
        assert_eq!(parsed[0].content, "first");
        assert_eq!(parsed[1].content, "still first\n\nsecond");
    }

    #[test]
    fn test_apply_canvas_updates_metadata() {
        let mut draft = draft_with(&["a", "b"]);
        draft.apply_canvas("edited a\n\nedited b");
        assert_eq!(draft.parts[0].content, "edited a");
        assert_eq!(draft.parts[1].content, "edited b");
        assert_eq!(draft.metadata.char_count, "edited a\n\nedited b".len());
    }

    #[test]
    fn test_update_and_remove_unknown_is_noop() {
        let mut draft = draft_with(&["a"]);
        let before = draft.parts.clone();
        let modified = draft.modified;
        assert!(!draft.update_part("missing", PartUpdate::content("x")));
        assert!(!draft.remove_part("missing"));
        assert_eq!(draft.parts, before);
        assert_eq!(draft.modified, modified);
    }

    #[test]
    fn test_remove_does_not_renumber() {
        let mut draft = draft_with(&["a", "b", "c"]);
        let first = draft.parts[0].id.clone();
        draft.remove_part(&first);
        let orders: Vec<usize> = draft.parts.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(draft.metadata.part_count, 2);
    }

    #[test]
    fn test_reorder_drops_unlisted_parts() {
        let mut draft = draft_with(&["a", "b", "c"]);
        let ids: Vec<String> = draft.parts.iter().map(|p| p.id.clone()).collect();
        let new_order = vec![ids[2].clone(), "ghost".to_string(), ids[0].clone()];
        draft.reorder_parts(&new_order);

        let got: Vec<String> = draft.parts.iter().map(|p| p.id.clone()).collect();
        assert_eq!(got, vec![ids[2].clone(), ids[0].clone()]);
        let orders: Vec<usize> = draft.parts.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(draft.metadata.part_count, 2);
        assert_eq!(draft.metadata.char_count, "c\n\na".len());
    }

    #[test]
    fn test_size_limit_is_soft() {
        let mut draft = Draft::create("Big");
        draft.add_part(PartSpec::free("x".repeat(600_000)));
        let limits = draft.check_limits();
        assert!(limits.exceeds);
        assert_eq!(limits.percentage, 120);

        let validation = draft.validate();
        assert!(!validation.valid);
        assert!(validation.errors[0].contains("exceeds maximum"));

        draft.add_part(PartSpec::free("still editable"));
        assert_eq!(draft.metadata.part_count, 2);
    }

    #[test]
    fn test_duplicate_gets_fresh_ids() {
        let draft = draft_with(&["a", "b"]);
        let copy = draft.duplicate(None);
        assert_eq!(copy.title, "Plan (Copy)");
        assert_ne!(copy.id, draft.id);
        for (orig, dup) in draft.parts.iter().zip(&copy.parts) {
            assert_ne!(orig.id, dup.id);
            assert_eq!(orig.content, dup.content);
        }
        assert_eq!(draft.duplicate(Some("Other")).title, "Other");
    }

    #[test]
    fn test_stats() {
        let draft = draft_with(&["one two", "three\nfour"]);
        let stats = draft.stats();
        assert_eq!(stats.characters, "one two\n\nthree\nfour".len());
        assert_eq!(stats.words, 4);
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.parts, 2);
        assert_eq!(stats.tokens, estimate_tokens(stats.characters));
    }

    #[test]
    fn test_chunking() {
        let text = "ab".repeat(5);
        let chunks = chunk_content_by(&text, 3);
        assert_eq!(chunks.len(), 4);
        assert_eq!(reassemble_chunks(&chunks), text);
        assert_eq!(chunk_content("small"), vec!["small".to_string()]);
    }
}
