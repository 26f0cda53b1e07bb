//! Final text assembly for copy and preview.

use crate::error::{CanvasError, CanvasResult};
use crate::megadraft::{estimate_tokens, ComposeOptions, HeaderStyle};
use crate::models::{Draft, Prompt, DEFAULT_SEPARATOR};
use crate::variables::{self, VariableEngine};
use serde::Serialize;
use std::collections::HashMap;

pub const PROMPT_SEPARATOR: &str = "\n\n---\n\n";
pub const PREVIEW_LENGTH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub separator: String,
    pub include_title: bool,
    pub numbering: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            separator: PROMPT_SEPARATOR.to_string(),
            include_title: true,
            numbering: true,
        }
    }
}

/// Options for [`build_from_draft`]. `separator` is only used for parts whose
/// own separator is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftBuildOptions {
    pub include_headers: bool,
    pub header_style: HeaderStyle,
    pub numbering: bool,
    pub separator: String,
}

impl Default for DraftBuildOptions {
    fn default() -> Self {
        Self {
            include_headers: true,
            header_style: HeaderStyle::Markdown,
            numbering: true,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl From<ComposeOptions> for DraftBuildOptions {
    fn from(options: ComposeOptions) -> Self {
        Self {
            include_headers: options.include_headers,
            header_style: options.header_style,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenAnalysis {
    pub characters: usize,
    pub tokens: usize,
    pub words: usize,
}

/// Join a plain prompt selection. An empty selection is an error.
pub fn build(prompts: &[Prompt], options: &BuildOptions) -> CanvasResult<String> {
    if prompts.is_empty() {
        return Err(CanvasError::validation("No prompts selected"));
    }

    let mut combined = String::new();
    for (index, prompt) in prompts.iter().enumerate() {
        if options.include_title {
            if options.numbering {
                combined.push_str(&format!("{}. ", index + 1));
            }
            combined.push_str(&prompt.title);
            combined.push_str("\n\n");
        }
        combined.push_str(&prompt.content);

        if index + 1 < prompts.len() {
            combined.push_str(&options.separator);
        }
    }

    Ok(combined)
}

pub fn preview(prompts: &[Prompt], max_len: usize) -> CanvasResult<String> {
    let full = build(prompts, &BuildOptions::default())?;
    let total = full.chars().count();
    if total <= max_len {
        return Ok(full);
    }

    Ok(format!(
        "{}\n\n[... {} more characters ...]",
        crate::util::truncate_chars(&full, max_len),
        total - max_len
    ))
}

pub fn build_from_draft(draft: &Draft, options: &DraftBuildOptions) -> String {
    let mut result = String::new();
    let count = draft.parts.len();

    for (index, part) in draft.parts.iter().enumerate() {
        if options.include_headers {
            let number = if options.numbering {
                format!("{}. ", index + 1)
            } else {
                String::new()
            };
            match options.header_style {
                HeaderStyle::Markdown => result.push_str(&format!("### {}{}\n\n", number, part.title)),
                HeaderStyle::Comment => result.push_str(&format!("// {}{}\n\n", number, part.title)),
                HeaderStyle::None => {}
            }
        }

        result.push_str(&part.content);

        if index + 1 < count {
            if part.separator.is_empty() {
                result.push_str(&options.separator);
            } else {
                result.push_str(&part.separator);
            }
        }
    }

    result
}

/// Build, then resolve through `engine` when one is given.
pub async fn build_resolved(
    draft: &Draft,
    options: &DraftBuildOptions,
    engine: Option<&VariableEngine>,
    extra: &HashMap<String, String>,
) -> String {
    let raw = build_from_draft(draft, options);
    match engine {
        Some(engine) => engine.resolve(&raw, extra).await,
        None => raw,
    }
}

/// Without an engine, every placeholder in the header-less text.
pub fn unresolved_variables(draft: &Draft, engine: Option<&VariableEngine>) -> Vec<String> {
    let options = DraftBuildOptions {
        include_headers: false,
        ..Default::default()
    };
    let text = build_from_draft(draft, &options);
    match engine {
        Some(engine) => engine.unresolved(&text),
        None => extract_variables(&text),
    }
}

pub fn extract_variables(text: &str) -> Vec<String> {
    variables::parse(text)
}

pub fn highlight_variables(text: &str) -> String {
    variables::highlight(text)
}

pub fn analyze_tokens(text: &str) -> TokenAnalysis {
    let characters = text.chars().count();
    TokenAnalysis {
        characters,
        tokens: estimate_tokens(characters),
        words: text.split_whitespace().count(),
    }
}
