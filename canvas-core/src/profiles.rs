//! Built-in AI platform profiles and URL based prompt filtering.

use crate::models::{Prompt, Tag};
use crate::util::generate_id;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize)]
pub struct DefaultProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub color: &'static str,
    pub matchers: &'static [&'static str],
    pub description: &'static str,
}

pub static DEFAULT_PROFILES: &[DefaultProfile] = &[
    DefaultProfile {
        id: "profile_claude",
        name: "Claude",
        color: "#D4A574",
        matchers: &["claude.ai", "anthropic.com"],
        description: "Anthropic Claude AI Assistant",
    },
    DefaultProfile {
        id: "profile_chatgpt",
        name: "ChatGPT",
        color: "#10A37F",
        matchers: &["chat.openai.com", "chatgpt.com"],
        description: "OpenAI ChatGPT",
    },
    DefaultProfile {
        id: "profile_gemini",
        name: "Gemini",
        color: "#4285F4",
        matchers: &["gemini.google.com", "bard.google.com"],
        description: "Google Gemini AI",
    },
    DefaultProfile {
        id: "profile_kimi",
        name: "Kimi",
        color: "#FF6B35",
        matchers: &["kimi.ai", "kimi.moonshot.cn"],
        description: "Moonshot AI Kimi",
    },
    DefaultProfile {
        id: "profile_deepseek",
        name: "DeepSeek",
        color: "#6B4CE6",
        matchers: &["deepseek.com", "chat.deepseek.com"],
        description: "DeepSeek AI",
    },
    DefaultProfile {
        id: "profile_copilot",
        name: "Copilot",
        color: "#0078D4",
        matchers: &["copilot.microsoft.com", "bing.com/chat"],
        description: "Microsoft Copilot",
    },
    DefaultProfile {
        id: "profile_perplexity",
        name: "Perplexity",
        color: "#20808D",
        matchers: &["perplexity.ai"],
        description: "Perplexity AI Search",
    },
];

/// Site domains mapped to profile names, checked in order.
const DOMAIN_MAP: &[(&str, &str)] = &[
    ("github.com", "GitHub"),
    ("gitlab.com", "GitLab"),
    ("stackoverflow.com", "StackOverflow"),
    ("reddit.com", "Reddit"),
    ("twitter.com", "Twitter"),
    ("x.com", "Twitter"),
    ("linkedin.com", "LinkedIn"),
    ("facebook.com", "Facebook"),
    ("youtube.com", "YouTube"),
    ("medium.com", "Medium"),
    ("dev.to", "Dev.to"),
    ("notion.so", "Notion"),
    ("figma.com", "Figma"),
    ("slack.com", "Slack"),
    ("discord.com", "Discord"),
    ("jira.atlassian", "Jira"),
    ("trello.com", "Trello"),
    ("asana.com", "Asana"),
    ("monday.com", "Monday"),
    ("airtable.com", "Airtable"),
];

/// Fallback used only when no domain matched. At most one keyword applies.
const KEYWORD_MAP: &[(&str, &str)] = &[
    ("code", "Coding"),
    ("docs", "Documentation"),
    ("api", "API"),
    ("blog", "Blogging"),
    ("shop", "E-Commerce"),
    ("mail", "Email"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub color: String,
    pub description: String,
    pub platforms: String,
}

impl DefaultProfile {
    pub fn matches(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.matchers.iter().any(|m| lower.contains(m))
    }

    /// Fresh profile tag for this catalog entry.
    pub fn to_tag(&self) -> Tag {
        Tag {
            id: generate_id("tag"),
            name: self.name.to_string(),
            color: self.color.to_string(),
            is_profile: true,
            is_default: Some(true),
            matchers: self.matchers.iter().map(|m| m.to_string()).collect(),
            description: Some(self.description.to_string()),
            created: Some(Utc::now()),
        }
    }
}

pub fn find_by_url(url: &str) -> Option<&'static DefaultProfile> {
    if url.is_empty() {
        return None;
    }
    DEFAULT_PROFILES.iter().find(|p| p.matches(url))
}

pub fn match_all(url: &str) -> Vec<&'static DefaultProfile> {
    if url.is_empty() {
        return Vec::new();
    }
    DEFAULT_PROFILES.iter().filter(|p| p.matches(url)).collect()
}

pub fn is_default(profile_id: &str) -> bool {
    DEFAULT_PROFILES.iter().any(|p| p.id == profile_id)
}

pub fn profile_info(profile_id: &str) -> Option<ProfileInfo> {
    let p = DEFAULT_PROFILES.iter().find(|p| p.id == profile_id)?;
    Some(ProfileInfo {
        name: p.name.to_string(),
        color: p.color.to_string(),
        description: p.description.to_string(),
        platforms: p.matchers.join(", "),
    })
}

/// `tags` plus every catalog profile whose name is not already used by a
/// profile tag (case-insensitive).
pub fn merge_with_user_profiles(tags: &[Tag]) -> Vec<Tag> {
    let existing: HashSet<String> = tags
        .iter()
        .filter(|t| t.is_profile)
        .map(|t| t.name.to_lowercase())
        .collect();

    let mut merged = tags.to_vec();
    merged.extend(
        DEFAULT_PROFILES
            .iter()
            .filter(|p| !existing.contains(&p.name.to_lowercase()))
            .map(DefaultProfile::to_tag),
    );
    merged
}

/// Profile names suggested by `url`: catalog profiles and known sites first,
/// a single keyword guess only when nothing else matched.
pub fn detect_profiles(url: &str) -> Vec<String> {
    if url.is_empty() {
        return Vec::new();
    }
    let lower = url.to_lowercase();
    let mut found: Vec<String> = Vec::new();

    let catalog = match_all(url).into_iter().map(|p| p.name);
    let domains = DOMAIN_MAP
        .iter()
        .filter(|(domain, _)| lower.contains(domain))
        .map(|(_, name)| *name);
    for name in catalog.chain(domains) {
        if !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    }

    if found.is_empty() {
        if let Some((_, name)) = KEYWORD_MAP.iter().find(|(kw, _)| lower.contains(kw)) {
            found.push(name.to_string());
        }
    }

    found
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub filtered: usize,
    pub hidden: usize,
    pub profiles: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AutoFilter {
    enabled: bool,
    current_url: String,
    detected: Vec<String>,
}

impl AutoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_current_url(&mut self, url: &str) {
        self.current_url = url.to_string();
        self.detected = detect_profiles(url);
        tracing::debug!(url, profiles = ?self.detected, "Detected profiles");
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn detected_profiles(&self) -> &[String] {
        &self.detected
    }

    pub fn matched_profile_tags<'a>(&self, tags: &'a [Tag]) -> Vec<&'a Tag> {
        tags.iter()
            .filter(|t| t.is_profile && self.detected.contains(&t.name))
            .collect()
    }

    /// Prompts tagged with a detected profile. The input comes back unchanged
    /// when the filter is off or nothing matched.
    pub fn filter_prompts<'a>(&self, prompts: &'a [Prompt], tags: &[Tag]) -> Vec<&'a Prompt> {
        if !self.enabled || self.detected.is_empty() {
            return prompts.iter().collect();
        }

        let ids: HashSet<&str> = self
            .matched_profile_tags(tags)
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        if ids.is_empty() {
            return prompts.iter().collect();
        }

        prompts
            .iter()
            .filter(|p| p.tag_ids.iter().any(|t| ids.contains(t.as_str())))
            .collect()
    }

    pub fn filter_stats(&self, total: usize, filtered: usize) -> FilterStats {
        FilterStats {
            total,
            filtered,
            hidden: total.saturating_sub(filtered),
            profiles: self.detected.clone(),
            enabled: self.enabled,
        }
    }
}
