//! Compiled-in prompt frameworks and their single-level template language.
//!
//! Templates understand `{{var}}` and `{{#if var}}...{{/if}}`. Conditionals do
//! not nest: the block regex is lazy and runs once, so an inner `{{/if}}`
//! closes the outer block.

use crate::error::{CanvasError, CanvasResult};
use crate::megadraft::PartSpec;
use crate::models::{PartSource, TemplateInstance};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern"));

static CONDITIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{#if (\w+)\}\}(.*?)\{\{/if\}\}").expect("conditional pattern")
});

static SIMPLE_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("variable pattern"));

#[derive(Debug, Clone, Serialize)]
pub struct FrameworkVariable {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Framework {
    pub key: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub variables: &'static [FrameworkVariable],
    pub template: &'static str,
}

const fn var(name: &'static str, description: &'static str, required: bool) -> FrameworkVariable {
    FrameworkVariable {
        name,
        description,
        required,
    }
}

const CRISE_TEMPLATE: &str = "## Context
{{context}}

## Role
You are {{role}}.

## Instruction
{{instruction}}

{{#if samples}}
## Samples
{{samples}}
{{/if}}

{{#if evaluation}}
## Evaluation Criteria
{{evaluation}}
{{/if}}";

const CRAFT_TEMPLATE: &str = "{{#if cut}}
## Step 1: Cut
{{cut}}

{{/if}}
## Step 2: Reframe
{{reframe}}

## Step 3: Add Detail
{{detail}}

## Step 4: Format
Deliver the output in this format:
{{format}}

{{#if test}}
## Step 5: Test
{{test}}
{{/if}}";

const TAG_TEMPLATE: &str = "## Task
{{task}}

## Audience
This is intended for: {{audience}}

## Goal
The desired outcome is: {{goal}}";

pub static FRAMEWORKS: &[Framework] = &[
    Framework {
        key: "CRISE",
        id: "framework_crise",
        name: "CRISE Framework",
        description: "Context, Role, Instruction, Samples, Evaluation",
        variables: &[
            var("context", "Background information", true),
            var("role", "AI role/persona", true),
            var("instruction", "Main task", true),
            var("samples", "Example inputs/outputs", false),
            var("evaluation", "Success criteria", false),
        ],
        template: CRISE_TEMPLATE,
    },
    Framework {
        key: "CRAFT",
        id: "framework_craft",
        name: "CRAFT Framework",
        description: "Cut, Reframe, Add detail, Format, Test",
        variables: &[
            var("cut", "Remove unnecessary elements", false),
            var("reframe", "Restate the problem", true),
            var("detail", "Additional context", true),
            var("format", "Output format requirements", true),
            var("test", "Quality checks", false),
        ],
        template: CRAFT_TEMPLATE,
    },
    Framework {
        key: "TAG",
        id: "framework_tag",
        name: "TAG Framework",
        description: "Task, Audience, Goal",
        variables: &[
            var("task", "What needs to be done", true),
            var("audience", "Who is the target audience", true),
            var("goal", "Desired outcome", true),
        ],
        template: TAG_TEMPLATE,
    },
];

pub fn framework(key: &str) -> Option<&'static Framework> {
    FRAMEWORKS.iter().find(|f| f.key == key)
}

fn truthy(values: &BTreeMap<String, String>, name: &str) -> bool {
    values.get(name).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Variable names in first-occurrence order, conditional markers excluded.
pub fn parse_variables(template: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = caps[1].trim();
        if name.starts_with('#') || name.starts_with('/') {
            continue;
        }
        if !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    }
    found
}

/// Expand conditionals, then substitute variables with a non-empty value.
/// Placeholders without one stay literal. The result is trimmed.
pub fn resolve_template(template: &str, values: &BTreeMap<String, String>) -> String {
    let expanded = CONDITIONAL.replace_all(template, |caps: &Captures| {
        if truthy(values, &caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    let resolved = SIMPLE_VAR.replace_all(&expanded, |caps: &Captures| {
        match values.get(&caps[1]).filter(|v| !v.is_empty()) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        }
    });

    resolved.trim().to_string()
}

pub fn unresolved_variables(template: &str, values: &BTreeMap<String, String>) -> Vec<String> {
    parse_variables(template)
        .into_iter()
        .filter(|name| !truthy(values, name))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredCheck {
    pub valid: bool,
    pub missing: Vec<String>,
}

pub fn validate_variables(
    variables: &[FrameworkVariable],
    values: &BTreeMap<String, String>,
) -> RequiredCheck {
    let missing: Vec<String> = variables
        .iter()
        .filter(|v| v.required && !truthy(values, v.name))
        .map(|v| v.name.to_string())
        .collect();
    RequiredCheck {
        valid: missing.is_empty(),
        missing,
    }
}

/// A framework paired with the values filled in so far.
#[derive(Debug, Clone)]
pub struct FrameworkInstance {
    pub framework: &'static Framework,
    pub values: BTreeMap<String, String>,
}

pub fn instantiate(key: &str, values: BTreeMap<String, String>) -> CanvasResult<FrameworkInstance> {
    let framework =
        framework(key).ok_or_else(|| CanvasError::not_found(format!("Unknown framework: {}", key)))?;
    Ok(FrameworkInstance { framework, values })
}

impl FrameworkInstance {
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn preview(&self) -> String {
        resolve_template(self.framework.template, &self.values)
    }

    pub fn validate(&self) -> RequiredCheck {
        validate_variables(self.framework.variables, &self.values)
    }

    pub fn unresolved(&self) -> Vec<String> {
        unresolved_variables(self.framework.template, &self.values)
    }

    pub fn to_template_record(&self, name: &str) -> TemplateInstance {
        let name = if name.trim().is_empty() {
            self.framework.name
        } else {
            name
        };
        TemplateInstance::new(self.framework.key, name, self.values.clone())
    }

    pub fn to_part_spec(&self) -> PartSpec {
        PartSpec {
            source: PartSource::Template {
                framework_key: Some(self.framework.key.to_string()),
            },
            title: Some(self.framework.name.to_string()),
            content: self.preview(),
            separator: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_conditional_block() {
        let t = "{{#if cut}}A{{/if}}B";
        assert_eq!(resolve_template(t, &values(&[])), "B");
        assert_eq!(resolve_template(t, &values(&[("cut", "x")])), "AB");
        assert_eq!(resolve_template(t, &values(&[("cut", "")])), "B");
    }

    #[test]
    fn test_missing_value_stays_literal() {
        let out = resolve_template("Hi {{name}}, {{other}}", &values(&[("name", "Bo")]));
        assert_eq!(out, "Hi Bo, {{other}}");
    }

    #[test]
    fn test_nested_conditionals_are_not_supported() {
        let t = "{{#if a}}1{{#if b}}2{{/if}}3{{/if}}";
        // The first {{/if}} closes the outer block; the trailing marker survives.
        let out = resolve_template(t, &values(&[("a", "x")]));
        assert_eq!(out, "1{{#if b}}23{{/if}}");
    }

    #[test]
    fn test_parse_variables_skips_markers() {
        let vars = parse_variables(CRISE_TEMPLATE);
        assert_eq!(
            vars,
            vec!["context", "role", "instruction", "samples", "evaluation"]
        );
    }

    #[test]
    fn test_validate_required() {
        let tag = framework("TAG").unwrap();
        let check = validate_variables(tag.variables, &values(&[("task", "write")]));
        assert!(!check.valid);
        assert_eq!(check.missing, vec!["audience", "goal"]);
    }

    #[test]
    fn test_instantiate_and_preview() {
        let mut inst = instantiate("TAG", BTreeMap::new()).unwrap();
        inst.set("task", "Summarise");
        inst.set("audience", "execs");
        inst.set("goal", "a decision");
        assert!(inst.validate().valid);
        assert!(inst.unresolved().is_empty());
        let text = inst.preview();
        assert!(text.starts_with("## Task\nSummarise"));
        assert!(text.ends_with("The desired outcome is: a decision"));

        let part = inst.to_part_spec();
        assert_eq!(part.source.ref_id(), Some("TAG"));
        assert_eq!(part.content, text);

        let record = inst.to_template_record("");
        assert_eq!(record.name, "TAG Framework");
        assert_eq!(record.framework_key, "TAG");
    }

    #[test]
    fn test_unknown_framework() {
        let err = instantiate("NOPE", BTreeMap::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_craft_optional_sections_dropped() {
        let inst = instantiate(
            "CRAFT",
            values(&[("reframe", "r"), ("detail", "d"), ("format", "f")]),
        )
        .unwrap();
        let text = inst.preview();
        assert!(text.starts_with("## Step 2: Reframe"));
        assert!(!text.contains("Step 5"));
    }
}
