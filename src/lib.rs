// Prompt Canvas: prompt library, draft composer and variable resolver.

pub mod logging;
pub mod session;

pub use canvas_core;
pub use canvas_core::{CanvasConfig, CanvasError, CanvasResult};
pub use logging::init_logging;
pub use session::{ComposeRequest, PromptListing, Session};

use std::collections::{BTreeMap, HashMap};

/// Parse a `name=value` assignment. The value may itself contain `=`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected name=value, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Missing variable name in {:?}", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

pub fn assignments_to_map(pairs: &[(String, String)]) -> HashMap<String, String> {
    pairs.iter().cloned().collect()
}

/// Framework values are ordered so rendering is deterministic.
pub fn assignments_to_values(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    pairs.iter().cloned().collect()
}
