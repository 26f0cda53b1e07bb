use crate::models::Prompt;

/// Case-insensitive substring match on title and description. A blank query
/// keeps everything.
pub fn filter_prompts<'a>(prompts: &'a [Prompt], query: &str) -> Vec<&'a Prompt> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return prompts.iter().collect();
    }
    prompts
        .iter()
        .filter(|p| p.title.to_lowercase().contains(&q) || p.description.to_lowercase().contains(&q))
        .collect()
}

/// Narrow an already filtered list by query.
pub fn filter_refs<'a>(prompts: Vec<&'a Prompt>, query: &str) -> Vec<&'a Prompt> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return prompts;
    }
    prompts
        .into_iter()
        .filter(|p| p.title.to_lowercase().contains(&q) || p.description.to_lowercase().contains(&q))
        .collect()
}
