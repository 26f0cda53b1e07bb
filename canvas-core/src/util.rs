use chrono::{DateTime, Utc};
use uuid::Uuid;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix of generated ids.
const SUFFIX_LENGTH: usize = 9;

fn encode_base36(data: &[u8], length: usize) -> String {
    // Big-endian integer, at most 16 bytes.
    let mut num = 0u128;
    for &b in data.iter().take(16) {
        num = (num << 8) | (b as u128);
    }

    let mut chars = Vec::new();
    let base = 36u128;
    while num > 0 {
        let rem = (num % base) as usize;
        num /= base;
        chars.push(BASE36_ALPHABET[rem] as char);
    }
    chars.reverse();

    let needed = length.saturating_sub(chars.len());
    let mut padded: Vec<char> = std::iter::repeat('0').take(needed).collect();
    padded.extend(chars);

    // Keep the least significant digits when too long.
    if padded.len() > length {
        let start = padded.len() - length;
        padded[start..].iter().collect()
    } else {
        padded.into_iter().collect()
    }
}

/// Generate an id of the form `<prefix>_<unix millis>_<base36 suffix>`.
///
/// Ids sort by creation time down to the millisecond. Two ids minted in the
/// same millisecond are told apart only by the random suffix.
pub fn generate_id(prefix: &str) -> String {
    generate_id_at(prefix, Utc::now())
}

pub fn generate_id_at(prefix: &str, at: DateTime<Utc>) -> String {
    let random = Uuid::new_v4();
    let suffix = encode_base36(&random.as_bytes()[..8], SUFFIX_LENGTH);
    format!("{}_{}_{}", prefix, at.timestamp_millis(), suffix)
}

/// Millisecond component of an id produced by [`generate_id`].
pub fn id_timestamp(id: &str) -> Option<i64> {
    let mut parts = id.rsplitn(3, '_');
    let _suffix = parts.next()?;
    parts.next()?.parse().ok()
}

/// Lowercase and collapse whitespace runs into `-`, used for export file names.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_base36() {
        assert_eq!(encode_base36(&[0], 6), "000000");

        // u32::MAX is 1z141z3 in base 36
        let bytes = u32::MAX.to_be_bytes();
        assert_eq!(encode_base36(&bytes, 6), "z141z3");

        let val = 123456u32;
        assert_eq!(encode_base36(&val.to_be_bytes(), 6), "002n9c");
    }

    #[test]
    fn test_generate_id_shape() {
        let at = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let id = generate_id_at("prompt", at);
        assert!(id.starts_with("prompt_1600000000000_"));
        assert_eq!(id.len(), "prompt_1600000000000_".len() + SUFFIX_LENGTH);
        assert_eq!(id_timestamp(&id), Some(1_600_000_000_000));
    }

    #[test]
    fn test_generate_id_unique_within_same_millisecond() {
        let at = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let a = generate_id_at("part", at);
        let b = generate_id_at("part", at);
        assert_ne!(a, b);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My  Work Pack"), "my-work-pack");
        assert_eq!(slugify("Solo"), "solo");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
