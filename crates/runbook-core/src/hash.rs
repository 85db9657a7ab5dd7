/// Collapse all whitespace runs to a single space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// blake3 hex digest of the normalized text. Formatting-only edits keep the hash.
pub fn content_hash(text: &str) -> String {
    blake3::hash(normalize_text(text).as_bytes()).to_hex().to_string()
}
