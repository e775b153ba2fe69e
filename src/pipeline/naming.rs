//! Collection identifiers derived from uploaded filenames.

const MAX_LEN: usize = 63;
const MIN_LEN: usize = 3;
const SHORT_PREFIX: &str = "doc_";
const EDGE_MARKER: char = 'x';
const HASH_SUFFIX_LEN: usize = 8;

/// Normalize a filename stem into a valid collection identifier.
///
/// The result is 3 to 63 characters of `[A-Za-z0-9._-]`, starts and ends with an ASCII
/// alphanumeric, and feeding it back in returns it unchanged.
pub fn sanitize_collection_name(stem: &str) -> String {
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if name.len() < MIN_LEN {
        name.insert_str(0, SHORT_PREFIX);
    }
    if !starts_alphanumeric(&name) {
        name.insert(0, EDGE_MARKER);
    }
    if !ends_alphanumeric(&name) {
        name.push(EDGE_MARKER);
    }
    truncate_identifier(name, MAX_LEN)
}

/// Append `-` and the first eight hex digits of `content_hash`, shortening the base so the
/// result still fits the identifier limits.
pub fn disambiguate(candidate: &str, content_hash: &str) -> String {
    let suffix: String = content_hash.chars().take(HASH_SUFFIX_LEN).collect();
    let base = truncate_identifier(candidate.to_string(), MAX_LEN - HASH_SUFFIX_LEN - 1);
    format!("{base}-{suffix}")
}

fn truncate_identifier(mut name: String, limit: usize) -> String {
    // Only ASCII survives sanitizing, so byte and char offsets agree.
    if name.len() > limit {
        name.truncate(limit);
        if !ends_alphanumeric(&name) {
            name.pop();
            name.push(EDGE_MARKER);
        }
    }
    name
}

fn starts_alphanumeric(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
}

fn ends_alphanumeric(name: &str) -> bool {
    name.chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric())
}
