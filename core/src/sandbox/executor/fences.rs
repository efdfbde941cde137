//! Cleaning generated code before it runs

use sha2::{Digest, Sha256};

const LANGUAGE_TAGS: [&str; 2] = ["python", "py"];

/// Remove markdown fences around generated code
///
/// Leading backticks and whitespace are dropped together with a `python`/`py`
/// language tag standing alone on the first line; trailing backticks and
/// whitespace likewise.
pub fn strip_code_fences(code: &str) -> String {
    let is_fence = |c: char| c.is_whitespace() || c == '`';
    let body = code.trim_start_matches(is_fence);
    let body = strip_language_tag(body);
    body.trim_start().trim_end_matches(is_fence).to_string()
}

/// `python\nprint(1)` loses the tag; `py = df['distance']` and `pyplot = 1` do not
fn strip_language_tag(body: &str) -> &str {
    let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
    let first = first.trim();
    if LANGUAGE_TAGS.iter().any(|tag| first.eq_ignore_ascii_case(tag)) {
        rest
    } else {
        body
    }
}

/// Hex SHA-256 of a program, used to correlate log lines
pub fn fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
