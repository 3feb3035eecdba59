//! Wildcard matching for event-route patterns
//!
//! `*` matches anything; `prefix*`, `*suffix` and `prefix*suffix` anchor the
//! literal fragments. Patterns with multiple `*` reduce to an
//! ordered-substring walk: the first fragment is anchored at the start, the
//! last at the end (when non-empty), and the middle fragments must appear in
//! order between them. Regex-like semantics are deliberately not provided.

/// Match `input` against a wildcard `pattern`
pub fn wildcard_match(pattern: &str, input: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == input;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    let mut pos = 0;
    if !first.is_empty() {
        if !input.starts_with(first) {
            return false;
        }
        pos = first.len();
    }

    let end = if !last.is_empty() {
        if !input.ends_with(last) {
            return false;
        }
        match input.len().checked_sub(last.len()) {
            Some(end) if end >= pos => end,
            _ => return false,
        }
    } else {
        input.len()
    };

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match input[pos..end].find(*part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    true
}

/// Match an object-store pattern against a bucket and key
///
/// - `*` matches everything;
/// - a pattern starting with `/` is a pure key glob;
/// - `bucket/keyglob` splits at the first slash, the bucket part matched as
///   a wildcard and the key part as a glob;
/// - a pattern without a slash constrains the bucket only.
pub fn object_store_match(pattern: &str, bucket: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(key_glob) = pattern.strip_prefix('/') {
        return wildcard_match(key_glob, key);
    }
    match pattern.split_once('/') {
        Some((bucket_pattern, key_glob)) => {
            wildcard_match(bucket_pattern, bucket) && wildcard_match(key_glob, key)
        }
        None => wildcard_match(pattern, bucket),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*", "anything at all"));
    }

    #[test]
    fn literal_patterns_require_equality() {
        assert!(wildcard_match("orders", "orders"));
        assert!(!wildcard_match("orders", "orders-v2"));
    }

    #[test]
    fn prefix_and_suffix_anchors() {
        assert!(wildcard_match("scheduled-*", "scheduled-hourly-cleanup"));
        assert!(!wildcard_match("scheduled-*", "daily-cleanup"));
        assert!(wildcard_match("*.jpg", "photos/cat.jpg"));
        assert!(!wildcard_match("*.jpg", "photos/cat.png"));
        assert!(wildcard_match("img-*-final", "img-0042-final"));
        assert!(!wildcard_match("img-*-final", "img-0042-draft"));
    }

    #[test]
    fn overlapping_anchors_are_rejected() {
        // "ab*ba" cannot match "aba": the anchors would have to overlap.
        assert!(!wildcard_match("ab*ba", "aba"));
        assert!(wildcard_match("ab*ba", "abba"));
    }

    #[test]
    fn multi_star_walks_fragments_in_order() {
        assert!(wildcard_match("a*b*c", "a-1-b-2-c"));
        assert!(!wildcard_match("a*b*c", "a-1-c-2-b"));
        assert!(wildcard_match("*mid*", "left-mid-right"));
        assert!(!wildcard_match("*mid*", "left-right"));
    }

    #[test]
    fn object_store_star_matches_all() {
        assert!(object_store_match("*", "any-bucket", "any/key"));
    }

    #[test]
    fn object_store_splits_bucket_and_key() {
        assert!(object_store_match("uploads/*.jpg", "uploads", "cat.jpg"));
        assert!(!object_store_match("uploads/*.jpg", "other", "cat.jpg"));
        assert!(!object_store_match("uploads/*.jpg", "uploads", "cat.png"));
        assert!(object_store_match("up*/images/*", "uploads", "images/cat.jpg"));
    }

    #[test]
    fn object_store_leading_slash_is_pure_key_glob() {
        assert!(object_store_match("/incoming/*.csv", "whatever", "incoming/batch.csv"));
        assert!(!object_store_match("/incoming/*.csv", "whatever", "outgoing/batch.csv"));
    }

    #[test]
    fn object_store_bucket_only_pattern() {
        assert!(object_store_match("uploads", "uploads", "any/key"));
        assert!(object_store_match("uploads-*", "uploads-prod", "k"));
        assert!(!object_store_match("uploads", "archive", "k"));
    }
}
