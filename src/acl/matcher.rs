//! Hierarchical topic matching.
//!
//! Topics are `/`-separated levels. A permission pattern may use `+` to match
//! exactly one level and `#` to match the rest of the topic, including nothing
//! at all beyond its position.

pub const LEVEL_SEPARATOR: char = '/';
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// Decides whether `topic` is granted by `pattern`.
///
/// A single trailing `/` on either side is ignored.
///
/// ```
/// use topicgate::acl::matcher::matches;
///
/// assert!(matches("a/b/c", "a/+/c"));
/// assert!(matches("a/b/c", "a/#"));
/// assert!(!matches("a/b/c", "a/+"));
/// ```
pub fn matches(topic: &str, pattern: &str) -> bool {
    let topic = strip_trailing_separator(topic);
    let pattern = strip_trailing_separator(pattern);

    if topic == pattern || pattern == MULTI_LEVEL_WILDCARD {
        return true;
    }

    let filters: Vec<&str> = pattern.split(LEVEL_SEPARATOR).collect();
    let mut pos = 0;

    for level in topic.split(LEVEL_SEPARATOR) {
        let Some(&filter) = filters.get(pos) else {
            return false;
        };
        if filter == MULTI_LEVEL_WILDCARD {
            return true;
        }
        if filter != SINGLE_LEVEL_WILDCARD && filter != level {
            return false;
        }
        pos += 1;
    }

    // A longer pattern never matches a shorter topic, unless all that is left
    // is a trailing `#` standing for zero further levels.
    match &filters[pos..] {
        [] => true,
        [rest] => *rest == MULTI_LEVEL_WILDCARD,
        _ => false,
    }
}

/// True when the topic contains `+` or `#` anywhere.
pub fn has_wildcards(topic: &str) -> bool {
    topic.contains(['+', '#'])
}

fn strip_trailing_separator(s: &str) -> &str {
    s.strip_suffix(LEVEL_SEPARATOR).unwrap_or(s)
}
