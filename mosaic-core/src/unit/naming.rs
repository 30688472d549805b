//! Action type naming.
//!
//! A stateful unit's default action type is `<prefix>/UPDATE_<NAME>`, where
//! the prefix is the unit's own name at the top level and the dot-joined
//! path of its ancestors when nested.

use std::sync::Arc;

/// Convert a unit name to SCREAMING_SNAKE_CASE.
///
/// A run of non-word characters separates words, and every ASCII upper-case
/// letter following a word character starts a new word. Runs of capitals
/// are therefore split letter by letter: `userURL` becomes `USER_U_R_L`.
pub(crate) fn screaming_snake(name: &str) -> String {
    let mut words = vec![String::new()];
    let mut previous_word = false;
    let mut in_gap = false;

    for ch in name.chars() {
        if !(ch.is_ascii_alphanumeric() || ch == '_') {
            if !in_gap {
                words.push(String::new());
                in_gap = true;
            }
            previous_word = false;
            continue;
        }
        if ch.is_ascii_uppercase() && previous_word {
            words.push(String::new());
        }
        if let Some(current) = words.last_mut() {
            current.push(ch.to_ascii_uppercase());
        }
        previous_word = true;
        in_gap = false;
    }

    words.join("_")
}

/// Base action type for a stateful unit's own update action.
pub(crate) fn base_type(name: &str) -> String {
    format!("UPDATE_{}", screaming_snake(name))
}

/// Prefix `base` with the owning path.
///
/// Only the last `/`-separated segment of `base` is kept, so re-prefixing an
/// already prefixed type replaces the old prefix.
pub(crate) fn prefixed_type(path: &[Arc<str>], base: &str) -> String {
    let base = base.rsplit('/').next().unwrap_or(base);
    let prefix = match path {
        [] => return base.to_owned(),
        [only] => only.to_string(),
        [ancestors @ .., _] => ancestors
            .iter()
            .map(|segment| segment.as_ref())
            .collect::<Vec<_>>()
            .join("."),
    };
    format!("{prefix}/{base}")
}
