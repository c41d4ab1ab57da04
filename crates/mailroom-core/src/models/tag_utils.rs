//! Tag helpers for nostr-sdk events
//!
//! Tags are read positionally (`[name, value, ...]`) so that custom and
//! standardized tags are handled the same way.

use std::borrow::Cow;

use nostr_sdk::prelude::*;

/// All tag entries with the given name, as raw string slices.
pub fn tag_entries<'a>(tags: &'a Tags, name: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
    tags.iter()
        .map(|t| t.as_slice())
        .filter(move |s| s.first().map(String::as_str) == Some(name))
}

/// First value of the first tag with the given name.
pub fn first_tag_value<'a>(tags: &'a Tags, name: &'a str) -> Option<&'a str> {
    tag_entries(tags, name).find_map(|s| s.get(1).map(String::as_str))
}

/// First value of every tag with the given name.
pub fn all_tag_values<'a>(tags: &'a Tags, name: &'a str) -> Vec<&'a str> {
    tag_entries(tags, name)
        .filter_map(|s| s.get(1).map(String::as_str))
        .collect()
}

/// Build a single-letter tag (`e`, `p`, `k`, `l`, `L`) with arbitrary values.
pub fn letter_tag(tag: SingleLetterTag, values: Vec<String>) -> Tag {
    Tag::custom(TagKind::SingleLetter(tag), values)
}

/// Build a named custom tag such as `subject`.
pub fn named_tag(name: &'static str, values: Vec<String>) -> Tag {
    Tag::custom(TagKind::Custom(Cow::Borrowed(name)), values)
}
