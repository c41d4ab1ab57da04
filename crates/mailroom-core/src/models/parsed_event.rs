//! Typed projection of raw relay events.
//!
//! Every event coming from a historical query or a live subscription is
//! parsed once into a [`ParsedEvent`]; business logic never scans tags.

use nostr_sdk::prelude::*;

use crate::constants::{kinds, tags};
use crate::models::tag_utils::{all_tag_values, first_tag_value, tag_entries};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    Envelope(EnvelopeHeader),
    LabelAssertion(LabelAssertion),
    Deletion(DeletionRequest),
    Other { kind: u16 },
}

/// Outer, unencrypted view of a gift wrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub id: String,
    /// Declared recipient (`p` tag)
    pub recipient: Option<String>,
    pub created_at: u64,
}

impl EnvelopeHeader {
    pub fn from_event(event: &Event) -> Self {
        Self {
            id: event.id.to_hex(),
            recipient: first_tag_value(&event.tags, tags::PUBKEY).map(str::to_string),
            created_at: event.created_at.as_u64(),
        }
    }
}

/// NIP-32 label event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelAssertion {
    pub event_id: String,
    pub author: String,
    /// `L` tags
    pub namespaces: Vec<String>,
    /// `l` tags as (label, mark)
    pub labels: Vec<(String, Option<String>)>,
    /// `e` tags: the labelled messages
    pub message_ids: Vec<String>,
    pub created_at: u64,
}

impl LabelAssertion {
    /// Labels asserted under `namespace`.
    ///
    /// An `l` tag without a mark belongs to the event's `L` namespace.
    pub fn labels_in(&self, namespace: &str) -> Vec<&str> {
        let declared = self.namespaces.iter().any(|ns| ns == namespace);
        self.labels
            .iter()
            .filter(|(_, mark)| match mark {
                Some(mark) => mark == namespace && declared,
                None => declared,
            })
            .map(|(label, _)| label.as_str())
            .collect()
    }
}

/// NIP-09 deletion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub event_id: String,
    pub author: String,
    pub target_ids: Vec<String>,
    /// `k` tags; empty means the request does not say
    pub target_kinds: Vec<u16>,
    pub created_at: u64,
}

impl DeletionRequest {
    pub fn targets_kind(&self, kind: u16) -> bool {
        self.target_kinds.is_empty() || self.target_kinds.contains(&kind)
    }
}

impl ParsedEvent {
    pub fn from_event(event: &Event) -> Self {
        let event_id = event.id.to_hex();
        let created_at = event.created_at.as_u64();

        match event.kind.as_u16() {
            kinds::GIFT_WRAP => ParsedEvent::Envelope(EnvelopeHeader::from_event(event)),
            kinds::LABEL => ParsedEvent::LabelAssertion(LabelAssertion {
                event_id,
                author: event.pubkey.to_hex(),
                namespaces: all_tag_values(&event.tags, tags::LABEL_NAMESPACE)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                labels: tag_entries(&event.tags, tags::LABEL)
                    .filter_map(|entry| {
                        let label = entry.get(1)?;
                        Some((label.clone(), entry.get(2).cloned()))
                    })
                    .collect(),
                message_ids: all_tag_values(&event.tags, tags::EVENT)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                created_at,
            }),
            kinds::DELETION => ParsedEvent::Deletion(DeletionRequest {
                event_id,
                author: event.pubkey.to_hex(),
                target_ids: all_tag_values(&event.tags, tags::EVENT)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                target_kinds: all_tag_values(&event.tags, tags::KIND)
                    .into_iter()
                    .filter_map(|k| k.parse().ok())
                    .collect(),
                created_at,
            }),
            kind => ParsedEvent::Other { kind },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tag_utils::letter_tag;

    fn e_tag(id: &str) -> Tag {
        letter_tag(SingleLetterTag::lowercase(Alphabet::E), vec![id.to_string()])
    }

    #[test]
    fn test_parse_gift_wrap_header() {
        let keys = Keys::generate();
        let me = Keys::generate().public_key();
        let event = EventBuilder::new(Kind::from(kinds::GIFT_WRAP), "ciphertext")
            .tag(Tag::public_key(me))
            .sign_with_keys(&keys)
            .unwrap();

        match ParsedEvent::from_event(&event) {
            ParsedEvent::Envelope(header) => {
                assert_eq!(header.id, event.id.to_hex());
                assert_eq!(header.recipient, Some(me.to_hex()));
            }
            other => panic!("expected envelope, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_label_assertion_filters_namespace() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::from(kinds::LABEL), "")
            .tag(letter_tag(
                SingleLetterTag::uppercase(Alphabet::L),
                vec!["mailroom".to_string()],
            ))
            .tag(letter_tag(
                SingleLetterTag::lowercase(Alphabet::L),
                vec!["flag:starred".to_string(), "mailroom".to_string()],
            ))
            .tag(letter_tag(
                SingleLetterTag::lowercase(Alphabet::L),
                vec!["spam".to_string(), "other".to_string()],
            ))
            .tag(letter_tag(
                SingleLetterTag::lowercase(Alphabet::L),
                vec!["state:read".to_string()],
            ))
            .tag(e_tag("m1"))
            .sign_with_keys(&keys)
            .unwrap();

        let ParsedEvent::LabelAssertion(assertion) = ParsedEvent::from_event(&event) else {
            panic!("expected label assertion");
        };
        assert_eq!(assertion.author, keys.public_key().to_hex());
        assert_eq!(assertion.message_ids, vec!["m1".to_string()]);
        assert_eq!(
            assertion.labels_in("mailroom"),
            vec!["flag:starred", "state:read"]
        );
        assert!(assertion.labels_in("other").is_empty());
    }

    #[test]
    fn test_parse_deletion_request() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::from(kinds::DELETION), "")
            .tag(e_tag("aa"))
            .tag(e_tag("bb"))
            .tag(letter_tag(
                SingleLetterTag::lowercase(Alphabet::K),
                vec![kinds::LABEL.to_string()],
            ))
            .sign_with_keys(&keys)
            .unwrap();

        let ParsedEvent::Deletion(request) = ParsedEvent::from_event(&event) else {
            panic!("expected deletion request");
        };
        assert_eq!(request.target_ids, vec!["aa".to_string(), "bb".to_string()]);
        assert!(request.targets_kind(kinds::LABEL));
        assert!(!request.targets_kind(kinds::GIFT_WRAP));
    }

    #[test]
    fn test_unknown_kind_is_other() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(ParsedEvent::from_event(&event), ParsedEvent::Other { kind: 1 });
    }
}
