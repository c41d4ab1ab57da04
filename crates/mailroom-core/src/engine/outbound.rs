//! Unsigned events the engine publishes.

use nostr_sdk::prelude::*;

use crate::constants::{kinds, tags};
use crate::models::tag_utils::{letter_tag, named_tag};

/// NIP-32 label assertion: `["L", ns]`, `["l", label, ns]`, `["e", message]`.
pub fn label_assertion(me: &PublicKey, namespace: &str, message_id: &str, label: &str) -> UnsignedEvent {
    EventBuilder::new(Kind::from(kinds::LABEL), "")
        .tag(letter_tag(
            SingleLetterTag::uppercase(Alphabet::L),
            vec![namespace.to_string()],
        ))
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::L),
            vec![label.to_string(), namespace.to_string()],
        ))
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::E),
            vec![message_id.to_string()],
        ))
        .build(*me)
}

/// NIP-09 deletion request for `target`, with a `k` tag naming its kind.
pub fn deletion_request(me: &PublicKey, target: &str, target_kind: u16) -> UnsignedEvent {
    EventBuilder::new(Kind::EventDeletion, "")
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::E),
            vec![target.to_string()],
        ))
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::K),
            vec![target_kind.to_string()],
        ))
        .build(*me)
}

/// Mail rumor addressed to `to`; the body is carried verbatim.
pub fn mail_rumor(me: &PublicKey, to: &PublicKey, subject: &str, body: &str) -> UnsignedEvent {
    EventBuilder::new(Kind::from(kinds::MAIL), body)
        .tag(letter_tag(
            SingleLetterTag::lowercase(Alphabet::P),
            vec![to.to_hex()],
        ))
        .tag(named_tag(tags::SUBJECT, vec![subject.to_string()]))
        .build(*me)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, ParsedEvent};

    #[test]
    fn test_label_assertion_parses_back() {
        let keys = Keys::generate();
        let event = label_assertion(&keys.public_key(), "mailroom", "m1", "flag:starred")
            .sign_with_keys(&keys)
            .unwrap();

        let ParsedEvent::LabelAssertion(assertion) = ParsedEvent::from_event(&event) else {
            panic!("not a label assertion");
        };
        assert_eq!(assertion.labels_in("mailroom"), vec!["flag:starred"]);
        assert_eq!(assertion.message_ids, vec!["m1"]);
    }

    #[test]
    fn test_deletion_request_names_kind() {
        let keys = Keys::generate();
        let event = deletion_request(&keys.public_key(), "abc", kinds::LABEL)
            .sign_with_keys(&keys)
            .unwrap();

        let ParsedEvent::Deletion(request) = ParsedEvent::from_event(&event) else {
            panic!("not a deletion");
        };
        assert_eq!(request.target_ids, vec!["abc"]);
        assert!(request.targets_kind(kinds::LABEL));
        assert!(!request.targets_kind(kinds::GIFT_WRAP));
    }

    #[test]
    fn test_mail_rumor_becomes_message() {
        let me = Keys::generate().public_key();
        let to = Keys::generate().public_key();
        let rumor = mail_rumor(&me, &to, "Report", "Attached.\r\n");

        let message = Message::from_rumor("env", &rumor).unwrap();
        assert_eq!(message.recipient, to.to_hex());
        assert_eq!(message.subject, "Report");
        assert_eq!(message.body_text, "Attached.");
        assert_eq!(message.raw_body, "Attached.\r\n");
    }
}
