//! Property-based tests for line framing and inbound interpretation.

use acs_core::{AccessState, CredentialId};
use acs_protocol::{AcsCodec, Directive, Inbound, Outbound, OutboundBody};
use bytes::BytesMut;
use proptest::prelude::*;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

fn credential() -> impl Strategy<Value = CredentialId> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 4),
        prop::collection::vec(any::<u8>(), 7),
    ]
    .prop_map(|bytes| CredentialId::new(&bytes).unwrap())
}

fn state() -> impl Strategy<Value = AccessState> {
    prop::sample::select(AccessState::ALL.to_vec())
}

fn decode_all(codec: &mut AcsCodec, buffer: &mut BytesMut) -> Vec<Inbound> {
    let mut out = Vec::new();
    while let Some(item) = codec.decode(buffer).unwrap() {
        out.push(item);
    }
    out
}

proptest! {
    /// Arbitrary input below the frame limit never fails to decode.
    #[test]
    fn prop_decode_never_errors_below_limit(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = AcsCodec::new();
        let mut buffer = BytesMut::from(&input[..]);
        while codec.decode(&mut buffer).unwrap().is_some() {}
    }

    /// Splitting the byte stream at any point yields the same records.
    #[test]
    fn prop_chunking_is_transparent(
        states in prop::collection::vec(state(), 1..8),
        split in any::<prop::sample::Index>(),
    ) {
        let wire: String = states
            .iter()
            .map(|s| format!("{}\n", json!({ "State": s.as_str() })))
            .collect();
        let bytes = wire.as_bytes();
        let at = split.index(bytes.len());

        let mut codec = AcsCodec::new();
        let mut buffer = BytesMut::from(&bytes[..at]);
        let mut records = decode_all(&mut codec, &mut buffer);
        buffer.extend_from_slice(&bytes[at..]);
        records.extend(decode_all(&mut codec, &mut buffer));

        let expected: Vec<Inbound> = states
            .iter()
            .map(|s| Inbound::Record(vec![Directive::SetState(*s)]))
            .collect();
        prop_assert_eq!(records, expected);
    }

    /// Any echoed credential is recovered exactly, in any hex case.
    #[test]
    fn prop_auth_reply_recovers_credential(id in credential(), upper in any::<bool>()) {
        let mut uid = id.to_string();
        if upper {
            uid = uid.to_uppercase();
        }
        let line = format!("{}\n", json!({ "Auth": uid, "Verified": 1 }));
        let mut buffer = BytesMut::from(line.as_bytes());

        let decoded = AcsCodec::new().decode(&mut buffer).unwrap();
        prop_assert_eq!(
            decoded,
            Some(Inbound::Record(vec![Directive::AuthReply {
                credential: Some(id),
                verified: true,
                error: None,
            }]))
        );
    }

    /// Outbound text of any content stays on a single line.
    #[test]
    fn prop_message_encodes_to_one_line(seq in any::<u64>(), text in ".{0,200}") {
        let mut buffer = BytesMut::new();
        AcsCodec::new()
            .encode(Outbound::new(seq, OutboundBody::message(text.clone())), &mut buffer)
            .unwrap();

        prop_assert_eq!(buffer.iter().filter(|b| **b == b'\n').count(), 1);
        prop_assert_eq!(buffer.last(), Some(&b'\n'));

        let value: serde_json::Value = serde_json::from_slice(&buffer[..buffer.len() - 1]).unwrap();
        prop_assert_eq!(&value["Message"], &json!(text));
        prop_assert_eq!(&value["Seq"], &json!(seq));
    }
}
