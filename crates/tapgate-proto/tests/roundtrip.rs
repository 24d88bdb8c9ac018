//! Property-based round-trip coverage for the wire envelope.

use proptest::prelude::*;
use serde_json::Value;
use tapgate_proto::Envelope;

fn payload_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<u32>().prop_map(|n| Value::from(n)),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ];
    proptest::collection::btree_map("[a-zA-Z][a-zA-Z0-9]{0,8}", leaf, 0..4)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

proptest! {
    #[test]
    fn envelope_round_trip(
        kind in "[A-Z][A-Z_]{0,23}",
        payload in payload_strategy(),
        response in any::<bool>(),
    ) {
        let env = if response {
            Envelope::response(&kind, payload)
        } else {
            Envelope::event(&kind, payload)
        };
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        prop_assert_eq!(back, env);
    }
}
