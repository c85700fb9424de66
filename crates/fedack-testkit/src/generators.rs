//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use fedack_core::{AckBuilder, FederationAck, SharedKey};

/// Generate a random signing key.
pub fn shared_key() -> impl Strategy<Value = SharedKey> {
    prop::collection::vec(any::<u8>(), 1..=64)
        .prop_map(|bytes| SharedKey::new(bytes).expect("non-empty by construction"))
}

/// Generate a hyphenated UUID v4 string.
pub fn uuid_v4() -> impl Strategy<Value = String> {
    any::<[u8; 16]>().prop_map(|mut b| {
        b[6] = (b[6] & 0x0f) | 0x40;
        b[8] = (b[8] & 0x3f) | 0x80;
        let h = hex::encode(b);
        format!("{}-{}-{}-{}-{}", &h[..8], &h[8..12], &h[12..16], &h[16..20], &h[20..])
    })
}

/// Generate a dotted event type such as `payment.recovered`.
pub fn event_type() -> impl Strategy<Value = String> {
    "[a-z]{1,12}(\\.[a-z_]{1,12}){0,2}".prop_map(String::from)
}

/// Generate a node identifier.
pub fn node_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,23}".prop_map(String::from)
}

/// Generate a timestamp within the last few decades.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=2_000_000_000_000i64
}

/// Generate an arbitrary JSON value without floats.
///
/// Floats are left out because their textual form is the one place
/// canonical JSON can differ between runtimes.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        ".{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(".{0,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Parameters for generating an ACK.
#[derive(Debug, Clone)]
pub struct AckParams {
    pub key: SharedKey,
    pub node_id: String,
    pub event_type: String,
    pub timestamp: i64,
    pub nonce: String,
    pub payload: Value,
    pub prev_signature: Option<String>,
}

impl Arbitrary for AckParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            shared_key(),
            node_id(),
            event_type(),
            timestamp(),
            uuid_v4(),
            json_value(),
            any::<Option<[u8; 32]>>(),
        )
            .prop_map(
                |(key, node_id, event_type, timestamp, nonce, payload, prev)| AckParams {
                    key,
                    node_id,
                    event_type,
                    timestamp,
                    nonce,
                    payload,
                    prev_signature: prev.map(hex::encode),
                },
            )
            .boxed()
    }
}

/// Generate a signed ACK from parameters.
pub fn ack_from_params(params: &AckParams) -> FederationAck {
    AckBuilder::new(params.node_id.clone(), params.event_type.clone())
        .timestamp(params.timestamp)
        .nonce(params.nonce.clone())
        .payload(params.payload.clone())
        .prev_opt(params.prev_signature.clone())
        .sign(&params.key)
}
