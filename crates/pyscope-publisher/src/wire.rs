//! Encoding of events, on the wire and in the local store.

use pyscope_tracer::event::{Event, EventKind};
use serde_json::Value;
use tokio_util::bytes::Bytes;

use crate::error::Result;

/// Encodes an event into a wire frame body.
///
/// The body is a MessagePack map with named fields:
/// `{session_id, timestamp_us, thread_id, frame_id, kind, payload}`.
pub fn encode_frame(event: &Event) -> Result<Bytes> {
    Ok(rmp_serde::to_vec_named(event)?.into())
}

/// Decodes a wire frame body (without its length prefix) into an event.
pub fn decode_frame(frame: &[u8]) -> Result<Event> {
    Ok(rmp_serde::from_slice(frame)?)
}

/// Splits an event kind into its tag and its JSON payload.
pub(crate) fn split_kind(kind: &EventKind) -> Result<(&'static str, String)> {
    let payload = match serde_json::to_value(kind)? {
        Value::Object(mut fields) => fields.remove("payload").unwrap_or(Value::Null),
        _ => Value::Null,
    };

    Ok((kind.tag(), payload.to_string()))
}

/// Joins a tag and a JSON payload back into an event kind.
pub(crate) fn join_kind(tag: &str, payload: &str) -> Result<EventKind> {
    let payload: Value = serde_json::from_str(payload)?;
    let tagged = serde_json::json!({ "kind": tag, "payload": payload });

    Ok(serde_json::from_value(tagged)?)
}
