//! Parsing for the two wire frame shapes on the streaming channel.
//!
//! Binary frames carry a 4-byte big-endian event type; event `1` (preview
//! image) carries a second 4-byte big-endian MIME selector before the image
//! payload. Text frames are a JSON object `{type, data}`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::events::{ClientEvent, PreviewMime};

const EVENT_PREVIEW_IMAGE: u32 = 1;
const MIME_JPEG: u32 = 1;
const MIME_PNG: u32 = 2;

#[derive(Debug, Deserialize)]
struct TextFrame {
    #[serde(rename = "type")]
    kind: String,
    data: Value,
}

/// Decode a binary frame into its event, or `None` if the frame is too
/// short to contain even the event-type header (malformed, discarded
/// silently rather than aborting the channel).
pub fn parse_binary(bytes: &[u8]) -> Option<ClientEvent> {
    if bytes.len() < 4 {
        return None;
    }
    let event_type = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    if event_type == EVENT_PREVIEW_IMAGE {
        if bytes.len() < 8 {
            return Some(ClientEvent::UnknownFrame { event_type });
        }
        let mime_word = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let mime = match mime_word {
            MIME_PNG => PreviewMime::Png,
            // Default to JPEG for `1` and any other value.
            _ => PreviewMime::Jpeg,
        };
        return Some(ClientEvent::Preview {
            mime,
            bytes: Arc::from(&bytes[8..]),
        });
    }

    Some(ClientEvent::UnknownFrame { event_type })
}

/// Decode a text frame. Returns `None` for frames this layer doesn't turn
/// into a [`ClientEvent`] on its own (execution events, handled by
/// [`parse_named`] once the `sid` rebind and `logs` special cases are
/// ruled out) paired with the frame's raw `(type, data)` for the caller to
/// dispatch further.
pub fn parse_text(text: &str) -> Result<(String, Value), serde_json::Error> {
    let frame: TextFrame = serde_json::from_str(text)?;
    Ok((frame.kind, frame.data))
}

/// Session-id rebind carried on `data.sid`, if present.
pub fn session_rebind(data: &Value) -> Option<String> {
    data.get("sid").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preview_jpeg_frame() {
        let mut bytes = vec![0, 0, 0, 1, 0, 0, 0, 1];
        bytes.extend_from_slice(b"fake-jpeg-data");
        match parse_binary(&bytes).unwrap() {
            ClientEvent::Preview { mime, bytes } => {
                assert_eq!(mime, PreviewMime::Jpeg);
                assert_eq!(&*bytes, b"fake-jpeg-data");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_preview_png_frame() {
        let mut bytes = vec![0, 0, 0, 1, 0, 0, 0, 2];
        bytes.extend_from_slice(b"png-bytes");
        match parse_binary(&bytes).unwrap() {
            ClientEvent::Preview { mime, .. } => assert_eq!(mime, PreviewMime::Png),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_reported_not_dropped() {
        let bytes = vec![0, 0, 0, 99, 1, 2, 3, 4];
        match parse_binary(&bytes).unwrap() {
            ClientEvent::UnknownFrame { event_type } => assert_eq!(event_type, 99),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn short_frame_yields_none() {
        assert!(parse_binary(&[0, 0, 1]).is_none());
    }

    #[test]
    fn text_frame_extracts_sid_rebind() {
        let (kind, data) = parse_text(r#"{"type":"status","data":{"sid":"abc123"}}"#).unwrap();
        assert_eq!(kind, "status");
        assert_eq!(session_rebind(&data).as_deref(), Some("abc123"));
    }

    #[test]
    fn text_frame_without_sid_has_no_rebind() {
        let (_, data) = parse_text(r#"{"type":"progress","data":{"value":1}}"#).unwrap();
        assert_eq!(session_rebind(&data), None);
    }
}
