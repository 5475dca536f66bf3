// ── Frame envelope ──
//
// Each WebSocket binary message carries exactly one frame:
//
//   0x01 | header | field tag | topic length | topic (UTF-8) | payload
//
// The field tag is 0x22 for requests and broadcasts and 0x2a for command
// responses. The header byte is `topic length + 2` on everything we send;
// the device's value is not interpreted.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError};
use crate::protocol::topic;

const FRAME_TYPE: u8 = 0x01;
const TAG_PUBLISH: u8 = 0x22;
const TAG_RESPONSE: u8 = 0x2a;
const HEADER_LEN: usize = 4;

/// Longest topic whose `length + 2` still fits the header byte.
pub const MAX_TOPIC_LEN: usize = 253;

/// Which protobuf field of the envelope holds the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Field 4: app requests and device broadcasts.
    Publish,
    /// Field 5: device replies to a command.
    Response,
}

impl FrameKind {
    fn tag(self) -> u8 {
        match self {
            Self::Publish => TAG_PUBLISH,
            Self::Response => TAG_RESPONSE,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_PUBLISH => Some(Self::Publish),
            TAG_RESPONSE => Some(Self::Response),
            _ => None,
        }
    }
}

/// One decoded (or to-be-encoded) envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Full topic, e.g. `/QoEsI5qYXO/<device>/status/working_status`.
    pub topic: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// The topic without its `/{product_key}/{device_id}/` prefix.
    pub fn short_topic(&self) -> &str {
        topic::short_topic(&self.topic)
    }

    /// Serialize into the on-wire byte layout.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let topic = self.topic.as_bytes();
        if topic.is_empty() {
            return Err(EncodeError::EmptyTopic);
        }
        let topic_len = u8::try_from(topic.len())
            .ok()
            .filter(|len| usize::from(*len) <= MAX_TOPIC_LEN)
            .ok_or(EncodeError::TopicTooLong {
                len: topic.len(),
                max: MAX_TOPIC_LEN,
            })?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + topic.len() + self.payload.len());
        buf.put_u8(FRAME_TYPE);
        buf.put_u8(topic_len + 2);
        buf.put_u8(self.kind.tag());
        buf.put_u8(topic_len);
        buf.put_slice(topic);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parse one frame. The payload is a zero-copy slice of `data`.
    pub fn decode(data: &Bytes) -> Result<Self, DecodeError> {
        let Some(&[frame_type, _header, tag, topic_len]) = data.get(..HEADER_LEN) else {
            return Err(DecodeError::truncated(HEADER_LEN, data.len()));
        };

        if frame_type != FRAME_TYPE {
            return Err(DecodeError::malformed(format!(
                "unexpected frame type 0x{frame_type:02x}"
            )));
        }

        let kind = FrameKind::from_tag(tag)
            .ok_or_else(|| DecodeError::malformed(format!("unknown field tag 0x{tag:02x}")))?;

        let topic_end = HEADER_LEN + usize::from(topic_len);
        let topic_bytes = data
            .get(HEADER_LEN..topic_end)
            .ok_or_else(|| DecodeError::truncated(topic_end, data.len()))?;

        let topic = std::str::from_utf8(topic_bytes)
            .map_err(|e| DecodeError::malformed(format!("topic is not UTF-8: {e}")))?
            .to_owned();

        Ok(Self {
            kind,
            topic,
            payload: data.slice(topic_end..),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let frame = Frame::new(FrameKind::Publish, "/a/b/c", vec![0x08, 0x01]);
        let bytes = frame.encode().unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[0x01, 0x08, 0x22, 0x06, b'/', b'a', b'/', b'b', b'/', b'c', 0x08, 0x01]
        );
    }

    #[test]
    fn decode_response_frame() {
        let raw = Bytes::from_static(&[0x01, 0x07, 0x2a, 0x05, b'/', b'x', b'/', b'y', b'z', 0x08, 0x01]);
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.kind, FrameKind::Response);
        assert_eq!(frame.topic, "/x/yz");
        assert_eq!(frame.payload.as_ref(), &[0x08, 0x01]);
    }

    #[test]
    fn decode_empty_payload() {
        let raw = Bytes::from_static(&[0x01, 0x03, 0x22, 0x01, b't']);
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.topic, "t");
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn short_input_is_truncated() {
        let err = Frame::decode(&Bytes::from_static(&[0x01, 0x02])).unwrap_err();
        assert_eq!(err, DecodeError::truncated(4, 2));
    }

    #[test]
    fn topic_length_past_end_is_truncated() {
        let raw = Bytes::from_static(&[0x01, 0x0c, 0x22, 0x0a, b'a', b'b']);
        let err = Frame::decode(&raw).unwrap_err();
        assert_eq!(err, DecodeError::truncated(14, 6));
    }

    #[test]
    fn wrong_frame_type_is_malformed() {
        let raw = Bytes::from_static(&[0x02, 0x03, 0x22, 0x01, b't']);
        assert!(matches!(
            Frame::decode(&raw),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn unknown_field_tag_is_malformed() {
        let raw = Bytes::from_static(&[0x01, 0x03, 0x1a, 0x01, b't']);
        assert!(matches!(
            Frame::decode(&raw),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn invalid_utf8_topic_is_malformed() {
        let raw = Bytes::from_static(&[0x01, 0x04, 0x22, 0x02, 0xff, 0xfe]);
        assert!(matches!(
            Frame::decode(&raw),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn empty_topic_is_rejected() {
        let frame = Frame::new(FrameKind::Publish, "", Bytes::new());
        assert_eq!(frame.encode(), Err(EncodeError::EmptyTopic));
    }

    #[test]
    fn oversized_topic_is_rejected() {
        let frame = Frame::new(FrameKind::Publish, "x".repeat(254), Bytes::new());
        assert_eq!(
            frame.encode(),
            Err(EncodeError::TopicTooLong { len: 254, max: 253 })
        );

        let longest = Frame::new(FrameKind::Publish, "x".repeat(253), Bytes::new());
        let bytes = longest.encode().unwrap();
        assert_eq!(bytes[1], 255);
        assert_eq!(bytes[3], 253);
    }
}
