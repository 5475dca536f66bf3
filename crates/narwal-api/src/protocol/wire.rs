// ── Protobuf-lite wire format ──
//
// The device speaks protobuf but its schemas are not published, so payloads
// are read as untyped (field number, value) pairs and decoders pick out the
// fields they know. Unknown field numbers are kept and ignored.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DecodeError;

const MAX_VARINT_LEN: usize = 10;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

// ── Reading ──────────────────────────────────────────────────────────

/// A single field value, borrowed from the buffer it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

impl<'a> Value<'a> {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Varint(v) | Self::Fixed64(v) => Some(v),
            Self::Fixed32(v) => Some(u64::from(v)),
            Self::Bytes(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Varint(v) => Some(v != 0),
            _ => None,
        }
    }

    /// Floats arrive as fixed32; some firmwares send whole numbers as varints.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::Fixed32(bits) => Some(f32::from_bits(bits)),
            Self::Varint(v) => Some(v as f32),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Interpret a length-delimited value as a nested message.
    ///
    /// Returns `None` when the bytes do not parse, since strings and
    /// packed arrays share the same wire type.
    pub fn as_message(&self) -> Option<Fields<'a>> {
        self.as_bytes().and_then(|b| Fields::parse(b).ok())
    }
}

/// The parsed fields of one message, in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields<'a> {
    entries: Vec<(u32, Value<'a>)>,
}

impl<'a> Fields<'a> {
    /// Parse every field in `buf`.
    ///
    /// A length that runs past the end is [`DecodeError::Truncated`];
    /// group or reserved wire types and field number zero are
    /// [`DecodeError::Malformed`].
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < buf.len() {
            let key = read_varint(buf, &mut pos)?;
            let field = u32::try_from(key >> 3)
                .ok()
                .filter(|f| *f != 0)
                .ok_or_else(|| DecodeError::malformed(format!("invalid field key 0x{key:x}")))?;

            let value = match u8::try_from(key & 0x07).unwrap_or(u8::MAX) {
                WIRE_VARINT => Value::Varint(read_varint(buf, &mut pos)?),
                WIRE_FIXED64 => Value::Fixed64(u64::from_le_bytes(take(buf, &mut pos)?)),
                WIRE_LEN => {
                    let len = read_varint(buf, &mut pos)?;
                    let end = usize::try_from(len)
                        .ok()
                        .and_then(|len| pos.checked_add(len))
                        .ok_or_else(|| DecodeError::truncated(usize::MAX, buf.len()))?;
                    let bytes = buf
                        .get(pos..end)
                        .ok_or_else(|| DecodeError::truncated(end, buf.len()))?;
                    pos = end;
                    Value::Bytes(bytes)
                }
                WIRE_FIXED32 => Value::Fixed32(u32::from_le_bytes(take(buf, &mut pos)?)),
                wire => {
                    return Err(DecodeError::malformed(format!(
                        "unsupported wire type {wire} on field {field}"
                    )));
                }
            };

            entries.push((field, value));
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, field: u32) -> bool {
        self.entries.iter().any(|(f, _)| *f == field)
    }

    /// Last occurrence of `field`, matching protobuf's last-one-wins rule.
    pub fn get(&self, field: u32) -> Option<Value<'a>> {
        self.entries
            .iter()
            .rev()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| *v)
    }

    /// Every occurrence of a repeated field.
    pub fn all(&self, field: u32) -> impl Iterator<Item = Value<'a>> + '_ {
        self.entries
            .iter()
            .filter(move |(f, _)| *f == field)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Value<'a>)> + '_ {
        self.entries.iter().copied()
    }

    pub fn u64(&self, field: u32) -> Option<u64> {
        self.get(field).and_then(|v| v.as_u64())
    }

    pub fn u32(&self, field: u32) -> Option<u32> {
        self.get(field).and_then(|v| v.as_u32())
    }

    pub fn bool(&self, field: u32) -> Option<bool> {
        self.get(field).and_then(|v| v.as_bool())
    }

    pub fn f32(&self, field: u32) -> Option<f32> {
        self.get(field).and_then(|v| v.as_f32())
    }

    pub fn bytes(&self, field: u32) -> Option<&'a [u8]> {
        self.get(field).and_then(|v| v.as_bytes())
    }

    pub fn str(&self, field: u32) -> Option<&'a str> {
        self.get(field).and_then(|v| v.as_str())
    }

    pub fn message(&self, field: u32) -> Option<Fields<'a>> {
        self.get(field).and_then(|v| v.as_message())
    }

    /// Every occurrence of a repeated sub-message; entries that do not
    /// parse are skipped.
    pub fn messages(&self, field: u32) -> impl Iterator<Item = Fields<'a>> + '_ {
        self.all(field).filter_map(|v| v.as_message())
    }
}

/// Read one base-128 varint starting at `pos`, advancing it.
pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64, DecodeError> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| DecodeError::truncated(*pos + 1, buf.len()))?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DecodeError::malformed("varint longer than 10 bytes"))
}

fn take<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N], DecodeError> {
    let end = *pos + N;
    let bytes: [u8; N] = buf
        .get(*pos..end)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| DecodeError::truncated(end, buf.len()))?;
    *pos = end;
    Ok(bytes)
}

// ── Writing ──────────────────────────────────────────────────────────

/// Builder for protobuf payloads.
///
/// Fields are written in call order, so the same calls always produce the
/// same bytes.
#[derive(Debug, Clone, Default)]
pub struct MessageWriter {
    buf: BytesMut,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn varint(mut self, field: u32, value: u64) -> Self {
        put_key(&mut self.buf, field, WIRE_VARINT);
        put_varint(&mut self.buf, value);
        self
    }

    pub fn fixed32(mut self, field: u32, value: u32) -> Self {
        put_key(&mut self.buf, field, WIRE_FIXED32);
        self.buf.put_u32_le(value);
        self
    }

    pub fn float(self, field: u32, value: f32) -> Self {
        self.fixed32(field, value.to_bits())
    }

    pub fn bytes(mut self, field: u32, value: &[u8]) -> Self {
        put_key(&mut self.buf, field, WIRE_LEN);
        put_varint(&mut self.buf, u64::try_from(value.len()).unwrap_or(u64::MAX));
        self.buf.put_slice(value);
        self
    }

    pub fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    pub fn message(self, field: u32, inner: MessageWriter) -> Self {
        self.bytes(field, &inner.buf)
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

fn put_key(buf: &mut BytesMut, field: u32, wire_type: u8) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire_type));
}

/// Append `value` as a base-128 varint.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn varint_encoding() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 300);
        assert_eq!(buf.as_ref(), &[0xac, 0x02]);

        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, 2);
    }

    #[test]
    fn varint_running_off_the_end_is_truncated() {
        let mut pos = 0;
        let err = read_varint(&[0x80, 0x80], &mut pos).unwrap_err();
        assert_eq!(err, DecodeError::truncated(3, 2));
    }

    #[test]
    fn overlong_varint_is_malformed() {
        let mut pos = 0;
        let err = read_varint(&[0xff; 11], &mut pos).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn parse_mixed_fields() {
        let payload = MessageWriter::new()
            .varint(1, 7)
            .string(2, "hello")
            .float(3, 82.5)
            .message(4, MessageWriter::new().varint(1, 9))
            .finish();

        let fields = Fields::parse(&payload).unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.u64(1), Some(7));
        assert_eq!(fields.str(2), Some("hello"));
        assert_eq!(fields.f32(3), Some(82.5));
        assert_eq!(fields.message(4).and_then(|m| m.u64(1)), Some(9));
    }

    #[test]
    fn unknown_fields_are_kept_and_ignored() {
        let payload = MessageWriter::new()
            .varint(1, 1)
            .bytes(999, &[1, 2, 3])
            .fixed32(77, 5)
            .varint(2, 2)
            .finish();

        let fields = Fields::parse(&payload).unwrap();
        assert_eq!(fields.u64(1), Some(1));
        assert_eq!(fields.u64(2), Some(2));
        assert!(fields.contains(999));
    }

    #[test]
    fn length_past_end_is_truncated() {
        // field 2, length 10, only 3 bytes follow
        let err = Fields::parse(&[0x12, 0x0a, 1, 2, 3]).unwrap_err();
        assert_eq!(err, DecodeError::truncated(12, 5));
    }

    #[test]
    fn fixed32_past_end_is_truncated() {
        let err = Fields::parse(&[0x1d, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, DecodeError::truncated(5, 3));
    }

    #[test]
    fn group_wire_type_is_malformed() {
        // field 1, wire type 3 (start group)
        let err = Fields::parse(&[0x0b]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn field_zero_is_malformed() {
        let err = Fields::parse(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn last_occurrence_wins_and_repeated_fields_iterate() {
        let payload = MessageWriter::new()
            .varint(5, 1)
            .varint(5, 2)
            .varint(5, 3)
            .finish();
        let fields = Fields::parse(&payload).unwrap();
        assert_eq!(fields.u64(5), Some(3));
        let all: Vec<u64> = fields.all(5).filter_map(|v| v.as_u64()).collect();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn string_that_is_not_a_message() {
        // "ab" = 0x61 0x62: field 12 wire type 1 needs 8 more bytes
        let payload = MessageWriter::new().string(1, "ab").finish();
        let fields = Fields::parse(&payload).unwrap();
        assert!(fields.message(1).is_none());
        assert_eq!(fields.str(1), Some("ab"));
    }

    #[test]
    fn empty_buffer_has_no_fields() {
        assert!(Fields::parse(&[]).unwrap().is_empty());
    }
}
