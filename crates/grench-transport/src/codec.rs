//! Bencode framing for nREPL messages.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};
use grench_core::{Message, Value};
use tokio_util::codec::{Decoder, Encoder};

/// Nesting depth beyond which a frame is rejected.
const MAX_DEPTH: usize = 64;

/// Codec error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid bencode at byte {offset}: {reason}")]
    Invalid { offset: usize, reason: &'static str },
    #[error("top-level value is not a dictionary")]
    NotADict,
}

/// Encodes requests and decodes replies as bencode dictionaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct BencodeCodec;

impl BencodeCodec {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder for BencodeCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }
        let Some((value, used)) = Parser::new(&src[..]).value(0, 0)? else {
            // Partial frame, wait for more bytes.
            return Ok(None);
        };
        src.advance(used);
        match value {
            Value::Dict(fields) => Ok(Some(Message::from(fields))),
            _ => Err(CodecError::NotADict),
        }
    }
}

impl Encoder<Message> for BencodeCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        write_dict(&BTreeMap::from(item), dst);
        Ok(())
    }
}

fn write_value(value: &Value, dst: &mut BytesMut) {
    match value {
        Value::Int(n) => {
            dst.put_u8(b'i');
            dst.put_slice(n.to_string().as_bytes());
            dst.put_u8(b'e');
        }
        Value::Str(s) => write_str(s, dst),
        Value::List(items) => {
            dst.put_u8(b'l');
            for item in items {
                write_value(item, dst);
            }
            dst.put_u8(b'e');
        }
        Value::Dict(fields) => write_dict(fields, dst),
    }
}

fn write_dict(fields: &BTreeMap<String, Value>, dst: &mut BytesMut) {
    dst.put_u8(b'd');
    // BTreeMap iterates in sorted key order, as bencode requires.
    for (key, value) in fields {
        write_str(key, dst);
        write_value(value, dst);
    }
    dst.put_u8(b'e');
}

fn write_str(s: &str, dst: &mut BytesMut) {
    dst.put_slice(s.len().to_string().as_bytes());
    dst.put_u8(b':');
    dst.put_slice(s.as_bytes());
}

/// Incremental parser. `Ok(None)` means the buffer ends mid-value.
struct Parser<'a> {
    buf: &'a [u8],
}

type Parsed<T> = Result<Option<(T, usize)>, CodecError>;

impl<'a> Parser<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn value(&self, pos: usize, depth: usize) -> Parsed<Value> {
        if depth > MAX_DEPTH {
            return Err(invalid(pos, "nesting too deep"));
        }
        let Some(&tag) = self.buf.get(pos) else {
            return Ok(None);
        };
        match tag {
            b'i' => self.int(pos),
            b'l' => self.list(pos, depth),
            b'd' => self.dict(pos, depth),
            b'0'..=b'9' => Ok(self.string(pos)?.map(|(s, end)| (Value::Str(s), end))),
            _ => Err(invalid(pos, "unexpected byte")),
        }
    }

    fn int(&self, pos: usize) -> Parsed<Value> {
        let start = pos + 1;
        let Some(len) = self.buf[start..].iter().position(|&b| b == b'e') else {
            return Ok(None);
        };
        let n = std::str::from_utf8(&self.buf[start..start + len])
            .ok()
            .and_then(|digits| digits.parse::<i64>().ok())
            .ok_or_else(|| invalid(pos, "bad integer"))?;
        Ok(Some((Value::Int(n), start + len + 1)))
    }

    fn string(&self, pos: usize) -> Parsed<String> {
        let Some(colon) = self.buf[pos..].iter().position(|&b| b == b':') else {
            if self.buf.len() - pos > 20 {
                return Err(invalid(pos, "string length too long"));
            }
            return Ok(None);
        };
        let len = std::str::from_utf8(&self.buf[pos..pos + colon])
            .ok()
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| invalid(pos, "bad string length"))?;
        let start = pos + colon + 1;
        let Some(end) = start.checked_add(len) else {
            return Err(invalid(pos, "string length overflows"));
        };
        if end > self.buf.len() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&self.buf[start..end]).into_owned();
        Ok(Some((text, end)))
    }

    fn list(&self, pos: usize, depth: usize) -> Parsed<Value> {
        let mut items = Vec::new();
        let mut cursor = pos + 1;
        loop {
            match self.buf.get(cursor) {
                None => return Ok(None),
                Some(b'e') => return Ok(Some((Value::List(items), cursor + 1))),
                Some(_) => {
                    let Some((item, next)) = self.value(cursor, depth + 1)? else {
                        return Ok(None);
                    };
                    items.push(item);
                    cursor = next;
                }
            }
        }
    }

    fn dict(&self, pos: usize, depth: usize) -> Parsed<Value> {
        let mut fields = BTreeMap::new();
        let mut cursor = pos + 1;
        loop {
            match self.buf.get(cursor) {
                None => return Ok(None),
                Some(b'e') => return Ok(Some((Value::Dict(fields), cursor + 1))),
                Some(b'0'..=b'9') => {
                    let Some((key, next)) = self.string(cursor)? else {
                        return Ok(None);
                    };
                    let Some((value, next)) = self.value(next, depth + 1)? else {
                        return Ok(None);
                    };
                    fields.insert(key, value);
                    cursor = next;
                }
                Some(_) => return Err(invalid(cursor, "dictionary key is not a string")),
            }
        }
    }
}

const fn invalid(offset: usize, reason: &'static str) -> CodecError {
    CodecError::Invalid { offset, reason }
}
