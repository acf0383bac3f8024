//! Bencode encoder
//!
//! Encoding is infallible: every `BencodeValue` is representable. Dictionary
//! keys come out of the `BTreeMap` in raw byte order, which makes the output
//! canonical.

use bytes::{BufMut, BytesMut};

use crate::bencode::value::BencodeValue;

/// Encode a value to its canonical bencode bytes
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.to_vec()
}

fn encode_bytes(bytes: &[u8], buf: &mut BytesMut) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}

fn encode_into(value: &BencodeValue, buf: &mut BytesMut) {
    match value {
        BencodeValue::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        BencodeValue::Bytes(b) => encode_bytes(b, buf),
        BencodeValue::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        BencodeValue::Dict(entries) => {
            buf.put_u8(b'd');
            for (key, item) in entries {
                encode_bytes(key, buf);
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

impl BencodeValue {
    /// Canonical bencode encoding of this value
    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }
}
