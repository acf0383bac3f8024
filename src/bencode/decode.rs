//! Bencode decoder
//!
//! Recursive-descent parser keyed off the lookahead byte.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::trace;

use crate::bencode::value::BencodeValue;
use crate::error::TorrentError;

/// Deepest list/dictionary nesting accepted
pub const MAX_DEPTH: usize = 256;

/// Decode exactly one bencode value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<BencodeValue> {
    trace!("Decoding {} bytes of bencode", data.len());
    let mut decoder = Decoder { data, idx: 0, depth: 0 };
    let value = decoder.parse_value()?;

    if decoder.idx != data.len() {
        return Err(TorrentError::malformed_at(
            format!("{} trailing bytes after value", data.len() - decoder.idx),
            decoder.idx,
        )
        .into());
    }

    Ok(value)
}

struct Decoder<'a> {
    data: &'a [u8],
    idx: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Option<u8> {
        self.data.get(self.idx).copied()
    }

    fn parse_value(&mut self) -> Result<BencodeValue> {
        match self.peek() {
            None => Err(TorrentError::malformed_at("Unexpected end of data", self.idx).into()),
            Some(b'i') => self.parse_integer(),
            Some(b'l') => self.parse_list(),
            Some(b'd') => self.parse_dict(),
            Some(b'0'..=b'9') => self.parse_bytes().map(BencodeValue::Bytes),
            Some(byte) => Err(TorrentError::malformed_at(
                format!("Unknown bencode type byte 0x{:02x}", byte),
                self.idx,
            )
            .into()),
        }
    }

    /// `i<digits>e`, minus sign allowed only in first position
    fn parse_integer(&mut self) -> Result<BencodeValue> {
        let start = self.idx;
        self.idx += 1;

        let end = self.data[self.idx..]
            .iter()
            .position(|&b| b == b'e')
            .map(|p| p + self.idx)
            .ok_or_else(|| TorrentError::malformed_at("Unterminated integer", start))?;

        let digits = &self.data[self.idx..end];
        let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
        if unsigned.is_empty() || !unsigned.iter().all(u8::is_ascii_digit) {
            return Err(TorrentError::malformed_at(
                format!("Invalid integer literal '{}'", String::from_utf8_lossy(digits)),
                start,
            )
            .into());
        }

        // digits are ASCII so this cannot fail; parse errors here are overflow
        let text = std::str::from_utf8(digits).map_err(|_| TorrentError::malformed_at("Invalid integer", start))?;
        let value: i64 = text
            .parse()
            .map_err(|_| TorrentError::malformed_at(format!("Integer out of range '{}'", text), start))?;

        self.idx = end + 1;
        Ok(BencodeValue::Integer(value))
    }

    /// `<len>:<bytes>`
    fn parse_bytes(&mut self) -> Result<Vec<u8>> {
        let start = self.idx;
        let colon = self.data[self.idx..]
            .iter()
            .position(|&b| b == b':')
            .map(|p| p + self.idx)
            .ok_or_else(|| TorrentError::malformed_at("Unterminated string length", start))?;

        let len_digits = &self.data[self.idx..colon];
        if !len_digits.iter().all(u8::is_ascii_digit) {
            return Err(TorrentError::malformed_at("Invalid string length", start).into());
        }
        let length: usize = std::str::from_utf8(len_digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TorrentError::malformed_at("String length out of range", start))?;

        let body_start = colon + 1;
        let remaining = self.data.len() - body_start;
        if length > remaining {
            return Err(TorrentError::malformed_at(
                format!("String length {} exceeds remaining {} bytes", length, remaining),
                start,
            )
            .into());
        }

        self.idx = body_start + length;
        Ok(self.data[body_start..self.idx].to_vec())
    }

    fn enter(&mut self, start: usize) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(TorrentError::malformed_at(format!("Nesting deeper than {} levels", MAX_DEPTH), start).into());
        }
        Ok(())
    }

    fn parse_list(&mut self) -> Result<BencodeValue> {
        let start = self.idx;
        self.enter(start)?;
        self.idx += 1;
        let mut list = Vec::new();
        loop {
            match self.peek() {
                None => return Err(TorrentError::malformed_at("Unterminated list", start).into()),
                Some(b'e') => break,
                Some(_) => list.push(self.parse_value()?),
            }
        }
        self.idx += 1;
        self.depth -= 1;
        Ok(BencodeValue::List(list))
    }

    fn parse_dict(&mut self) -> Result<BencodeValue> {
        let start = self.idx;
        self.enter(start)?;
        self.idx += 1;
        let mut dict = BTreeMap::new();
        loop {
            match self.peek() {
                None => return Err(TorrentError::malformed_at("Unterminated dictionary", start).into()),
                Some(b'e') => break,
                Some(b'0'..=b'9') => {
                    let key = self.parse_bytes()?;
                    let value = self.parse_value()?;
                    dict.insert(key, value);
                }
                Some(_) => {
                    return Err(TorrentError::malformed_at("Dictionary key must be a byte string", self.idx).into())
                }
            }
        }
        self.idx += 1;
        self.depth -= 1;
        Ok(BencodeValue::Dict(dict))
    }
}
