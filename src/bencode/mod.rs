//! Bencode codec
//!
//! Decodes and encodes the bencode format used by torrent metainfo files and
//! tracker responses. Dictionaries are kept in a `BTreeMap`, so encoding always
//! emits keys in lexicographic byte order.

pub mod decode;
pub mod encode;
pub mod value;

pub use decode::decode;
pub use encode::encode;
pub use value::{BencodeDict, BencodeValue};
