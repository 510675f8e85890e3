//! Lossless byte <-> char mapping on top of `encoding_rs::mem`.
//!
//! Every byte `0x00..=0xFF` maps to the char with the same code point, so NUL
//! bytes, bare control characters and invalid UTF-8 survive a round trip.

use core::fmt;

use encoding_rs::mem;

/// A char outside the `U+0000..=U+00FF` range was found while encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latin1Error {
    pub ch: char,
    pub index: usize,
}

impl std::error::Error for Latin1Error {}

impl fmt::Display for Latin1Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[must_use]
pub fn decode(bytes: &[u8]) -> String {
    mem::decode_latin1(bytes).into_owned()
}

/// Encodes `text`, failing on the first char that has no single byte form.
///
/// # Errors
///
/// Returns [`Latin1Error`] naming the offending char and its char index.
pub fn encode(text: &str) -> Result<Vec<u8>, Latin1Error> {
    if mem::is_str_latin1(text) {
        return Ok(mem::encode_latin1_lossy(text).into_owned());
    }
    match text.chars().enumerate().find(|(_, ch)| u32::from(*ch) > 0xFF) {
        Some((index, ch)) => Err(Latin1Error { ch, index }),
        None => Ok(mem::encode_latin1_lossy(text).into_owned()),
    }
}

/// Like [`encode`] but substitutes `?` for unmappable chars.
#[must_use]
pub fn encode_lossy(text: &str) -> Vec<u8> {
    if mem::is_str_latin1(text) {
        return mem::encode_latin1_lossy(text).into_owned();
    }
    // encode_latin1_lossy garbles wide chars, so replace them first
    let narrowed: String = text
        .chars()
        .map(|ch| if u32::from(ch) > 0xFF { '?' } else { ch })
        .collect();
    mem::encode_latin1_lossy(&narrowed).into_owned()
}
