//! Legacy text encodings.
//!
//! Scripts and their data files were authored on Japanese Windows, so both the
//! on-disk text and everything read/written through file handles is Shift-JIS
//! unless a title says otherwise. The runtime works on UTF-8 `String`s and
//! converts only at the I/O boundary.

use std::{borrow::Cow, fmt, str::FromStr};

use anyhow::{bail, Result};
use encoding_rs::{Encoding as RsEncoding, GB18030, SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};

pub trait TextDecoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Utf8,
    #[default]
    ShiftJis,
    /// Treat GBK as GB18030 (superset).
    Gbk,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Encoding::Utf8 => UTF_8,
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::Gbk => GB18030,
        }
    }
}

impl FromStr for Encoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shiftjis" | "shift_jis" | "sjis" => Ok(Encoding::ShiftJis),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "gbk" | "gb2312" | "gb18030" => Ok(Encoding::Gbk),
            other => bail!("unknown text encoding: {other}"),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf8 => write!(f, "utf8"),
            Encoding::ShiftJis => write!(f, "shiftjis"),
            Encoding::Gbk => write!(f, "gbk"),
        }
    }
}

/// A codec bound to one encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    enc: Encoding,
}

impl Codec {
    #[inline]
    pub fn new(enc: Encoding) -> Self {
        Self { enc }
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.enc
    }

    /// Encode a Rust string to bytes using the selected encoding.
    /// This is "best effort": unrepresentable chars become numeric character references.
    pub fn encode<'a>(&self, s: &'a str) -> Cow<'a, [u8]> {
        match self.enc {
            Encoding::Utf8 => Cow::Borrowed(s.as_bytes()),
            Encoding::ShiftJis | Encoding::Gbk => {
                let (cow, _, had_errors) = self.enc.as_encoding_rs().encode(s);
                if had_errors {
                    log::warn!("encode: {s:?} is not fully representable in {}", self.enc);
                }
                cow
            }
        }
    }

    pub fn encode_owned(&self, s: &str) -> Vec<u8> {
        self.encode(s).into_owned()
    }
}

impl TextDecoder for Codec {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self.enc {
            Encoding::Utf8 => String::from_utf8_lossy(bytes),
            Encoding::ShiftJis | Encoding::Gbk => {
                let (cow, _, _had_errors) = self.enc.as_encoding_rs().decode(bytes);
                cow
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn utf8_decode_is_lossy() {
        let d = Codec::new(Encoding::Utf8);
        assert_eq!(d.decode(b"ok\xFF"), "ok\u{FFFD}");
    }

    #[test]
    fn shiftjis_kana_roundtrip() {
        let d = Codec::new(Encoding::ShiftJis);
        let s = "ABCxyz123 こんにちは カタカナ 漢字";
        let b = d.encode_owned(s);
        assert_ne!(b.as_slice(), s.as_bytes());
        assert_eq!(d.decode(&b), s);
    }

    #[test]
    fn shiftjis_unmappable_becomes_char_reference() {
        let d = Codec::new(Encoding::ShiftJis);
        assert_eq!(d.encode_owned("a😀"), b"a&#128512;".to_vec());
    }

    #[test]
    fn encoding_from_str() {
        assert_eq!("SJIS".parse::<Encoding>().unwrap(), Encoding::ShiftJis);
        assert_eq!("utf-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert!("latin1".parse::<Encoding>().is_err());
    }
}
