//! Text encodings for response bodies and template files.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unknown text encoding: {0:?}")]
    Unknown(String),

    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Unencodable { ch: char, encoding: TextEncoding },

    #[error("byte 0x{byte:02x} at offset {offset} is not valid {encoding}")]
    Undecodable {
        byte: u8,
        offset: usize,
        encoding: TextEncoding,
    },
}

/// A named text encoding.
///
/// Labels are matched case-insensitively: `utf8`, `utf-8`, `utf_8`, `ascii`,
/// `us-ascii`, `latin1`, `latin-1`, `iso-8859-1`.
///
/// ```
/// use pathserve::encoding::TextEncoding;
///
/// let enc: TextEncoding = "Latin-1".parse().unwrap();
/// assert_eq!(enc.encode("café").unwrap(), b"caf\xe9");
/// assert!("ebcdic".parse::<TextEncoding>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl TextEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Ascii => "ascii",
            Self::Latin1 => "latin1",
        }
    }

    /// Encodes `text` into bytes.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        let limit = match self {
            Self::Utf8 => return Ok(text.as_bytes().to_vec()),
            Self::Ascii => 0x7f,
            Self::Latin1 => 0xff,
        };
        text.chars()
            .map(|ch| match u8::try_from(u32::from(ch)) {
                Ok(b) if u32::from(b) <= limit => Ok(b),
                _ => Err(EncodingError::Unencodable { ch, encoding: self }),
            })
            .collect()
    }

    /// Decodes `bytes` into text.
    pub fn decode(self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| {
                let offset = e.utf8_error().valid_up_to();
                EncodingError::Undecodable {
                    byte: bytes[offset],
                    offset,
                    encoding: self,
                }
            }),
            Self::Ascii => bytes
                .iter()
                .enumerate()
                .map(|(offset, &byte)| {
                    if byte.is_ascii() {
                        Ok(char::from(byte))
                    } else {
                        Err(EncodingError::Undecodable {
                            byte,
                            offset,
                            encoding: self,
                        })
                    }
                })
                .collect(),
            Self::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = EncodingError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" | "utf_8" => Ok(Self::Utf8),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "latin1" | "latin-1" | "latin_1" | "iso-8859-1" | "iso8859-1" => Ok(Self::Latin1),
            _ => Err(EncodingError::Unknown(label.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!("UTF-8".parse(), Ok(TextEncoding::Utf8));
        assert_eq!("utf_8".parse(), Ok(TextEncoding::Utf8));
        assert_eq!("US-ASCII".parse(), Ok(TextEncoding::Ascii));
        assert_eq!("iso-8859-1".parse(), Ok(TextEncoding::Latin1));
        assert_eq!(
            "koi8-r".parse::<TextEncoding>(),
            Err(EncodingError::Unknown("koi8-r".into()))
        );
    }

    #[test]
    fn ascii_rejects_non_ascii() {
        let err = TextEncoding::Ascii.encode("naïve").unwrap_err();
        assert_eq!(
            err,
            EncodingError::Unencodable {
                ch: 'ï',
                encoding: TextEncoding::Ascii
            }
        );
    }

    #[test]
    fn latin1_round_trip() {
        let bytes = TextEncoding::Latin1.encode("Grüße").unwrap();
        assert_eq!(bytes, b"Gr\xfc\xdfe");
        assert_eq!(TextEncoding::Latin1.decode(&bytes).unwrap(), "Grüße");
        assert!(TextEncoding::Latin1.encode("€").is_err());
    }

    #[test]
    fn utf8_decode_reports_offset() {
        let err = TextEncoding::Utf8.decode(b"ok\xff").unwrap_err();
        assert!(matches!(err, EncodingError::Undecodable { offset: 2, .. }));
    }
}
