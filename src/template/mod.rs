//! Template resources: files a handler wants loaded before it runs.
//!
//! A template is read from disk on every dispatch. When parsing is enabled
//! the file extension selects a decoder from a [`TemplateDecoders`] table;
//! extensions without a decoder yield the raw bytes.
//!
//! | Extension          | Result                          |
//! |--------------------|---------------------------------|
//! | `.bz2`             | decompressed bytes              |
//! | `.gz`              | decompressed bytes              |
//! | `.xz`, `.lzma`     | decompressed bytes              |
//! | `.json`            | [`Template::Json`]              |
//! | `.yaml`, `.yml`    | [`Template::Yaml`]              |
//! | `.ini`             | [`Template::Ini`]               |
//! | `.xml`             | [`Template::Xml`]               |

mod xml;

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::encoding::{EncodingError, TextEncoding};

pub use xml::XmlElement;

/// Errors raised while loading or decoding a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decompress template: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("template text: {0}")]
    Encoding(#[from] EncodingError),

    #[error("invalid JSON template: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML template: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid INI template: {0}")]
    Ini(#[from] ini::ParseError),

    #[error("invalid XML template: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML template has no root element")]
    EmptyXml,
}

/// A loaded template, ready for the handler.
#[derive(Debug, Clone)]
pub enum Template {
    /// Raw file contents, or the output of a decompressing decoder.
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Yaml(serde_yaml::Value),
    Ini(ini::Ini),
    Xml(XmlElement),
}

impl Template {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_json_mut(&mut self) -> Option<&mut serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_yaml(&self) -> Option<&serde_yaml::Value> {
        match self {
            Self::Yaml(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ini(&self) -> Option<&ini::Ini> {
        match self {
            Self::Ini(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlElement> {
        match self {
            Self::Xml(v) => Some(v),
            _ => None,
        }
    }

    /// Consumes the template, returning raw bytes if that is what it holds.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Turns raw file contents into a [`Template`]. Text formats receive the
/// handler's template encoding.
pub type Decoder = fn(Vec<u8>, TextEncoding) -> Result<Template, TemplateError>;

/// Extension → decoder table used when a handler asks for parsed templates.
///
/// # Examples
///
/// ```
/// use pathserve::template::{Template, TemplateDecoders};
///
/// let mut decoders = TemplateDecoders::default();
/// assert!(decoders.get("json").is_some());
/// assert!(decoders.get("csv").is_none());
///
/// decoders.register("txt", |bytes, _enc| Ok(Template::Bytes(bytes.to_ascii_uppercase())));
/// assert!(decoders.get(".TXT").is_some());
/// ```
#[derive(Clone)]
pub struct TemplateDecoders {
    by_extension: HashMap<String, Decoder>,
}

impl Default for TemplateDecoders {
    fn default() -> Self {
        let mut decoders = Self::empty();
        decoders.register("bz2", decode_bzip2);
        decoders.register("gz", decode_gzip);
        decoders.register("xz", decode_xz);
        decoders.register("lzma", decode_xz);
        decoders.register("json", decode_json);
        decoders.register("yaml", decode_yaml);
        decoders.register("yml", decode_yaml);
        decoders.register("ini", decode_ini);
        decoders.register("xml", decode_xml);
        decoders
    }
}

impl fmt::Debug for TemplateDecoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<_> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("TemplateDecoders")
            .field("extensions", &extensions)
            .finish()
    }
}

impl TemplateDecoders {
    /// A table with no decoders; every template loads as raw bytes.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Adds or replaces the decoder for `extension` (leading dot optional,
    /// case-insensitive).
    pub fn register(&mut self, extension: &str, decoder: Decoder) {
        self.by_extension.insert(normalize(extension), decoder);
    }

    pub fn get(&self, extension: &str) -> Option<Decoder> {
        self.by_extension.get(&normalize(extension)).copied()
    }

    /// Reads the file at `path`, decoding it by extension when `parse` is set.
    ///
    /// # Errors
    ///
    /// The file could not be read, or its decoder rejected the contents.
    pub fn load(
        &self,
        path: &Path,
        parse: bool,
        encoding: TextEncoding,
    ) -> Result<Template, TemplateError> {
        let data = std::fs::read(path).map_err(|source| TemplateError::Read {
            path: path.to_owned(),
            source,
        })?;

        if !parse {
            return Ok(Template::Bytes(data));
        }

        let decoder = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get(ext));
        match decoder {
            Some(decode) => decode(data, encoding),
            None => Ok(Template::Bytes(data)),
        }
    }
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

fn read_all(mut reader: impl Read) -> Result<Template, TemplateError> {
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(TemplateError::Decompress)?;
    Ok(Template::Bytes(out))
}

fn decode_bzip2(data: Vec<u8>, _: TextEncoding) -> Result<Template, TemplateError> {
    read_all(bzip2::read::MultiBzDecoder::new(data.as_slice()))
}

fn decode_gzip(data: Vec<u8>, _: TextEncoding) -> Result<Template, TemplateError> {
    read_all(flate2::read::MultiGzDecoder::new(data.as_slice()))
}

// Accepts both .xz containers and legacy .lzma streams.
fn decode_xz(data: Vec<u8>, _: TextEncoding) -> Result<Template, TemplateError> {
    let stream = xz2::stream::Stream::new_auto_decoder(u64::MAX, xz2::stream::CONCATENATED)
        .map_err(|e| TemplateError::Decompress(e.into()))?;
    read_all(xz2::read::XzDecoder::new_stream(data.as_slice(), stream))
}

fn decode_json(data: Vec<u8>, encoding: TextEncoding) -> Result<Template, TemplateError> {
    let text = encoding.decode(&data)?;
    Ok(Template::Json(serde_json::from_str(&text)?))
}

fn decode_yaml(data: Vec<u8>, encoding: TextEncoding) -> Result<Template, TemplateError> {
    let text = encoding.decode(&data)?;
    Ok(Template::Yaml(serde_yaml::from_str(&text)?))
}

fn decode_ini(data: Vec<u8>, encoding: TextEncoding) -> Result<Template, TemplateError> {
    let text = encoding.decode(&data)?;
    Ok(Template::Ini(ini::Ini::load_from_str(&text)?))
}

fn decode_xml(data: Vec<u8>, encoding: TextEncoding) -> Result<Template, TemplateError> {
    let text = encoding.decode(&data)?;
    Ok(Template::Xml(xml::parse(&text)?))
}
