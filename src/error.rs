//! Error types for TIFF reading, codec decoding and PDF writing

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::tiff::Tag;

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Sub-kinds of a codec failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecErrorKind {
    /// A PackBits run would overflow the expected output
    CorruptRunLength,
    /// An LZW code references a table entry that does not exist yet
    InvalidLzwCode,
    /// A bit sequence matches no CCITT code
    InvalidCcittCode,
    /// A CCITT row's runs do not sum to the row width
    UnexpectedEndOfLine,
    /// The encoded data ended before the codec finished
    UnexpectedEndOfData,
}

impl fmt::Display for CodecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecErrorKind::CorruptRunLength => "corrupt run length",
            CodecErrorKind::InvalidLzwCode => "invalid LZW code",
            CodecErrorKind::InvalidCcittCode => "invalid CCITT code",
            CodecErrorKind::UnexpectedEndOfLine => "unexpected end of line",
            CodecErrorKind::UnexpectedEndOfData => "unexpected end of data",
        };
        f.write_str(name)
    }
}

/// A decode failure inside one codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct CodecError {
    pub kind: CodecErrorKind,
    pub detail: String,
}

impl CodecError {
    pub fn new(kind: CodecErrorKind, detail: impl Into<String>) -> Self {
        CodecError {
            kind,
            detail: detail.into(),
        }
    }
}

/// Conversion error
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Byte-order marker or version constant is wrong
    #[error("Malformed TIFF header: {0}")]
    MalformedHeader(String),

    /// A directory lacks ImageWidth, ImageLength, Compression, or a per-page tag it needs
    #[error("Directory at offset {offset} is missing required tag {tag}")]
    MissingRequiredTag { tag: Tag, offset: u64 },

    /// The IFD chain points back at a directory already read
    #[error("Directory chain revisits offset {offset}")]
    CyclicDirectoryChain { offset: u64 },

    /// A structural read ran past the end of the input
    #[error("Read of {needed} bytes at offset {offset} runs past end of input")]
    TruncatedInput { offset: u64, needed: u64 },

    /// A tag value has the wrong type or arity
    #[error("Invalid value for tag {tag} in directory at offset {offset}: {detail}")]
    InvalidTag {
        tag: Tag,
        offset: u64,
        detail: String,
    },

    /// A strip or tile lies outside the input
    #[error(
        "Segment {index} at offset {offset} with length {length} extends past end of input ({available} bytes)"
    )]
    TruncatedStripData {
        index: usize,
        offset: u64,
        length: u64,
        available: u64,
    },

    /// A codec failed on one strip or tile
    #[error("Segment {segment} at offset {offset}: {source}")]
    Codec {
        segment: usize,
        offset: u64,
        #[source]
        source: CodecError,
    },

    /// Decoded pixel data has the wrong length
    #[error("Decoded buffer is {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Compression, photometric, bit depth or layout outside baseline support
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Internal invariant violation while writing the PDF
    #[error("PDF serialization error: {0}")]
    PdfSerialization(String),

    /// Conversion options are out of range
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A PDF handed to inspection could not be loaded
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// File-system failure in the path-based helpers
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fieldless classification of [`ConvertError`], used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedHeader,
    MissingRequiredTag,
    CyclicDirectoryChain,
    TruncatedInput,
    InvalidTag,
    TruncatedStripData,
    Codec(CodecErrorKind),
    BufferSizeMismatch,
    UnsupportedFeature,
    PdfSerialization,
    InvalidOptions,
    InvalidPdf,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Codec(kind) => write!(f, "CodecError({})", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::MalformedHeader(_) => ErrorKind::MalformedHeader,
            ConvertError::MissingRequiredTag { .. } => ErrorKind::MissingRequiredTag,
            ConvertError::CyclicDirectoryChain { .. } => ErrorKind::CyclicDirectoryChain,
            ConvertError::TruncatedInput { .. } => ErrorKind::TruncatedInput,
            ConvertError::InvalidTag { .. } => ErrorKind::InvalidTag,
            ConvertError::TruncatedStripData { .. } => ErrorKind::TruncatedStripData,
            ConvertError::Codec { source, .. } => ErrorKind::Codec(source.kind),
            ConvertError::BufferSizeMismatch { .. } => ErrorKind::BufferSizeMismatch,
            ConvertError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            ConvertError::PdfSerialization(_) => ErrorKind::PdfSerialization,
            ConvertError::InvalidOptions(_) => ErrorKind::InvalidOptions,
            ConvertError::InvalidPdf(_) => ErrorKind::InvalidPdf,
            ConvertError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Byte offset in the TIFF input at which the failure was detected, if known
    pub fn offset(&self) -> Option<u64> {
        match self {
            ConvertError::MalformedHeader(_) => Some(0),
            ConvertError::MissingRequiredTag { offset, .. }
            | ConvertError::CyclicDirectoryChain { offset }
            | ConvertError::TruncatedInput { offset, .. }
            | ConvertError::InvalidTag { offset, .. }
            | ConvertError::TruncatedStripData { offset, .. }
            | ConvertError::Codec { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Page-scoped failures may be skipped; everything else aborts the file
    pub fn is_page_scoped(&self) -> bool {
        matches!(
            self,
            ConvertError::MissingRequiredTag { .. }
                | ConvertError::InvalidTag { .. }
                | ConvertError::TruncatedStripData { .. }
                | ConvertError::Codec { .. }
                | ConvertError::BufferSizeMismatch { .. }
                | ConvertError::UnsupportedFeature(_)
        )
    }
}
