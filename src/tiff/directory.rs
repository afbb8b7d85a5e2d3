//! TIFF header and image file directory chain

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::cursor::{ByteCursor, Endianness};
use crate::error::{ConvertError, Result};
use crate::tiff::tags::{FieldType, Tag, TagMap, TagValue};

const CLASSIC_VERSION: u16 = 42;
const BIGTIFF_VERSION: u16 = 43;
const HEADER_LEN: usize = 8;
const ENTRY_LEN: u64 = 12;

/// Parsed 8-byte TIFF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub order: Endianness,
    pub first_ifd: u64,
}

/// One image file directory, in chain order
#[derive(Debug, Clone)]
pub struct Directory {
    pub index: usize,
    pub offset: u64,
    pub tags: TagMap,
}

/// Cheap check for a classic TIFF magic number
pub fn is_tiff(data: &[u8]) -> bool {
    parse_header(data).is_ok()
}

fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < HEADER_LEN {
        return Err(ConvertError::MalformedHeader(format!(
            "input is {} bytes, shorter than a TIFF header",
            data.len()
        )));
    }
    let order = match &data[0..2] {
        b"II" => Endianness::Little,
        b"MM" => Endianness::Big,
        other => {
            return Err(ConvertError::MalformedHeader(format!(
                "unknown byte-order marker {:02X} {:02X}",
                other[0], other[1]
            )))
        }
    };
    let mut cursor = ByteCursor::new(data, order);
    cursor.seek(2)?;
    match cursor.read_u16()? {
        CLASSIC_VERSION => {}
        BIGTIFF_VERSION => {
            return Err(ConvertError::UnsupportedFeature("BigTIFF".to_string()));
        }
        version => {
            return Err(ConvertError::MalformedHeader(format!(
                "version {} is not 42",
                version
            )))
        }
    }
    let first_ifd = cursor.read_u32()? as u64;
    Ok(TiffHeader { order, first_ifd })
}

/// Reads the header and walks the IFD chain of a TIFF byte source
#[derive(Debug)]
pub struct TiffDirectoryParser<'a> {
    cursor: ByteCursor<'a>,
    header: TiffHeader,
}

impl<'a> TiffDirectoryParser<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = parse_header(data)?;
        if header.first_ifd == 0 {
            return Err(ConvertError::MalformedHeader(
                "header points at no image directory".to_string(),
            ));
        }
        debug!(order = ?header.order, first_ifd = header.first_ifd, "Parsed TIFF header");
        Ok(TiffDirectoryParser {
            cursor: ByteCursor::new(data, header.order),
            header,
        })
    }

    pub fn header(&self) -> TiffHeader {
        self.header
    }

    /// Walk the chain until a zero next-offset, or until `limit` directories were read.
    ///
    /// Each directory must carry ImageWidth, ImageLength and Compression. A chain that
    /// points back at an offset already visited fails instead of looping.
    pub fn parse_all(&mut self, limit: Option<usize>) -> Result<Vec<Directory>> {
        let mut directories = Vec::new();
        let mut seen = HashSet::new();
        let mut next = self.header.first_ifd;

        while next != 0 {
            if limit.is_some_and(|max| directories.len() >= max) {
                debug!(limit = ?limit, "Stopping directory walk at page limit");
                break;
            }
            if !seen.insert(next) {
                return Err(ConvertError::CyclicDirectoryChain { offset: next });
            }
            let (tags, following) = self.read_directory(next)?;
            for required in [Tag::ImageWidth, Tag::ImageLength, Tag::Compression] {
                if !tags.contains(required) {
                    return Err(tags.missing(required));
                }
            }
            directories.push(Directory {
                index: directories.len(),
                offset: next,
                tags,
            });
            next = following;
        }

        debug!(count = directories.len(), "Parsed image directories");
        Ok(directories)
    }

    fn read_directory(&mut self, offset: u64) -> Result<(TagMap, u64)> {
        self.cursor.seek(offset).map_err(|_| ConvertError::TruncatedInput {
            offset,
            needed: 2,
        })?;
        let count = self.cursor.read_u16()? as u64;
        // Make sure the whole entry table and next pointer exist before decoding any of it
        self.cursor.slice_at(offset + 2, count * ENTRY_LEN + 4)?;

        let mut tags = TagMap::new(offset);
        for _ in 0..count {
            let entry_offset = self.cursor.position();
            let id = self.cursor.read_u16()?;
            let raw_type = self.cursor.read_u16()?;
            let value_count = self.cursor.read_u32()? as u64;
            let slot = self.cursor.read_bytes(4)?;

            let Some(tag) = Tag::from_u16(id) else {
                continue;
            };
            let Some(field_type) = FieldType::from_u16(raw_type) else {
                warn!(tag = %tag, field_type = raw_type, "Skipping entry with unknown field type");
                continue;
            };
            let size = value_count * field_type.size();
            let bytes = if size <= 4 {
                &slot[..size as usize]
            } else {
                let value_offset = self.cursor.u32_from(slot) as u64;
                self.cursor.slice_at(value_offset, size)?
            };
            let value = self.decode_value(field_type, bytes);
            debug!(tag = %tag, entry_offset, count = value_count, "Read directory entry");
            tags.insert(tag, value);
        }

        let next = self.cursor.read_u32()? as u64;
        Ok((tags, next))
    }

    fn decode_value(&self, field_type: FieldType, bytes: &[u8]) -> TagValue {
        let c = &self.cursor;
        match field_type {
            FieldType::Byte | FieldType::Undefined => TagValue::Bytes(bytes.to_vec()),
            FieldType::SByte => {
                TagValue::SignedShorts(bytes.iter().map(|&b| b as i8 as i16).collect())
            }
            FieldType::Ascii => {
                let text = bytes.split(|&b| b == 0).next().unwrap_or_default();
                TagValue::Ascii(String::from_utf8_lossy(text).into_owned())
            }
            FieldType::Short => {
                TagValue::Shorts(bytes.chunks_exact(2).map(|b| c.u16_from(b)).collect())
            }
            FieldType::SShort => TagValue::SignedShorts(
                bytes.chunks_exact(2).map(|b| c.u16_from(b) as i16).collect(),
            ),
            FieldType::Long => {
                TagValue::Longs(bytes.chunks_exact(4).map(|b| c.u32_from(b)).collect())
            }
            FieldType::SLong => TagValue::SignedLongs(
                bytes.chunks_exact(4).map(|b| c.u32_from(b) as i32).collect(),
            ),
            FieldType::Rational => TagValue::Rationals(
                bytes
                    .chunks_exact(8)
                    .map(|b| (c.u32_from(&b[..4]), c.u32_from(&b[4..])))
                    .collect(),
            ),
            FieldType::SRational => TagValue::SignedRationals(
                bytes
                    .chunks_exact(8)
                    .map(|b| (c.u32_from(&b[..4]) as i32, c.u32_from(&b[4..]) as i32))
                    .collect(),
            ),
            FieldType::Float => TagValue::Floats(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_bits(c.u32_from(b)))
                    .collect(),
            ),
            FieldType::Double => TagValue::Doubles(
                bytes
                    .chunks_exact(8)
                    .map(|b| {
                        let (hi, lo) = match c.order() {
                            Endianness::Little => (c.u32_from(&b[4..]), c.u32_from(&b[..4])),
                            Endianness::Big => (c.u32_from(&b[..4]), c.u32_from(&b[4..])),
                        };
                        f64::from_bits(((hi as u64) << 32) | lo as u64)
                    })
                    .collect(),
            ),
        }
    }
}
