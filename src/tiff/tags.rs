//! Baseline TIFF tags, field types and typed tag values

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ConvertError, Result};

/// Tags the converter understands. Unknown tags are skipped while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    NewSubfileType,
    ImageWidth,
    ImageLength,
    BitsPerSample,
    Compression,
    PhotometricInterpretation,
    FillOrder,
    StripOffsets,
    SamplesPerPixel,
    RowsPerStrip,
    StripByteCounts,
    XResolution,
    YResolution,
    PlanarConfiguration,
    T4Options,
    T6Options,
    ResolutionUnit,
    Predictor,
    ColorMap,
    TileWidth,
    TileLength,
    TileOffsets,
    TileByteCounts,
    ExtraSamples,
    SampleFormat,
}

impl Tag {
    pub fn from_u16(id: u16) -> Option<Tag> {
        let tag = match id {
            254 => Tag::NewSubfileType,
            256 => Tag::ImageWidth,
            257 => Tag::ImageLength,
            258 => Tag::BitsPerSample,
            259 => Tag::Compression,
            262 => Tag::PhotometricInterpretation,
            266 => Tag::FillOrder,
            273 => Tag::StripOffsets,
            277 => Tag::SamplesPerPixel,
            278 => Tag::RowsPerStrip,
            279 => Tag::StripByteCounts,
            282 => Tag::XResolution,
            283 => Tag::YResolution,
            284 => Tag::PlanarConfiguration,
            292 => Tag::T4Options,
            293 => Tag::T6Options,
            296 => Tag::ResolutionUnit,
            317 => Tag::Predictor,
            320 => Tag::ColorMap,
            322 => Tag::TileWidth,
            323 => Tag::TileLength,
            324 => Tag::TileOffsets,
            325 => Tag::TileByteCounts,
            338 => Tag::ExtraSamples,
            339 => Tag::SampleFormat,
            _ => return None,
        };
        Some(tag)
    }

    pub fn id(self) -> u16 {
        match self {
            Tag::NewSubfileType => 254,
            Tag::ImageWidth => 256,
            Tag::ImageLength => 257,
            Tag::BitsPerSample => 258,
            Tag::Compression => 259,
            Tag::PhotometricInterpretation => 262,
            Tag::FillOrder => 266,
            Tag::StripOffsets => 273,
            Tag::SamplesPerPixel => 277,
            Tag::RowsPerStrip => 278,
            Tag::StripByteCounts => 279,
            Tag::XResolution => 282,
            Tag::YResolution => 283,
            Tag::PlanarConfiguration => 284,
            Tag::T4Options => 292,
            Tag::T6Options => 293,
            Tag::ResolutionUnit => 296,
            Tag::Predictor => 317,
            Tag::ColorMap => 320,
            Tag::TileWidth => 322,
            Tag::TileLength => 323,
            Tag::TileOffsets => 324,
            Tag::TileByteCounts => 325,
            Tag::ExtraSamples => 338,
            Tag::SampleFormat => 339,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// TIFF 6.0 field types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
}

impl FieldType {
    pub fn from_u16(value: u16) -> Option<FieldType> {
        let field_type = match value {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            6 => FieldType::SByte,
            7 => FieldType::Undefined,
            8 => FieldType::SShort,
            9 => FieldType::SLong,
            10 => FieldType::SRational,
            11 => FieldType::Float,
            12 => FieldType::Double,
            _ => return None,
        };
        Some(field_type)
    }

    /// Size in bytes of a single value of this type
    pub fn size(self) -> u64 {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double => 8,
        }
    }
}

/// A decoded tag value
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bytes(Vec<u8>),
    Ascii(String),
    Shorts(Vec<u16>),
    Longs(Vec<u32>),
    Rationals(Vec<(u32, u32)>),
    SignedShorts(Vec<i16>),
    SignedLongs(Vec<i32>),
    SignedRationals(Vec<(i32, i32)>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl TagValue {
    pub fn count(&self) -> usize {
        match self {
            TagValue::Bytes(v) => v.len(),
            TagValue::Ascii(v) => v.len(),
            TagValue::Shorts(v) => v.len(),
            TagValue::Longs(v) => v.len(),
            TagValue::Rationals(v) => v.len(),
            TagValue::SignedShorts(v) => v.len(),
            TagValue::SignedLongs(v) => v.len(),
            TagValue::SignedRationals(v) => v.len(),
            TagValue::Floats(v) => v.len(),
            TagValue::Doubles(v) => v.len(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            TagValue::Bytes(_) => "BYTE",
            TagValue::Ascii(_) => "ASCII",
            TagValue::Shorts(_) => "SHORT",
            TagValue::Longs(_) => "LONG",
            TagValue::Rationals(_) => "RATIONAL",
            TagValue::SignedShorts(_) => "SSHORT",
            TagValue::SignedLongs(_) => "SLONG",
            TagValue::SignedRationals(_) => "SRATIONAL",
            TagValue::Floats(_) => "FLOAT",
            TagValue::Doubles(_) => "DOUBLE",
        }
    }

    /// Unsigned integer values widened to u32
    pub fn as_u32_vec(&self) -> std::result::Result<Vec<u32>, String> {
        match self {
            TagValue::Bytes(v) => Ok(v.iter().map(|&b| b as u32).collect()),
            TagValue::Shorts(v) => Ok(v.iter().map(|&s| s as u32).collect()),
            TagValue::Longs(v) => Ok(v.clone()),
            other => Err(format!("expected an unsigned integer, found {}", other.type_name())),
        }
    }

    pub fn as_u32(&self) -> std::result::Result<u32, String> {
        let values = self.as_u32_vec()?;
        match values.as_slice() {
            [value] => Ok(*value),
            _ => Err(format!("expected 1 value, found {}", values.len())),
        }
    }

    /// First rational (or integer) value as a float
    pub fn as_f64(&self) -> std::result::Result<f64, String> {
        if self.count() != 1 {
            return Err(format!("expected 1 value, found {}", self.count()));
        }
        match self {
            TagValue::Rationals(v) => {
                let (num, den) = v[0];
                if den == 0 {
                    Err("rational with zero denominator".to_string())
                } else {
                    Ok(num as f64 / den as f64)
                }
            }
            TagValue::Floats(v) => Ok(v[0] as f64),
            TagValue::Doubles(v) => Ok(v[0]),
            other => other.as_u32().map(|v| v as f64),
        }
    }
}

/// The tags of one directory together with the directory's file offset,
/// so accessor failures can say where the bad value lives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMap {
    offset: u64,
    entries: BTreeMap<Tag, TagValue>,
}

impl TagMap {
    pub fn new(offset: u64) -> Self {
        TagMap {
            offset,
            entries: BTreeMap::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn insert(&mut self, tag: Tag, value: TagValue) {
        self.entries.insert(tag, value);
    }

    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &TagValue)> {
        self.entries.iter()
    }

    fn invalid(&self, tag: Tag, detail: String) -> ConvertError {
        ConvertError::InvalidTag {
            tag,
            offset: self.offset,
            detail,
        }
    }

    pub fn missing(&self, tag: Tag) -> ConvertError {
        ConvertError::MissingRequiredTag {
            tag,
            offset: self.offset,
        }
    }

    pub fn u32(&self, tag: Tag) -> Result<Option<u32>> {
        match self.get(tag) {
            None => Ok(None),
            Some(value) => value
                .as_u32()
                .map(Some)
                .map_err(|detail| self.invalid(tag, detail)),
        }
    }

    pub fn required_u32(&self, tag: Tag) -> Result<u32> {
        self.u32(tag)?.ok_or_else(|| self.missing(tag))
    }

    pub fn u32_or(&self, tag: Tag, default: u32) -> Result<u32> {
        Ok(self.u32(tag)?.unwrap_or(default))
    }

    pub fn u32_array(&self, tag: Tag) -> Result<Option<Vec<u32>>> {
        match self.get(tag) {
            None => Ok(None),
            Some(value) => value
                .as_u32_vec()
                .map(Some)
                .map_err(|detail| self.invalid(tag, detail)),
        }
    }

    pub fn f64(&self, tag: Tag) -> Result<Option<f64>> {
        match self.get(tag) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .map_err(|detail| self.invalid(tag, detail)),
        }
    }

    /// Fail with `InvalidTag` for this directory
    pub fn reject(&self, tag: Tag, detail: impl Into<String>) -> ConvertError {
        self.invalid(tag, detail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_tag_ids_round_trip() {
        for id in 0..=u16::MAX {
            if let Some(tag) = Tag::from_u16(id) {
                assert_eq!(tag.id(), id);
            }
        }
        assert_eq!(Tag::from_u16(273), Some(Tag::StripOffsets));
        assert_eq!(Tag::from_u16(305), None);
        assert_eq!(Tag::Compression.to_string(), "Compression");
    }

    #[test]
    fn test_field_type_sizes() {
        assert_eq!(FieldType::from_u16(3).map(FieldType::size), Some(2));
        assert_eq!(FieldType::from_u16(5).map(FieldType::size), Some(8));
        assert_eq!(FieldType::from_u16(13), None);
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(TagValue::Bytes(vec![8]).as_u32(), Ok(8));
        assert_eq!(TagValue::Shorts(vec![300]).as_u32(), Ok(300));
        assert_eq!(TagValue::Longs(vec![70000]).as_u32(), Ok(70000));
        assert!(TagValue::Ascii("x".into()).as_u32().is_err());
        assert!(TagValue::Shorts(vec![1, 2]).as_u32().is_err());
    }

    #[test]
    fn test_rational_as_f64() {
        assert_eq!(TagValue::Rationals(vec![(600, 2)]).as_f64(), Ok(300.0));
        assert!(TagValue::Rationals(vec![(1, 0)]).as_f64().is_err());
        assert_eq!(TagValue::Shorts(vec![72]).as_f64(), Ok(72.0));
    }

    #[test]
    fn test_tag_map_errors_carry_offset() {
        let mut tags = TagMap::new(120);
        tags.insert(Tag::ImageWidth, TagValue::Ascii("wide".into()));

        let err = tags.u32(Tag::ImageWidth).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTag);
        assert_eq!(err.offset(), Some(120));

        let err = tags.required_u32(Tag::ImageLength).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredTag);
        assert_eq!(tags.u32_or(Tag::FillOrder, 1).unwrap(), 1);
    }
}
