//! Decoders for the baseline TIFF compressions

mod ccitt;
mod fax_tables;
mod lzw;
mod packbits;

pub use ccitt::FaxVariant;

use crate::error::{CodecError, ConvertError, Result};

/// Compression ids understood by the reader
pub const COMPRESSION_NONE: u16 = 1;
pub const COMPRESSION_CCITT_RLE: u16 = 2;
pub const COMPRESSION_CCITT_T4: u16 = 3;
pub const COMPRESSION_CCITT_T6: u16 = 4;
pub const COMPRESSION_LZW: u16 = 5;
pub const COMPRESSION_PACKBITS: u16 = 32773;

/// Largest decoded buffer accepted for one page or one segment
pub const MAX_DECODED_BYTES: u64 = 1 << 30;

/// Pixel geometry of one encoded segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentGeometry {
    pub width: u32,
    pub rows: u32,
    pub bits_per_pixel: u32,
}

impl SegmentGeometry {
    pub fn row_bytes(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.bits_per_pixel as usize)
            .div_ceil(8)
    }

    /// Decoded size in bytes, saturating at `usize::MAX`
    pub fn expected_len(&self) -> usize {
        self.row_bytes().saturating_mul(self.rows as usize)
    }

    /// Decoded size in bytes, or `None` when it does not fit in a `u64`
    pub fn checked_len(&self) -> Option<u64> {
        (self.width as u64 * self.bits_per_pixel as u64)
            .div_ceil(8)
            .checked_mul(self.rows as u64)
    }
}

/// The closed set of decoders, selected by the Compression tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Uncompressed,
    PackBits,
    Lzw,
    Fax(FaxVariant),
}

impl Codec {
    /// Pick the decoder for a Compression value; T4Options bit 0 marks 2-D Group 3 data
    pub fn from_compression(compression: u16, t4_options: u32) -> Result<Codec> {
        match compression {
            COMPRESSION_NONE => Ok(Codec::Uncompressed),
            COMPRESSION_PACKBITS => Ok(Codec::PackBits),
            COMPRESSION_LZW => Ok(Codec::Lzw),
            COMPRESSION_CCITT_RLE => Ok(Codec::Fax(FaxVariant::ModifiedHuffman)),
            COMPRESSION_CCITT_T4 => {
                if t4_options & 0b10 != 0 {
                    return Err(ConvertError::UnsupportedFeature(
                        "CCITT Group 3 uncompressed mode".to_string(),
                    ));
                }
                Ok(Codec::Fax(FaxVariant::Group3 {
                    two_dimensional: t4_options & 0b1 != 0,
                }))
            }
            COMPRESSION_CCITT_T6 => Ok(Codec::Fax(FaxVariant::Group4)),
            other => Err(ConvertError::UnsupportedFeature(format!(
                "{} compression",
                compression_name(other)
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Uncompressed => "uncompressed",
            Codec::PackBits => "PackBits",
            Codec::Lzw => "LZW",
            Codec::Fax(FaxVariant::ModifiedHuffman) => "CCITT modified Huffman",
            Codec::Fax(FaxVariant::Group3 { .. }) => "CCITT Group 3",
            Codec::Fax(FaxVariant::Group4) => "CCITT Group 4",
        }
    }

    /// Bilevel-only codecs
    pub fn is_fax(&self) -> bool {
        matches!(self, Codec::Fax(_))
    }

    /// Decode one segment into packed rows of `geometry.row_bytes()` bytes.
    ///
    /// Uncompressed and LZW data may come back short; the rasterizer checks the
    /// final size. The other codecs fail as soon as their input runs out.
    pub fn decode(
        &self,
        input: &[u8],
        geometry: SegmentGeometry,
    ) -> std::result::Result<Vec<u8>, CodecError> {
        let expected = geometry.expected_len();
        match self {
            Codec::Uncompressed => Ok(input[..input.len().min(expected)].to_vec()),
            Codec::PackBits => packbits::decode(input, expected),
            Codec::Lzw => lzw::decode(input, expected),
            Codec::Fax(variant) => ccitt::decode(input, geometry.width, geometry.rows, *variant),
        }
    }
}

fn compression_name(id: u16) -> String {
    match id {
        6 | 7 => "JPEG".to_string(),
        8 | 32946 => "Deflate".to_string(),
        34712 => "JPEG 2000".to_string(),
        other => format!("id {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecErrorKind, ErrorKind};

    #[test]
    fn test_registry_selection() {
        assert_eq!(Codec::from_compression(1, 0).unwrap(), Codec::Uncompressed);
        assert_eq!(Codec::from_compression(32773, 0).unwrap(), Codec::PackBits);
        assert_eq!(
            Codec::from_compression(3, 1).unwrap(),
            Codec::Fax(FaxVariant::Group3 {
                two_dimensional: true
            })
        );
        assert!(Codec::from_compression(4, 0).unwrap().is_fax());

        let err = Codec::from_compression(7, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
        assert!(err.to_string().contains("JPEG"));
        assert!(Codec::from_compression(3, 2).is_err());
    }

    #[test]
    fn test_uncompressed_copy() {
        let geometry = SegmentGeometry {
            width: 3,
            rows: 2,
            bits_per_pixel: 8,
        };
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(
            Codec::Uncompressed.decode(&data, geometry).unwrap(),
            vec![1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn test_geometry_rounds_rows_up() {
        let geometry = SegmentGeometry {
            width: 10,
            rows: 3,
            bits_per_pixel: 1,
        };
        assert_eq!(geometry.row_bytes(), 2);
        assert_eq!(geometry.expected_len(), 6);
        assert_eq!(geometry.checked_len(), Some(6));
    }

    #[test]
    fn test_oversized_geometry_decodes_from_input() {
        let geometry = SegmentGeometry {
            width: u32::MAX,
            rows: u32::MAX,
            bits_per_pixel: 32,
        };
        assert_eq!(geometry.expected_len(), usize::MAX);
        assert_eq!(geometry.checked_len(), None);

        // Buffers grow with the input rather than the declared size
        let err = Codec::PackBits.decode(&[0xFF, 7], geometry).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::UnexpectedEndOfData);
        let err = Codec::Fax(FaxVariant::Group4)
            .decode(&[0x00], geometry)
            .unwrap_err();
        assert!(!err.detail.is_empty());
    }
}
