//! Page rasterization: assembled segments to one flat pixel buffer

use std::borrow::Cow;

use tracing::debug;

use crate::codec::{Codec, SegmentGeometry, MAX_DECODED_BYTES};
use crate::error::{ConvertError, Result};
use crate::report::Advisory;
use crate::tiff::{
    EncodedRegion, FillOrder, PageDescriptor, Photometric, Predictor, Resolution, Segment,
    StripAssembler,
};

/// Decoded pixels of one page plus the metadata the PDF encoder needs.
///
/// `data` holds `height` rows of `ceil(width * components * bits / 8)` bytes,
/// samples interleaved, rows padded to a byte boundary.
#[derive(Debug, Clone)]
pub struct DecodedPage {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u16,
    /// Color components per pixel after extra samples were dropped
    pub components: u16,
    pub photometric: Photometric,
    pub resolution: Option<Resolution>,
    pub color_map: Option<Vec<u16>>,
    pub data: Vec<u8>,
    pub advisories: Vec<Advisory>,
}

impl DecodedPage {
    pub fn row_bytes(&self) -> usize {
        (self.width as usize * self.components as usize * self.bits_per_component as usize)
            .div_ceil(8)
    }
}

/// Turns page descriptors into decoded pages
#[derive(Debug, Clone, Copy)]
pub struct PageRasterizer<'a> {
    assembler: StripAssembler<'a>,
    normalize_polarity: bool,
}

impl<'a> PageRasterizer<'a> {
    pub fn new(source: &'a [u8], normalize_polarity: bool) -> Self {
        PageRasterizer {
            assembler: StripAssembler::new(source),
            normalize_polarity,
        }
    }

    /// Assemble and decode a page in one step
    pub fn rasterize(&self, page: &PageDescriptor) -> Result<DecodedPage> {
        let region = self.assembler.assemble(page)?;
        self.decode(page, &region)
    }

    /// Decode an already assembled page
    pub fn decode(&self, page: &PageDescriptor, region: &EncodedRegion) -> Result<DecodedPage> {
        let codec = Codec::from_compression(page.compression, page.t4_options)?;
        check_supported(page, &codec)?;

        let bits_per_pixel = page.bits_per_pixel();
        let expected = bounded_len(page.decoded_len(), "page")?;

        let mut data = Vec::new();
        data.try_reserve_exact(expected).map_err(|_| {
            ConvertError::UnsupportedFeature(format!("cannot allocate {} bytes for page", expected))
        })?;
        if region.tiled {
            data.resize(expected, 0);
        }

        for segment in &region.segments {
            let geometry = SegmentGeometry {
                width: segment.width,
                rows: segment.rows,
                bits_per_pixel,
            };
            bounded_len(geometry.checked_len(), "segment")?;
            let input: Cow<[u8]> = match page.fill_order {
                FillOrder::MsbFirst => Cow::Borrowed(segment.data),
                FillOrder::LsbFirst => Cow::Owned(reverse_bits(segment.data)),
            };
            let mut decoded =
                codec
                    .decode(&input, geometry)
                    .map_err(|source| ConvertError::Codec {
                        segment: segment.index,
                        offset: segment.offset,
                        source,
                    })?;
            if page.predictor == Predictor::Horizontal {
                undo_horizontal_predictor(
                    &mut decoded,
                    geometry.row_bytes(),
                    page.samples_per_pixel as usize,
                );
            }
            if region.tiled {
                blit_tile(page, segment, &decoded, geometry, &mut data)?;
            } else {
                data.extend_from_slice(&decoded);
            }
        }

        if data.len() != expected {
            return Err(ConvertError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut advisories = Vec::new();
        let color_samples = page.photometric.color_samples();
        if page.samples_per_pixel > color_samples {
            data = drop_extra_samples(
                &data,
                page.samples_per_pixel as usize,
                color_samples as usize,
            );
            advisories.push(Advisory::ExtraSamplesDiscarded {
                count: page.samples_per_pixel - color_samples,
            });
        }

        let mut photometric = page.photometric;
        if photometric == Photometric::WhiteIsZero && self.normalize_polarity {
            data.iter_mut().for_each(|b| *b = !*b);
            photometric = Photometric::BlackIsZero;
            advisories.push(Advisory::PolarityInverted);
        }

        debug!(
            page = page.index,
            codec = codec.name(),
            bytes = data.len(),
            "Decoded page"
        );

        Ok(DecodedPage {
            index: page.index,
            width: page.width,
            height: page.height,
            bits_per_component: page.bits_per_sample,
            components: color_samples,
            photometric,
            resolution: page.resolution,
            color_map: page.color_map.clone(),
            data,
            advisories,
        })
    }
}

/// A decoded size as `usize`, rejected when it exceeds [`MAX_DECODED_BYTES`]
fn bounded_len(len: Option<u64>, what: &str) -> Result<usize> {
    len.filter(|&n| n <= MAX_DECODED_BYTES)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            ConvertError::UnsupportedFeature(format!(
                "{} decodes to more than {} bytes",
                what, MAX_DECODED_BYTES
            ))
        })
}

/// Bit depths and sample layouts the encoder can express in PDF
fn check_supported(page: &PageDescriptor, codec: &Codec) -> Result<()> {
    let bits = page.bits_per_sample;
    let depth_ok = match page.photometric {
        Photometric::WhiteIsZero | Photometric::BlackIsZero | Photometric::Palette => {
            matches!(bits, 1 | 2 | 4 | 8)
        }
        Photometric::Rgb | Photometric::Cmyk => bits == 8,
    };
    if !depth_ok {
        return Err(ConvertError::UnsupportedFeature(format!(
            "{}-bit {:?} samples",
            bits, page.photometric
        )));
    }
    if page.samples_per_pixel > page.photometric.color_samples() && bits != 8 {
        return Err(ConvertError::UnsupportedFeature(format!(
            "extra samples at {} bits",
            bits
        )));
    }
    if codec.is_fax() && !page.is_bilevel() {
        return Err(ConvertError::UnsupportedFeature(format!(
            "{} data with {} bits per pixel",
            codec.name(),
            page.bits_per_pixel()
        )));
    }
    if page.predictor == Predictor::Horizontal && bits != 8 {
        return Err(ConvertError::UnsupportedFeature(format!(
            "horizontal predictor at {} bits",
            bits
        )));
    }
    Ok(())
}

fn reverse_bits(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.reverse_bits()).collect()
}

/// Undo TIFF horizontal differencing on 8-bit interleaved rows
fn undo_horizontal_predictor(data: &mut [u8], row_bytes: usize, samples: usize) {
    for row in data.chunks_mut(row_bytes) {
        for i in samples..row.len() {
            row[i] = row[i].wrapping_add(row[i - samples]);
        }
    }
}

/// Copy the visible part of a decoded tile into the page buffer
fn blit_tile(
    page: &PageDescriptor,
    segment: &Segment,
    decoded: &[u8],
    geometry: SegmentGeometry,
    page_data: &mut [u8],
) -> Result<()> {
    let tile_len = geometry.expected_len();
    if decoded.len() != tile_len {
        return Err(ConvertError::BufferSizeMismatch {
            expected: tile_len,
            actual: decoded.len(),
        });
    }
    let bits_per_pixel = geometry.bits_per_pixel as usize;
    let start_bit = segment.x as usize * bits_per_pixel;
    if start_bit % 8 != 0 {
        return Err(ConvertError::UnsupportedFeature(format!(
            "tile column {} does not start on a byte boundary",
            segment.x
        )));
    }

    let tile_row_bytes = geometry.row_bytes();
    let page_row_bytes = page.row_bytes(page.width);
    let visible_width = segment.width.min(page.width - segment.x) as usize;
    let copy_len = (visible_width * bits_per_pixel).div_ceil(8);
    let visible_rows = segment.rows.min(page.height - segment.y) as usize;

    for r in 0..visible_rows {
        let src = &decoded[r * tile_row_bytes..r * tile_row_bytes + copy_len];
        let dst_start = (segment.y as usize + r) * page_row_bytes + start_bit / 8;
        page_data[dst_start..dst_start + copy_len].copy_from_slice(src);
    }
    Ok(())
}

fn drop_extra_samples(data: &[u8], samples: usize, keep: usize) -> Vec<u8> {
    data.chunks_exact(samples)
        .flat_map(|pixel| pixel[..keep].iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecErrorKind, ErrorKind};
    use crate::tiff::{SegmentLayout, TagMap};

    fn page(width: u32, height: u32, bits: u16, samples: u16) -> PageDescriptor {
        PageDescriptor {
            index: 0,
            ifd_offset: 8,
            tags: TagMap::new(8),
            width,
            height,
            bits_per_sample: bits,
            samples_per_pixel: samples,
            photometric: Photometric::BlackIsZero,
            compression: 1,
            layout: SegmentLayout::Strips {
                rows_per_strip: height,
            },
            offsets: vec![0],
            byte_counts: vec![0],
            resolution: None,
            fill_order: FillOrder::MsbFirst,
            predictor: Predictor::None,
            t4_options: 0,
            color_map: None,
        }
    }

    #[test]
    fn test_uncompressed_strips_concatenate() {
        let source: Vec<u8> = (0..12).collect();
        let mut desc = page(4, 3, 8, 1);
        desc.layout = SegmentLayout::Strips { rows_per_strip: 2 };
        desc.offsets = vec![0, 8];
        desc.byte_counts = vec![8, 4];
        let decoded = PageRasterizer::new(&source, false).rasterize(&desc).unwrap();
        assert_eq!(decoded.data, source);
        assert_eq!(decoded.row_bytes(), 4);
    }

    #[test]
    fn test_short_strip_is_size_mismatch() {
        let source = vec![0u8; 10];
        let mut desc = page(4, 3, 8, 1);
        desc.byte_counts = vec![10];
        let err = PageRasterizer::new(&source, false).rasterize(&desc).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::BufferSizeMismatch {
                expected: 12,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_codec_error_carries_segment() {
        let source = vec![0xFD, 0x11];
        let mut desc = page(2, 1, 8, 1);
        desc.compression = 32773;
        desc.byte_counts = vec![2];
        let err = PageRasterizer::new(&source, false).rasterize(&desc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec(CodecErrorKind::CorruptRunLength));
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn test_sixteen_bit_unsupported() {
        let source = vec![0u8; 8];
        let mut desc = page(2, 2, 16, 1);
        desc.byte_counts = vec![8];
        let err = PageRasterizer::new(&source, false).rasterize(&desc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
    }

    #[test]
    fn test_predictor_and_alpha() {
        // Two RGBA pixels, second stored as a difference from the first
        let source = vec![10, 20, 30, 255, 5, 5, 5, 0];
        let mut desc = page(2, 1, 8, 4);
        desc.photometric = Photometric::Rgb;
        desc.predictor = Predictor::Horizontal;
        desc.byte_counts = vec![8];
        let decoded = PageRasterizer::new(&source, false).rasterize(&desc).unwrap();
        assert_eq!(decoded.data, vec![10, 20, 30, 15, 25, 35]);
        assert_eq!(decoded.components, 3);
        assert_eq!(
            decoded.advisories,
            vec![Advisory::ExtraSamplesDiscarded { count: 1 }]
        );
    }

    #[test]
    fn test_polarity_normalisation() {
        let source = vec![0b1010_0000];
        let mut desc = page(4, 1, 1, 1);
        desc.photometric = Photometric::WhiteIsZero;
        desc.byte_counts = vec![1];

        let kept = PageRasterizer::new(&source, false).rasterize(&desc).unwrap();
        assert_eq!(kept.photometric, Photometric::WhiteIsZero);
        assert_eq!(kept.data, vec![0b1010_0000]);

        let inverted = PageRasterizer::new(&source, true).rasterize(&desc).unwrap();
        assert_eq!(inverted.photometric, Photometric::BlackIsZero);
        assert_eq!(inverted.data, vec![0b0101_1111]);
        assert_eq!(inverted.advisories, vec![Advisory::PolarityInverted]);
    }

    #[test]
    fn test_lsb_fill_order_reversed_before_decode() {
        // Group 4 stream for two rows of WWWWBBBB, stored LSB first
        let msb = [0x36u8, 0xF0, 0x01, 0x00, 0x10];
        let source: Vec<u8> = msb.iter().map(|b| b.reverse_bits()).collect();
        let mut desc = page(8, 2, 1, 1);
        desc.compression = 4;
        desc.fill_order = FillOrder::LsbFirst;
        desc.byte_counts = vec![source.len() as u64];
        let decoded = PageRasterizer::new(&source, false).rasterize(&desc).unwrap();
        assert_eq!(decoded.data, vec![0x0F, 0x0F]);
    }

    #[test]
    fn test_tiles_are_placed_on_grid() {
        // 3x3 page from 2x2 tiles; each tile filled with its index + 1
        let mut source = Vec::new();
        for tile in 1..=4u8 {
            source.extend_from_slice(&[tile; 4]);
        }
        let mut desc = page(3, 3, 8, 1);
        desc.layout = SegmentLayout::Tiles {
            tile_width: 2,
            tile_length: 2,
        };
        desc.offsets = vec![0, 4, 8, 12];
        desc.byte_counts = vec![4, 4, 4, 4];
        let decoded = PageRasterizer::new(&source, false).rasterize(&desc).unwrap();
        assert_eq!(decoded.data, vec![1, 1, 2, 1, 1, 2, 3, 3, 4]);
    }
}
