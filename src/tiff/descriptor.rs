//! Typed view of one directory: geometry, sample layout and photometric metadata

use crate::error::{ConvertError, Result};
use crate::tiff::directory::Directory;
use crate::tiff::tags::{Tag, TagMap};

/// How stored sample values map to color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    WhiteIsZero,
    BlackIsZero,
    Rgb,
    Palette,
    Cmyk,
}

impl Photometric {
    pub fn from_u32(value: u32) -> Option<Photometric> {
        match value {
            0 => Some(Photometric::WhiteIsZero),
            1 => Some(Photometric::BlackIsZero),
            2 => Some(Photometric::Rgb),
            3 => Some(Photometric::Palette),
            5 => Some(Photometric::Cmyk),
            _ => None,
        }
    }

    /// Samples per pixel that carry color; anything above is an extra sample
    pub fn color_samples(self) -> u16 {
        match self {
            Photometric::WhiteIsZero | Photometric::BlackIsZero | Photometric::Palette => 1,
            Photometric::Rgb => 3,
            Photometric::Cmyk => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionUnit {
    None,
    Inch,
    Centimeter,
}

/// Resolution tags as stored in the file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
    pub unit: ResolutionUnit,
}

impl Resolution {
    /// Dots per inch on both axes, or `None` if the values cannot size a page
    pub fn dpi(&self) -> Option<(f64, f64)> {
        let scale = match self.unit {
            ResolutionUnit::None => return None,
            ResolutionUnit::Inch => 1.0,
            ResolutionUnit::Centimeter => 2.54,
        };
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if usable(self.x) && usable(self.y) {
            Some((self.x * scale, self.y * scale))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOrder {
    MsbFirst,
    LsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    None,
    Horizontal,
}

/// Strip or tile organisation of the encoded data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLayout {
    Strips { rows_per_strip: u32 },
    Tiles { tile_width: u32, tile_length: u32 },
}

/// Everything the rest of the pipeline needs to know about one page
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    pub index: usize,
    pub ifd_offset: u64,
    pub tags: TagMap,
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: u16,
    pub samples_per_pixel: u16,
    pub photometric: Photometric,
    pub compression: u16,
    pub layout: SegmentLayout,
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub resolution: Option<Resolution>,
    pub fill_order: FillOrder,
    pub predictor: Predictor,
    pub t4_options: u32,
    pub color_map: Option<Vec<u16>>,
}

impl PageDescriptor {
    /// Interpret a parsed directory.
    ///
    /// Failures here concern one page only; the pipeline may skip the page and continue.
    pub fn describe(directory: Directory) -> Result<PageDescriptor> {
        let tags = directory.tags;

        let width = positive(&tags, Tag::ImageWidth, tags.required_u32(Tag::ImageWidth)?)?;
        let height = positive(&tags, Tag::ImageLength, tags.required_u32(Tag::ImageLength)?)?;
        let compression = tags.required_u32(Tag::Compression)?;
        let compression = u16::try_from(compression)
            .map_err(|_| tags.reject(Tag::Compression, format!("{} out of range", compression)))?;

        let samples_per_pixel = tags.u32_or(Tag::SamplesPerPixel, 1)?;
        let samples_per_pixel = u16::try_from(samples_per_pixel)
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| {
                tags.reject(Tag::SamplesPerPixel, format!("{} samples", samples_per_pixel))
            })?;
        let bits_per_sample = bits_per_sample(&tags, samples_per_pixel)?;

        let photometric = match tags.u32(Tag::PhotometricInterpretation)? {
            Some(value) => Photometric::from_u32(value).ok_or_else(|| {
                ConvertError::UnsupportedFeature(format!("photometric interpretation {}", value))
            })?,
            // Readers commonly infer from the sample count when the tag is absent
            None if samples_per_pixel >= 3 => Photometric::Rgb,
            None => Photometric::BlackIsZero,
        };
        if samples_per_pixel < photometric.color_samples() {
            return Err(tags.reject(
                Tag::SamplesPerPixel,
                format!("{} samples for {:?}", samples_per_pixel, photometric),
            ));
        }

        if samples_per_pixel > 1 && tags.u32_or(Tag::PlanarConfiguration, 1)? == 2 {
            return Err(ConvertError::UnsupportedFeature(
                "planar sample configuration".to_string(),
            ));
        }
        if let Some(formats) = tags.u32_array(Tag::SampleFormat)? {
            if formats.iter().any(|&f| f != 1) {
                return Err(ConvertError::UnsupportedFeature(
                    "signed or floating-point samples".to_string(),
                ));
            }
        }

        let (layout, offsets, byte_counts) = if tags.contains(Tag::TileOffsets) {
            let tile_width = positive(&tags, Tag::TileWidth, tags.required_u32(Tag::TileWidth)?)?;
            let tile_length =
                positive(&tags, Tag::TileLength, tags.required_u32(Tag::TileLength)?)?;
            let (offsets, counts) = segment_arrays(&tags, Tag::TileOffsets, Tag::TileByteCounts)?;
            (
                SegmentLayout::Tiles {
                    tile_width,
                    tile_length,
                },
                offsets,
                counts,
            )
        } else {
            let rows_per_strip = match tags.u32(Tag::RowsPerStrip)? {
                Some(rows) if rows > 0 && rows < height => rows,
                _ => height,
            };
            let (offsets, counts) =
                segment_arrays(&tags, Tag::StripOffsets, Tag::StripByteCounts)?;
            (SegmentLayout::Strips { rows_per_strip }, offsets, counts)
        };

        let fill_order = match tags.u32_or(Tag::FillOrder, 1)? {
            1 => FillOrder::MsbFirst,
            2 => FillOrder::LsbFirst,
            other => return Err(tags.reject(Tag::FillOrder, format!("value {}", other))),
        };
        let predictor = match tags.u32_or(Tag::Predictor, 1)? {
            1 => Predictor::None,
            2 => Predictor::Horizontal,
            other => {
                return Err(ConvertError::UnsupportedFeature(format!("predictor {}", other)))
            }
        };

        let color_map = if photometric == Photometric::Palette {
            let map = tags
                .u32_array(Tag::ColorMap)?
                .ok_or_else(|| tags.missing(Tag::ColorMap))?;
            let expected = 3u64 << bits_per_sample;
            if map.len() as u64 != expected {
                return Err(tags.reject(
                    Tag::ColorMap,
                    format!("{} entries, expected {}", map.len(), expected),
                ));
            }
            Some(map.into_iter().map(|v| v as u16).collect())
        } else {
            None
        };

        Ok(PageDescriptor {
            index: directory.index,
            ifd_offset: directory.offset,
            width,
            height,
            bits_per_sample,
            samples_per_pixel,
            photometric,
            compression,
            layout,
            offsets,
            byte_counts,
            resolution: resolution(&tags)?,
            fill_order,
            predictor,
            t4_options: tags.u32_or(Tag::T4Options, 0)?,
            color_map,
            tags,
        })
    }

    /// Bits per pixel across all samples
    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_sample as u32 * self.samples_per_pixel as u32
    }

    /// Bytes in one packed row of `width` pixels
    pub fn row_bytes(&self, width: u32) -> usize {
        (width as usize)
            .saturating_mul(self.bits_per_pixel() as usize)
            .div_ceil(8)
    }

    /// Size of the decoded page in bytes, or `None` when it does not fit in a `u64`
    pub fn decoded_len(&self) -> Option<u64> {
        (self.width as u64 * self.bits_per_pixel() as u64)
            .div_ceil(8)
            .checked_mul(self.height as u64)
    }

    /// Whether the page is a 1-bit single-sample image
    pub fn is_bilevel(&self) -> bool {
        self.bits_per_sample == 1 && self.samples_per_pixel == 1
    }
}

impl Directory {
    /// Pixel size and resolution read leniently, for sizing a page that failed to describe
    pub fn page_extent(&self) -> Option<(u32, u32, Option<Resolution>)> {
        let width = self.tags.u32(Tag::ImageWidth).ok().flatten()?;
        let height = self.tags.u32(Tag::ImageLength).ok().flatten()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some((width, height, resolution(&self.tags).ok().flatten()))
    }
}

fn positive(tags: &TagMap, tag: Tag, value: u32) -> Result<u32> {
    if value == 0 {
        Err(tags.reject(tag, "must be positive"))
    } else {
        Ok(value)
    }
}

fn bits_per_sample(tags: &TagMap, samples: u16) -> Result<u16> {
    let bits = tags.u32_array(Tag::BitsPerSample)?.unwrap_or_else(|| vec![1]);
    let first = match bits.first() {
        Some(&b) if b > 0 && b <= 32 => b,
        _ => return Err(tags.reject(Tag::BitsPerSample, "must be positive")),
    };
    if bits.len() != 1 && bits.len() != samples as usize {
        return Err(tags.reject(
            Tag::BitsPerSample,
            format!("{} values for {} samples", bits.len(), samples),
        ));
    }
    if bits.iter().any(|&b| b != first) {
        return Err(ConvertError::UnsupportedFeature(
            "mixed bits per sample".to_string(),
        ));
    }
    Ok(first as u16)
}

fn segment_arrays(tags: &TagMap, offsets: Tag, counts: Tag) -> Result<(Vec<u64>, Vec<u64>)> {
    let offset_values = tags
        .u32_array(offsets)?
        .ok_or_else(|| tags.missing(offsets))?;
    let count_values = tags.u32_array(counts)?.ok_or_else(|| tags.missing(counts))?;
    if offset_values.len() != count_values.len() {
        return Err(tags.reject(
            counts,
            format!(
                "{} byte counts for {} offsets",
                count_values.len(),
                offset_values.len()
            ),
        ));
    }
    Ok((
        offset_values.into_iter().map(u64::from).collect(),
        count_values.into_iter().map(u64::from).collect(),
    ))
}

fn resolution(tags: &TagMap) -> Result<Option<Resolution>> {
    let x = tags.f64(Tag::XResolution)?;
    let y = tags.f64(Tag::YResolution)?;
    let unit = match tags.u32_or(Tag::ResolutionUnit, 2)? {
        1 => ResolutionUnit::None,
        3 => ResolutionUnit::Centimeter,
        _ => ResolutionUnit::Inch,
    };
    Ok(match (x, y) {
        (Some(x), Some(y)) => Some(Resolution { x, y, unit }),
        (Some(v), None) | (None, Some(v)) => Some(Resolution { x: v, y: v, unit }),
        (None, None) => None,
    })
}
