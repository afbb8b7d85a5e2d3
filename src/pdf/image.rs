//! Image XObject encoding: color space mapping, filter choice and page sizing

use std::fmt;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Dictionary, Object, StringFormat};
use tracing::debug;

use crate::codec::COMPRESSION_CCITT_T6;
use crate::error::{ConvertError, Result};
use crate::raster::DecodedPage;
use crate::report::Advisory;
use crate::tiff::{EncodedRegion, FillOrder, PageDescriptor, Photometric, Resolution};

/// Resolution used when the file does not give a usable one
pub const DEFAULT_DPI: f64 = 96.0;

/// PDF units per inch
const POINTS_PER_INCH: f64 = 72.0;

/// Stream filter of an image XObject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Flate,
    CcittFax,
}

impl ImageFilter {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            ImageFilter::Flate => "FlateDecode",
            ImageFilter::CcittFax => "CCITTFaxDecode",
        }
    }
}

impl fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pdf_name())
    }
}

/// Color space declaration of an image XObject
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    /// RGB palette: `hival + 1` entries of three bytes each
    Indexed { hival: u32, lookup: Vec<u8> },
}

impl ColorSpace {
    pub fn to_object(&self) -> Object {
        match self {
            ColorSpace::DeviceGray => Object::Name(b"DeviceGray".to_vec()),
            ColorSpace::DeviceRgb => Object::Name(b"DeviceRGB".to_vec()),
            ColorSpace::DeviceCmyk => Object::Name(b"DeviceCMYK".to_vec()),
            ColorSpace::Indexed { hival, lookup } => Object::Array(vec![
                Object::Name(b"Indexed".to_vec()),
                Object::Name(b"DeviceRGB".to_vec()),
                Object::Integer(*hival as i64),
                Object::String(lookup.clone(), StringFormat::Hexadecimal),
            ]),
        }
    }
}

/// Page size in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// US Letter, for pages whose own size is unknown
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
}

/// An encoded image ready to be written as an XObject
#[derive(Debug, Clone, PartialEq)]
pub struct PdfImageObject {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u16,
    pub color_space: ColorSpace,
    /// Sample decode mapping, e.g. `[1 0]` for WhiteIsZero gray
    pub decode: Option<Vec<f64>>,
    pub filter: ImageFilter,
    pub fax_params: Option<FaxParams>,
    pub data: Vec<u8>,
}

/// CCITTFaxDecode parameters of a passed-through Group 4 image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaxParams {
    pub columns: u32,
    pub rows: u32,
    pub black_is_1: bool,
}

impl FaxParams {
    pub fn dictionary(&self) -> Dictionary {
        let mut parms = dictionary! {
            "K" => -1i64,
            "Columns" => self.columns as i64,
            "Rows" => self.rows as i64,
        };
        if self.black_is_1 {
            parms.set("BlackIs1", true);
        }
        parms
    }
}

impl PdfImageObject {
    /// The XObject dictionary, without Length
    pub fn dictionary(&self) -> Dictionary {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => self.color_space.to_object(),
            "BitsPerComponent" => self.bits_per_component as i64,
            "Filter" => Object::Name(self.filter.pdf_name().as_bytes().to_vec()),
        };
        if let Some(decode) = &self.decode {
            dict.set(
                "Decode",
                Object::Array(decode.iter().map(|&v| Object::Real(v as _)).collect()),
            );
        }
        if let Some(parms) = &self.fax_params {
            dict.set("DecodeParms", Object::Dictionary(parms.dictionary()));
        }
        dict
    }
}

/// Encoder output for one page
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPage {
    pub index: usize,
    pub image: PdfImageObject,
    pub size: PageSize,
    pub advisories: Vec<Advisory>,
}

/// How a page will reach the PDF, decided before any pixel is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePlan {
    /// Copy the Group 4 strip into a CCITTFaxDecode stream
    Passthrough,
    /// Decode to pixels, then Flate-compress
    Reencode,
}

/// Settings that shape the encoded images
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderOptions {
    pub compression_level: u32,
    pub passthrough_ccitt: bool,
    pub dpi_override: Option<f64>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
            passthrough_ccitt: true,
            dpi_override: None,
        }
    }
}

/// Maps decoded TIFF pages onto PDF image XObjects
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfImageEncoder {
    options: EncoderOptions,
}

impl PdfImageEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        PdfImageEncoder { options }
    }

    pub fn plan(&self, page: &PageDescriptor, region: &EncodedRegion) -> EncodePlan {
        let gray = matches!(
            page.photometric,
            Photometric::WhiteIsZero | Photometric::BlackIsZero
        );
        if self.options.passthrough_ccitt
            && page.compression == COMPRESSION_CCITT_T6
            && page.is_bilevel()
            && gray
            && region.single_segment().is_some()
        {
            EncodePlan::Passthrough
        } else {
            EncodePlan::Reencode
        }
    }

    /// Embed an unmodified Group 4 strip
    pub fn passthrough(
        &self,
        page: &PageDescriptor,
        region: &EncodedRegion,
    ) -> Result<EncodedPage> {
        let segment = region.single_segment().ok_or_else(|| {
            ConvertError::UnsupportedFeature(
                "CCITT passthrough needs a single strip covering the page".to_string(),
            )
        })?;
        let data = match page.fill_order {
            FillOrder::MsbFirst => segment.data.to_vec(),
            FillOrder::LsbFirst => segment.data.iter().map(|b| b.reverse_bits()).collect(),
        };

        // Fax black runs are 1 bits; under BlackIsZero those samples mean white
        let params = FaxParams {
            columns: page.width,
            rows: page.height,
            black_is_1: page.photometric == Photometric::BlackIsZero,
        };

        let (size, advisory) = self.page_size(page.width, page.height, page.resolution);
        debug!(page = page.index, bytes = data.len(), "Passing CCITT G4 strip through");
        Ok(EncodedPage {
            index: page.index,
            image: PdfImageObject {
                width: page.width,
                height: page.height,
                bits_per_component: 1,
                color_space: ColorSpace::DeviceGray,
                decode: None,
                filter: ImageFilter::CcittFax,
                fax_params: Some(params),
                data,
            },
            size,
            advisories: advisory.into_iter().collect(),
        })
    }

    /// Flate-compress a decoded page
    pub fn encode(&self, page: DecodedPage) -> Result<EncodedPage> {
        let (color_space, decode) = match page.photometric {
            Photometric::WhiteIsZero => (ColorSpace::DeviceGray, Some(vec![1.0, 0.0])),
            Photometric::BlackIsZero => (ColorSpace::DeviceGray, None),
            Photometric::Rgb => (ColorSpace::DeviceRgb, None),
            Photometric::Cmyk => (ColorSpace::DeviceCmyk, None),
            Photometric::Palette => {
                let map = page.color_map.as_deref().ok_or_else(|| {
                    ConvertError::PdfSerialization("palette page without a color map".to_string())
                })?;
                (indexed(map, page.bits_per_component)?, None)
            }
        };

        let data = self.deflate(&page.data)?;
        let (size, advisory) = self.page_size(page.width, page.height, page.resolution);
        let mut advisories = page.advisories;
        advisories.extend(advisory);

        debug!(
            page = page.index,
            raw = page.data.len(),
            compressed = data.len(),
            "Flate-encoded page image"
        );
        Ok(EncodedPage {
            index: page.index,
            image: PdfImageObject {
                width: page.width,
                height: page.height,
                bits_per_component: page.bits_per_component,
                color_space,
                decode,
                filter: ImageFilter::Flate,
                fax_params: None,
                data,
            },
            size,
            advisories,
        })
    }

    /// Page size in points from pixel size and resolution
    pub fn page_size(
        &self,
        width: u32,
        height: u32,
        resolution: Option<Resolution>,
    ) -> (PageSize, Option<Advisory>) {
        let file_dpi = resolution.and_then(|r| r.dpi());
        let (dpi, advisory) = match (self.options.dpi_override, file_dpi) {
            (Some(dpi), _) => ((dpi, dpi), None),
            (None, Some(dpi)) => (dpi, None),
            (None, None) => (
                (DEFAULT_DPI, DEFAULT_DPI),
                Some(Advisory::AssumedDefaultResolution),
            ),
        };
        let size = PageSize {
            width: width as f64 / dpi.0 * POINTS_PER_INCH,
            height: height as f64 / dpi.1 * POINTS_PER_INCH,
        };
        (size, advisory)
    }

    pub fn deflate(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(data.len() / 2),
            Compression::new(self.options.compression_level),
        );
        let failed = |e: std::io::Error| {
            ConvertError::PdfSerialization(format!("flate encoding failed: {}", e))
        };
        encoder.write_all(data).map_err(failed)?;
        encoder.finish().map_err(failed)
    }
}

/// Indexed RGB color space from a TIFF ColorMap (all reds, then greens, then blues)
fn indexed(map: &[u16], bits: u16) -> Result<ColorSpace> {
    let entries = 1usize << bits;
    if map.len() != entries * 3 {
        return Err(ConvertError::PdfSerialization(format!(
            "color map has {} values for {} entries",
            map.len(),
            entries
        )));
    }
    let (reds, rest) = map.split_at(entries);
    let (greens, blues) = rest.split_at(entries);
    let lookup = reds
        .iter()
        .zip(greens)
        .zip(blues)
        .flat_map(|((r, g), b)| [(r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8])
        .collect();
    Ok(ColorSpace::Indexed {
        hival: entries as u32 - 1,
        lookup,
    })
}
