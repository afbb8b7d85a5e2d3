//! PDF side of the conversion: image XObjects, document assembly and read-back

mod document;
mod image;
mod inspect;

pub use document::{PdfDocumentBuilder, PdfPageNode};
pub use image::{
    ColorSpace, EncodePlan, EncodedPage, EncoderOptions, FaxParams, ImageFilter, PageSize,
    PdfImageEncoder, PdfImageObject, DEFAULT_DPI,
};
pub use inspect::{extract_page_image, inspect_pdf, ImageInfo, PageSummary};
