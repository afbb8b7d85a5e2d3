//! PDF object graph assembly and byte-exact serialization.
//!
//! Objects are written to the output buffer as soon as they are added, so only
//! the page tree, catalog and cross-reference data are held until `finish`.
//! Ids 1 and 2 are reserved for the catalog and the page tree root.

use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::pdf::image::{EncodedPage, PageSize, PdfImageObject};

const HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";
const CATALOG_ID: ObjectId = (1, 0);
const PAGES_ID: ObjectId = (2, 0);
const IMAGE_NAME: &str = "Im1";

/// One leaf of the page tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfPageNode {
    pub page_id: ObjectId,
    /// The image XObject drawn on the page, absent for blank placeholders
    pub image_id: Option<ObjectId>,
    pub size: PageSize,
}

/// Builds a PDF file page by page in document order
#[derive(Debug)]
pub struct PdfDocumentBuilder {
    buffer: Vec<u8>,
    /// Byte offset of each written object, indexed by object number - 1
    offsets: Vec<Option<usize>>,
    /// Every reference emitted so far, checked against `offsets` at the end
    references: Vec<ObjectId>,
    pages: Vec<PdfPageNode>,
    producer: String,
}

impl Default for PdfDocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfDocumentBuilder {
    pub fn new() -> Self {
        let mut builder = PdfDocumentBuilder {
            buffer: HEADER.to_vec(),
            offsets: Vec::new(),
            references: Vec::new(),
            pages: Vec::new(),
            producer: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };
        builder.reserve();
        builder.reserve();
        builder
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Append a page showing an encoded image scaled to the page
    pub fn add_image_page(&mut self, page: EncodedPage) -> Result<PdfPageNode> {
        let EncodedPage { image, size, .. } = page;
        let image_id = self.add_image(image)?;
        let content = format!(
            "q {} 0 0 {} 0 0 cm /{} Do Q\n",
            format_real(size.width),
            format_real(size.height),
            IMAGE_NAME
        );
        let resources = dictionary! {
            "XObject" => dictionary! {
                IMAGE_NAME => Object::Reference(image_id),
            },
        };
        self.add_page(size, content.into_bytes(), resources, Some(image_id))
    }

    /// Append an empty page, used in place of a page that failed to convert
    pub fn add_blank_page(&mut self, size: PageSize) -> Result<PdfPageNode> {
        self.add_page(size, Vec::new(), Dictionary::new(), None)
    }

    /// Write the page tree, catalog, info dictionary, xref table and trailer
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let kids: Vec<Object> = self
            .pages
            .iter()
            .map(|p| Object::Reference(p.page_id))
            .collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.pages.len() as i64,
        };
        self.write(PAGES_ID, &Object::Dictionary(pages))?;

        let catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(PAGES_ID),
        };
        self.write(CATALOG_ID, &Object::Dictionary(catalog))?;

        let info = dictionary! {
            "Producer" => Object::String(self.producer.clone().into_bytes(), StringFormat::Literal),
        };
        let info_id = self.add_object(Object::Dictionary(info))?;

        self.check_references()?;

        let xref_offset = self.buffer.len();
        let size = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for (i, offset) in self.offsets.iter().enumerate() {
            let offset = offset.ok_or_else(|| {
                ConvertError::PdfSerialization(format!("object {} was never written", i + 1))
            })?;
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        self.buffer.extend_from_slice(xref.as_bytes());

        let trailer = dictionary! {
            "Size" => size as i64,
            "Root" => Object::Reference(CATALOG_ID),
            "Info" => Object::Reference(info_id),
        };
        self.buffer.extend_from_slice(b"trailer\n");
        let mut unused = Vec::new();
        write_object(&mut self.buffer, &Object::Dictionary(trailer), &mut unused);
        self.buffer
            .extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());

        debug!(
            pages = self.pages.len(),
            objects = self.offsets.len(),
            bytes = self.buffer.len(),
            "Serialized PDF"
        );
        Ok(self.buffer)
    }

    fn add_image(&mut self, image: PdfImageObject) -> Result<ObjectId> {
        let dict = image.dictionary();
        self.add_object(Object::Stream(Stream::new(dict, image.data)))
    }

    fn add_page(
        &mut self,
        size: PageSize,
        content: Vec<u8>,
        resources: Dictionary,
        image_id: Option<ObjectId>,
    ) -> Result<PdfPageNode> {
        if !(size.width > 0.0 && size.height > 0.0 && size.width.is_finite() && size.height.is_finite()) {
            return Err(ConvertError::PdfSerialization(format!(
                "page size {} x {} is not drawable",
                size.width, size.height
            )));
        }
        let content_id = self.add_object(Object::Stream(Stream::new(Dictionary::new(), content)))?;
        let page = dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(PAGES_ID),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(size.width as _),
                Object::Real(size.height as _),
            ],
            "Resources" => resources,
            "Contents" => Object::Reference(content_id),
        };
        let page_id = self.add_object(Object::Dictionary(page))?;
        let node = PdfPageNode {
            page_id,
            image_id,
            size,
        };
        self.pages.push(node);
        Ok(node)
    }

    fn reserve(&mut self) -> ObjectId {
        self.offsets.push(None);
        (self.offsets.len() as u32, 0)
    }

    fn add_object(&mut self, object: Object) -> Result<ObjectId> {
        let id = self.reserve();
        self.write(id, &object)?;
        Ok(id)
    }

    fn write(&mut self, id: ObjectId, object: &Object) -> Result<()> {
        let slot = (id.0 as usize)
            .checked_sub(1)
            .and_then(|i| self.offsets.get_mut(i))
            .ok_or_else(|| {
                ConvertError::PdfSerialization(format!("object {} was never reserved", id.0))
            })?;
        if slot.is_some() {
            return Err(ConvertError::PdfSerialization(format!(
                "object {} written twice",
                id.0
            )));
        }
        *slot = Some(self.buffer.len());

        self.buffer
            .extend_from_slice(format!("{} {} obj\n", id.0, id.1).as_bytes());
        write_object(&mut self.buffer, object, &mut self.references);
        self.buffer.extend_from_slice(b"\nendobj\n");
        Ok(())
    }

    fn check_references(&self) -> Result<()> {
        for &(number, generation) in &self.references {
            let written = (number as usize)
                .checked_sub(1)
                .and_then(|i| self.offsets.get(i))
                .is_some_and(|slot| slot.is_some());
            if !written || generation != 0 {
                return Err(ConvertError::PdfSerialization(format!(
                    "dangling reference {} {} R",
                    number, generation
                )));
            }
        }
        Ok(())
    }
}

/// Serialize one object, collecting the references it contains
fn write_object(out: &mut Vec<u8>, object: &Object, references: &mut Vec<ObjectId>) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(value) => out.extend_from_slice(if *value { b"true" } else { b"false" }),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => out.extend_from_slice(format_real(*value as f64).as_bytes()),
        Object::Name(name) => write_name(out, name),
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.push(b'<');
            for byte in bytes {
                out.extend_from_slice(format!("{:02X}", byte).as_bytes());
            }
            out.push(b'>');
        }
        Object::String(bytes, _) => write_literal_string(out, bytes),
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item, references);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict, None, references),
        Object::Stream(stream) => {
            write_dictionary(out, &stream.dict, Some(stream.content.len()), references);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(id) => {
            references.push(*id);
            out.extend_from_slice(format!("{} {} R", id.0, id.1).as_bytes());
        }
    }
}

/// Dictionary entries in insertion order; streams get their Length from the content
fn write_dictionary(
    out: &mut Vec<u8>,
    dict: &Dictionary,
    length: Option<usize>,
    references: &mut Vec<ObjectId>,
) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        if length.is_some() && key.as_slice() == b"Length" {
            continue;
        }
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        write_object(out, value, references);
    }
    if let Some(length) = length {
        out.extend_from_slice(format!(" /Length {}", length).as_bytes());
    }
    out.extend_from_slice(b" >>");
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &byte in name {
        let delimiter = matches!(
            byte,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
        );
        if (0x21..=0x7E).contains(&byte) && !delimiter {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

fn write_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            0x20..=0x7E => out.push(byte),
            _ => out.extend_from_slice(format!("\\{:03o}", byte).as_bytes()),
        }
    }
    out.push(b')');
}

/// Shortest fixed-point form with at most four decimals
pub(crate) fn format_real(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded.fract() == 0.0 {
        return format!("{}", rounded as i64);
    }
    let text = format!("{:.4}", rounded);
    text.trim_end_matches('0').to_string()
}
