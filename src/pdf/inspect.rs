//! Read-back of produced PDFs: page sizes and embedded image XObjects

use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{ConvertError, Result};

/// One image XObject reachable from a page
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    /// Resource name, e.g. `Im1`
    pub name: String,
    pub object_id: (u32, u16),
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    pub bits_per_component: u32,
    /// First filter in the chain, or `raw`
    pub filter: String,
    /// Encoded stream length
    pub size_bytes: usize,
}

/// Page geometry and images, numbered from 1
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary {
    pub page_number: u32,
    pub media_box: [f64; 4],
    pub images: Vec<ImageInfo>,
}

impl PageSummary {
    pub fn width(&self) -> f64 {
        self.media_box[2] - self.media_box[0]
    }

    pub fn height(&self) -> f64 {
        self.media_box[3] - self.media_box[1]
    }
}

/// Summarize every page of a PDF
pub fn inspect_pdf(pdf_bytes: &[u8]) -> Result<Vec<PageSummary>> {
    let doc = load(pdf_bytes)?;
    let mut summaries = Vec::new();
    for (page_number, page_id) in doc.get_pages() {
        let page_dict = page_dictionary(&doc, page_id)?;
        let media_box = inherited(&doc, page_dict, b"MediaBox")
            .and_then(|obj| number_array(&doc, obj))
            .unwrap_or([0.0; 4]);

        let resources = inherited(&doc, page_dict, b"Resources");
        let mut images = Vec::new();
        for (name, id) in xobjects(&doc, resources) {
            if let Ok(Object::Stream(stream)) = doc.get_object(id) {
                if name_of(stream.dict.get(b"Subtype").ok()).as_deref() == Some("Image") {
                    images.push(image_info(&doc, name, id, stream));
                }
            }
        }

        summaries.push(PageSummary {
            page_number,
            media_box,
            images,
        });
    }
    Ok(summaries)
}

/// Stream bytes of the first image on a page, with FlateDecode undone.
///
/// CCITT data is returned exactly as stored.
pub fn extract_page_image(pdf_bytes: &[u8], page_number: u32) -> Result<Vec<u8>> {
    let doc = load(pdf_bytes)?;
    let page_id = doc
        .get_pages()
        .get(&page_number)
        .copied()
        .ok_or_else(|| ConvertError::InvalidPdf(format!("no page {}", page_number)))?;
    let page_dict = page_dictionary(&doc, page_id)?;
    let resources = inherited(&doc, page_dict, b"Resources");

    let mut seen = HashSet::new();
    for (_, id) in xobjects(&doc, resources) {
        if !seen.insert(id) {
            continue;
        }
        if let Ok(Object::Stream(stream)) = doc.get_object(id) {
            if name_of(stream.dict.get(b"Subtype").ok()).as_deref() == Some("Image") {
                return decompress_stream(stream);
            }
        }
    }
    Err(ConvertError::InvalidPdf(format!(
        "page {} has no image",
        page_number
    )))
}

fn load(pdf_bytes: &[u8]) -> Result<Document> {
    Document::load_mem(pdf_bytes).map_err(|e| ConvertError::InvalidPdf(e.to_string()))
}

fn page_dictionary(doc: &Document, page_id: ObjectId) -> Result<&Dictionary> {
    doc.get_dictionary(page_id)
        .map_err(|e| ConvertError::InvalidPdf(format!("page {:?}: {}", page_id, e)))
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Look a key up on the page, then along its Parent chain
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut dict = page;
    let mut visited = HashSet::new();
    loop {
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = match dict.get(b"Parent") {
            Ok(Object::Reference(id)) if visited.insert(*id) => *id,
            _ => return None,
        };
        dict = doc.get_dictionary(parent).ok()?;
    }
}

/// XObject names and ids, sorted by name
fn xobjects(doc: &Document, resources: Option<&Object>) -> BTreeMap<String, ObjectId> {
    let mut result = BTreeMap::new();
    let xobject_dict = match resources {
        Some(Object::Dictionary(res)) => res.get(b"XObject").ok().map(|x| resolve(doc, x)),
        _ => None,
    };
    if let Some(Object::Dictionary(dict)) = xobject_dict {
        for (name, value) in dict.iter() {
            if let Object::Reference(id) = value {
                result.insert(String::from_utf8_lossy(name).into_owned(), *id);
            }
        }
    }
    result
}

fn image_info(doc: &Document, name: String, id: ObjectId, stream: &Stream) -> ImageInfo {
    let integer = |key: &[u8]| match stream.dict.get(key).map(|v| resolve(doc, v)) {
        Ok(Object::Integer(n)) => Some(*n as u32),
        _ => None,
    };

    let filter = match stream.dict.get(b"Filter").map(|v| resolve(doc, v)) {
        Ok(Object::Array(filters)) => name_of(filters.first()),
        Ok(other) => name_of(Some(other)),
        Err(_) => None,
    };

    ImageInfo {
        name,
        object_id: id,
        width: integer(b"Width").unwrap_or(0),
        height: integer(b"Height").unwrap_or(0),
        color_space: stream
            .dict
            .get(b"ColorSpace")
            .map(|cs| color_space_name(doc, cs))
            .unwrap_or_else(|_| "Unknown".to_string()),
        bits_per_component: integer(b"BitsPerComponent").unwrap_or(8),
        filter: filter.unwrap_or_else(|| "raw".to_string()),
        size_bytes: stream.content.len(),
    }
}

fn color_space_name(doc: &Document, obj: &Object) -> String {
    match resolve(doc, obj) {
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        Object::Array(items) => name_of(items.first()).unwrap_or_else(|| "Unknown".to_string()),
        _ => "Unknown".to_string(),
    }
}

fn name_of(obj: Option<&Object>) -> Option<String> {
    match obj {
        Some(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn number_array(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let Object::Array(items) = obj else {
        return None;
    };
    if items.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(items) {
        *slot = match resolve(doc, item) {
            Object::Integer(n) => *n as f64,
            Object::Real(r) => *r as f64,
            _ => return None,
        };
    }
    Some(values)
}

/// Undo FlateDecode; any other filter leaves the bytes untouched
fn decompress_stream(stream: &Stream) -> Result<Vec<u8>> {
    let filters: Vec<String> = match stream.dict.get(b"Filter") {
        Ok(Object::Array(items)) => items.iter().filter_map(|f| name_of(Some(f))).collect(),
        Ok(other) => name_of(Some(other)).into_iter().collect(),
        Err(_) => Vec::new(),
    };

    let mut data = stream.content.clone();
    for filter in filters {
        if filter != "FlateDecode" {
            break;
        }
        let mut decoded = Vec::new();
        ZlibDecoder::new(&data[..])
            .read_to_end(&mut decoded)
            .map_err(|e| ConvertError::InvalidPdf(format!("FlateDecode failed: {}", e)))?;
        data = decoded;
    }
    Ok(data)
}
