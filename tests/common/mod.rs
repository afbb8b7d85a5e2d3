//! Synthetic TIFF files for the integration tests

#![allow(dead_code)]

pub const IMAGE_WIDTH: u16 = 256;
pub const IMAGE_LENGTH: u16 = 257;
pub const BITS_PER_SAMPLE: u16 = 258;
pub const COMPRESSION: u16 = 259;
pub const PHOTOMETRIC: u16 = 262;
pub const FILL_ORDER: u16 = 266;
pub const STRIP_OFFSETS: u16 = 273;
pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const ROWS_PER_STRIP: u16 = 278;
pub const STRIP_BYTE_COUNTS: u16 = 279;
pub const X_RESOLUTION: u16 = 282;
pub const Y_RESOLUTION: u16 = 283;
pub const RESOLUTION_UNIT: u16 = 296;
pub const PREDICTOR: u16 = 317;
pub const COLOR_MAP: u16 = 320;
pub const TILE_WIDTH: u16 = 322;
pub const TILE_LENGTH: u16 = 323;
pub const TILE_OFFSETS: u16 = 324;
pub const TILE_BYTE_COUNTS: u16 = 325;
pub const EXTRA_SAMPLES: u16 = 338;

/// Group 4 encoding of a 16x4 bilevel pattern
pub const G4_16X4: [u8; 11] = [
    0x98, 0x09, 0x04, 0x72, 0x22, 0x47, 0x08, 0x18, 0x00, 0x80, 0x08,
];
/// Packed rows of the pattern, 1 bits where black codes were coded
pub const PATTERN_16X4: [u8; 8] = [0x00, 0x00, 0x1F, 0xF8, 0xC0, 0x03, 0x1F, 0xF8];

#[derive(Debug, Clone)]
pub enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Short(_) => 3,
            Value::Long(_) => 4,
            Value::Rational(_) => 5,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Value::Short(v) => v.len() as u32,
            Value::Long(v) => v.len() as u32,
            Value::Rational(v) => v.len() as u32,
        }
    }

    fn encode(&self, big_endian: bool) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Value::Short(values) => {
                for v in values {
                    out.extend(u16_bytes(*v, big_endian));
                }
            }
            Value::Long(values) => {
                for v in values {
                    out.extend(u32_bytes(*v, big_endian));
                }
            }
            Value::Rational(values) => {
                for (n, d) in values {
                    out.extend(u32_bytes(*n, big_endian));
                    out.extend(u32_bytes(*d, big_endian));
                }
            }
        }
        out
    }
}

fn u16_bytes(v: u16, big_endian: bool) -> [u8; 2] {
    if big_endian {
        v.to_be_bytes()
    } else {
        v.to_le_bytes()
    }
}

fn u32_bytes(v: u32, big_endian: bool) -> [u8; 4] {
    if big_endian {
        v.to_be_bytes()
    } else {
        v.to_le_bytes()
    }
}

/// One directory with its segment data
#[derive(Debug, Clone)]
pub struct Page {
    tags: Vec<(u16, Value)>,
    segments: Vec<Vec<u8>>,
    tiled: bool,
    /// Overrides the byte counts written for the segments
    byte_counts: Option<Vec<u32>>,
    /// Overrides the offsets written for the segments
    offsets: Option<Vec<u32>>,
}

impl Page {
    /// A page with ImageWidth, ImageLength and Compression set
    pub fn new(width: u32, height: u32, compression: u16) -> Self {
        Page {
            tags: vec![
                (IMAGE_WIDTH, Value::Long(vec![width])),
                (IMAGE_LENGTH, Value::Long(vec![height])),
                (COMPRESSION, Value::Short(vec![compression])),
            ],
            segments: Vec::new(),
            tiled: false,
            byte_counts: None,
            offsets: None,
        }
    }

    /// 8-bit grayscale, BlackIsZero, one strip per `rows_per_strip` rows
    pub fn gray8(width: u32, height: u32, compression: u16, rows_per_strip: u32) -> Self {
        Page::new(width, height, compression)
            .tag(BITS_PER_SAMPLE, Value::Short(vec![8]))
            .tag(PHOTOMETRIC, Value::Short(vec![1]))
            .tag(ROWS_PER_STRIP, Value::Long(vec![rows_per_strip]))
    }

    pub fn tag(mut self, id: u16, value: Value) -> Self {
        self.tags.retain(|(t, _)| *t != id);
        self.tags.push((id, value));
        self
    }

    pub fn without(mut self, id: u16) -> Self {
        self.tags.retain(|(t, _)| *t != id);
        self
    }

    pub fn dpi(self, x: u32, y: u32) -> Self {
        self.tag(X_RESOLUTION, Value::Rational(vec![(x, 1)]))
            .tag(Y_RESOLUTION, Value::Rational(vec![(y, 1)]))
            .tag(RESOLUTION_UNIT, Value::Short(vec![2]))
    }

    pub fn strip(mut self, data: Vec<u8>) -> Self {
        self.segments.push(data);
        self
    }

    /// Switch to tiles of `width` x `length`; segments added become tiles
    pub fn tiles(mut self, width: u32, length: u32) -> Self {
        self.tiled = true;
        self.tag(TILE_WIDTH, Value::Long(vec![width]))
            .tag(TILE_LENGTH, Value::Long(vec![length]))
    }

    pub fn byte_counts(mut self, counts: Vec<u32>) -> Self {
        self.byte_counts = Some(counts);
        self
    }

    pub fn offsets(mut self, offsets: Vec<u32>) -> Self {
        self.offsets = Some(offsets);
        self
    }
}

/// Lays out a TIFF file: header, then per page its segments, values and directory
#[derive(Debug, Clone, Default)]
pub struct TiffBuilder {
    big_endian: bool,
    pages: Vec<Page>,
    /// Point the last directory back at this page's directory
    loop_to: Option<usize>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    pub fn loop_to(mut self, page: usize) -> Self {
        self.loop_to = Some(page);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_offsets().0
    }

    /// The file plus the offset of each directory
    pub fn build_with_offsets(&self) -> (Vec<u8>, Vec<u32>) {
        let be = self.big_endian;
        let mut out = Vec::new();
        out.extend_from_slice(if be { b"MM" } else { b"II" });
        out.extend(u16_bytes(42, be));
        out.extend(u32_bytes(0, be));

        let mut ifd_offsets = Vec::new();
        let mut next_slots = Vec::new();

        for page in &self.pages {
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for segment in &page.segments {
                offsets.push(out.len() as u32);
                counts.push(segment.len() as u32);
                out.extend_from_slice(segment);
            }
            let offsets = page.offsets.clone().unwrap_or(offsets);
            let counts = page.byte_counts.clone().unwrap_or(counts);

            let mut tags = page.tags.clone();
            let (offset_tag, count_tag) = if page.tiled {
                (TILE_OFFSETS, TILE_BYTE_COUNTS)
            } else {
                (STRIP_OFFSETS, STRIP_BYTE_COUNTS)
            };
            if !offsets.is_empty() {
                tags.push((offset_tag, Value::Long(offsets)));
                tags.push((count_tag, Value::Long(counts)));
            }
            tags.sort_by_key(|(id, _)| *id);

            let mut slots = Vec::new();
            for (_, value) in &tags {
                let bytes = value.encode(be);
                if bytes.len() <= 4 {
                    let mut slot = bytes.clone();
                    slot.resize(4, 0);
                    slots.push(slot);
                } else {
                    if out.len() % 2 == 1 {
                        out.push(0);
                    }
                    slots.push(u32_bytes(out.len() as u32, be).to_vec());
                    out.extend_from_slice(&bytes);
                }
            }

            if out.len() % 2 == 1 {
                out.push(0);
            }
            ifd_offsets.push(out.len() as u32);
            out.extend(u16_bytes(tags.len() as u16, be));
            for ((id, value), slot) in tags.iter().zip(slots) {
                out.extend(u16_bytes(*id, be));
                out.extend(u16_bytes(value.field_type(), be));
                out.extend(u32_bytes(value.count(), be));
                out.extend_from_slice(&slot);
            }
            next_slots.push(out.len());
            out.extend(u32_bytes(0, be));
        }

        if let Some(&first) = ifd_offsets.first() {
            out[4..8].copy_from_slice(&u32_bytes(first, be));
        }
        for (i, &slot) in next_slots.iter().enumerate() {
            let next = match ifd_offsets.get(i + 1) {
                Some(&offset) => offset,
                None => self.loop_to.map(|p| ifd_offsets[p]).unwrap_or(0),
            };
            out[slot..slot + 4].copy_from_slice(&u32_bytes(next, be));
        }
        (out, ifd_offsets)
    }
}

/// PackBits with repeat runs for 3+ equal bytes and literal runs otherwise
pub fn packbits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && data[i + run] == data[i] && run < 128 {
            run += 1;
        }
        if run >= 3 {
            out.push((1i16 - run as i16) as i8 as u8);
            out.push(data[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < data.len() && i - start < 128 {
            if i + 2 < data.len() && data[i] == data[i + 1] && data[i] == data[i + 2] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    out
}

/// Deterministic gray ramp of `len` bytes
pub fn ramp(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 37 % 251) as u8).collect()
}
