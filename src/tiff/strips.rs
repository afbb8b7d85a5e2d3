//! Locates the encoded strips or tiles of a page inside the source bytes

use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::tiff::descriptor::{PageDescriptor, SegmentLayout};
use crate::tiff::tags::Tag;

/// One independently encoded strip or tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub index: usize,
    /// File offset of the first encoded byte
    pub offset: u64,
    pub data: &'a [u8],
    /// Top-left pixel of the segment on the page
    pub x: u32,
    pub y: u32,
    /// Encoded geometry; a tile keeps its full size even where it hangs past the page edge
    pub width: u32,
    pub rows: u32,
}

/// The encoded segments of one page, in storage order
#[derive(Debug, Clone)]
pub struct EncodedRegion<'a> {
    pub segments: Vec<Segment<'a>>,
    pub tiled: bool,
}

impl<'a> EncodedRegion<'a> {
    /// Total encoded bytes across all segments
    pub fn encoded_len(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }

    /// The single segment covering the whole page, if the page is stored that way
    pub fn single_segment(&self) -> Option<&Segment<'a>> {
        match self.segments.as_slice() {
            [only] if !self.tiled => Some(only),
            _ => None,
        }
    }
}

/// Slices strips and tiles out of the source according to a descriptor
#[derive(Debug, Clone, Copy)]
pub struct StripAssembler<'a> {
    source: &'a [u8],
}

impl<'a> StripAssembler<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        StripAssembler { source }
    }

    pub fn assemble(&self, page: &PageDescriptor) -> Result<EncodedRegion<'a>> {
        let region = match page.layout {
            SegmentLayout::Strips { rows_per_strip } => {
                let count = page.height.div_ceil(rows_per_strip) as usize;
                self.check_count(page, Tag::StripOffsets, count)?;
                let mut segments = Vec::with_capacity(count);
                for index in 0..count {
                    let y = index as u32 * rows_per_strip;
                    // The last strip only holds the rows left over
                    let rows = rows_per_strip.min(page.height - y);
                    segments.push(self.segment(page, index, 0, y, page.width, rows)?);
                }
                EncodedRegion {
                    segments,
                    tiled: false,
                }
            }
            SegmentLayout::Tiles {
                tile_width,
                tile_length,
            } => {
                let across = page.width.div_ceil(tile_width);
                let down = page.height.div_ceil(tile_length);
                let count = across as usize * down as usize;
                self.check_count(page, Tag::TileOffsets, count)?;
                let mut segments = Vec::with_capacity(count);
                for row in 0..down {
                    for col in 0..across {
                        let index = (row * across + col) as usize;
                        segments.push(self.segment(
                            page,
                            index,
                            col * tile_width,
                            row * tile_length,
                            tile_width,
                            tile_length,
                        )?);
                    }
                }
                EncodedRegion {
                    segments,
                    tiled: true,
                }
            }
        };
        debug!(
            page = page.index,
            segments = region.segments.len(),
            bytes = region.encoded_len(),
            "Assembled encoded segments"
        );
        Ok(region)
    }

    fn check_count(&self, page: &PageDescriptor, tag: Tag, needed: usize) -> Result<()> {
        let available = page.offsets.len().min(page.byte_counts.len());
        if available < needed {
            return Err(ConvertError::InvalidTag {
                tag,
                offset: page.ifd_offset,
                detail: format!("{} entries, page needs {}", available, needed),
            });
        }
        Ok(())
    }

    fn segment(
        &self,
        page: &PageDescriptor,
        index: usize,
        x: u32,
        y: u32,
        width: u32,
        rows: u32,
    ) -> Result<Segment<'a>> {
        let offset = page.offsets[index];
        let length = page.byte_counts[index];
        let available = self.source.len() as u64;
        let data = offset
            .checked_add(length)
            .filter(|&end| end <= available)
            .map(|end| &self.source[offset as usize..end as usize])
            .ok_or(ConvertError::TruncatedStripData {
                index,
                offset,
                length,
                available,
            })?;
        Ok(Segment {
            index,
            offset,
            data,
            x,
            y,
            width,
            rows,
        })
    }
}
