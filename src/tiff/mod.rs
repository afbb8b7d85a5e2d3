//! TIFF container reading: header, directories, page descriptors and segment lookup

mod descriptor;
mod directory;
mod strips;
mod tags;

pub use descriptor::{
    FillOrder, PageDescriptor, Photometric, Predictor, Resolution, ResolutionUnit, SegmentLayout,
};
pub use directory::{is_tiff, Directory, TiffDirectoryParser, TiffHeader};
pub use strips::{EncodedRegion, Segment, StripAssembler};
pub use tags::{FieldType, Tag, TagMap, TagValue};
