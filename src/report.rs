//! Per-page outcomes and advisories returned with every conversion

use std::fmt;

use crate::error::{ConvertError, ErrorKind};
use crate::pdf::ImageFilter;

/// A non-fatal condition worth telling the caller about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// Resolution was missing, zero or unitless; the page was sized at 96 DPI
    AssumedDefaultResolution,
    /// WhiteIsZero samples were inverted instead of declaring a Decode array
    PolarityInverted,
    /// Samples beyond the color channels (usually alpha) were dropped
    ExtraSamplesDiscarded { count: u16 },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::AssumedDefaultResolution => write!(f, "AssumedDefaultResolution"),
            Advisory::PolarityInverted => write!(f, "PolarityInverted"),
            Advisory::ExtraSamplesDiscarded { count } => {
                write!(f, "ExtraSamplesDiscarded({})", count)
            }
        }
    }
}

/// Why a page could not be converted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub kind: ErrorKind,
    pub offset: Option<u64>,
    pub message: String,
}

impl From<&ConvertError> for PageFailure {
    fn from(err: &ConvertError) -> Self {
        PageFailure {
            kind: err.kind(),
            offset: err.offset(),
            message: err.to_string(),
        }
    }
}

/// What ended up in the PDF for one source page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Converted { filter: ImageFilter },
    Placeholder { failure: PageFailure },
    Omitted { failure: PageFailure },
}

/// Report entry for one source page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    /// Zero-based position in the directory chain
    pub index: usize,
    pub outcome: PageOutcome,
    pub advisories: Vec<Advisory>,
}

impl PageReport {
    pub fn failure(&self) -> Option<&PageFailure> {
        match &self.outcome {
            PageOutcome::Converted { .. } => None,
            PageOutcome::Placeholder { failure } | PageOutcome::Omitted { failure } => {
                Some(failure)
            }
        }
    }
}

/// Outcome of a whole conversion, in source page order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Directories found in the chain, after any page limit
    pub source_pages: usize,
    pub pages: Vec<PageReport>,
    /// Conversion stopped early at the caller's request
    pub cancelled: bool,
}

impl ConversionReport {
    pub fn converted_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.failure().is_none()).count()
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &PageReport> {
        self.pages.iter().filter(|p| p.failure().is_some())
    }

    /// Pages present in the output, placeholders included
    pub fn output_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| !matches!(p.outcome, PageOutcome::Omitted { .. }))
            .count()
    }

    pub fn advisories(&self) -> impl Iterator<Item = (usize, Advisory)> + '_ {
        self.pages
            .iter()
            .flat_map(|p| p.advisories.iter().map(move |a| (p.index, *a)))
    }

    /// Nothing failed and nothing needed an advisory
    pub fn is_clean(&self) -> bool {
        !self.cancelled
            && self
                .pages
                .iter()
                .all(|p| p.failure().is_none() && p.advisories.is_empty())
    }
}
