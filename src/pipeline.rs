//! Page-by-page conversion driver
//!
//! Every directory is parsed up front so header and chain damage aborts before any
//! page is written. Pages then flow one at a time (or one window of `workers` pages
//! at a time) through assembly, decoding and encoding, and are appended to the
//! document strictly in source order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ConvertError, ErrorKind};
use crate::pdf::{
    EncodePlan, EncodedPage, EncoderOptions, PageSize, PdfDocumentBuilder, PdfImageEncoder,
};
use crate::raster::PageRasterizer;
use crate::report::{ConversionReport, PageFailure, PageOutcome, PageReport};
use crate::tiff::{Directory, PageDescriptor, StripAssembler, TiffDirectoryParser};

/// What to put in the PDF for a page that failed under skip-and-continue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SkippedPagePolicy {
    /// A blank page of the failed page's size, or US Letter if that is unknown
    #[default]
    Placeholder,
    /// No page at all
    Omit,
}

/// Shared flag for stopping a conversion between pages
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for a conversion
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Abort on the first page-level failure instead of skipping the page
    pub fail_fast: bool,
    /// Size every page at this resolution instead of the file's own
    pub output_dpi_override: Option<f64>,
    /// Convert at most this many pages from the start of the file
    pub max_pages: Option<usize>,
    pub skipped_pages: SkippedPagePolicy,
    /// Invert WhiteIsZero pixels rather than declaring a Decode array
    pub normalize_polarity: bool,
    /// Embed single-strip Group 4 data without re-encoding
    pub passthrough_ccitt: bool,
    /// Pages decoded in parallel; 1 keeps everything on the calling thread
    pub workers: usize,
    /// Flate level, 0-9
    pub compression_level: u32,
    pub cancel: Option<CancelToken>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            output_dpi_override: None,
            max_pages: None,
            skipped_pages: SkippedPagePolicy::Placeholder,
            normalize_polarity: false,
            passthrough_ccitt: true,
            workers: 1,
            compression_level: 6,
            cancel: None,
        }
    }
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<(), ConvertError> {
        if let Some(dpi) = self.output_dpi_override {
            if !(dpi.is_finite() && dpi > 0.0) {
                return Err(ConvertError::InvalidOptions(format!(
                    "output DPI must be positive, got {}",
                    dpi
                )));
            }
        }
        if self.max_pages == Some(0) {
            return Err(ConvertError::InvalidOptions(
                "max pages must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ConvertError::InvalidOptions(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.compression_level > 9 {
            return Err(ConvertError::InvalidOptions(format!(
                "compression level must be 0-9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    fn encoder_options(&self) -> EncoderOptions {
        EncoderOptions {
            compression_level: self.compression_level,
            passthrough_ccitt: self.passthrough_ccitt,
            dpi_override: self.output_dpi_override,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Where the pipeline is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    ParsingHeader,
    Assembling { page: usize },
    Decoding { page: usize },
    Encoding { page: usize },
    Finalizing,
    Done,
    Failed(ErrorKind),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Start => write!(f, "start"),
            PipelineState::ParsingHeader => write!(f, "parsing header"),
            PipelineState::Assembling { page } => write!(f, "assembling page {}", page),
            PipelineState::Decoding { page } => write!(f, "decoding page {}", page),
            PipelineState::Encoding { page } => write!(f, "encoding page {}", page),
            PipelineState::Finalizing => write!(f, "finalizing"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(kind) => write!(f, "failed ({})", kind),
        }
    }
}

/// A finished PDF and what happened to each page
#[derive(Debug, Clone)]
pub struct Conversion {
    pub pdf: Vec<u8>,
    pub report: ConversionReport,
}

/// The first fatal error of a conversion
#[derive(Error, Debug)]
#[error("Conversion failed while {state}: {error}")]
pub struct ConversionFailure {
    #[source]
    pub error: ConvertError,
    /// Byte offset in the TIFF input, when the error has one
    pub offset: Option<u64>,
    pub state: PipelineState,
    /// Pages handled before the failure
    pub report: ConversionReport,
}

impl ConversionFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Per-page stages; plain data so a window of pages can share them across threads
#[derive(Debug, Clone, Copy)]
struct PageStages<'a> {
    assembler: StripAssembler<'a>,
    rasterizer: PageRasterizer<'a>,
    encoder: PdfImageEncoder,
}

/// Result of running one page through the stages
struct PageAttempt {
    index: usize,
    result: Result<EncodedPage, (PipelineState, ConvertError)>,
    /// Size for a placeholder, when the directory still gives one
    fallback: Option<PageSize>,
}

impl<'a> PageStages<'a> {
    fn run(&self, directory: Directory) -> PageAttempt {
        let index = directory.index;
        let fallback = directory
            .page_extent()
            .map(|(width, height, resolution)| self.encoder.page_size(width, height, resolution).0);
        PageAttempt {
            index,
            result: self.encode(directory),
            fallback,
        }
    }

    fn encode(&self, directory: Directory) -> Result<EncodedPage, (PipelineState, ConvertError)> {
        let index = directory.index;
        let at = |state: PipelineState| move |e: ConvertError| (state, e);

        debug!(page = index, offset = directory.offset, "Assembling page");
        let page =
            PageDescriptor::describe(directory).map_err(at(PipelineState::Assembling { page: index }))?;
        let region = self
            .assembler
            .assemble(&page)
            .map_err(at(PipelineState::Assembling { page: index }))?;

        if self.encoder.plan(&page, &region) == EncodePlan::Passthrough {
            debug!(page = index, "Encoding page as CCITT passthrough");
            return self
                .encoder
                .passthrough(&page, &region)
                .map_err(at(PipelineState::Encoding { page: index }));
        }

        debug!(
            page = index,
            width = page.width,
            height = page.height,
            compression = page.compression,
            "Decoding page"
        );
        let decoded = self
            .rasterizer
            .decode(&page, &region)
            .map_err(at(PipelineState::Decoding { page: index }))?;

        debug!(page = index, "Encoding page");
        self.encoder
            .encode(decoded)
            .map_err(at(PipelineState::Encoding { page: index }))
    }
}

/// Drives one conversion from TIFF bytes to PDF bytes
pub struct ConversionPipeline<'a> {
    source: &'a [u8],
    options: ConvertOptions,
    state: PipelineState,
    report: ConversionReport,
}

impl<'a> ConversionPipeline<'a> {
    pub fn new(source: &'a [u8], options: ConvertOptions) -> Self {
        ConversionPipeline {
            source,
            options,
            state: PipelineState::Start,
            report: ConversionReport::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run(&mut self) -> Result<Conversion, ConversionFailure> {
        match self.convert() {
            Ok(pdf) => {
                self.state = PipelineState::Done;
                info!(
                    pages = self.report.output_pages(),
                    failed = self.report.failed_pages().count(),
                    bytes = pdf.len(),
                    "Conversion finished"
                );
                Ok(Conversion {
                    pdf,
                    report: std::mem::take(&mut self.report),
                })
            }
            Err((state, error)) => {
                self.state = PipelineState::Failed(error.kind());
                warn!(%state, error = %error, "Conversion failed");
                Err(ConversionFailure {
                    offset: error.offset(),
                    error,
                    state,
                    report: std::mem::take(&mut self.report),
                })
            }
        }
    }

    fn convert(&mut self) -> Result<Vec<u8>, (PipelineState, ConvertError)> {
        self.options
            .validate()
            .map_err(|e| (PipelineState::Start, e))?;

        self.state = PipelineState::ParsingHeader;
        let directories = TiffDirectoryParser::new(self.source)
            .and_then(|mut parser| parser.parse_all(self.options.max_pages))
            .map_err(|e| (PipelineState::ParsingHeader, e))?;
        self.report.source_pages = directories.len();
        info!(pages = directories.len(), "Found image directories");

        let stages = PageStages {
            assembler: StripAssembler::new(self.source),
            rasterizer: PageRasterizer::new(self.source, self.options.normalize_polarity),
            encoder: PdfImageEncoder::new(self.options.encoder_options()),
        };
        let mut builder = PdfDocumentBuilder::new();
        let window = self.options.workers;

        let mut pending = directories.into_iter().peekable();
        while let Some(next) = pending.peek() {
            if self.options.is_cancelled() {
                warn!(page = next.index, "Conversion cancelled");
                self.report.cancelled = true;
                break;
            }
            let batch: Vec<Directory> = pending.by_ref().take(window).collect();
            self.state = PipelineState::Assembling {
                page: batch[0].index,
            };
            for attempt in run_window(&stages, batch) {
                self.record(attempt, &mut builder)?;
            }
        }

        self.state = PipelineState::Finalizing;
        if builder.page_count() == 0 {
            warn!("No pages were written");
        }
        builder
            .finish()
            .map_err(|e| (PipelineState::Finalizing, e))
    }

    fn record(
        &mut self,
        attempt: PageAttempt,
        builder: &mut PdfDocumentBuilder,
    ) -> Result<(), (PipelineState, ConvertError)> {
        let index = attempt.index;
        match attempt.result {
            Ok(encoded) => {
                for advisory in &encoded.advisories {
                    warn!(page = index, %advisory, "Page advisory");
                }
                let filter = encoded.image.filter;
                let advisories = encoded.advisories.clone();
                builder
                    .add_image_page(encoded)
                    .map_err(|e| (PipelineState::Encoding { page: index }, e))?;
                self.report.pages.push(PageReport {
                    index,
                    outcome: PageOutcome::Converted { filter },
                    advisories,
                });
                Ok(())
            }
            Err((state, error)) => {
                if self.options.fail_fast || !error.is_page_scoped() {
                    return Err((state, error));
                }
                warn!(page = index, %state, error = %error, "Skipping page");
                let failure = PageFailure::from(&error);
                let outcome = match self.options.skipped_pages {
                    SkippedPagePolicy::Placeholder => {
                        let size = attempt.fallback.unwrap_or(PageSize::LETTER);
                        builder
                            .add_blank_page(size)
                            .map_err(|e| (PipelineState::Encoding { page: index }, e))?;
                        PageOutcome::Placeholder { failure }
                    }
                    SkippedPagePolicy::Omit => PageOutcome::Omitted { failure },
                };
                self.report.pages.push(PageReport {
                    index,
                    outcome,
                    advisories: Vec::new(),
                });
                Ok(())
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn run_window(stages: &PageStages<'_>, batch: Vec<Directory>) -> Vec<PageAttempt> {
    use rayon::prelude::*;

    if batch.len() > 1 {
        batch.into_par_iter().map(|d| stages.run(d)).collect()
    } else {
        batch.into_iter().map(|d| stages.run(d)).collect()
    }
}

#[cfg(target_arch = "wasm32")]
fn run_window(stages: &PageStages<'_>, batch: Vec<Directory>) -> Vec<PageAttempt> {
    batch.into_iter().map(|d| stages.run(d)).collect()
}
