//! TIFF to PDF converter library
//!
//! Core logic for turning multi-page TIFF images into paginated PDF documents.
//! Shared between the CLI and WASM targets.
//!
//! Each TIFF directory becomes one PDF page holding a single image XObject that
//! fills the page. Group 4 fax data is embedded as is; everything else is decoded
//! and Flate-compressed.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod report;
pub mod tiff;

#[cfg(not(target_arch = "wasm32"))]
pub mod logger;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use error::{CodecError, CodecErrorKind, ConvertError, ErrorKind, Result};
pub use pdf::{extract_page_image, inspect_pdf, ImageFilter, ImageInfo, PageSummary};
pub use pipeline::{
    CancelToken, Conversion, ConversionFailure, ConversionPipeline, ConvertOptions,
    PipelineState, SkippedPagePolicy,
};
pub use report::{Advisory, ConversionReport, PageFailure, PageOutcome, PageReport};
pub use tiff::is_tiff;

/// Convert TIFF bytes to PDF bytes.
///
/// On success the report lists every page, including skipped ones. On failure the
/// first fatal error comes back with the pages handled before it.
pub fn convert(
    source: &[u8],
    options: &ConvertOptions,
) -> std::result::Result<Conversion, ConversionFailure> {
    ConversionPipeline::new(source, options.clone()).run()
}

#[cfg(not(target_arch = "wasm32"))]
pub mod file_ops {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tracing::{debug, info, warn};

    /// Outcome of one file in a directory conversion
    #[derive(Debug)]
    pub struct FileConversion {
        pub input: PathBuf,
        pub output: PathBuf,
        pub result: std::result::Result<ConversionReport, ConversionFailure>,
    }

    /// `scan.tif` becomes `scan.pdf` next to it
    pub fn default_output_path(input: &Path) -> PathBuf {
        input.with_extension("pdf")
    }

    /// Whether a path has a `.tif` or `.tiff` extension, in any case
    pub fn has_tiff_extension(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
            .unwrap_or(false)
    }

    /// Convert a TIFF file to a PDF file
    pub fn convert_file(
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> std::result::Result<ConversionReport, ConversionFailure> {
        let source = fs::read(input).map_err(|source| {
            io_failure(input, source, PipelineState::Start)
        })?;
        info!(input = %input.display(), bytes = source.len(), "Converting file");
        if !is_tiff(&source) {
            warn!(input = %input.display(), "File does not start with a TIFF header");
        }

        let Conversion { pdf, report } = convert(&source, options)?;
        fs::write(output, &pdf).map_err(|source| {
            io_failure(output, source, PipelineState::Finalizing)
        })?;
        info!(
            output = %output.display(),
            pages = report.output_pages(),
            "Wrote PDF"
        );
        Ok(report)
    }

    /// Convert every `.tif`/`.tiff` file in `input_dir` into `output_dir`.
    ///
    /// Files are visited in name order. A failed file does not stop the batch.
    /// With `delete_source`, each input is removed once its PDF was written.
    pub fn convert_directory(
        input_dir: &Path,
        output_dir: &Path,
        options: &ConvertOptions,
        delete_source: bool,
    ) -> Result<Vec<FileConversion>> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConvertError::Io { path, source }
        };

        fs::create_dir_all(output_dir).map_err(io(output_dir))?;
        let mut inputs = Vec::new();
        for entry in fs::read_dir(input_dir).map_err(io(input_dir))? {
            let path = entry.map_err(io(input_dir))?.path();
            if !path.is_file() {
                continue;
            }
            if has_tiff_extension(&path) {
                inputs.push(path);
            } else {
                debug!(path = %path.display(), "Ignoring non-TIFF file");
            }
        }
        inputs.sort();
        info!(files = inputs.len(), dir = %input_dir.display(), "Converting directory");

        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = input.file_name().map(PathBuf::from).unwrap_or_default();
            let output = output_dir.join(name).with_extension("pdf");
            let result = convert_file(&input, &output, options);
            match &result {
                Ok(_) if delete_source => {
                    if let Err(e) = fs::remove_file(&input) {
                        warn!(path = %input.display(), error = %e, "Could not delete source");
                    }
                }
                Ok(_) => {}
                Err(failure) => {
                    warn!(path = %input.display(), error = %failure, "File failed");
                }
            }
            results.push(FileConversion {
                input,
                output,
                result,
            });
        }
        Ok(results)
    }

    fn io_failure(path: &Path, source: std::io::Error, state: PipelineState) -> ConversionFailure {
        ConversionFailure {
            error: ConvertError::Io {
                path: path.to_path_buf(),
                source,
            },
            offset: None,
            state,
            report: ConversionReport::default(),
        }
    }
}
