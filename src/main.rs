//! TIFF to PDF CLI
//!
//! Command-line interface for converting a TIFF file, or a directory of them, to PDF.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tiff_to_pdf::{
    file_ops::{convert_directory, convert_file, default_output_path, has_tiff_extension},
    inspect_pdf, logger, ConversionReport, ConvertOptions, PageOutcome, SkippedPagePolicy,
};
use tracing::{info, warn};

/// What to emit for a page that fails to convert
#[derive(ValueEnum, Clone, Copy, Debug)]
enum SkippedPages {
    /// Insert a blank page of the same size
    Placeholder,
    /// Leave the page out
    Omit,
}

/// Convert multi-page TIFF images into paginated PDF documents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input TIFF file, or a directory of TIFF files
    #[arg(short, long)]
    input: PathBuf,

    /// Output PDF file, or output directory when the input is a directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Abort on the first page that fails to convert
    #[arg(long)]
    fail_fast: bool,

    /// Size pages at this DPI instead of the file's resolution
    #[arg(long)]
    dpi: Option<f64>,

    /// Convert at most this many pages
    #[arg(long)]
    max_pages: Option<usize>,

    /// What to emit for pages that fail to convert
    #[arg(long, value_enum, default_value = "placeholder")]
    skipped_pages: SkippedPages,

    /// Invert WhiteIsZero images instead of declaring a decode array
    #[arg(long)]
    normalize_polarity: bool,

    /// Always decode and re-encode CCITT Group 4 pages
    #[arg(long)]
    no_passthrough: bool,

    /// Pages decoded in parallel
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Flate compression level (0-9)
    #[arg(long, default_value = "6")]
    compression_level: u32,

    /// Delete each source TIFF after its PDF was written
    #[arg(long)]
    delete_source: bool,

    /// Re-open each written PDF and check its page count
    #[arg(long)]
    verify: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> ConvertOptions {
        ConvertOptions {
            fail_fast: self.fail_fast,
            output_dpi_override: self.dpi,
            max_pages: self.max_pages,
            skipped_pages: match self.skipped_pages {
                SkippedPages::Placeholder => SkippedPagePolicy::Placeholder,
                SkippedPages::Omit => SkippedPagePolicy::Omit,
            },
            normalize_polarity: self.normalize_polarity,
            passthrough_ccitt: !self.no_passthrough,
            workers: self.workers,
            compression_level: self.compression_level,
            cancel: None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(args.verbose);

    let options = args.options();
    options.validate()?;

    println!("TIFF to PDF Converter");
    println!("=====================");

    if args.input.is_dir() {
        let output_dir = args.output.clone().unwrap_or_else(|| args.input.clone());
        let results = convert_directory(&args.input, &output_dir, &options, args.delete_source)?;

        let mut failed = 0;
        for file in &results {
            match &file.result {
                Ok(report) => {
                    print_report(&file.input, report);
                    if args.verify {
                        verify(&file.output, report)?;
                    }
                }
                Err(failure) => {
                    failed += 1;
                    println!("{}: FAILED: {}", file.input.display(), failure);
                }
            }
        }
        println!(
            "\nDone! Converted {} of {} files",
            results.len() - failed,
            results.len()
        );
        if failed > 0 {
            bail!("{} file(s) failed to convert", failed);
        }
        return Ok(());
    }

    if !has_tiff_extension(&args.input) {
        warn!(input = %args.input.display(), "Input has no .tif or .tiff extension");
    }
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    let report = convert_file(&args.input, &output, &options)?;
    print_report(&args.input, &report);
    if args.verify {
        verify(&output, &report)?;
    }
    if args.delete_source {
        std::fs::remove_file(&args.input)
            .with_context(|| format!("deleting {:?}", args.input))?;
    }
    println!("Output saved to: {:?}", output);

    Ok(())
}

fn print_report(input: &Path, report: &ConversionReport) {
    println!(
        "\n{}: {} of {} pages converted{}",
        input.display(),
        report.converted_pages(),
        report.source_pages,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for page in &report.pages {
        match &page.outcome {
            PageOutcome::Converted { filter } => {
                println!("  page {}: {}", page.index + 1, filter);
            }
            PageOutcome::Placeholder { failure } => {
                println!("  page {}: placeholder ({})", page.index + 1, failure.message);
            }
            PageOutcome::Omitted { failure } => {
                println!("  page {}: omitted ({})", page.index + 1, failure.message);
            }
        }
        for advisory in &page.advisories {
            println!("    note: {}", advisory);
        }
    }
}

fn verify(output: &Path, report: &ConversionReport) -> anyhow::Result<()> {
    let bytes = std::fs::read(output).with_context(|| format!("reading {:?}", output))?;
    let pages = inspect_pdf(&bytes).with_context(|| format!("inspecting {:?}", output))?;
    if pages.len() != report.output_pages() {
        warn!(found = pages.len(), expected = report.output_pages(), "Page count mismatch");
        bail!(
            "{:?} has {} pages, expected {}",
            output,
            pages.len(),
            report.output_pages()
        );
    }
    info!(output = %output.display(), pages = pages.len(), "Verified PDF");
    Ok(())
}
