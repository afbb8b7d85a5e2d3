//! WebAssembly bindings for the TIFF to PDF converter

use wasm_bindgen::prelude::*;
use crate::{convert, ConversionReport, ConvertOptions, PageOutcome};

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn options(fail_fast: Option<bool>, dpi: Option<f64>, max_pages: Option<u32>) -> ConvertOptions {
    ConvertOptions {
        fail_fast: fail_fast.unwrap_or(false),
        output_dpi_override: dpi,
        max_pages: max_pages.map(|n| n as usize),
        ..ConvertOptions::default()
    }
}

/// Convert a TIFF image to a PDF
///
/// # Arguments
/// * `tiff_bytes` - The input TIFF file as a byte array
/// * `fail_fast` - Abort on the first page that fails (default: false)
/// * `dpi` - Size pages at this DPI instead of the file's resolution
/// * `max_pages` - Convert at most this many pages
///
/// # Returns
/// The PDF as a byte array, or throws an error
#[wasm_bindgen]
pub fn tiff_to_pdf(
    tiff_bytes: &[u8],
    fail_fast: Option<bool>,
    dpi: Option<f64>,
    max_pages: Option<u32>,
) -> Result<Vec<u8>, JsError> {
    let conversion = convert(tiff_bytes, &options(fail_fast, dpi, max_pages))
        .map_err(|e| JsError::new(&e.to_string()))?;
    Ok(conversion.pdf)
}

/// Convert a TIFF image to a PDF and report what happened to each page
///
/// # Returns
/// A `ConversionResultJs` object containing the PDF and a JSON page report
#[wasm_bindgen]
pub fn tiff_to_pdf_with_report(
    tiff_bytes: &[u8],
    fail_fast: Option<bool>,
    dpi: Option<f64>,
    max_pages: Option<u32>,
) -> Result<ConversionResultJs, JsError> {
    let conversion = convert(tiff_bytes, &options(fail_fast, dpi, max_pages))
        .map_err(|e| JsError::new(&e.to_string()))?;

    let report_json = serde_json::to_string(&report_to_json(&conversion.report))
        .unwrap_or_else(|_| "{}".to_string());

    Ok(ConversionResultJs {
        source_pages: conversion.report.source_pages,
        converted_pages: conversion.report.converted_pages(),
        pdf_bytes: conversion.pdf,
        report_json,
    })
}

/// Convert a report to a JSON-serializable structure
fn report_to_json(report: &ConversionReport) -> serde_json::Value {
    serde_json::json!({
        "sourcePages": report.source_pages,
        "cancelled": report.cancelled,
        "pages": report.pages.iter().map(|page| {
            let (outcome, detail) = match &page.outcome {
                PageOutcome::Converted { filter } => ("converted", filter.to_string()),
                PageOutcome::Placeholder { failure } => ("placeholder", failure.message.clone()),
                PageOutcome::Omitted { failure } => ("omitted", failure.message.clone()),
            };
            serde_json::json!({
                "page": page.index + 1,
                "outcome": outcome,
                "detail": detail,
                "errorKind": page.failure().map(|f| f.kind.to_string()),
                "advisories": page.advisories.iter().map(|a| a.to_string()).collect::<Vec<_>>()
            })
        }).collect::<Vec<_>>()
    })
}

/// Result of a TIFF conversion with its page report
#[wasm_bindgen]
pub struct ConversionResultJs {
    pdf_bytes: Vec<u8>,
    source_pages: usize,
    converted_pages: usize,
    report_json: String,
}

#[wasm_bindgen]
impl ConversionResultJs {
    /// Get the PDF bytes
    #[wasm_bindgen(getter)]
    pub fn pdf_bytes(&self) -> Vec<u8> {
        self.pdf_bytes.clone()
    }

    /// Get the number of pages found in the TIFF
    #[wasm_bindgen(getter)]
    pub fn source_pages(&self) -> usize {
        self.source_pages
    }

    /// Get the number of pages converted without failure
    #[wasm_bindgen(getter)]
    pub fn converted_pages(&self) -> usize {
        self.converted_pages
    }

    /// Get the per-page report as JSON string
    #[wasm_bindgen(getter)]
    pub fn report_json(&self) -> String {
        self.report_json.clone()
    }
}
