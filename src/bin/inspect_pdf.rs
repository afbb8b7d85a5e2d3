//! Print page sizes and embedded images of a PDF

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tiff_to_pdf::inspect_pdf;

/// List the pages and image XObjects of a PDF
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PDF file to inspect
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let bytes = std::fs::read(&args.input).with_context(|| format!("reading {:?}", args.input))?;
    println!("Read {} bytes", bytes.len());

    let pages = inspect_pdf(&bytes)?;
    println!("Pages: {}", pages.len());
    for page in &pages {
        println!(
            "page {}: {:.2} x {:.2} pt",
            page.page_number,
            page.width(),
            page.height()
        );
        for image in &page.images {
            println!(
                "  /{} {} {}: {}x{} {} {} bpc, {} ({} bytes)",
                image.name,
                image.object_id.0,
                image.object_id.1,
                image.width,
                image.height,
                image.color_space,
                image.bits_per_component,
                image.filter,
                image.size_bytes
            );
        }
    }
    Ok(())
}
