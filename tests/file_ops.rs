mod common;

use common::*;
use std::fs;
use tempfile::tempdir;
use tiff_to_pdf::file_ops::{
    convert_directory, convert_file, default_output_path, has_tiff_extension,
};
use tiff_to_pdf::{inspect_pdf, ConvertOptions, ErrorKind};

fn sample_tiff(pages: u32) -> Vec<u8> {
    let mut builder = TiffBuilder::new();
    for _ in 0..pages {
        builder = builder.page(Page::gray8(8, 8, 1, 8).dpi(72, 72).strip(ramp(64)));
    }
    builder.build()
}

#[test]
fn test_convert_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scan.tif");
    fs::write(&input, sample_tiff(2)).unwrap();

    let output = default_output_path(&input);
    assert_eq!(output, dir.path().join("scan.pdf"));

    let report = convert_file(&input, &output, &ConvertOptions::default()).unwrap();
    assert_eq!(report.output_pages(), 2);
    let pages = inspect_pdf(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(pages.len(), 2);
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempdir().unwrap();
    let failure = convert_file(
        &dir.path().join("absent.tif"),
        &dir.path().join("absent.pdf"),
        &ConvertOptions::default(),
    )
    .unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Io);
}

#[test]
fn test_tiff_extension_check() {
    assert!(has_tiff_extension("a.tif".as_ref()));
    assert!(has_tiff_extension("b.TIFF".as_ref()));
    assert!(!has_tiff_extension("c.pdf".as_ref()));
    assert!(!has_tiff_extension("tif".as_ref()));
}

#[test]
fn test_convert_directory() {
    let input_dir = tempdir().unwrap();
    let output_dir = tempdir().unwrap();
    let out = output_dir.path().join("pdfs");

    fs::write(input_dir.path().join("b.TIFF"), sample_tiff(1)).unwrap();
    fs::write(input_dir.path().join("a.tif"), sample_tiff(3)).unwrap();
    fs::write(input_dir.path().join("broken.tif"), b"not a tiff").unwrap();
    fs::write(input_dir.path().join("notes.txt"), b"ignored").unwrap();

    let results =
        convert_directory(input_dir.path(), &out, &ConvertOptions::default(), false).unwrap();
    let names: Vec<_> = results
        .iter()
        .map(|r| r.input.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.tif", "b.TIFF", "broken.tif"]);

    assert_eq!(results[0].result.as_ref().unwrap().output_pages(), 3);
    assert_eq!(results[1].output, out.join("b.pdf"));
    assert!(out.join("a.pdf").exists());
    assert!(out.join("b.pdf").exists());

    let failure = results[2].result.as_ref().unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::MalformedHeader);
    assert!(!out.join("broken.pdf").exists());
    assert!(input_dir.path().join("a.tif").exists());
}

#[test]
fn test_convert_directory_deletes_converted_sources() {
    let input_dir = tempdir().unwrap();
    let output_dir = tempdir().unwrap();
    fs::write(input_dir.path().join("one.tif"), sample_tiff(1)).unwrap();
    fs::write(input_dir.path().join("bad.tif"), b"II").unwrap();

    let results = convert_directory(
        input_dir.path(),
        output_dir.path(),
        &ConvertOptions::default(),
        true,
    )
    .unwrap();
    assert_eq!(results.len(), 2);
    assert!(!input_dir.path().join("one.tif").exists());
    assert!(output_dir.path().join("one.pdf").exists());
    // Failed conversions keep their source
    assert!(input_dir.path().join("bad.tif").exists());
}
