use image::{DynamicImage, Rgb, RgbImage};
use quickcompress::Error;
use quickcompress::models::{MarginOption, PageSize, PdfSettings};
use quickcompress::page_ranges::{self, PageRange};
use quickcompress::pdf_engine;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 160, 90])))
        .save(&path)
        .unwrap();
    path
}

/// A PDF with `count` pages of the given size.
fn write_pdf(dir: &Path, name: &str, count: u32, page_size: PageSize) -> PathBuf {
    let images: Vec<PathBuf> = (0..count)
        .map(|i| write_image(dir, &format!("{name}_{i}.png"), 40, 30))
        .collect();
    let settings = PdfSettings {
        page_size,
        ..PdfSettings::default()
    };
    let output = dir.join(format!("{name}.pdf"));
    pdf_engine::create_pdf_from_images(&images, &settings, &output).unwrap();
    output
}

fn page_sizes(path: &Path) -> Vec<(f32, f32)> {
    pdf_engine::pdf_pages(path)
        .unwrap()
        .iter()
        .map(|p| (p.width, p.height))
        .collect()
}

#[test]
fn images_become_uniform_a4_pages() {
    let dir = tempdir().unwrap();
    let images = vec![
        write_image(dir.path(), "landscape.png", 400, 200),
        write_image(dir.path(), "portrait.png", 100, 300),
    ];
    let settings = PdfSettings {
        margins: MarginOption::Small,
        ..PdfSettings::default()
    };
    let output = dir.path().join("out").join("album.pdf");

    let document = pdf_engine::create_pdf_from_images(&images, &settings, &output).unwrap();
    assert_eq!(document.page_count, 2);
    assert_eq!(document.name, "album.pdf");
    assert_eq!(document.size, fs::metadata(&output).unwrap().len());
    assert_eq!(page_sizes(&output), vec![(595.0, 842.0), (595.0, 842.0)]);
}

#[test]
fn fit_to_image_uses_largest_dimensions() {
    let dir = tempdir().unwrap();
    let images = vec![
        write_image(dir.path(), "a.png", 300, 200),
        write_image(dir.path(), "b.png", 100, 400),
    ];
    let settings = PdfSettings {
        page_size: PageSize::FitToImage,
        ..PdfSettings::default()
    };
    let output = dir.path().join("fit.pdf");

    pdf_engine::create_pdf_from_images(&images, &settings, &output).unwrap();
    assert_eq!(page_sizes(&output), vec![(300.0, 400.0), (300.0, 400.0)]);
}

#[test]
fn unreadable_images_are_skipped() {
    let dir = tempdir().unwrap();
    let broken = dir.path().join("broken.png");
    fs::write(&broken, b"nope").unwrap();
    let good = write_image(dir.path(), "good.png", 50, 50);
    let output = dir.path().join("partial.pdf");

    let document =
        pdf_engine::create_pdf_from_images(&[broken.clone(), good], &PdfSettings::default(), &output)
            .unwrap();
    assert_eq!(document.page_count, 1);

    assert!(matches!(
        pdf_engine::create_pdf_from_images(&[broken], &PdfSettings::default(), &dir.path().join("none.pdf")),
        Err(Error::NoImages)
    ));
}

#[test]
fn merge_keeps_input_order() {
    let dir = tempdir().unwrap();
    let letter = write_pdf(dir.path(), "letter", 2, PageSize::Letter);
    let a4 = write_pdf(dir.path(), "a4", 1, PageSize::A4);
    let output = dir.path().join("merged.pdf");

    let merged = pdf_engine::merge_pdfs(&[letter, a4.clone()], &output).unwrap();
    assert_eq!(merged.page_count, 3);
    assert_eq!(
        page_sizes(&output),
        vec![(612.0, 792.0), (612.0, 792.0), (595.0, 842.0)]
    );

    let reversed = pdf_engine::merge_pdfs(&[a4, output], &dir.path().join("reversed.pdf")).unwrap();
    assert_eq!(reversed.page_count, 4);
}

#[test]
fn merging_nothing_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        pdf_engine::merge_pdfs(&[], &dir.path().join("merged.pdf")),
        Err(Error::NoDocuments)
    ));
}

#[test]
fn split_writes_one_file_per_range() {
    let dir = tempdir().unwrap();
    let source = write_pdf(dir.path(), "source", 5, PageSize::A4);
    let output_dir = dir.path().join("parts");
    let ranges = page_ranges::parse_ranges("1-2, 4-", 5).unwrap();

    let outputs = pdf_engine::split_pdf(&source, &ranges, &output_dir, "chapter").unwrap();
    assert_eq!(outputs.len(), 2);

    let counts: Vec<u32> = outputs
        .iter()
        .map(|p| pdf_engine::pdf_details(p).unwrap().page_count)
        .collect();
    assert_eq!(counts, vec![2, 2]);

    let first = outputs[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(first.starts_with("chapter_part1_"), "{first}");
    assert!(first.ends_with(".pdf"), "{first}");
}

#[test]
fn split_each_selected_page() {
    let dir = tempdir().unwrap();
    let source = write_pdf(dir.path(), "source", 3, PageSize::Letter);

    let outputs =
        pdf_engine::split_pdf(&source, &page_ranges::each_page([3, 1]), dir.path(), "split").unwrap();
    assert_eq!(outputs.len(), 2);
    for output in &outputs {
        assert_eq!(page_sizes(output), vec![(612.0, 792.0)]);
    }
}

#[test]
fn split_rejects_pages_past_the_end() {
    let dir = tempdir().unwrap();
    let source = write_pdf(dir.path(), "source", 2, PageSize::A4);
    let output_dir = dir.path().join("parts");

    let result = pdf_engine::split_pdf(
        &source,
        &[PageRange::single(1), PageRange::single(3)],
        &output_dir,
        "split",
    );
    assert!(matches!(result, Err(Error::PageOutOfRange { page: 3, count: 2 })));
    assert!(!output_dir.exists());

    assert!(matches!(
        pdf_engine::split_pdf(&source, &[], &output_dir, "split"),
        Err(Error::NoPagesSelected)
    ));
}

#[test]
fn repeated_splits_never_overwrite_parts() {
    let dir = tempdir().unwrap();
    let source = write_pdf(dir.path(), "source", 2, PageSize::A4);
    let output_dir = dir.path().join("parts");
    let ranges = page_ranges::each_page([1, 2]);

    let first = pdf_engine::split_pdf(&source, &ranges, &output_dir, "same").unwrap();
    let second = pdf_engine::split_pdf(&source, &ranges, &output_dir, "same").unwrap();

    let mut all: Vec<&PathBuf> = first.iter().chain(&second).collect();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|p| p.exists()));
    assert_eq!(fs::read_dir(&output_dir).unwrap().count(), 4);
}
