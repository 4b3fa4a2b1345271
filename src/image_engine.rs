use crate::error::{Error, Result};
use crate::layout;
use crate::models::{CompressedImage, CompressionSettings, ImageItem, OutputFormat, clamp_quality};
use crate::storage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use rayon::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub const PDF_MAX_DIMENSION: u32 = 2048;

const PNG_OPTIMIZATION_PRESET: u8 = 2;

static NEXT_STAGED_ID: AtomicU64 = AtomicU64::new(1);

pub fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    let (width, height) = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions(path.to_path_buf()));
    }
    Ok((width, height))
}

pub fn image_details(path: &Path) -> Result<ImageItem> {
    let size = fs::metadata(path)?.len();
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let mime_type = reader.format().map(|f| f.to_mime_type().to_string());
    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions(path.to_path_buf()));
    }

    Ok(ImageItem {
        path: path.to_path_buf(),
        name: storage::display_name(path),
        size,
        mime_type,
        width,
        height,
    })
}

pub fn readable_images(paths: &[PathBuf]) -> Vec<ImageItem> {
    paths
        .iter()
        .filter_map(|path| match image_details(path) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                None
            }
        })
        .collect()
}

/// Decodes an image downsampled by a power of two toward the requested box
/// (never below it), with its EXIF orientation applied.
pub fn load_sampled(path: &Path, req_width: u32, req_height: u32) -> Result<DynamicImage> {
    let (width, height) = read_dimensions(path)?;
    let sample = layout::sample_size(width, height, req_width, req_height);
    debug!(
        "{}: {width}x{height}, sample size {sample} for {req_width}x{req_height}",
        path.display()
    );

    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;

    if sample > 1 {
        let (w, h) = layout::sampled_dimensions(width, height, sample);
        img = img.thumbnail_exact(w, h);
    }
    img.apply_orientation(orientation);

    debug!("{}: decoded to {}x{}", path.display(), img.width(), img.height());
    Ok(img)
}

pub fn load_for_pdf(path: &Path) -> Result<DynamicImage> {
    load_sampled(path, PDF_MAX_DIMENSION, PDF_MAX_DIMENSION)
}

pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let mut rgba = img.to_rgba8();
    rgba.par_chunks_exact_mut(4).for_each(|pixel| {
        let alpha = u32::from(pixel[3]);
        for channel in &mut pixel[..3] {
            *channel = ((u32::from(*channel) * alpha + 255 * (255 - alpha)) / 255) as u8;
        }
        pixel[3] = 255;
    });
    DynamicImage::ImageRgba8(rgba).to_rgb8()
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = flatten_onto_white(img);
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, clamp_quality(quality));
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Jpeg => encode_jpeg(img, quality),
        OutputFormat::Png => {
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            let options = oxipng::Options::from_preset(PNG_OPTIMIZATION_PRESET);
            Ok(oxipng::optimize_from_memory(&buf, &options)?)
        }
    }
}

fn staged_path(staging_dir: &Path, format: OutputFormat) -> PathBuf {
    let id = NEXT_STAGED_ID.fetch_add(1, Ordering::Relaxed);
    staging_dir.join(format!(
        "compressed_{}_{id}.{}",
        storage::now_millis(),
        format.extension()
    ))
}

pub fn compress_image(
    path: &Path,
    settings: &CompressionSettings,
    staging_dir: &Path,
) -> Result<CompressedImage> {
    let original_size = fs::metadata(path)?.len();
    debug!(
        "Compressing {} ({original_size} bytes) at quality {}, target {}",
        path.display(),
        settings.quality,
        settings.resize.display_name()
    );

    let target = settings.resize.dimensions();
    let (req_width, req_height) = target.unwrap_or((u32::MAX, u32::MAX));
    let mut img = load_sampled(path, req_width, req_height)?;

    if let Some((target_width, target_height)) = target {
        let (w, h) = layout::fit_within(img.width(), img.height(), target_width, target_height);
        if (w, h) != (img.width(), img.height()) {
            debug!("Fine-tuning size to {w}x{h}");
            img = img.resize_exact(w, h, FilterType::Triangle);
        }
    }

    let bytes = encode(&img, settings.format, settings.quality)?;

    storage::ensure_dir(staging_dir)?;
    let staged = staged_path(staging_dir, settings.format);
    fs::write(&staged, &bytes)?;

    let compressed_size = fs::metadata(&staged)?.len();
    if compressed_size == 0 {
        let _ = fs::remove_file(&staged);
        return Err(Error::EmptyOutput(staged));
    }

    let result = CompressedImage::new(
        path.to_path_buf(),
        staged,
        original_size,
        compressed_size,
        (img.width(), img.height()),
    );
    debug!(
        "Compressed {}: {original_size} -> {compressed_size} bytes, ratio {:.3}",
        path.display(),
        result.compression_ratio
    );
    Ok(result)
}

/// Compresses every image in parallel, keeping input order. Any failure
/// fails the whole batch and removes what was already staged.
pub fn compress_batch(
    paths: &[PathBuf],
    settings: &CompressionSettings,
    staging_dir: &Path,
) -> Result<Vec<CompressedImage>> {
    let results: Vec<Result<CompressedImage>> = paths
        .par_iter()
        .map(|path| compress_image(path, settings, staging_dir))
        .collect();

    let mut done = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(compressed) => done.push(compressed),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(e) => warn!("Additional compression failure: {e}"),
        }
    }

    if let Some(e) = first_error {
        discard_staged(&done);
        return Err(e);
    }
    Ok(done)
}

pub fn save_compressed(
    compressed: &CompressedImage,
    display_name: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    if !compressed.compressed_path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("compressed file {} not found", compressed.compressed_path.display()),
        )));
    }

    let stem = Path::new(display_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    let extension = compressed
        .compressed_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| OutputFormat::Jpeg.extension().to_string());

    storage::ensure_dir(output_dir)?;
    let target = storage::unique_path(output_dir, &format!("{stem}.{extension}"));

    if fs::rename(&compressed.compressed_path, &target).is_err() {
        // rename fails across filesystems
        fs::copy(&compressed.compressed_path, &target)?;
        fs::remove_file(&compressed.compressed_path)?;
    }

    debug!("Saved {} as {}", display_name, target.display());
    Ok(target)
}

pub fn discard_staged(results: &[CompressedImage]) {
    for result in results {
        if let Err(e) = fs::remove_file(&result.compressed_path) {
            warn!("Could not remove {}: {e}", result.compressed_path.display());
        }
    }
}
