use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_QUALITY: u8 = 80;
pub const MIN_QUALITY: u8 = 10;
pub const MAX_QUALITY: u8 = 100;
pub const DEFAULT_PDF_IMAGE_QUALITY: u8 = 90;

pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageItem {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedImage {
    pub original_path: PathBuf,
    pub compressed_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    pub width: u32,
    pub height: u32,
    pub compression_ratio: f32,
}

impl CompressedImage {
    pub fn new(
        original_path: PathBuf,
        compressed_path: PathBuf,
        original_size: u64,
        compressed_size: u64,
        (width, height): (u32, u32),
    ) -> Self {
        let compression_ratio = if original_size > 0 {
            compressed_size as f32 / original_size as f32
        } else {
            1.0
        };
        Self {
            original_path,
            compressed_path,
            original_size,
            compressed_size,
            width,
            height,
            compression_ratio,
        }
    }

    pub fn size_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }

    pub fn percentage_saved(&self) -> f32 {
        if self.original_size > 0 {
            self.size_saved() as f32 / self.original_size as f32 * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfDocument {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub page_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdfPage {
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    pub is_selected: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ResizeOption {
    #[default]
    Original,
    #[value(name = "1080p")]
    Hd1080,
    #[value(name = "720p")]
    Hd720,
    #[value(name = "480p")]
    Sd,
}

impl ResizeOption {
    pub const fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            ResizeOption::Original => None,
            ResizeOption::Hd1080 => Some((1920, 1080)),
            ResizeOption::Hd720 => Some((1280, 720)),
            ResizeOption::Sd => Some((720, 480)),
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            ResizeOption::Original => "Original",
            ResizeOption::Hd1080 => "1920x1080",
            ResizeOption::Hd720 => "1280x720",
            ResizeOption::Sd => "720x480",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    #[value(name = "fit")]
    FitToImage,
}

impl PageSize {
    /// Fixed page dimensions in points, `None` when pages follow the images.
    pub const fn dimensions(self) -> Option<(f32, f32)> {
        match self {
            PageSize::A4 => Some((595.0, 842.0)),
            PageSize::Letter => Some((612.0, 792.0)),
            PageSize::FitToImage => None,
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::Letter => "Letter",
            PageSize::FitToImage => "Fit to Image",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum MarginOption {
    #[default]
    None,
    Small,
}

impl MarginOption {
    pub const fn points(self) -> f32 {
        match self {
            MarginOption::None => 0.0,
            MarginOption::Small => 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub quality: u8,
    pub resize: ResizeOption,
    pub format: OutputFormat,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            resize: ResizeOption::default(),
            format: OutputFormat::default(),
        }
    }
}

impl CompressionSettings {
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = clamp_quality(quality);
        self
    }

    pub fn overridden(
        mut self,
        quality: Option<u8>,
        resize: Option<ResizeOption>,
        format: Option<OutputFormat>,
    ) -> Self {
        if let Some(q) = quality {
            self = self.with_quality(q);
        }
        if let Some(r) = resize {
            self.resize = r;
        }
        if let Some(f) = format {
            self.format = f;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    pub page_size: PageSize,
    pub margins: MarginOption,
    pub image_quality: u8,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            margins: MarginOption::default(),
            image_quality: DEFAULT_PDF_IMAGE_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compression: CompressionSettings,
    pub pdf: PdfSettings,
}

impl Settings {
    pub fn sanitized(mut self) -> Self {
        self.compression.quality = clamp_quality(self.compression.quality);
        self.pdf.image_quality = clamp_quality(self.pdf.image_quality);
        self
    }
}

pub fn format_file_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size == 0 {
        return "0 B".to_string();
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
