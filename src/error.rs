use std::error::Error as _;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("PNG optimization failed: {0}")]
    Png(#[from] oxipng::PngError),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("invalid image dimensions for {}", .0.display())]
    InvalidDimensions(PathBuf),

    #[error("no valid images to create PDF")]
    NoImages,

    #[error("no PDF documents to merge")]
    NoDocuments,

    #[error("No pages selected")]
    NoPagesSelected,

    #[error("nothing selected")]
    EmptySelection,

    #[error("page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("invalid page range '{0}'")]
    InvalidRange(String),

    #[error("index {index} is out of bounds for a list of {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("{} is encrypted", .0.display())]
    Encrypted(PathBuf),

    #[error("{} was written empty", .0.display())]
    EmptyOutput(PathBuf),

    #[error("a job is already running")]
    Busy,

    #[error("no job is running")]
    NotWorking,

    #[error("background engine has shut down")]
    EngineClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The message plus any causes it does not already spell out, one per line.
    pub fn report(&self) -> String {
        let mut report = format!("Error: {self}");
        let mut source = self.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !report.contains(&text) {
                report.push_str("\n  caused by: ");
                report.push_str(&text);
            }
            source = cause.source();
        }
        report
    }
}
