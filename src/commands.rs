use crate::error::Result;
use crate::models::{CompressedImage, ImageItem, PdfDocument, PdfPage};
use crate::session::{CompressJob, ImageToPdfJob, MergeJob, SplitJob};
use std::path::PathBuf;
use tokio::sync::mpsc;

pub type Reply<T> = mpsc::Sender<Result<T>>;

#[derive(Debug)]
pub enum JobCommand {
    InspectImages(Vec<PathBuf>, Reply<Vec<ImageItem>>),
    ReadableImages(Vec<PathBuf>, Reply<Vec<ImageItem>>),
    InspectPdfs(Vec<PathBuf>, Reply<Vec<PdfDocument>>),
    PdfPages(PathBuf, Reply<Vec<PdfPage>>),
    Compress(CompressJob, PathBuf, Reply<Vec<CompressedImage>>),
    SaveCompressed(Vec<(CompressedImage, String)>, PathBuf, Reply<Vec<PathBuf>>),
    ImagesToPdf(ImageToPdfJob, PathBuf, Reply<PdfDocument>),
    Merge(MergeJob, PathBuf, Reply<PdfDocument>),
    Split(SplitJob, PathBuf, Reply<Vec<PathBuf>>),
}
