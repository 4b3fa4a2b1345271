use crate::error::{Error, Result};
use crate::models::{
    CompressedImage, CompressionSettings, ImageItem, PdfDocument, PdfPage, PdfSettings,
};
use crate::page_ranges::{self, PageRange};
use crate::selection::{self, Selection};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Stage<T> {
    Initial,
    Ready,
    Working,
    Done(T),
    Failed(String),
}

// A derive would require `T: Default`.
impl<T> Default for Stage<T> {
    fn default() -> Self {
        Stage::Initial
    }
}

impl<T> Stage<T> {
    pub const fn is_working(&self) -> bool {
        matches!(self, Stage::Working)
    }

    pub const fn output(&self) -> Option<&T> {
        match self {
            Stage::Done(value) => Some(value),
            _ => None,
        }
    }

    fn begin(&mut self) -> Result<()> {
        if self.is_working() {
            return Err(Error::Busy);
        }
        *self = Stage::Working;
        Ok(())
    }

    /// Records the outcome. A failed job's error is handed back to the caller.
    fn finish(&mut self, result: Result<T>) -> Result<()> {
        if !self.is_working() {
            return Err(Error::NotWorking);
        }
        match result {
            Ok(value) => {
                *self = Stage::Done(value);
                Ok(())
            }
            Err(e) => {
                *self = Stage::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn settle(&mut self, has_input: bool) {
        if self.is_working() {
            return;
        }
        *self = if has_input { Stage::Ready } else { Stage::Initial };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressJob {
    pub paths: Vec<PathBuf>,
    pub settings: CompressionSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageToPdfJob {
    pub paths: Vec<PathBuf>,
    pub settings: PdfSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeJob {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitJob {
    pub path: PathBuf,
    pub ranges: Vec<PageRange>,
    pub prefix: String,
}

fn paths_of<'a>(items: impl IntoIterator<Item = &'a ImageItem>) -> Vec<PathBuf> {
    items.into_iter().map(|i| i.path.clone()).collect()
}

#[derive(Debug, Default)]
pub struct CompressSession {
    images: Selection<ImageItem>,
    defaults: CompressionSettings,
    settings: CompressionSettings,
    stage: Stage<Vec<CompressedImage>>,
    saved: Vec<PathBuf>,
}

impl CompressSession {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            defaults: settings,
            settings,
            ..Self::default()
        }
    }

    pub const fn stage(&self) -> &Stage<Vec<CompressedImage>> {
        &self.stage
    }

    pub const fn images(&self) -> &Selection<ImageItem> {
        &self.images
    }

    pub const fn settings(&self) -> CompressionSettings {
        self.settings
    }

    pub fn select(&mut self, images: Vec<ImageItem>) {
        debug!("Selected {} images", images.len());
        self.images.replace(images);
        self.saved.clear();
        self.stage.settle(!self.images.is_empty());
    }

    pub fn remove(&mut self, index: usize) -> Result<ImageItem> {
        let removed = self.images.remove(index)?;
        self.stage.settle(!self.images.is_empty());
        Ok(removed)
    }

    pub fn update_settings(&mut self, settings: CompressionSettings) {
        self.settings = settings.with_quality(settings.quality);
    }

    pub fn start(&mut self) -> Result<CompressJob> {
        if self.images.is_empty() {
            return Err(Error::EmptySelection);
        }
        self.stage.begin()?;
        Ok(CompressJob {
            paths: paths_of(&self.images),
            settings: self.settings,
        })
    }

    pub fn finish(&mut self, result: Result<Vec<CompressedImage>>) -> Result<()> {
        self.stage.finish(result)
    }

    pub fn results(&self) -> &[CompressedImage] {
        self.stage.output().map_or(&[], Vec::as_slice)
    }

    pub fn save_requests(&self) -> Vec<(CompressedImage, String)> {
        self.results()
            .iter()
            .enumerate()
            .map(|(index, result)| {
                let name = self
                    .images
                    .as_slice()
                    .get(index)
                    .map_or_else(|| format!("image_{index}.jpg"), |i| i.name.clone());
                (result.clone(), name)
            })
            .collect()
    }

    pub fn record_saved(&mut self, paths: Vec<PathBuf>) {
        self.saved = paths;
    }

    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.defaults);
    }
}

#[derive(Debug, Default)]
pub struct ImageToPdfSession {
    images: Selection<ImageItem>,
    defaults: PdfSettings,
    settings: PdfSettings,
    stage: Stage<PdfDocument>,
}

impl ImageToPdfSession {
    pub fn new(settings: PdfSettings) -> Self {
        Self {
            defaults: settings,
            settings,
            ..Self::default()
        }
    }

    pub const fn stage(&self) -> &Stage<PdfDocument> {
        &self.stage
    }

    pub const fn images(&self) -> &Selection<ImageItem> {
        &self.images
    }

    pub fn select(&mut self, images: Vec<ImageItem>) {
        self.images.replace(images);
        self.stage.settle(!self.images.is_empty());
    }

    pub fn add_more(&mut self, images: Vec<ImageItem>) {
        self.images.extend(images);
        self.stage.settle(!self.images.is_empty());
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.images.reorder(from, to)?;
        self.stage.settle(true);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ImageItem> {
        let removed = self.images.remove(index)?;
        self.stage.settle(!self.images.is_empty());
        Ok(removed)
    }

    pub fn update_settings(&mut self, settings: PdfSettings) {
        self.settings = settings;
    }

    pub fn start(&mut self) -> Result<ImageToPdfJob> {
        if self.images.is_empty() {
            return Err(Error::EmptySelection);
        }
        self.stage.begin()?;
        Ok(ImageToPdfJob {
            paths: paths_of(&self.images),
            settings: self.settings,
        })
    }

    pub fn finish(&mut self, result: Result<PdfDocument>) -> Result<()> {
        self.stage.finish(result)
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.defaults);
    }
}

#[derive(Debug, Default)]
pub struct MergeSession {
    documents: Selection<PdfDocument>,
    stage: Stage<PdfDocument>,
}

impl MergeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn stage(&self) -> &Stage<PdfDocument> {
        &self.stage
    }

    pub const fn documents(&self) -> &Selection<PdfDocument> {
        &self.documents
    }

    pub fn select(&mut self, documents: Vec<PdfDocument>) {
        self.documents.replace(documents);
        self.stage.settle(!self.documents.is_empty());
    }

    pub fn add_more(&mut self, documents: Vec<PdfDocument>) {
        self.documents.extend(documents);
        self.stage.settle(!self.documents.is_empty());
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.documents.reorder(from, to)?;
        self.stage.settle(true);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<PdfDocument> {
        let removed = self.documents.remove(index)?;
        self.stage.settle(!self.documents.is_empty());
        Ok(removed)
    }

    pub fn start(&mut self) -> Result<MergeJob> {
        if self.documents.is_empty() {
            return Err(Error::EmptySelection);
        }
        self.stage.begin()?;
        Ok(MergeJob {
            paths: self.documents.iter().map(|d| d.path.clone()).collect(),
        })
    }

    pub fn finish(&mut self, result: Result<PdfDocument>) -> Result<()> {
        self.stage.finish(result)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
pub struct SplitSession {
    document: Option<PdfDocument>,
    pages: Vec<PdfPage>,
    stage: Stage<Vec<PathBuf>>,
}

impl SplitSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn stage(&self) -> &Stage<Vec<PathBuf>> {
        &self.stage
    }

    pub const fn document(&self) -> Option<&PdfDocument> {
        self.document.as_ref()
    }

    pub fn pages(&self) -> &[PdfPage] {
        &self.pages
    }

    pub fn load(&mut self, document: PdfDocument, pages: Vec<PdfPage>) {
        debug!("Loaded {} with {} pages", document.name, pages.len());
        self.document = Some(document);
        self.pages = pages;
        self.stage.settle(true);
    }

    pub fn toggle_page(&mut self, page_number: u32) -> bool {
        selection::toggle_page(&mut self.pages, page_number)
    }

    pub fn selected_pages(&self) -> Vec<u32> {
        selection::selected_pages(&self.pages)
    }

    pub fn start(&mut self, prefix: &str) -> Result<SplitJob> {
        let ranges = page_ranges::each_page(self.selected_pages());
        self.start_ranges(ranges, prefix)
    }

    pub fn start_ranges(&mut self, ranges: Vec<PageRange>, prefix: &str) -> Result<SplitJob> {
        let path = self
            .document
            .as_ref()
            .map(|d| d.path.clone())
            .ok_or(Error::EmptySelection)?;
        if self.stage.is_working() {
            return Err(Error::Busy);
        }
        if ranges.is_empty() {
            self.stage = Stage::Failed(Error::NoPagesSelected.to_string());
            return Err(Error::NoPagesSelected);
        }

        self.stage.begin()?;
        Ok(SplitJob {
            path,
            ranges,
            prefix: prefix.to_string(),
        })
    }

    pub fn finish(&mut self, result: Result<Vec<PathBuf>>) -> Result<()> {
        self.stage.finish(result)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResizeOption;

    fn image(name: &str) -> ImageItem {
        ImageItem {
            path: PathBuf::from(name),
            name: name.to_string(),
            size: 100,
            mime_type: Some("image/png".into()),
            width: 10,
            height: 10,
        }
    }

    fn pdf(name: &str, page_count: u32) -> PdfDocument {
        PdfDocument {
            path: PathBuf::from(name),
            name: name.to_string(),
            size: 1000,
            page_count,
        }
    }

    #[test]
    fn stages_start_initial_for_any_output() {
        assert_eq!(Stage::<PdfDocument>::default(), Stage::Initial);
        assert_eq!(Stage::<Vec<PathBuf>>::default(), Stage::Initial);
    }

    fn pages(count: u32) -> Vec<PdfPage> {
        (1..=count)
            .map(|page_number| PdfPage {
                page_number,
                width: 595.0,
                height: 842.0,
                is_selected: false,
            })
            .collect()
    }

    #[test]
    fn compress_flow() {
        let mut session = CompressSession::new(CompressionSettings::default());
        assert!(matches!(session.start(), Err(Error::EmptySelection)));
        assert_eq!(session.stage(), &Stage::Initial);

        session.select(vec![image("a.png"), image("b.png")]);
        assert_eq!(session.stage(), &Stage::Ready);

        session.update_settings(CompressionSettings {
            quality: 5,
            resize: ResizeOption::Hd720,
            ..CompressionSettings::default()
        });
        let job = session.start().unwrap();
        assert_eq!(job.paths, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
        assert_eq!(job.settings.quality, 10);
        assert!(matches!(session.start(), Err(Error::Busy)));

        let result = CompressedImage::new("a.png".into(), "x.jpg".into(), 100, 40, (10, 10));
        session.finish(Ok(vec![result])).unwrap();
        assert_eq!(session.results().len(), 1);

        let requests = session.save_requests();
        assert_eq!(requests[0].1, "a.png");
        assert!(matches!(session.finish(Ok(vec![])), Err(Error::NotWorking)));

        session.reset();
        assert_eq!(session.stage(), &Stage::Initial);
        assert_eq!(session.settings(), CompressionSettings::default());
    }

    #[test]
    fn removing_last_image_returns_to_initial() {
        let mut session = CompressSession::default();
        session.select(vec![image("a.png")]);
        session.remove(0).unwrap();
        assert_eq!(session.stage(), &Stage::Initial);
    }

    #[test]
    fn failures_carry_the_message() {
        let mut session = MergeSession::new();
        session.select(vec![pdf("a.pdf", 1)]);
        session.start().unwrap();
        assert!(matches!(
            session.finish(Err(Error::NoDocuments)),
            Err(Error::NoDocuments)
        ));
        assert_eq!(
            session.stage(),
            &Stage::Failed("no PDF documents to merge".to_string())
        );
    }

    #[test]
    fn merge_order_follows_reordering() {
        let mut session = MergeSession::new();
        session.select(vec![pdf("a.pdf", 1), pdf("b.pdf", 2)]);
        session.add_more(vec![pdf("c.pdf", 3)]);
        session.reorder(2, 0).unwrap();
        let job = session.start().unwrap();
        assert_eq!(
            job.paths,
            vec![
                PathBuf::from("c.pdf"),
                PathBuf::from("a.pdf"),
                PathBuf::from("b.pdf")
            ]
        );
    }

    #[test]
    fn image_to_pdf_keeps_settings() {
        let settings = PdfSettings {
            image_quality: 70,
            ..PdfSettings::default()
        };
        let mut session = ImageToPdfSession::new(settings);
        session.select(vec![image("a.png")]);
        session.add_more(vec![image("b.png")]);
        session.reorder(1, 0).unwrap();
        let job = session.start().unwrap();
        assert_eq!(job.paths[0], PathBuf::from("b.png"));
        assert_eq!(job.settings.image_quality, 70);

        session.finish(Ok(pdf("out.pdf", 2))).unwrap();
        assert_eq!(session.stage().output().map(|d| d.page_count), Some(2));
    }

    #[test]
    fn split_without_selection_fails() {
        let mut session = SplitSession::new();
        session.load(pdf("doc.pdf", 3), pages(3));
        assert!(matches!(session.start("split"), Err(Error::NoPagesSelected)));
        assert_eq!(session.stage(), &Stage::Failed("No pages selected".to_string()));
    }

    #[test]
    fn split_makes_one_range_per_selected_page() {
        let mut session = SplitSession::new();
        session.load(pdf("doc.pdf", 4), pages(4));
        session.toggle_page(4);
        session.toggle_page(2);
        let job = session.start("split").unwrap();
        assert_eq!(job.ranges, vec![PageRange::single(2), PageRange::single(4)]);
        assert_eq!(job.prefix, "split");

        session.finish(Ok(vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")])).unwrap();
        assert_eq!(session.stage().output().map(Vec::len), Some(2));

        session.reset();
        assert!(session.document().is_none());
        assert!(matches!(
            session.start_ranges(vec![PageRange::single(1)], "split"),
            Err(Error::EmptySelection)
        ));
        assert!(session.pages().is_empty());
    }
}
