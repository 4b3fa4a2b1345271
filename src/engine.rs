use crate::commands::{JobCommand, Reply};
use crate::error::{Error, Result};
use crate::image_engine;
use crate::models::{CompressedImage, ImageItem, PdfDocument, PdfPage};
use crate::pdf_engine;
use crate::session::{CompressJob, ImageToPdfJob, MergeJob, SplitJob};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const COMMAND_QUEUE: usize = 32;
const WORKER_THREADS: usize = 4;

#[derive(Debug, Clone)]
pub struct Engine {
    cmd_tx: mpsc::Sender<JobCommand>,
}

pub fn spawn_engine_thread() -> Result<Engine> {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .thread_name("quickcompress-worker")
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("quickcompress-engine".into())
        .spawn(move || {
            rt.block_on(run(cmd_rx));
            debug!("Engine stopped");
        })?;

    Ok(Engine { cmd_tx })
}

async fn run(mut cmd_rx: mpsc::Receiver<JobCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        dispatch(cmd);
    }
}

fn dispatch(cmd: JobCommand) {
    match cmd {
        JobCommand::InspectImages(paths, reply) => respond(reply, move || {
            paths.iter().map(|p| image_engine::image_details(p)).collect()
        }),
        JobCommand::ReadableImages(paths, reply) => respond(reply, move || {
            Ok(image_engine::readable_images(&paths))
        }),
        JobCommand::InspectPdfs(paths, reply) => respond(reply, move || {
            paths.iter().map(|p| pdf_engine::pdf_details(p)).collect()
        }),
        JobCommand::PdfPages(path, reply) => respond(reply, move || pdf_engine::pdf_pages(&path)),
        JobCommand::Compress(job, staging_dir, reply) => respond(reply, move || {
            debug!("Compressing {} images with {:?}", job.paths.len(), job.settings);
            image_engine::compress_batch(&job.paths, &job.settings, &staging_dir)
        }),
        JobCommand::SaveCompressed(items, output_dir, reply) => respond(reply, move || {
            items
                .iter()
                .map(|(compressed, name)| image_engine::save_compressed(compressed, name, &output_dir))
                .collect()
        }),
        JobCommand::ImagesToPdf(job, output, reply) => respond(reply, move || {
            pdf_engine::create_pdf_from_images(&job.paths, &job.settings, &output)
        }),
        JobCommand::Merge(job, output, reply) => respond(reply, move || {
            pdf_engine::merge_pdfs(&job.paths, &output)
        }),
        JobCommand::Split(job, output_dir, reply) => respond(reply, move || {
            pdf_engine::split_pdf(&job.path, &job.ranges, &output_dir, &job.prefix)
        }),
    }
}

fn respond<T, F>(reply: Reply<T>, job: F)
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        if reply.blocking_send(job()).is_err() {
            warn!("Job finished but nobody is waiting for the result");
        }
    });
}

impl Engine {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> JobCommand) -> Result<T> {
        let (resp_tx, mut resp_rx) = mpsc::channel(1);
        self.cmd_tx
            .send(command(resp_tx))
            .await
            .map_err(|_| Error::EngineClosed)?;
        resp_rx.recv().await.ok_or(Error::EngineClosed)?
    }

    pub async fn inspect_images(&self, paths: Vec<PathBuf>) -> Result<Vec<ImageItem>> {
        self.request(|reply| JobCommand::InspectImages(paths, reply)).await
    }

    pub async fn readable_images(&self, paths: Vec<PathBuf>) -> Result<Vec<ImageItem>> {
        self.request(|reply| JobCommand::ReadableImages(paths, reply)).await
    }

    pub async fn inspect_pdfs(&self, paths: Vec<PathBuf>) -> Result<Vec<PdfDocument>> {
        self.request(|reply| JobCommand::InspectPdfs(paths, reply)).await
    }

    pub async fn pdf_pages(&self, path: PathBuf) -> Result<Vec<PdfPage>> {
        self.request(|reply| JobCommand::PdfPages(path, reply)).await
    }

    pub async fn compress(&self, job: CompressJob, staging_dir: PathBuf) -> Result<Vec<CompressedImage>> {
        self.request(|reply| JobCommand::Compress(job, staging_dir, reply)).await
    }

    pub async fn save_compressed(
        &self,
        items: Vec<(CompressedImage, String)>,
        output_dir: PathBuf,
    ) -> Result<Vec<PathBuf>> {
        self.request(|reply| JobCommand::SaveCompressed(items, output_dir, reply))
            .await
    }

    pub async fn images_to_pdf(&self, job: ImageToPdfJob, output: PathBuf) -> Result<PdfDocument> {
        self.request(|reply| JobCommand::ImagesToPdf(job, output, reply)).await
    }

    pub async fn merge(&self, job: MergeJob, output: PathBuf) -> Result<PdfDocument> {
        self.request(|reply| JobCommand::Merge(job, output, reply)).await
    }

    pub async fn split(&self, job: SplitJob, output_dir: PathBuf) -> Result<Vec<PathBuf>> {
        self.request(|reply| JobCommand::Split(job, output_dir, reply)).await
    }
}
