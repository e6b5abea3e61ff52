//! Batch orchestration: derive settings, upload, render, append.

use crate::markup::{render_markup, RenderOptions};
use crate::models::{Config, DerivedSetting, PhotoBatch, PhotoRequest, UploadResult};
use crate::output::OutputFile;
use crate::settings::derive_all;
use crate::upload::{CloudinaryClient, MockUploadClient, UploadService};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Uploads a batch of photos and appends their markup to one output file.
pub struct App {
    uploader: Box<dyn UploadService>,
    output_path: PathBuf,
    render: RenderOptions,
    concurrency: usize,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub uploader: Box<dyn UploadService>,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub output_path: PathBuf,
    pub render: RenderOptions,
    /// Maximum uploads in flight at once.
    pub concurrency: usize,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output.html"),
            render: RenderOptions::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Per-run outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
}

type Uploaded = (Vec<DerivedSetting>, UploadResult);

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, options: AppOptions) -> Self {
        Self {
            uploader: services.uploader,
            output_path: options.output_path,
            render: options.render,
            concurrency: options.concurrency.max(1),
        }
    }

    /// Construct an app from environment configuration.
    pub fn new(config: &Config, options: AppOptions) -> Self {
        let uploader: Box<dyn UploadService> = if config.dry_run {
            info!("DRY_RUN enabled, uploads will be simulated");
            Box::new(MockUploadClient::new())
        } else {
            Box::new(
                CloudinaryClient::new(
                    config.cloud_name.clone(),
                    config.api_key.clone(),
                    config.api_secret.clone(),
                )
                .with_base_url(config.api_url.clone()),
            )
        };

        Self::with_services(AppServices { uploader }, options)
    }

    /// Load the batch file at `input` and process every photo in it.
    ///
    /// Entries that cannot be read as a photo request count as failed.
    pub async fn run(&self, input: &Path) -> Result<BatchReport> {
        let (batch, rejected) = PhotoBatch::from_file(input)?;
        info!(
            "Loaded {} photos from {} ({} rejected)",
            batch.photos.len(),
            input.display(),
            rejected
        );

        let mut report = self.run_batch(&batch).await?;
        report.failed += rejected;
        Ok(report)
    }

    /// Upload concurrently, then render and append in input order.
    pub async fn run_batch(&self, batch: &PhotoBatch) -> Result<BatchReport> {
        let mut output = OutputFile::new(&self.output_path);
        let mut report = BatchReport::default();

        let mut uploads = stream::iter(&batch.photos)
            .map(|photo| async move { (photo, self.upload_photo(photo).await) })
            .buffered(self.concurrency);

        while let Some((photo, outcome)) = uploads.next().await {
            let (settings, result) = match outcome {
                Ok(uploaded) => uploaded,
                Err(Error::InputFileMissing(path)) => {
                    error!(
                        "[{}] Source file {} does not exist, skipping",
                        photo.public_id,
                        path.display()
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!("[{}] Upload failed: {}", photo.public_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let markup = match render_markup(photo, &settings, &result, &self.render) {
                Ok(markup) => markup,
                Err(e) => {
                    error!("[{}] Failed to render markup: {}", photo.public_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match output.append(&markup).await {
                Ok(()) => {
                    info!(
                        "[{}] Markup appended to {}",
                        photo.public_id,
                        output.path().display()
                    );
                    report.rendered += 1;
                }
                Err(e) => {
                    error!("[{}] {}", photo.public_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Batch complete: {} rendered, {} skipped, {} failed",
            report.rendered, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn upload_photo(&self, photo: &PhotoRequest) -> Result<Uploaded> {
        if !tokio::fs::try_exists(&photo.location).await? {
            return Err(Error::InputFileMissing(photo.location.clone()));
        }

        let settings = derive_all(photo)?;
        info!(
            "[{}] Uploading {} with {} breakpoint settings",
            photo.public_id,
            photo.location.display(),
            settings.len()
        );

        let result = self
            .uploader
            .upload(&photo.location, &photo.public_id, &settings)
            .await?;

        if result.public_id != photo.public_id {
            warn!(
                "[{}] Service echoed a different public id: {}",
                photo.public_id, result.public_id
            );
        }
        Ok((settings, result))
    }
}
