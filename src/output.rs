//! Append-only markup output
//!
//! The file is opened in append mode for every write, so markup accumulates
//! across runs. Callers hold the single `OutputFile` and write one block per
//! photo.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub struct OutputFile {
    path: PathBuf,
}

impl OutputFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, markup: &str) -> Result<()> {
        let write = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(markup.as_bytes()).await?;
            file.flush().await
        };

        write.await.map_err(|source| Error::OutputWrite {
            path: self.path.clone(),
            source,
        })
    }
}
