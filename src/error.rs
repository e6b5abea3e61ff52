//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input file not found: {}", .0.display())]
    InputFileMissing(PathBuf),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Invalid aspect ratio '{0}', expected W:H")]
    InvalidAspectRatio(String),

    #[error("Failed to append to {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;
