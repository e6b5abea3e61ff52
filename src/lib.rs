//! Responsive picture uploader
//!
//! Uploads local photos to a hosted image service, asks it to generate
//! responsive breakpoint derivatives, and emits `<picture>` markup with
//! `srcset`/`sizes`/`media` attributes and WebP alternates for each photo.

pub mod app;
pub mod error;
pub mod markup;
pub mod models;
pub mod output;
pub mod settings;
pub mod upload;

pub use error::{Error, Result};
