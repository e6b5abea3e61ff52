//! Data models and structures
//!
//! Defines the batch input format, the per-variant breakpoint settings, the
//! image service's upload response, and environment configuration.

use crate::settings::parse_loose_int;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_WIDTH: u32 = 1000;
pub const DEFAULT_MIN_WIDTH: u32 = 200;
pub const DEFAULT_BYTES_STEP: u32 = 25000;
pub const DEFAULT_MAX_IMAGES: u32 = 10;
pub const ORIGINAL_RATIO: &str = "original";

/// Batch file: `{ "photos": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoBatch {
    pub photos: Vec<PhotoRequest>,
}

#[derive(Deserialize)]
struct RawBatch {
    photos: Vec<Value>,
}

impl PhotoBatch {
    /// Read and parse a batch file. See [`PhotoBatch::parse`].
    pub fn from_file(path: &Path) -> Result<(Self, usize)> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse a batch document entry by entry. Entries that are not a valid
    /// photo request are logged and dropped; their count is returned with the
    /// batch. Only a document without a `photos` array is an error.
    pub fn parse(json: &str) -> Result<(Self, usize)> {
        let raw: RawBatch = serde_json::from_str(json)?;
        let mut photos = Vec::with_capacity(raw.photos.len());
        let mut rejected = 0;

        for (index, entry) in raw.photos.into_iter().enumerate() {
            match serde_json::from_value::<PhotoRequest>(entry) {
                Ok(photo) => photos.push(photo),
                Err(e) => {
                    tracing::error!("Skipping photo entry {}: {}", index, e);
                    rejected += 1;
                }
            }
        }

        Ok((Self { photos }, rejected))
    }
}

/// Numeric field read leniently: numbers are truncated, strings are read by
/// their leading integer, and anything negative or non-numeric is absent.
fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(parse_loose_int)
        .and_then(|v| u32::try_from(v).ok()))
}

/// One photo to upload, with its display intents.
///
/// Numeric fields treat `0` the same as absent and fall back to the defaults.
/// They also accept numeric strings such as `"800"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhotoRequest {
    pub location: PathBuf,
    pub public_id: String,
    pub alt: Option<String>,
    /// Public address used for computed (query-parameter resized) URLs.
    pub url: Option<String>,
    pub aspect_ratios: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub max_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub min_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub bytes_step: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub max_images: Option<u32>,
    pub retina: Option<bool>,
    /// Percentages of the viewport the image occupies, one per aspect ratio.
    /// Accepts numbers or strings such as `"50"`.
    pub view_port_ratios: Option<Vec<Value>>,
    /// `"min,max"` screen widths, one per aspect ratio.
    pub screen_sizes: Option<Vec<String>>,
    pub transformation: Option<Transformation>,
}

fn non_zero_or(value: Option<u32>, default: u32) -> u32 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

impl PhotoRequest {
    pub fn max_width(&self) -> u32 {
        non_zero_or(self.max_width, DEFAULT_MAX_WIDTH)
    }

    pub fn min_width(&self) -> u32 {
        non_zero_or(self.min_width, DEFAULT_MIN_WIDTH)
    }

    pub fn bytes_step(&self) -> u32 {
        non_zero_or(self.bytes_step, DEFAULT_BYTES_STEP)
    }

    pub fn max_images(&self) -> u32 {
        non_zero_or(self.max_images, DEFAULT_MAX_IMAGES)
    }

    /// Declared aspect ratios, or `["original"]` when none are given.
    pub fn aspect_ratios(&self) -> Vec<&str> {
        match &self.aspect_ratios {
            Some(ratios) if !ratios.is_empty() => ratios.iter().map(String::as_str).collect(),
            _ => vec![ORIGINAL_RATIO],
        }
    }

    pub fn alt_text(&self) -> &str {
        self.alt.as_deref().unwrap_or("")
    }
}

/// Image-service transformation. Unknown keys are kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Short parameter names understood by the service's transformation strings.
const TRANSFORMATION_PARAMS: &[(&str, &str)] = &[
    ("angle", "a"),
    ("aspect_ratio", "ar"),
    ("background", "b"),
    ("crop", "c"),
    ("dpr", "dpr"),
    ("effect", "e"),
    ("fetch_format", "f"),
    ("gravity", "g"),
    ("height", "h"),
    ("opacity", "o"),
    ("quality", "q"),
    ("radius", "r"),
    ("width", "w"),
    ("x", "x"),
    ("y", "y"),
    ("zoom", "z"),
];

impl Transformation {
    /// Fill-crop to the given `W:H` ratio.
    pub fn fill(aspect_ratio: &str) -> Self {
        Self {
            crop: Some("fill".to_string()),
            aspect_ratio: Some(aspect_ratio.to_string()),
            extra: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.crop.is_none() && self.aspect_ratio.is_none() && self.extra.is_empty()
    }

    /// Comma-separated transformation string, e.g. `ar_4:3,c_fill`.
    pub fn to_param(&self) -> String {
        let mut entries: Vec<(&str, Value)> = Vec::new();
        if let Some(crop) = &self.crop {
            entries.push(("crop", Value::String(crop.clone())));
        }
        if let Some(aspect_ratio) = &self.aspect_ratio {
            entries.push(("aspect_ratio", Value::String(aspect_ratio.clone())));
        }
        entries.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.clone())));

        let mut parts: Vec<String> = Vec::new();
        for (key, value) in entries {
            let Some((_, short)) = TRANSFORMATION_PARAMS.iter().find(|(name, _)| *name == key)
            else {
                tracing::warn!("Skipping unsupported transformation parameter '{}'", key);
                continue;
            };
            let value = match value {
                Value::String(s) => s,
                Value::Null => continue,
                other => other.to_string(),
            };
            parts.push(format!("{}_{}", short, value));
        }

        parts.sort();
        parts.join(",")
    }
}

/// Upload parameters and rendering hints for one aspect-ratio variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedSetting {
    pub create_derived: bool,
    pub bytes_step: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub screen_min_width: i64,
    pub screen_max_width: i64,
    pub max_images: u32,
    pub transformation: Transformation,
    pub view_port_ratio: u32,
}

/// Image-service response for a single upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub responsive_breakpoints: Vec<DerivativeGroup>,
}

/// Generated derivatives for one breakpoint setting, aligned by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeGroup {
    #[serde(default)]
    pub transformation: Option<String>,
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakpoint {
    pub width: u32,
    #[serde(default)]
    pub height: Option<u32>,
    pub secure_url: String,
}

// Configuration
pub const DEFAULT_API_URL: &str = "https://api.cloudinary.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_url: String,
    pub dry_run: bool,
}

impl Config {
    /// Load `.env` if present, then read configuration from the environment.
    ///
    /// `dry_run` forces dry-run mode on top of the `DRY_RUN` variable.
    pub fn from_env(dry_run: bool) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok(), dry_run)
    }

    pub fn from_lookup<F>(lookup: F, dry_run: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dry_run = dry_run
            || lookup("DRY_RUN")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false);

        let credential = |key: &str| -> Result<String> {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(value) => Ok(value),
                None if dry_run => Ok(String::new()),
                None => Err(Error::Configuration(format!("{} not set", key))),
            }
        };

        Ok(Self {
            cloud_name: credential("CLOUD_NAME")?,
            api_key: credential("API_KEY")?,
            api_secret: credential("CLOUDINARY_SECRET")?,
            api_url: lookup("CLOUDINARY_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_photo_request_defaults() {
        let photo: PhotoRequest =
            serde_json::from_str(r#"{"location": "a.jpg", "public_id": "a", "max_width": 0}"#)
                .unwrap();

        assert_eq!(photo.max_width(), 1000);
        assert_eq!(photo.min_width(), 200);
        assert_eq!(photo.bytes_step(), 25000);
        assert_eq!(photo.max_images(), 10);
        assert_eq!(photo.aspect_ratios(), vec!["original"]);
        assert_eq!(photo.alt_text(), "");
    }

    #[test]
    fn test_batch_accepts_mixed_viewport_ratio_types() {
        let json = r#"{"photos": [{
            "location": "a.jpg",
            "public_id": "a",
            "aspect_ratios": ["16:9", "1:1"],
            "view_port_ratios": [50, "33"],
            "screen_sizes": ["768,", ",767"]
        }]}"#;

        let batch: PhotoBatch = serde_json::from_str(json).unwrap();
        let photo = &batch.photos[0];
        assert_eq!(photo.aspect_ratios(), vec!["16:9", "1:1"]);
        assert_eq!(photo.view_port_ratios.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_loosely_typed_numbers() {
        let photo: PhotoRequest = serde_json::from_str(
            r#"{
                "location": "a.jpg",
                "public_id": "a",
                "max_width": "800",
                "min_width": 250.7,
                "max_images": -3,
                "bytes_step": true
            }"#,
        )
        .unwrap();

        assert_eq!(photo.max_width, Some(800));
        assert_eq!(photo.min_width, Some(250));
        assert_eq!(photo.max_images(), 10);
        assert_eq!(photo.bytes_step(), 25000);
    }

    #[test]
    fn test_batch_drops_malformed_entries_only() {
        let json = r#"{"photos": [
            {"location": "a.jpg", "public_id": "good"},
            {"location": "b.jpg", "public_id": "bad", "aspect_ratios": "16:9"},
            {"public_id": "no-location"},
            {"location": "c.jpg", "public_id": "loose", "max_width": "800"}
        ]}"#;

        let (batch, rejected) = PhotoBatch::parse(json).unwrap();
        assert_eq!(rejected, 2);
        let ids: Vec<&str> = batch.photos.iter().map(|p| p.public_id.as_str()).collect();
        assert_eq!(ids, vec!["good", "loose"]);
        assert_eq!(batch.photos[1].max_width(), 800);
    }

    #[test]
    fn test_batch_without_photos_array_errors() {
        assert!(matches!(
            PhotoBatch::parse(r#"{"pictures": []}"#),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_transformation_keeps_unknown_keys() {
        let t: Transformation =
            serde_json::from_str(r#"{"crop": "thumb", "gravity": "face", "width": 300}"#).unwrap();

        assert_eq!(t.crop.as_deref(), Some("thumb"));
        assert_eq!(t.extra.get("gravity"), Some(&Value::String("face".into())));
        assert_eq!(t.to_param(), "c_thumb,g_face,w_300");
    }

    #[test]
    fn test_transformation_param_for_fill() {
        assert_eq!(Transformation::fill("4:3").to_param(), "ar_4:3,c_fill");
        assert_eq!(Transformation::default().to_param(), "");
        assert!(Transformation::default().is_empty());
    }

    #[test]
    fn test_empty_transformation_serializes_to_empty_object() {
        let json = serde_json::to_string(&Transformation::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_upload_result_ignores_extra_fields() {
        let json = r#"{
            "public_id": "cat",
            "secure_url": "https://res.example.com/cat.jpg",
            "bytes": 12345,
            "responsive_breakpoints": [{
                "transformation": "ar_4:3,c_fill",
                "breakpoints": [
                    {"width": 800, "height": 600, "bytes": 100, "url": "http://x", "secure_url": "https://x/800"},
                    {"width": 400, "height": 300, "bytes": 50, "url": "http://y", "secure_url": "https://x/400"}
                ]
            }]
        }"#;

        let result: UploadResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.responsive_breakpoints.len(), 1);
        assert_eq!(result.responsive_breakpoints[0].breakpoints[1].width, 400);
    }

    #[test]
    fn test_config_requires_credentials() {
        let err = Config::from_lookup(lookup_from(&[("CLOUD_NAME", "demo")]), false).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn test_config_rejects_blank_credentials() {
        let err = Config::from_lookup(
            lookup_from(&[("CLOUD_NAME", "demo"), ("API_KEY", " "), ("CLOUDINARY_SECRET", "s")]),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn test_config_reads_all_values() {
        let config = Config::from_lookup(
            lookup_from(&[
                ("CLOUD_NAME", "demo"),
                ("API_KEY", "key"),
                ("CLOUDINARY_SECRET", "secret"),
            ]),
            false,
        )
        .unwrap();

        assert_eq!(config.cloud_name, "demo");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.api_secret, "secret");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_config_dry_run_skips_credentials() {
        let config = Config::from_lookup(lookup_from(&[("DRY_RUN", "true")]), false).unwrap();
        assert!(config.dry_run);
        assert!(config.api_key.is_empty());

        let forced = Config::from_lookup(lookup_from(&[]), true).unwrap();
        assert!(forced.dry_run);
    }
}
