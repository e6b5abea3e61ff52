use super::{breakpoints_param, mime, UploadService};
use crate::models::{DerivedSetting, UploadResult, DEFAULT_API_URL};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Signed uploads against the Cloudinary REST API.
///
/// Requests are signed with SHA-256 and say so via `signature_algorithm`. The
/// account's API key must accept SHA-256 signatures; keys still pinned to the
/// SHA-1 default reject these uploads with an invalid-signature error.
pub struct CloudinaryClient {
    client: Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    base_url: String,
}

/// Request signature: parameters sorted by name, joined as `k=v&k=v`, secret
/// appended, SHA-256 hex digest. `signature_algorithm` itself is not signed.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl CloudinaryClient {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Self {
        Self::new_with_client(cloud_name, api_key, api_secret, Client::new())
    }

    pub fn new_with_client(
        cloud_name: String,
        api_key: String,
        api_secret: String,
        client: Client,
    ) -> Self {
        Self {
            client,
            cloud_name,
            api_key,
            api_secret,
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/image/upload", self.base_url, self.cloud_name)
    }

    async fn read_data_uri(path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::InputFileMissing(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let mime = mime::detect_image_mime(&bytes);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{};base64,{}", mime, encoded))
    }
}

#[async_trait]
impl UploadService for CloudinaryClient {
    async fn upload(
        &self,
        path: &Path,
        public_id: &str,
        settings: &[DerivedSetting],
    ) -> Result<UploadResult> {
        let file = Self::read_data_uri(path).await?;

        let signed = vec![
            ("public_id", public_id.to_string()),
            ("responsive_breakpoints", breakpoints_param(settings)?),
            ("timestamp", chrono::Utc::now().timestamp().to_string()),
        ];
        let signature = sign_params(&signed, &self.api_secret);

        let mut form = signed;
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature", signature));
        form.push(("signature_algorithm", "sha256".to_string()));
        form.push(("file", file));

        let response = self
            .client
            .post(self.upload_url())
            .timeout(UPLOAD_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send upload request for {}: {}", public_id, e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            let message = serde_json::from_str::<ErrorBody>(&error_text)
                .map(|body| body.error.message)
                .unwrap_or(error_text);
            tracing::error!("Upload API error (status {}): {}", status, message);
            return Err(Error::Upload(format!(
                "Upload API error (status {}): {}",
                status, message
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse upload response: {}\nBody: {}", e, body);
            Error::Upload(format!("Failed to parse upload response: {}", e))
        })
    }
}
