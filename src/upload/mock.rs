use super::UploadService;
use crate::models::{Breakpoint, DerivativeGroup, DerivedSetting, UploadResult};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Offline stand-in for the image service. Synthesizes evenly spaced
/// breakpoints for every setting instead of uploading anything.
#[derive(Clone)]
pub struct MockUploadClient {
    base_url: String,
    uploads: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashSet<String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
}

impl MockUploadClient {
    pub fn new() -> Self {
        Self {
            base_url: "https://mock-images.example.com".to_string(),
            uploads: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
            delays: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Fail every upload of `public_id`.
    pub fn with_failure(self, public_id: &str) -> Self {
        self.failures.lock().unwrap().insert(public_id.to_string());
        self
    }

    /// Hold the response for `public_id` back by `delay`.
    pub fn with_delay(self, public_id: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(public_id.to_string(), delay);
        self
    }

    pub fn get_upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Public ids in the order their uploads completed.
    pub fn get_uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    /// Up to `max_images` widths spread evenly from `max_width` down to
    /// `min_width`, largest first like the real service.
    fn synthesize_widths(setting: &DerivedSetting) -> Vec<u32> {
        let min = setting.min_width.min(setting.max_width);
        let max = setting.max_width;
        let count = setting.max_images.max(1);
        if count == 1 || min == max {
            return vec![max];
        }

        let step = f64::from(max - min) / f64::from(count - 1);
        let mut widths: Vec<u32> = (0..count)
            .map(|i| max - (step * f64::from(i)).round() as u32)
            .collect();
        widths.dedup();
        widths
    }

    fn synthesize(&self, public_id: &str, settings: &[DerivedSetting]) -> UploadResult {
        let responsive_breakpoints = settings
            .iter()
            .map(|setting| {
                let transformation = setting.transformation.to_param();
                let prefix = if transformation.is_empty() {
                    String::new()
                } else {
                    format!("{},", transformation)
                };

                DerivativeGroup {
                    transformation: (!transformation.is_empty()).then(|| transformation.clone()),
                    breakpoints: Self::synthesize_widths(setting)
                        .into_iter()
                        .map(|width| Breakpoint {
                            width,
                            height: None,
                            secure_url: format!(
                                "{}/image/upload/{}w_{}/{}",
                                self.base_url, prefix, width, public_id
                            ),
                        })
                        .collect(),
                }
            })
            .collect();

        UploadResult {
            public_id: public_id.to_string(),
            secure_url: format!("{}/image/upload/{}", self.base_url, public_id),
            responsive_breakpoints,
        }
    }
}

impl Default for MockUploadClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadService for MockUploadClient {
    async fn upload(
        &self,
        _path: &Path,
        public_id: &str,
        settings: &[DerivedSetting],
    ) -> Result<UploadResult> {
        let delay = self.delays.lock().unwrap().get(public_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.lock().unwrap().contains(public_id) {
            return Err(Error::Upload(format!("Mock failure for {}", public_id)));
        }

        self.uploads.lock().unwrap().push(public_id.to_string());
        Ok(self.synthesize(public_id, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transformation;

    fn setting(min_width: u32, max_width: u32, max_images: u32) -> DerivedSetting {
        DerivedSetting {
            create_derived: true,
            bytes_step: 25000,
            min_width,
            max_width,
            screen_min_width: 0,
            screen_max_width: 0,
            max_images,
            transformation: Transformation::default(),
            view_port_ratio: 100,
        }
    }

    #[test]
    fn test_synthesize_widths_evenly_spaced() {
        assert_eq!(
            MockUploadClient::synthesize_widths(&setting(200, 1000, 5)),
            vec![1000, 800, 600, 400, 200]
        );
        assert_eq!(
            MockUploadClient::synthesize_widths(&setting(500, 500, 10)),
            vec![500]
        );
        assert_eq!(
            MockUploadClient::synthesize_widths(&setting(200, 1000, 1)),
            vec![1000]
        );
    }

    #[tokio::test]
    async fn test_mock_upload_one_group_per_setting() {
        let client = MockUploadClient::new().with_base_url("https://img.test".to_string());
        let mut cropped = setting(200, 400, 2);
        cropped.transformation = Transformation::fill("1:1");

        let result = client
            .upload(Path::new("cat.jpg"), "cat", &[setting(200, 400, 2), cropped])
            .await
            .unwrap();

        assert_eq!(result.secure_url, "https://img.test/image/upload/cat");
        assert_eq!(result.responsive_breakpoints.len(), 2);
        assert_eq!(
            result.responsive_breakpoints[1].breakpoints[0].secure_url,
            "https://img.test/image/upload/ar_1:1,c_fill,w_400/cat"
        );
        assert_eq!(client.get_upload_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_upload_failure() {
        let client = MockUploadClient::new().with_failure("broken");

        let result = client
            .upload(Path::new("broken.jpg"), "broken", &[setting(200, 400, 2)])
            .await;

        assert!(matches!(result, Err(Error::Upload(_))));
        assert_eq!(client.get_upload_count(), 0);
    }
}
