//! Image service integration
//!
//! Uploads local photos to the hosted image service and asks it to generate
//! responsive breakpoint derivatives server-side.

pub mod client;
pub mod mime;
pub mod mock;

pub use client::CloudinaryClient;
pub use mock::MockUploadClient;

use crate::models::{DerivedSetting, UploadResult};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

#[async_trait]
pub trait UploadService: Send + Sync {
    /// Upload the file at `path` as `public_id`, requesting one derivative
    /// group per setting.
    async fn upload(
        &self,
        path: &Path,
        public_id: &str,
        settings: &[DerivedSetting],
    ) -> Result<UploadResult>;
}

/// Wire form of a [`DerivedSetting`] inside the `responsive_breakpoints` parameter.
#[derive(Debug, Serialize, PartialEq)]
pub struct BreakpointRequest {
    pub create_derived: bool,
    pub bytes_step: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub max_images: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
}

impl From<&DerivedSetting> for BreakpointRequest {
    fn from(setting: &DerivedSetting) -> Self {
        let transformation = setting.transformation.to_param();
        Self {
            create_derived: setting.create_derived,
            bytes_step: setting.bytes_step,
            min_width: setting.min_width,
            max_width: setting.max_width,
            max_images: setting.max_images,
            transformation: (!transformation.is_empty()).then_some(transformation),
        }
    }
}

/// JSON value for the `responsive_breakpoints` upload parameter.
pub fn breakpoints_param(settings: &[DerivedSetting]) -> Result<String> {
    let requests: Vec<BreakpointRequest> = settings.iter().map(BreakpointRequest::from).collect();
    Ok(serde_json::to_string(&requests)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transformation;

    fn setting(transformation: Transformation) -> DerivedSetting {
        DerivedSetting {
            create_derived: true,
            bytes_step: 25000,
            min_width: 200,
            max_width: 2000,
            screen_min_width: 768,
            screen_max_width: 0,
            max_images: 10,
            transformation,
            view_port_ratio: 50,
        }
    }

    #[test]
    fn test_breakpoints_param_omits_rendering_hints() {
        let json = breakpoints_param(&[setting(Transformation::fill("4:3"))]).unwrap();

        assert_eq!(
            json,
            r#"[{"create_derived":true,"bytes_step":25000,"min_width":200,"max_width":2000,"max_images":10,"transformation":"ar_4:3,c_fill"}]"#
        );
    }

    #[test]
    fn test_empty_transformation_is_omitted() {
        let request = BreakpointRequest::from(&setting(Transformation::default()));
        assert_eq!(request.transformation, None);

        let json = breakpoints_param(&[setting(Transformation::default())]).unwrap();
        assert!(!json.contains("transformation"));
    }
}
