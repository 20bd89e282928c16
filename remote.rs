use crate::config::{AnonymizeConfig, RemoteApiConfig};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::models::DetectionRegion;
use crate::postprocess::{finalize_box, Margins};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlateReaderResponse {
    #[serde(default)]
    pub results: Vec<PlateReaderResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlateReaderResult {
    #[serde(rename = "box")]
    pub bounding_box: DetectionRegion,
}

/// Client for a Plate Recognizer style HTTP API. Boxes come back in pixels of
/// the uploaded image.
pub struct RemoteDetector {
    client: Client,
    endpoint: String,
    token: String,
    margins: Margins,
}

impl RemoteDetector {
    pub fn new(config: &RemoteApiConfig, anonymize: &AnonymizeConfig) -> Result<Self> {
        let token = config
            .token()
            .ok_or_else(|| Error::Config("Remote detection requires an API token".into()))?
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token,
            margins: Margins::from(anonymize),
        })
    }

    pub fn detect(&self, bytes: &[u8], width: u32, height: u32) -> Result<Vec<DetectionRegion>> {
        let form = Form::new().part(
            "upload",
            Part::bytes(bytes.to_vec()).file_name("upload.jpg"),
        );
        let response: PlateReaderResponse = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Token {}", self.token))
            .multipart(form)
            .send()?
            .error_for_status()?
            .json()?;
        log::debug!("Remote detector returned {} plates", response.results.len());
        Ok(regions_from_response(&response, width, height, &self.margins))
    }
}

pub(crate) fn regions_from_response(
    response: &PlateReaderResponse,
    width: u32,
    height: u32,
    margins: &Margins,
) -> Vec<DetectionRegion> {
    response
        .results
        .iter()
        .filter_map(|result| {
            let b = result.bounding_box;
            if ![b.xmin, b.ymin, b.xmax, b.ymax].iter().all(|v| v.is_finite()) {
                return None;
            }
            let clamped = BoundingBox::new(b.xmin, b.ymin, b.xmax, b.ymax)
                .clamp(width as f32, height as f32);
            finalize_box(&clamped, width, height, margins)
        })
        .collect()
}
