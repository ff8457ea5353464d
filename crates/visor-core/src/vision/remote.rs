//! Reqwest-backed vision service client.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::images::DecodedImage;
use crate::vision::{
    InferenceError, InferenceErrorKind, Label, LabelsFuture, TextFuture, VisionService,
};

/// Wire format of a text extraction response.
#[derive(Debug, Deserialize)]
struct ExtractTextResponse {
    text: String,
}

/// Wire format of a labeling response.
#[derive(Debug, Deserialize)]
struct LabelResponse {
    labels: Vec<Label>,
}

/// Vision client against the visor backend, bearer-authenticated with the
/// session token.
pub struct HttpVisionService {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpVisionService {
    /// Creates a vision client for the given backend and session token.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    fn post_image(
        &self,
        path: &'static str,
        image: &DecodedImage,
    ) -> impl Future<Output = Result<serde_json::Value, InferenceError>> + Send + use<> {
        let client = self.client.clone();
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let token = self.access_token.clone();
        let body = serde_json::json!({
            "image": {
                "mime_type": "image/png",
                "data": STANDARD.encode(&image.png_bytes),
            }
        });

        async move {
            let response = client
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        InferenceError::timeout(format!("Request timed out: {e}"))
                    } else {
                        InferenceError::new(
                            InferenceErrorKind::HttpStatus,
                            format!("Failed to reach {url}: {e}"),
                        )
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(status = status.as_u16(), %url, "vision request rejected");
                return Err(InferenceError::http_status(status.as_u16(), &body));
            }

            response
                .json()
                .await
                .map_err(|e| InferenceError::parse(format!("Invalid vision response: {e}")))
        }
    }
}

impl VisionService for HttpVisionService {
    fn extract_text(&self, image: &DecodedImage) -> TextFuture {
        let request = self.post_image("/v1/vision/extract-text", image);
        Box::pin(async move {
            let value = request.await?;
            let parsed: ExtractTextResponse = serde_json::from_value(value)
                .map_err(|e| InferenceError::parse(format!("Invalid text payload: {e}")))?;
            Ok(parsed.text)
        })
    }

    fn label_image(&self, image: &DecodedImage) -> LabelsFuture {
        let request = self.post_image("/v1/vision/label", image);
        Box::pin(async move {
            let value = request.await?;
            let parsed: LabelResponse = serde_json::from_value(value)
                .map_err(|e| InferenceError::parse(format!("Invalid label payload: {e}")))?;
            Ok(parsed.labels)
        })
    }
}
