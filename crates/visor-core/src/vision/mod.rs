//! Vision inference service boundary and result types.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::images::DecodedImage;

pub mod dispatcher;
pub mod remote;

pub use dispatcher::{DispatchCompletion, DispatchError, ImageActionDispatcher, ImageOperation};
pub use remote::HttpVisionService;

/// A semantic label produced by the labeling operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Label name (e.g., "cat")
    pub name: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.name, self.confidence)
    }
}

/// One inference outcome, tagged by the operation that produced it.
///
/// Labels keep the order the service produced them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InferenceResult {
    Text { text: String },
    Labels { labels: Vec<Label> },
}

/// Categories of inference errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection timeout or request timeout
    Timeout,
    /// Failed to parse the service response
    Parse,
    /// Service-level error (e.g., unsupported image)
    ApiError,
}

impl fmt::Display for InferenceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceErrorKind::HttpStatus => write!(f, "http_status"),
            InferenceErrorKind::Timeout => write!(f, "timeout"),
            InferenceErrorKind::Parse => write!(f, "parse"),
            InferenceErrorKind::ApiError => write!(f, "api_error"),
        }
    }
}

/// Structured error from the vision service with kind and details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceError {
    /// Error category
    pub kind: InferenceErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl InferenceError {
    /// Creates a new inference error.
    pub fn new(kind: InferenceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error, extracting a cleaner message from a
    /// JSON error body when one is present.
    pub fn http_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}");
        if body.is_empty() {
            return Self::new(InferenceErrorKind::HttpStatus, message);
        }
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(body)
            && let Some(error_obj) = json.get("error")
            && let Some(msg) = error_obj.get("message").and_then(|v| v.as_str())
        {
            return Self {
                kind: InferenceErrorKind::HttpStatus,
                message: format!("HTTP {status}: {msg}"),
                details: Some(body.to_string()),
            };
        }
        Self {
            kind: InferenceErrorKind::HttpStatus,
            message,
            details: Some(body.to_string()),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(InferenceErrorKind::Timeout, message)
    }

    /// Creates a response-parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(InferenceErrorKind::Parse, message)
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InferenceError {}

/// Async text extraction completion.
pub type TextFuture = Pin<Box<dyn Future<Output = Result<String, InferenceError>> + Send>>;

/// Async labeling completion.
pub type LabelsFuture = Pin<Box<dyn Future<Output = Result<Vec<Label>, InferenceError>> + Send>>;

/// The inference boundary: turns an image into text or labels.
///
/// Both methods register work and return a future immediately; nothing
/// blocks the caller.
pub trait VisionService: Send + Sync {
    /// Extracts printed text from the image.
    fn extract_text(&self, image: &DecodedImage) -> TextFuture;

    /// Produces semantic labels for the image, ordered by the service.
    fn label_image(&self, image: &DecodedImage) -> LabelsFuture;
}
