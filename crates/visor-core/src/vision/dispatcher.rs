//! Image action dispatcher: routes inference results to output channels.
//!
//! One pending image at a time; each operation owns its output channel.
//! Dispatches are spawned and their completions delivered over an internal
//! channel in arrival order, which may differ from issue order. There is no
//! cancellation of in-flight inference: the last completion to arrive wins
//! its channel, since every write is a full overwrite.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::images::{ImageLoadError, ImageRef, ImageSource};
use crate::vision::{InferenceError, InferenceResult, Label, VisionService};

/// The two independent inference operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOperation {
    /// Extract printed text; results land in the text channel.
    ExtractText,
    /// Produce semantic labels; results land in the label channel.
    GenerateLabels,
}

impl fmt::Display for ImageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageOperation::ExtractText => write!(f, "extract-text"),
            ImageOperation::GenerateLabels => write!(f, "generate-labels"),
        }
    }
}

/// Why a dispatch was rejected before any inference call.
#[derive(Debug)]
pub enum DispatchError {
    /// No image is pending; the action trigger is disabled.
    NoImageSelected,
    /// The pending reference no longer decodes.
    ImageLoad(ImageLoadError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoImageSelected => write!(f, "no image selected"),
            DispatchError::ImageLoad(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<ImageLoadError> for DispatchError {
    fn from(err: ImageLoadError) -> Self {
        DispatchError::ImageLoad(err)
    }
}

/// Completion of one dispatched inference call.
#[derive(Debug)]
pub struct DispatchCompletion {
    /// The operation that completed.
    pub operation: ImageOperation,
    /// Its outcome.
    pub outcome: Result<InferenceResult, InferenceError>,
}

/// Default capacity for the completion channel.
const COMPLETION_CHANNEL_CAPACITY: usize = 128;

/// Dispatches inference operations for the selected image and applies
/// their completions to the output channels.
pub struct ImageActionDispatcher {
    source: Arc<dyn ImageSource>,
    vision: Arc<dyn VisionService>,
    pending: Option<ImageRef>,
    text_channel: Option<String>,
    label_channel: Option<Vec<Label>>,
    in_flight: usize,
    completions_tx: mpsc::Sender<DispatchCompletion>,
    completions_rx: mpsc::Receiver<DispatchCompletion>,
}

impl ImageActionDispatcher {
    /// Creates a dispatcher over an injected image source and vision service.
    pub fn new(source: Arc<dyn ImageSource>, vision: Arc<dyn VisionService>) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            source,
            vision,
            pending: None,
            text_channel: None,
            label_channel: None,
            in_flight: 0,
            completions_tx,
            completions_rx,
        }
    }

    /// Selects a new image.
    ///
    /// Both output channels reset immediately and dispatch stays disabled
    /// until the reference is confirmed to load. On failure the pending slot
    /// is cleared and the load error returned.
    ///
    /// # Errors
    /// Returns `ImageLoadError` if the reference cannot be decoded.
    pub fn select_image(&mut self, image: ImageRef) -> Result<(), ImageLoadError> {
        self.text_channel = None;
        self.label_channel = None;
        self.pending = None;

        // Confirm the selection loads before enabling the action triggers.
        self.source.load_image(&image)?;
        tracing::debug!(image = %image, "image selected");
        self.pending = Some(image);
        Ok(())
    }

    /// Whether the action triggers are enabled (an image is pending).
    pub fn can_dispatch(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the in-progress indicator should be visible.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// The text output channel.
    pub fn text_channel(&self) -> Option<&str> {
        self.text_channel.as_deref()
    }

    /// The label output channel, in service order.
    pub fn label_channel(&self) -> Option<&[Label]> {
        self.label_channel.as_deref()
    }

    /// Dispatches exactly one inference call for `operation`.
    ///
    /// The image is re-loaded first; a reference that no longer decodes
    /// fails immediately without invoking inference. The call is spawned
    /// and this method returns at once; operations may be dispatched
    /// back-to-back without waiting for each other.
    ///
    /// # Errors
    /// Rejected when no image is pending, or when the image fails to load.
    pub fn dispatch(&mut self, operation: ImageOperation) -> Result<(), DispatchError> {
        let Some(image) = self.pending.as_ref() else {
            return Err(DispatchError::NoImageSelected);
        };

        let decoded = self.source.load_image(image)?;

        type CallFuture =
            std::pin::Pin<Box<dyn Future<Output = Result<InferenceResult, InferenceError>> + Send>>;
        let call: CallFuture = match operation {
            ImageOperation::ExtractText => {
                let text = self.vision.extract_text(&decoded);
                Box::pin(async move { text.await.map(|text| InferenceResult::Text { text }) })
            }
            ImageOperation::GenerateLabels => {
                let labels = self.vision.label_image(&decoded);
                Box::pin(
                    async move { labels.await.map(|labels| InferenceResult::Labels { labels }) },
                )
            }
        };

        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = call.await;
            let _ = tx.send(DispatchCompletion { operation, outcome }).await;
        });

        self.in_flight += 1;
        tracing::debug!(%operation, "inference dispatched");
        Ok(())
    }

    /// Awaits the next completion and applies it.
    ///
    /// Success overwrites only the completed operation's channel; failure
    /// leaves the prior displayed result untouched. Either way the
    /// in-progress indicator clears once nothing remains in flight.
    /// Completions are applied strictly in arrival order.
    pub async fn next_completion(&mut self) -> Option<DispatchCompletion> {
        let completion = self.completions_rx.recv().await?;
        self.in_flight = self.in_flight.saturating_sub(1);

        match &completion.outcome {
            Ok(InferenceResult::Text { text }) => {
                self.text_channel = Some(text.clone());
            }
            Ok(InferenceResult::Labels { labels }) => {
                self.label_channel = Some(labels.clone());
            }
            Err(err) => {
                tracing::debug!(operation = %completion.operation, error = %err, "inference failed");
            }
        }

        Some(completion)
    }
}
