//! Image selection and decoding boundary.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

pub mod decode;
pub mod path_mime;

pub use decode::decode_image_to_png;

/// Opaque reference to a user-selected image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    path: PathBuf,
}

impl ImageRef {
    /// Wraps a filesystem path as an image reference.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the underlying path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Decoded image payload encoded as PNG bytes, with original dimensions.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub png_bytes: Vec<u8>,
    pub source_width: u32,
    pub source_height: u32,
}

/// An image reference could not be decoded.
#[derive(Debug, Clone)]
pub struct ImageLoadError {
    /// The reference that failed to load.
    pub image: ImageRef,
    /// What went wrong.
    pub reason: String,
}

impl ImageLoadError {
    pub fn new(image: ImageRef, reason: impl Into<String>) -> Self {
        Self {
            image,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ImageLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load {}: {}", self.image, self.reason)
    }
}

impl std::error::Error for ImageLoadError {}

/// Async image selection completion.
pub type PickFuture = Pin<Box<dyn Future<Output = Result<ImageRef, ImageLoadError>> + Send>>;

/// Supplier of user-selected images.
pub trait ImageSource: Send + Sync {
    /// Asks the user to pick an image.
    fn pick_image(&self) -> PickFuture;

    /// Decodes an image reference into an uploadable payload.
    ///
    /// # Errors
    /// Returns `ImageLoadError` if the reference cannot be read or decoded.
    fn load_image(&self, image: &ImageRef) -> Result<DecodedImage, ImageLoadError>;
}

/// Filesystem-backed image source.
///
/// `pick_image` resolves to the preselected reference (a terminal client
/// receives the selection as an argument rather than through a chooser).
pub struct FsImageSource {
    selection: Option<ImageRef>,
    max_dims: (u32, u32),
}

impl FsImageSource {
    /// Creates a source with a preselected image reference.
    pub fn with_selection(image: ImageRef, max_dims: (u32, u32)) -> Self {
        Self {
            selection: Some(image),
            max_dims,
        }
    }
}

impl ImageSource for FsImageSource {
    fn pick_image(&self) -> PickFuture {
        let selection = self.selection.clone();
        Box::pin(async move {
            selection.ok_or_else(|| {
                ImageLoadError::new(ImageRef::new(""), "no image was selected")
            })
        })
    }

    fn load_image(&self, image: &ImageRef) -> Result<DecodedImage, ImageLoadError> {
        decode::decode_image_to_png(image.path(), self.max_dims)
            .map_err(|reason| ImageLoadError::new(image.clone(), reason))
    }
}
