//! Image source for the session machine
//!
//! The picker dialog lives in the UI client; the daemon receives the chosen
//! file path over IPC and loads the encoded bytes from disk here.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Annotate requests to the detection service cap out at 10MB.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// An image as selected by the user: its handle plus encoded bytes
#[derive(Debug, Clone)]
pub struct SelectedImage {
    /// Where the image came from
    pub path: PathBuf,
    /// Encoded image bytes as stored on disk
    pub bytes: Vec<u8>,
}

/// Errors that can occur while loading a selected image
#[derive(Debug, thiserror::Error)]
pub enum ImageSourceError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("image is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

/// Supplies the encoded bytes of a user-selected image
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn load(&self, path: &Path) -> Result<SelectedImage, ImageSourceError>;
}

/// File-backed image source
pub struct FileImageSource {
    max_bytes: usize,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
        }
    }
}

impl Default for FileImageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn load(&self, path: &Path) -> Result<SelectedImage, ImageSourceError> {
        let metadata = tokio::fs::metadata(path).await?;
        let size = metadata.len() as usize;
        if size > self.max_bytes {
            return Err(ImageSourceError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        Ok(SelectedImage {
            path: path.to_owned(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let source = FileImageSource::new();
        let result = source.load(Path::new("/nonexistent/image.jpg")).await;
        assert!(matches!(result, Err(ImageSourceError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_reads_bytes() {
        let dir = std::env::temp_dir().join("scanspeak-source-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("photo.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let source = FileImageSource::new();
        let image = source.load(&path).await.unwrap();
        assert_eq!(image.bytes, b"not really a jpeg");
        assert_eq!(image.path, path);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let dir = std::env::temp_dir().join("scanspeak-source-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("big.jpg");
        std::fs::write(&path, vec![0u8; 32]).unwrap();

        let source = FileImageSource { max_bytes: 16 };
        let result = source.load(&path).await;
        assert!(matches!(
            result,
            Err(ImageSourceError::TooLarge { size: 32, limit: 16 })
        ));
    }
}
