use crate::encoder::DataUri;
use image::ImageFormat;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

const UNKNOWN_MIME: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Please choose an image first.")]
    NoFileChosen,
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Holds the file the user picked until they ask for it to be uploaded.
#[derive(Debug, Default)]
pub struct FileChooser {
    selected: Mutex<Option<PathBuf>>,
}

impl FileChooser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choose(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!("File chosen: {}", path.display());
        *self.selected.lock() = Some(path);
    }

    pub fn selected(&self) -> Option<PathBuf> {
        self.selected.lock().clone()
    }

    /// Reads the chosen file into a data-URI, keeping its original encoding.
    #[instrument(skip(self))]
    pub async fn read_as_data_uri(&self) -> Result<DataUri, UploadError> {
        let path = self.selected().ok_or(UploadError::NoFileChosen)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| UploadError::ReadFailed {
                path: path.clone(),
                source,
            })?;

        let mime = sniff_mime(&path, &bytes);
        tracing::debug!("Read {} bytes as {}", bytes.len(), mime);

        Ok(DataUri::from_bytes(mime, &bytes))
    }
}

fn sniff_mime(path: &Path, bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok())
        .map(|format| format.to_mime_type())
        .unwrap_or(UNKNOWN_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_upload_without_choice_fails() {
        let chooser = FileChooser::new();

        let err = chooser.read_as_data_uri().await.unwrap_err();

        assert!(matches!(err, UploadError::NoFileChosen));
        assert_eq!(err.to_string(), "Please choose an image first.");
    }

    #[tokio::test]
    async fn test_upload_passes_original_encoding_through() {
        let jpeg_magic = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(&jpeg_magic).unwrap();

        let chooser = FileChooser::new();
        chooser.choose(file.path());
        let uri = chooser.read_as_data_uri().await.unwrap();

        assert_eq!(uri.mime(), "image/jpeg");
        assert_eq!(uri.decode().unwrap(), jpeg_magic);
    }

    #[tokio::test]
    async fn test_unknown_content_uses_extension_then_octet_stream() {
        let mut png_named = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        png_named.write_all(b"not really").unwrap();
        let mut unnamed = tempfile::Builder::new().suffix(".xyz").tempfile().unwrap();
        unnamed.write_all(b"not really").unwrap();

        let chooser = FileChooser::new();
        chooser.choose(png_named.path());
        assert_eq!(chooser.read_as_data_uri().await.unwrap().mime(), "image/png");

        chooser.choose(unnamed.path());
        assert_eq!(
            chooser.read_as_data_uri().await.unwrap().mime(),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let chooser = FileChooser::new();
        chooser.choose("/definitely/not/here.png");

        let err = chooser.read_as_data_uri().await.unwrap_err();

        assert!(matches!(err, UploadError::ReadFailed { .. }));
    }
}
