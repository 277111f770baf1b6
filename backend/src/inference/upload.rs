use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::InferenceError;

pub const FILE_FIELD: &str = "file";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file provided")]
    MissingFile,
    #[error("File exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },
    #[error("Malformed multipart payload: {0}")]
    Multipart(String),
    #[error("Failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

/// An uploaded image written to temporary storage. The file belongs to a
/// single request and is removed when this value goes away.
#[derive(Debug)]
pub struct UploadedImage {
    file: NamedTempFile,
    filename: Option<String>,
    size: usize,
}

impl UploadedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Deletes the backing file now, reporting failures instead of ignoring
    /// them the way drop does.
    pub fn discard(self) -> Result<(), InferenceError> {
        let path = self.file.path().to_path_buf();
        self.file
            .close()
            .map_err(|e| InferenceError::Storage(format!("{}: {}", path.display(), e)))
    }
}

/// Pulls the `file` field out of the multipart stream into `upload_dir`.
/// Every other field is drained and ignored.
pub async fn receive_upload(
    mut payload: Multipart,
    upload_dir: &Path,
    max_bytes: usize,
) -> Result<UploadedImage, UploadError> {
    let mut upload = None;

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            // A body that is not multipart at all carries no file either.
            Err(e) if upload.is_none() => {
                log::debug!("Multipart stream ended with error: {}", e);
                break;
            }
            Err(e) => return Err(UploadError::Multipart(e.to_string())),
        };

        if upload.is_some() || field.name() != Some(FILE_FIELD) {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            }
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let mut file = temp_file_for(upload_dir, filename.as_deref())?;
        let mut size = 0usize;

        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            size += data.len();
            if size > max_bytes {
                return Err(UploadError::TooLarge { limit: max_bytes });
            }
            file.write_all(&data)?;
        }
        file.flush()?;

        log::debug!(
            "Stored upload {:?} ({} bytes) at {}",
            filename,
            size,
            file.path().display()
        );
        upload = Some(UploadedImage {
            file,
            filename,
            size,
        });
    }

    upload.ok_or(UploadError::MissingFile)
}

fn temp_file_for(upload_dir: &Path, filename: Option<&str>) -> std::io::Result<NamedTempFile> {
    // Keep the extension so the decoder can use it as a format hint.
    let suffix = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    std::fs::create_dir_all(upload_dir)?;
    tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile_in(upload_dir)
}

/// Directory for uploads, resolved once at startup.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub max_bytes: usize,
}
