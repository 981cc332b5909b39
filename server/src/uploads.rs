//! Uploaded file storage
//!
//! Files land at `<root>/<folder>/<uuid>.<ext>` and are served back under
//! `/static/<folder>/<file>`.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use uuid::Uuid;

pub const STATIC_PREFIX: &str = "/static";
pub const PROFILE_FOLDER: &str = "profile_img";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload folder '{0}'")]
    InvalidFolder(String),

    #[error("failed to write upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Folder holding a page's photos
pub fn page_folder(nameslug: &str) -> String {
    format!("{}_img", nameslug)
}

/// A file written under the uploads root
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub original_filename: String,
    pub filename: String,
    pub folder: String,
    pub content_type: String,
    pub size: usize,
    pub path: PathBuf,
}

impl StoredFile {
    /// Public URL path of the file
    pub fn url(&self) -> String {
        format!("{}/{}/{}", STATIC_PREFIX, self.folder, self.filename)
    }

    /// Metadata handed to services as the request's `file` field
    pub fn to_json(&self) -> Value {
        json!({
            "originalFilename": self.original_filename,
            "filename": self.filename,
            "name": self.url(),
            "contentType": self.content_type,
            "size": self.size,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Uploads {
    root: PathBuf,
}

impl Uploads {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under `folder` with a fresh name
    pub async fn save(
        &self,
        folder: &str,
        original_filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile, UploadError> {
        if folder.is_empty()
            || !folder
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(UploadError::InvalidFolder(folder.to_string()));
        }

        let content_type = match content_type.filter(|ct| !ct.is_empty()) {
            Some(ct) => ct.to_string(),
            None => mime_guess::from_path(original_filename)
                .first_or_octet_stream()
                .to_string(),
        };
        let filename = match extension(original_filename, &content_type) {
            Some(ext) => format!("{}.{}", Uuid::new_v4().simple(), ext),
            None => Uuid::new_v4().simple().to_string(),
        };

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&filename);
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "upload stored");
        Ok(StoredFile {
            original_filename: original_filename.to_string(),
            filename,
            folder: folder.to_string(),
            content_type,
            size: bytes.len(),
            path,
        })
    }

    /// Remove a stored file whose request did not succeed
    pub async fn discard(&self, file: &StoredFile) {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::warn!(path = %file.path.display(), error = %e, "failed to discard upload");
        }
    }
}

/// Extension from the client's filename, else one registered for the content type
fn extension(original_filename: &str, content_type: &str) -> Option<String> {
    let from_name = Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase);

    from_name.or_else(|| {
        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    })
}
