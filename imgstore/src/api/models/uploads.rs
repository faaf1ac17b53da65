use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::StoredFile;

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";

/// Response body of a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Always "File uploaded successfully"
    #[schema(example = "File uploaded successfully")]
    pub message: String,
    /// Generated storage name: 24 lowercase hex characters plus the original extension
    #[schema(example = "3f9a0c61d2e84b7a95c0e1f2.jpeg")]
    pub filename: String,
    /// Path the stored file is served under
    #[serde(rename = "filePath")]
    #[schema(example = "/images/3f9a0c61d2e84b7a95c0e1f2.jpeg")]
    pub file_path: String,
}

impl UploadResponse {
    pub fn new(stored: &StoredFile, file_path: String) -> Self {
        Self {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            filename: stored.storage_name.clone(),
            file_path,
        }
    }
}
