use super::Validate;
use serde::{Deserialize, Serialize};

const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMediaRequest {
    pub owner_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Validate for UploadMediaRequest {
    fn validate(&self) -> Result<(), String> {
        if self.owner_id.trim().is_empty() {
            return Err("Owner ID is required".to_string());
        }
        if self.file_name.trim().is_empty() {
            return Err("File name is required".to_string());
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err("File is too large (max 5MB)".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMediaResponse {
    pub url: String,
}
