use crate::application::ports::object_storage::ObjectStorage;
use crate::domain::value_objects::EntityId;
use crate::shared::error::AppError;
use crate::shared::validation::ValidationFailureKind;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const STUDENT_PHOTOS_BUCKET: &str = "student-photos";
pub const INVENTORY_IMAGES_BUCKET: &str = "inventory-images";

pub struct MediaService {
    storage: Arc<dyn ObjectStorage>,
}

impl MediaService {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub async fn upload_student_photo(
        &self,
        student_id: &EntityId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AppError> {
        self.upload(STUDENT_PHOTOS_BUCKET, student_id, file_name, bytes)
            .await
    }

    pub async fn upload_inventory_image(
        &self,
        item_id: &EntityId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AppError> {
        self.upload(INVENTORY_IMAGES_BUCKET, item_id, file_name, bytes)
            .await
    }

    async fn upload(
        &self,
        bucket: &str,
        owner: &EntityId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AppError> {
        if bytes.is_empty() {
            return Err(AppError::ValidationError {
                kind: ValidationFailureKind::InvalidPayload,
                field: Some("file".into()),
                message: "File is empty".into(),
            });
        }
        let extension = file_extension(file_name)?;
        let path = format!("{}-{}.{}", owner, Utc::now().timestamp_millis(), extension);
        let size = bytes.len();
        let url = self
            .storage
            .upload(bucket, &path, bytes, content_type(&extension))
            .await?;
        debug!(bucket, path = %path, size, "uploaded media");
        Ok(url)
    }
}

fn file_extension(file_name: &str) -> Result<String, AppError> {
    Path::new(file_name.trim())
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| AppError::ValidationError {
            kind: ValidationFailureKind::InvalidPayload,
            field: Some("file".into()),
            message: format!("File name has no extension: {file_name}"),
        })
}

fn content_type(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}
