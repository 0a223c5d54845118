use super::{invalid_input, no_session, validate_input};
use crate::application::services::{AuthService, MediaService};
use crate::domain::entities::Feature;
use crate::domain::value_objects::EntityId;
use crate::presentation::dto::media_dto::{UploadMediaRequest, UploadMediaResponse};
use crate::shared::error::AppError;
use std::sync::Arc;

pub struct MediaHandler {
    media_service: Arc<MediaService>,
    auth_service: Arc<AuthService>,
}

impl MediaHandler {
    pub fn new(media_service: Arc<MediaService>, auth_service: Arc<AuthService>) -> Self {
        Self {
            media_service,
            auth_service,
        }
    }

    pub async fn upload_student_photo(
        &self,
        request: UploadMediaRequest,
    ) -> Result<UploadMediaResponse, AppError> {
        let owner = self.authorize(&request, Feature::Students)?;
        let url = self
            .media_service
            .upload_student_photo(&owner, &request.file_name, request.bytes)
            .await?;
        Ok(UploadMediaResponse { url })
    }

    pub async fn upload_inventory_image(
        &self,
        request: UploadMediaRequest,
    ) -> Result<UploadMediaResponse, AppError> {
        let owner = self.authorize(&request, Feature::Inventory)?;
        let url = self
            .media_service
            .upload_inventory_image(&owner, &request.file_name, request.bytes)
            .await?;
        Ok(UploadMediaResponse { url })
    }

    fn authorize(&self, request: &UploadMediaRequest, feature: Feature) -> Result<EntityId, AppError> {
        validate_input(request)?;
        let context = self.auth_service.current_context().ok_or_else(no_session)?;
        if !context.can_access(feature) {
            return Err(AppError::Unauthorized(format!(
                "{feature:?} is not available for this session"
            )));
        }
        EntityId::new(request.owner_id.trim()).map_err(invalid_input)
    }
}
