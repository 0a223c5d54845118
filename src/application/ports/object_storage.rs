use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// アップロードして公開 URL を返す。同じパスは上書き。
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError>;
}
