use std::sync::{Arc, PoisonError, RwLock};

/// REST とリアルタイムで共有するアクセストークン。
#[derive(Debug, Clone, Default)]
pub struct AccessTokenSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl AccessTokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}
