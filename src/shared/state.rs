use crate::config::AppConfig;
use crate::shared::utils::DbPool;
use crate::storage::{ObjectStorage, VideoTranscoder};
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub transcoder: Arc<dyn VideoTranscoder>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            storage: self.storage.clone(),
            transcoder: Arc::clone(&self.transcoder),
        }
    }
}
