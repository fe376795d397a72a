use std::sync::Arc;

use screenocr_config::{Config, Paths};
use tokio::sync::RwLock;

use crate::status::AppStatus;

pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub paths: Paths,
    pub status: AppStatus,
}

impl AppState {
    pub fn new(config: Config, paths: Paths) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            paths,
            status: AppStatus::new(),
        }
    }
}
