pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod media;

pub use db::DbPool;

use config::Config;
use media::MediaDirectory;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub media: Arc<dyn MediaDirectory>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, media: Arc<dyn MediaDirectory>) -> Self {
        Self { config, db, media }
    }
}
