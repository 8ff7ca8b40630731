use std::sync::Arc;

use sqlx::PgPool;

use crate::calendar::CalComClient;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub calendar: CalComClient,
}
