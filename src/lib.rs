pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use std::sync::Arc;

use services::settlement::Settlement;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub settlement: Arc<Settlement>,
}
