use std::sync::Arc;

use crate::{config::AppConfig, db::Db, gateway::SagePayGateway};

#[derive(Debug, Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: Db,
    pub gate: SagePayGateway,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: Db, gate: SagePayGateway, config: AppConfig) -> Self {
        Self {
            db,
            gate,
            config: Arc::new(config),
        }
    }
}
