use std::sync::Arc;

use crate::config::Config;
use crate::observability::Metrics;
use crate::repository::LedgerRepository;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: LedgerRepository,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, repository: LedgerRepository) -> Self {
        let metrics = Arc::clone(repository.metrics());
        Self {
            config: Arc::new(config),
            repository,
            metrics,
        }
    }
}
