use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::store::EndpointStore;
use crate::tester::RequestTester;

/// Shared by every route.
pub struct AppState {
    pub store: Arc<EndpointStore>,
    pub config: RwLock<AppConfig>,
    /// Where `PUT /api/config` persists changes; in-memory only when unset.
    pub config_file: Option<PathBuf>,
    pub tester: RequestTester,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        store: EndpointStore,
        config: AppConfig,
        config_file: Option<PathBuf>,
        tester: RequestTester,
    ) -> Self {
        Self {
            store: Arc::new(store),
            config: RwLock::new(config),
            config_file,
            tester,
            started: Instant::now(),
        }
    }
}
