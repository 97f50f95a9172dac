use std::sync::Arc;

use braid_llm::CompletionClient;
use braid_persist::PersistClient;

use crate::account::{BillingLedger, SessionValidator};
use crate::config::Config;

/// Shared application state passed to all handlers
///
/// All resources are wrapped in Arc so detached relay tasks can outlive the
/// request handler that spawned them.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persist: Arc<PersistClient>,
    pub completions: Arc<dyn CompletionClient>,
    pub sessions: Arc<dyn SessionValidator>,
    pub billing: Arc<dyn BillingLedger>,
}

impl AppState {
    pub fn new(
        config: Config,
        persist: PersistClient,
        completions: Arc<dyn CompletionClient>,
        sessions: Arc<dyn SessionValidator>,
        billing: Arc<dyn BillingLedger>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            persist: Arc::new(persist),
            completions,
            sessions,
            billing,
        }
    }
}
