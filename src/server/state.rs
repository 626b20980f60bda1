//! Shared server state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ApiSettings;
use crate::inference::InferenceService;

pub type SharedState = Arc<AppState>;

/// Everything request handlers need, injected through axum's `State`.
pub struct AppState {
    service: Arc<InferenceService>,
    started_at: Instant,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(service: InferenceService, api: &ApiSettings) -> Self {
        Self {
            service: Arc::new(service),
            started_at: Instant::now(),
            request_timeout: Duration::from_secs(api.request_timeout_secs),
        }
    }

    pub fn service(&self) -> Arc<InferenceService> {
        Arc::clone(&self.service)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_state_satisfies_handler_bounds() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<SharedState>();
    }
}
