use metrics_exporter_prometheus::PrometheusHandle;
use ministry_match::config::ScoringConfig;
use ministry_match::error::AppError;
use ministry_match::matching::{
    HttpScoringOracle, MatchingService, MemoryStore, Notification, NotificationGateway,
    NotifyError, ScoringAdapter, ScoringOracle, UnavailableOracle,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

pub(crate) type ApiService = MatchingService<MemoryStore, InMemoryNotificationGateway>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Gateway that logs each notification and keeps it for inspection.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationGateway {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationGateway for InMemoryNotificationGateway {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient_id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification queued"
        );
        let mut guard = self
            .sent
            .lock()
            .map_err(|_| NotifyError::Transport("notification outbox poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationGateway {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// HTTP oracle when an endpoint is configured, otherwise fallback-only scoring.
pub(crate) fn build_oracle(config: &ScoringConfig) -> Result<Arc<dyn ScoringOracle>, AppError> {
    match &config.oracle_url {
        Some(url) => {
            let oracle = HttpScoringOracle::new(url.clone(), config.oracle_api_key.clone())?;
            Ok(Arc::new(oracle))
        }
        None => Ok(Arc::new(UnavailableOracle)),
    }
}

pub(crate) fn build_service(
    config: &ScoringConfig,
    gateway: Arc<InMemoryNotificationGateway>,
) -> Result<Arc<ApiService>, AppError> {
    let oracle = build_oracle(config)?;
    let scoring = ScoringAdapter::new(oracle, config.timeout);
    Ok(Arc::new(MatchingService::new(
        Arc::new(MemoryStore::new()),
        gateway,
        scoring,
    )))
}
