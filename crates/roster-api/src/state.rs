//! Application state management

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use roster_core::config::{AppConfig, StorageBackend};
use roster_core::{AuditRepository, MemoryStore, PgStore, Result, UserRepository};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::audit::AuditLog;
use crate::auth::{AuthService, CredentialHasher, JwtConfig};
use crate::localization::LocalizationService;
use crate::users::UserService;

/// Per-endpoint request statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointMetrics {
    pub status_counts: BTreeMap<u16, u64>,
    pub latency_count: u64,
    pub total_latency_us: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
}

impl EndpointMetrics {
    pub fn record(&mut self, status: u16, latency_us: u64) {
        *self.status_counts.entry(status).or_default() += 1;
        if self.latency_count == 0 || latency_us < self.min_latency_us {
            self.min_latency_us = latency_us;
        }
        self.max_latency_us = self.max_latency_us.max(latency_us);
        self.latency_count += 1;
        self.total_latency_us = self.total_latency_us.saturating_add(latency_us);
    }

    pub fn average_latency_us(&self) -> u64 {
        if self.latency_count == 0 {
            0
        } else {
            self.total_latency_us / self.latency_count
        }
    }
}

/// Application state shared across handlers
///
/// Everything a request needs is built once here and injected; nothing is
/// reached through globals.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Token signing settings
    pub jwt: JwtConfig,
    /// Account operations
    pub users: UserService,
    /// Login
    pub auth: AuthService,
    /// Audit trail
    pub audit: AuditLog,
    /// UI dictionaries
    pub localization: LocalizationService,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Statistics keyed by route template, plus one `unmatched` bucket
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Wire services over the given stores
    pub fn new(
        config: AppConfig,
        users_repo: Arc<dyn UserRepository>,
        audit_repo: Arc<dyn AuditRepository>,
    ) -> Self {
        let jwt = JwtConfig::from(&config.jwt);
        let hasher = CredentialHasher::from(&config.credentials);
        let audit = AuditLog::new(audit_repo);
        let users = UserService::new(users_repo, hasher, audit.clone());
        let auth = AuthService::new(users.clone(), audit.clone(), jwt.clone());
        let localization = LocalizationService::from(&config.localization);

        Self {
            config,
            jwt,
            users,
            auth,
            audit,
            localization,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// State over a fresh in-memory store
    pub fn in_memory(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store)
    }

    /// Open the configured store, migrating PostgreSQL when enabled
    pub async fn build(config: AppConfig) -> Result<Self> {
        match config.database.backend {
            StorageBackend::Memory => {
                info!("Using in-memory store");
                Ok(Self::in_memory(config))
            }
            StorageBackend::Postgres => {
                let store = PgStore::connect(&config.database).await?;
                if config.database.run_migrations {
                    store.migrate().await?;
                }
                info!("Connected to PostgreSQL");
                let store = Arc::new(store);
                Ok(Self::new(config, store.clone(), store))
            }
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.metrics
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .record(status, latency_us);
    }

    /// Store reachability, used by the readiness probe
    pub async fn store_ready(&self) -> bool {
        self.users.store().ping().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics_record() {
        let mut metrics = EndpointMetrics::default();
        metrics.record(200, 500);
        metrics.record(200, 100);
        metrics.record(404, 300);

        assert_eq!(metrics.status_counts[&200], 2);
        assert_eq!(metrics.status_counts[&404], 1);
        assert_eq!(metrics.min_latency_us, 100);
        assert_eq!(metrics.max_latency_us, 500);
        assert_eq!(metrics.average_latency_us(), 300);
    }

    #[tokio::test]
    async fn test_in_memory_state() {
        let state = AppState::in_memory(AppConfig::default());
        assert!(state.store_ready().await);
        assert_eq!(state.increment_requests(), 0);
        assert_eq!(state.get_request_count(), 1);

        state.record_request("/health".to_string(), 200, 10).await;
        assert_eq!(state.metrics.read().await["/health"].latency_count, 1);
    }
}
