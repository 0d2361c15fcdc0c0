use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::ports::LedgerStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> DependencyStatus;
}

/// Round-trips the ledger store, whichever backend is configured.
pub struct StoreChecker {
    store: Arc<dyn LedgerStore>,
}

impl StoreChecker {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyChecker for StoreChecker {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.store.ping().await {
            Ok(()) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: e.to_string(),
            },
        }
    }
}

pub async fn check_health(checkers: &[&dyn DependencyChecker], start_time: Instant) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let checks = checkers.iter().map(|checker| async move {
        let status = timeout(timeout_duration, checker.check())
            .await
            .unwrap_or_else(|_| DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: "timeout".to_string(),
            });
        (checker.name().to_string(), status)
    });
    let dependencies: HashMap<_, _> = join_all(checks).await.into_iter().collect();

    HealthResponse {
        status: determine_overall_status(&dependencies),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let critical_deps = ["store"];
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical_deps.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryLedgerStore;

    struct Failing;

    #[async_trait]
    impl DependencyChecker for Failing {
        fn name(&self) -> &'static str {
            "store"
        }

        async fn check(&self) -> DependencyStatus {
            DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: "connection refused".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn memory_store_reports_healthy() {
        let checker = StoreChecker::new(Arc::new(MemoryLedgerStore::default()));
        let health = check_health(&[&checker], Instant::now()).await;

        assert_eq!(health.status, "healthy");
        assert!(matches!(
            health.dependencies["store"],
            DependencyStatus::Healthy { .. }
        ));
    }

    #[tokio::test]
    async fn failing_store_is_critical() {
        let health = check_health(&[&Failing], Instant::now()).await;
        assert_eq!(health.status, "unhealthy");
    }
}
