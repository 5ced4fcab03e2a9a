//! Liveness/readiness tracking for the command plane's own health endpoint.

use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub last_check: Instant,
}

impl ComponentHealth {
    pub fn new(name: String) -> Self {
        Self {
            name,
            status: HealthStatus::Healthy,
            message: "OK".to_string(),
            last_check: Instant::now(),
        }
    }

    pub fn update(&mut self, status: HealthStatus, message: String) {
        self.status = status;
        self.message = message;
        self.last_check = Instant::now();
    }
}

/// Aggregates health across the command plane's components (store
/// connectivity, the connection registry, the scheduling loop) into a
/// single status for `/healthz`.
pub struct HealthChecker {
    components: Arc<Mutex<std::collections::HashMap<String, ComponentHealth>>>,
    server_start_time: Instant,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            components: Arc::new(Mutex::new(std::collections::HashMap::new())),
            server_start_time: Instant::now(),
        }
    }

    pub fn register_component(&self, name: String) {
        let mut components = self.components.lock().unwrap();
        components.insert(name.clone(), ComponentHealth::new(name));
    }

    pub fn update_component(&self, name: &str, status: HealthStatus, message: String) {
        let mut components = self.components.lock().unwrap();
        if let Some(component) = components.get_mut(name) {
            component.update(status, message);
        }
    }

    pub fn check_liveness(&self) -> (bool, String) {
        let uptime = self.server_start_time.elapsed();
        (true, format!("server running, uptime {:?}", uptime))
    }

    pub fn check_readiness(&self) -> (bool, String) {
        let components = self.components.lock().unwrap();
        if let Some(store) = components.get("store") {
            match store.status {
                HealthStatus::Healthy => (true, "ready".to_string()),
                HealthStatus::Degraded => (true, "degraded".to_string()),
                HealthStatus::Unhealthy => {
                    (false, format!("store unhealthy: {}", store.message))
                }
            }
        } else {
            (true, "ready (store not checked)".to_string())
        }
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let components = self.components.lock().unwrap();

        let mut has_unhealthy = false;
        let mut has_degraded = false;
        for component in components.values() {
            match component.status {
                HealthStatus::Unhealthy => has_unhealthy = true,
                HealthStatus::Degraded => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn get_component_statuses(&self) -> std::collections::HashMap<String, bool> {
        let components = self.components.lock().unwrap();
        components
            .iter()
            .map(|(name, component)| (name.clone(), component.status == HealthStatus::Healthy))
            .collect()
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_component_reports_ready() {
        let checker = HealthChecker::new();
        let (ready, _) = checker.check_readiness();
        assert!(ready);
    }

    #[test]
    fn unhealthy_component_marks_overall_unhealthy() {
        let checker = HealthChecker::new();
        checker.register_component("store".to_string());
        checker.update_component("store", HealthStatus::Unhealthy, "connection refused".into());
        assert_eq!(checker.get_health_status(), HealthStatus::Unhealthy);
        let (ready, _) = checker.check_readiness();
        assert!(!ready);
    }
}
