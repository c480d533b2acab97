//! Named registry of circuit breakers.
//!
//! # Responsibilities
//! - Create breakers once, at registration, and hand out shared references
//! - Aggregate state and metrics across every registered tier
//! - Administrative reset of all breakers
//!
//! # Design Decisions
//! - Constructed explicitly and passed to whoever needs it (no global)
//! - `register` returns the existing breaker on a duplicate name so startup
//!   code can be re-run; `try_register` is the strict variant
//! - The map is concurrent; breaker locking is independent of it

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::{BreakerConfig, ResilienceConfig};
use crate::resilience::circuit_breaker::{BreakerMetrics, CircuitBreaker, CircuitState};
use crate::resilience::errors::ManagerError;

/// Registry of breakers keyed by tier name.
#[derive(Debug, Default)]
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker for every tier named in `config`.
    pub fn from_config(config: &ResilienceConfig) -> Result<Self, ManagerError> {
        let manager = Self::new();
        for name in config.tier_names() {
            manager.register(&name, config.breaker_for(&name))?;
        }
        Ok(manager)
    }

    /// Register a breaker, or return the one already registered under `name`.
    ///
    /// `config` is validated even when the name already exists.
    pub fn register(
        &self,
        name: &str,
        config: BreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ManagerError> {
        config.validate()?;

        match self.breakers.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get().config() != &config {
                    tracing::debug!(
                        circuit = %name,
                        "Breaker already registered, keeping its original configuration"
                    );
                }
                Ok(existing.get().clone())
            }
            Entry::Vacant(slot) => {
                let breaker = Arc::new(CircuitBreaker::new(name, config)?);
                tracing::info!(
                    circuit = %name,
                    failure_threshold = breaker.config().failure_threshold,
                    recovery_timeout_secs = breaker.config().recovery_timeout_secs,
                    "Circuit breaker registered"
                );
                slot.insert(breaker.clone());
                Ok(breaker)
            }
        }
    }

    /// Register a breaker, failing if the name is taken.
    pub fn try_register(
        &self,
        name: &str,
        config: BreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ManagerError> {
        config.validate()?;

        match self.breakers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ManagerError::Duplicate(name.to_string())),
            Entry::Vacant(slot) => {
                let breaker = Arc::new(CircuitBreaker::new(name, config)?);
                slot.insert(breaker.clone());
                tracing::info!(circuit = %name, "Circuit breaker registered");
                Ok(breaker)
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<CircuitBreaker>, ManagerError> {
        self.breakers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))
    }

    /// Remove a breaker. Callers still holding it keep a working instance,
    /// but later lookups fail.
    pub fn unregister(&self, name: &str) -> Result<(), ManagerError> {
        match self.breakers.remove(name) {
            Some(_) => {
                tracing::info!(circuit = %name, "Circuit breaker unregistered");
                Ok(())
            }
            None => Err(ManagerError::NotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.breakers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub fn all_states(&self) -> BTreeMap<String, CircuitState> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().state()))
            .collect()
    }

    pub fn all_metrics(&self) -> BTreeMap<String, BreakerMetrics> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().metrics()))
            .collect()
    }

    /// Manually reset one breaker.
    pub fn reset(&self, name: &str) -> Result<(), ManagerError> {
        self.get(name)?.reset();
        Ok(())
    }

    /// Manually reset every registered breaker.
    pub fn reset_all(&self) {
        // Collect first so no shard lock is held while breakers log.
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();
        for breaker in &breakers {
            breaker.reset();
        }
        tracing::info!(count = breakers.len(), "All circuit breakers reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_register_returns_existing() {
        let manager = CircuitBreakerManager::new();
        let first = manager.register("primary", quick()).unwrap();
        let second = manager.register("primary", BreakerConfig::default()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().failure_threshold, 1);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_try_register_rejects_duplicate() {
        let manager = CircuitBreakerManager::new();
        manager.try_register("primary", quick()).unwrap();
        let err = manager.try_register("primary", quick()).unwrap_err();
        assert_eq!(err, ManagerError::Duplicate("primary".into()));
    }

    #[test]
    fn test_register_validates_config() {
        let manager = CircuitBreakerManager::new();
        let err = manager
            .register(
                "primary",
                BreakerConfig {
                    success_threshold: 0,
                    ..BreakerConfig::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidConfig(ref e) if e.field == "success_threshold"));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_get_and_unregister() {
        let manager = CircuitBreakerManager::new();
        assert_eq!(
            manager.get("primary").unwrap_err(),
            ManagerError::NotFound("primary".into())
        );

        manager.register("primary", quick()).unwrap();
        assert!(manager.get("primary").is_ok());

        manager.unregister("primary").unwrap();
        assert!(manager.get("primary").is_err());
        assert!(manager.unregister("primary").is_err());
    }

    #[tokio::test]
    async fn test_aggregates_and_reset_all() {
        let manager = CircuitBreakerManager::new();
        let primary = manager.register("primary", quick()).unwrap();
        manager.register("secondary", quick()).unwrap();

        let _ = primary.call(|| async { Err::<(), _>("down") }).await;

        let states = manager.all_states();
        assert_eq!(states["primary"], CircuitState::Open);
        assert_eq!(states["secondary"], CircuitState::Closed);
        assert_eq!(manager.all_metrics()["primary"].total_trips, 1);
        assert_eq!(manager.names(), vec!["primary", "secondary"]);

        manager.reset_all();
        assert!(manager
            .all_states()
            .values()
            .all(|s| *s == CircuitState::Closed));
    }

    #[test]
    fn test_from_config_registers_every_tier() {
        let mut config = ResilienceConfig::default();
        config.tiers.insert(
            "cache".into(),
            crate::config::TierOverrides {
                failure_threshold: Some(9),
                ..Default::default()
            },
        );

        let manager = CircuitBreakerManager::from_config(&config).unwrap();
        assert_eq!(
            manager.names(),
            vec!["cache", "primary", "secondary", "tertiary"]
        );
        assert_eq!(manager.get("cache").unwrap().config().failure_threshold, 9);
    }
}
