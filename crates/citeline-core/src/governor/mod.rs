pub mod breaker;

pub use breaker::{BreakerConfig, BreakerTable};

use crate::error::{CitelineError, Result};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::{debug, warn};

/// Source of the available-memory figure, injectable for tests.
pub trait MemoryProbe: Send + Sync {
    fn available_bytes(&self) -> u64;
}

/// Production probe backed by sysinfo.
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemProbe {
    fn available_bytes(&self) -> u64 {
        let mut system = self.system.lock().expect("memory probe poisoned");
        system.refresh_memory();
        system.available_memory()
    }
}

/// Fixed probe for tests.
pub struct FixedProbe(pub u64);

impl MemoryProbe for FixedProbe {
    fn available_bytes(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Inputs above this size are spooled to disk instead of held in memory.
    pub spool_threshold: usize,
    /// Required free-memory multiple of the estimated working size.
    pub headroom_factor: u64,
    /// Minimum interval between probe reads; between reads the last figure
    /// is reused.
    pub check_interval: Duration,
    pub breaker: BreakerConfig,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            spool_threshold: 8 * 1024 * 1024,
            headroom_factor: 3,
            check_interval: Duration::from_secs(5),
            breaker: BreakerConfig::default(),
        }
    }
}

/// How an admitted input should be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    InMemory,
    SpillToDisk,
}

/// Per-tenant circuit breaker plus a throttled global memory-pressure check.
/// One instance per process; tests construct their own isolated instances.
pub struct MemoryGovernor {
    config: GovernorConfig,
    probe: Box<dyn MemoryProbe>,
    breakers: Mutex<BreakerTable>,
    last_check: Mutex<Option<(Instant, u64)>>,
}

impl MemoryGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            breakers: Mutex::new(BreakerTable::new(config.breaker.clone())),
            config,
            probe: Box::new(SystemProbe::new()),
            last_check: Mutex::new(None),
        }
    }

    pub fn with_probe(config: GovernorConfig, probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            breakers: Mutex::new(BreakerTable::new(config.breaker.clone())),
            config,
            probe,
            last_check: Mutex::new(None),
        }
    }

    /// Admit or reject work for a tenant. An open breaker rejects immediately
    /// without re-checking memory; a failed memory check increments only this
    /// tenant's failure counter.
    pub fn admit(&self, estimated_size: usize, tenant: &str) -> Result<Admission> {
        {
            let mut breakers = self.breakers.lock().expect("breaker table poisoned");
            if breakers.is_open(tenant) {
                return Err(CitelineError::CircuitOpen {
                    tenant: tenant.to_string(),
                });
            }
        }

        let available = self.available_throttled();
        let required = (estimated_size as u64).saturating_mul(self.config.headroom_factor);

        if available < required {
            let mut breakers = self.breakers.lock().expect("breaker table poisoned");
            breakers.record_failure(tenant);
            warn!(
                tenant,
                required,
                available,
                "rejecting oversized input under memory pressure"
            );
            return Err(CitelineError::MemoryPressure {
                required,
                available,
            });
        }

        let tight_headroom = available < required.saturating_mul(2);
        if estimated_size > self.config.spool_threshold || tight_headroom {
            debug!(tenant, estimated_size, "spilling input to disk");
            Ok(Admission::SpillToDisk)
        } else {
            Ok(Admission::InMemory)
        }
    }

    pub fn record_success(&self, tenant: &str) {
        self.breakers
            .lock()
            .expect("breaker table poisoned")
            .record_success(tenant);
    }

    pub fn record_failure(&self, tenant: &str) {
        self.breakers
            .lock()
            .expect("breaker table poisoned")
            .record_failure(tenant);
    }

    /// Clear breaker state and the probe throttle. Test/reset path.
    pub fn reset(&self) {
        self.breakers
            .lock()
            .expect("breaker table poisoned")
            .reset();
        *self.last_check.lock().expect("throttle poisoned") = None;
    }

    /// Run a closure inside a memory-tracked region, logging anomalous
    /// growth in the available-memory figure across the call.
    pub fn run_tracked<T>(&self, label: &str, f: impl FnOnce() -> T) -> T {
        let before = self.probe.available_bytes();
        let result = f();
        let after = self.probe.available_bytes();
        let consumed = before.saturating_sub(after);
        debug!(label, before, after, consumed, "memory-tracked region");
        if consumed > before / 2 {
            warn!(label, consumed, "region consumed more than half of available memory");
        }
        result
    }

    fn available_throttled(&self) -> u64 {
        let mut last = self.last_check.lock().expect("throttle poisoned");
        if let Some((at, value)) = *last {
            if at.elapsed() < self.config.check_interval {
                return value;
            }
        }
        let value = self.probe.available_bytes();
        *last = Some((Instant::now(), value));
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(available: u64) -> MemoryGovernor {
        MemoryGovernor::with_probe(
            GovernorConfig {
                check_interval: Duration::from_millis(0),
                ..GovernorConfig::default()
            },
            Box::new(FixedProbe(available)),
        )
    }

    #[test]
    fn small_input_admitted_in_memory() {
        let g = governor(1 << 30);
        assert_eq!(g.admit(1024, "a").unwrap(), Admission::InMemory);
    }

    #[test]
    fn large_input_spills_to_disk() {
        let g = governor(1 << 34);
        assert_eq!(
            g.admit(16 * 1024 * 1024, "a").unwrap(),
            Admission::SpillToDisk
        );
    }

    #[test]
    fn tight_headroom_spills_to_disk() {
        // available is between 3x and 6x the estimate: admitted, but spooled.
        let g = governor(4 * 1024 * 1024);
        assert_eq!(g.admit(1024 * 1024, "a").unwrap(), Admission::SpillToDisk);
    }

    #[test]
    fn insufficient_headroom_rejects() {
        let g = governor(1024);
        let err = g.admit(1024 * 1024, "a").unwrap_err();
        assert_eq!(err.code(), "memory_pressure");
        assert!(err.is_retryable());
    }

    #[test]
    fn repeated_failures_open_breaker_for_that_tenant_only() {
        let g = governor(1024);
        for _ in 0..3 {
            assert!(g.admit(1024 * 1024, "a").is_err());
        }
        let err = g.admit(1, "a").unwrap_err();
        assert_eq!(err.code(), "circuit_open");

        // Tenant B is admitted normally.
        let g2 = governor(1 << 30);
        assert!(g2.admit(1024, "b").is_ok());
    }

    #[test]
    fn reset_clears_breakers() {
        let g = governor(1024);
        for _ in 0..3 {
            let _ = g.admit(1024 * 1024, "a");
        }
        assert_eq!(g.admit(1, "a").unwrap_err().code(), "circuit_open");
        g.reset();
        // Still memory-pressure limited, but no longer circuit-open.
        assert_eq!(
            g.admit(1024 * 1024, "a").unwrap_err().code(),
            "memory_pressure"
        );
    }

    #[test]
    fn run_tracked_returns_closure_result() {
        let g = governor(1 << 30);
        assert_eq!(g.run_tracked("test", || 42), 42);
    }
}
