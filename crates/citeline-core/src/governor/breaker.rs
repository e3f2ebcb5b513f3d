use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before a tenant's breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker stays open before resetting.
    pub cooldown: Duration,
    /// Maximum tracked tenants; least-recently-used records are evicted.
    pub max_tenants: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            max_tenants: 1_024,
        }
    }
}

#[derive(Debug)]
struct TenantRecord {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Bounded per-tenant circuit-breaker table. One tenant's failures never
/// open another tenant's breaker.
pub struct BreakerTable {
    records: HashMap<String, TenantRecord>,
    access_order: Vec<String>,
    config: BreakerConfig,
}

impl BreakerTable {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            records: HashMap::new(),
            access_order: Vec::new(),
            config,
        }
    }

    /// Whether the tenant's breaker is currently open. An open breaker whose
    /// cooldown has elapsed resets automatically.
    pub fn is_open(&mut self, tenant: &str) -> bool {
        self.touch(tenant);
        let cooldown = self.config.cooldown;
        let Some(record) = self.records.get_mut(tenant) else {
            return false;
        };
        match record.opened_at {
            Some(opened) if opened.elapsed() >= cooldown => {
                record.opened_at = None;
                record.consecutive_failures = 0;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn record_failure(&mut self, tenant: &str) {
        let threshold = self.config.failure_threshold;
        let record = self
            .records
            .entry(tenant.to_string())
            .or_insert(TenantRecord {
                consecutive_failures: 0,
                opened_at: None,
            });
        record.consecutive_failures += 1;
        if record.consecutive_failures >= threshold && record.opened_at.is_none() {
            record.opened_at = Some(Instant::now());
            warn!(tenant, failures = record.consecutive_failures, "circuit breaker opened");
        }
        self.touch(tenant);
        self.evict_if_needed();
    }

    pub fn record_success(&mut self, tenant: &str) {
        self.touch(tenant);
        if let Some(record) = self.records.get_mut(tenant) {
            record.consecutive_failures = 0;
            record.opened_at = None;
        }
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.access_order.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn touch(&mut self, tenant: &str) {
        if !self.records.contains_key(tenant) {
            return;
        }
        if let Some(pos) = self.access_order.iter().position(|t| t == tenant) {
            let t = self.access_order.remove(pos);
            self.access_order.push(t);
        } else {
            self.access_order.push(tenant.to_string());
        }
    }

    fn evict_if_needed(&mut self) {
        while self.records.len() > self.config.max_tenants {
            // Oldest tracked tenant that actually has a record.
            let Some(pos) = self
                .access_order
                .iter()
                .position(|t| self.records.contains_key(t))
            else {
                break;
            };
            let evicted = self.access_order.remove(pos);
            self.records.remove(&evicted);
        }
        self.access_order
            .retain(|t| self.records.contains_key(t));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(threshold: u32, max_tenants: usize) -> BreakerTable {
        BreakerTable::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(20),
            max_tenants,
        })
    }

    #[test]
    fn opens_after_threshold() {
        let mut t = table(3, 16);
        t.record_failure("a");
        t.record_failure("a");
        assert!(!t.is_open("a"));
        t.record_failure("a");
        assert!(t.is_open("a"));
    }

    #[test]
    fn tenants_are_isolated() {
        let mut t = table(3, 16);
        for _ in 0..3 {
            t.record_failure("a");
        }
        assert!(t.is_open("a"));
        assert!(!t.is_open("b"));
    }

    #[test]
    fn success_resets_failure_count() {
        let mut t = table(3, 16);
        t.record_failure("a");
        t.record_failure("a");
        t.record_success("a");
        t.record_failure("a");
        t.record_failure("a");
        assert!(!t.is_open("a"));
    }

    #[test]
    fn cooldown_closes_breaker() {
        let mut t = table(1, 16);
        t.record_failure("a");
        assert!(t.is_open("a"));
        std::thread::sleep(Duration::from_millis(25));
        assert!(!t.is_open("a"));
    }

    #[test]
    fn eviction_bounds_tenant_count() {
        let mut t = table(3, 4);
        for i in 0..10 {
            t.record_failure(&format!("tenant-{i}"));
        }
        assert!(t.len() <= 4);
    }

    #[test]
    fn reset_clears_all_state() {
        let mut t = table(1, 16);
        t.record_failure("a");
        t.reset();
        assert!(t.is_empty());
        assert!(!t.is_open("a"));
    }
}
