//! `VirtualClock`: an in-memory `SimClock`.
//!
//! Tracks a single simulated wall-clock time shared by every actor, plus a
//! per-host compute speed used to convert `charge_flops`' FLOPs into
//! elapsed seconds. There is no scheduler here: every call advances the
//! clock synchronously, matching how this workspace's tests drive actor
//! operations in scenario order rather than through real concurrency.

use std::collections::HashMap;
use std::sync::Mutex;

use dtl_core::SimClock;
use log::{debug, info};

/// FLOPs/second assumed for a host with no explicit entry in
/// `host_speeds` (1 Gf/s, matching the "1Gf" hosts in
/// `original_source/test/python/dtl_staging_engine.py`'s platform setup).
pub const DEFAULT_HOST_SPEED_FLOPS: f64 = 1.0e9;

#[derive(Debug, Default)]
struct ClockInner {
    now: f64,
    host_speeds: HashMap<String, f64>,
}

#[derive(Debug, Default)]
pub struct VirtualClock {
    inner: Mutex<ClockInner>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `host`'s compute speed in FLOPs/second, used by
    /// `charge_flops`. Hosts with no declared speed default to
    /// `DEFAULT_HOST_SPEED_FLOPS`.
    pub fn set_host_speed(&self, host: &str, flops_per_sec: f64) {
        self.inner.lock().unwrap().host_speeds.insert(host.to_string(), flops_per_sec);
        info!("clock: host '{host}' compute speed set to {flops_per_sec} flops/s");
    }
}

impl SimClock for VirtualClock {
    fn now(&self) -> f64 {
        self.inner.lock().unwrap().now
    }

    fn sleep_for(&self, secs: f64) {
        if secs > 0.0 {
            self.inner.lock().unwrap().now += secs;
        }
    }

    fn sleep_until(&self, t: f64) {
        let mut guard = self.inner.lock().unwrap();
        if t > guard.now {
            guard.now = t;
        }
    }

    fn charge_flops(&self, host: &str, flops: f64) {
        if flops <= 0.0 {
            return;
        }
        let mut guard = self.inner.lock().unwrap();
        let speed = guard.host_speeds.get(host).copied().unwrap_or(DEFAULT_HOST_SPEED_FLOPS);
        let elapsed = flops / speed;
        guard.now += elapsed;
        debug!("clock: charged {flops} flops to host '{host}' at {speed} flops/s ({elapsed:.6}s)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_for_advances_time_monotonically() {
        let clock = VirtualClock::new();
        clock.sleep_for(1.5);
        clock.sleep_for(0.5);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn sleep_until_never_moves_time_backward() {
        let clock = VirtualClock::new();
        clock.sleep_for(5.0);
        clock.sleep_until(2.0);
        assert_eq!(clock.now(), 5.0);
        clock.sleep_until(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn charge_flops_uses_declared_host_speed() {
        let clock = VirtualClock::new();
        clock.set_host_speed("host-0", 2.0);
        clock.charge_flops("host-0", 10.0);
        assert_eq!(clock.now(), 5.0);
    }

    #[test]
    fn charge_flops_falls_back_to_default_speed() {
        let clock = VirtualClock::new();
        clock.charge_flops("unknown-host", DEFAULT_HOST_SPEED_FLOPS);
        assert_eq!(clock.now(), 1.0);
    }
}
