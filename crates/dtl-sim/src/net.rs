//! `InMemoryNetwork`: an in-memory `NetworkBackend` backing the Staging
//! engine's MQ and Mailbox transports.
//!
//! Message queues are FIFO (`mq_push`/`mq_pop`): every publisher's push is
//! a transaction's worth of bytes, and a subscriber pops once per
//! publisher its selection intersects, matching
//! `original_source/test/python/dtl_staging_engine.py`'s
//! `run_test_multiple_pub_single_sub_message_queue`. Mailboxes hold a
//! single slot that a `mailbox_put` overwrites and a `mailbox_get` reads
//! without consuming, the way ADIOS2's SST mailbox delivers only the most
//! recent message to a late subscriber.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use dtl_core::NetworkBackend;
use log::{debug, warn};

/// Simulated network bandwidth (500 Mbps, matching the "internet" link in
/// `original_source/test/python/dtl_staging_engine.py`'s platform setup).
pub const DEFAULT_BANDWIDTH_BYTES_PER_SEC: f64 = 500.0e6 / 8.0;
/// Fixed per-message latency.
pub const DEFAULT_LATENCY_SECS: f64 = 1.0e-3;

#[derive(Debug, Default)]
struct NetworkInner {
    queues: HashMap<String, VecDeque<u64>>,
    mailboxes: HashMap<String, u64>,
}

#[derive(Debug)]
pub struct InMemoryNetwork {
    inner: Mutex<NetworkInner>,
    bandwidth_bytes_per_sec: f64,
    latency_secs: f64,
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(NetworkInner::default()),
            bandwidth_bytes_per_sec: DEFAULT_BANDWIDTH_BYTES_PER_SEC,
            latency_secs: DEFAULT_LATENCY_SECS,
        }
    }

    pub fn with_bandwidth(bandwidth_bytes_per_sec: f64, latency_secs: f64) -> Self {
        Self { inner: Mutex::new(NetworkInner::default()), bandwidth_bytes_per_sec, latency_secs }
    }

    fn transfer_time(&self, bytes: u64) -> f64 {
        self.latency_secs + (bytes as f64) / self.bandwidth_bytes_per_sec
    }
}

impl NetworkBackend for InMemoryNetwork {
    fn mq_push(&self, queue: &str, bytes: u64) -> f64 {
        self.inner.lock().unwrap().queues.entry(queue.to_string()).or_default().push_back(bytes);
        debug!("net: pushed {bytes} bytes onto queue '{queue}'");
        self.transfer_time(bytes)
    }

    fn mq_pop(&self, queue: &str) -> f64 {
        let bytes = self.inner.lock().unwrap().queues.get_mut(queue).and_then(VecDeque::pop_front).unwrap_or(0);
        if bytes == 0 {
            warn!("net: popped from empty queue '{queue}'");
        }
        self.transfer_time(bytes)
    }

    fn mailbox_put(&self, mailbox: &str, bytes: u64) -> f64 {
        self.inner.lock().unwrap().mailboxes.insert(mailbox.to_string(), bytes);
        debug!("net: put {bytes} bytes into mailbox '{mailbox}'");
        self.transfer_time(bytes)
    }

    fn mailbox_get(&self, mailbox: &str) -> f64 {
        let bytes = self.inner.lock().unwrap().mailboxes.get(mailbox).copied().unwrap_or(0);
        self.transfer_time(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mq_is_fifo_across_multiple_publishers() {
        let net = InMemoryNetwork::with_bandwidth(1000.0, 0.0);
        net.mq_push("q", 1000);
        net.mq_push("q", 2000);
        assert_eq!(net.mq_pop("q"), 1.0);
        assert_eq!(net.mq_pop("q"), 2.0);
        assert_eq!(net.mq_pop("q"), 0.0);
    }

    #[test]
    fn mailbox_get_does_not_consume() {
        let net = InMemoryNetwork::with_bandwidth(1000.0, 0.0);
        net.mailbox_put("mbox", 500);
        assert_eq!(net.mailbox_get("mbox"), 0.5);
        assert_eq!(net.mailbox_get("mbox"), 0.5);
    }

    #[test]
    fn mailbox_put_overwrites_previous_message() {
        let net = InMemoryNetwork::with_bandwidth(1000.0, 0.0);
        net.mailbox_put("mbox", 500);
        net.mailbox_put("mbox", 100);
        assert_eq!(net.mailbox_get("mbox"), 0.1);
    }
}
