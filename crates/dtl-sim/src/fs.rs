//! `InMemoryFileSystem`: an in-memory `FileSystemBackend`.
//!
//! Files are tracked by name and size only; no bytes are ever stored —
//! the DTL never moves real user data. `append`/`read` return simulated
//! elapsed time derived from a flat disk bandwidth and per-operation
//! latency, the same shape of model `dtl-core`'s File engine
//! already assumes its `FileSystemBackend` collaborator provides.

use std::collections::HashMap;
use std::sync::Mutex;

use dtl_core::FileSystemBackend;
use log::{debug, warn};

/// Simulated sequential disk bandwidth (1 GB/s).
pub const DEFAULT_BANDWIDTH_BYTES_PER_SEC: f64 = 1.0e9;
/// Fixed per-operation latency charged on top of the bandwidth term.
pub const DEFAULT_LATENCY_SECS: f64 = 1.0e-4;

#[derive(Debug)]
pub struct InMemoryFileSystem {
    files: Mutex<HashMap<String, u64>>,
    bandwidth_bytes_per_sec: f64,
    latency_secs: f64,
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            bandwidth_bytes_per_sec: DEFAULT_BANDWIDTH_BYTES_PER_SEC,
            latency_secs: DEFAULT_LATENCY_SECS,
        }
    }

    pub fn with_bandwidth(bandwidth_bytes_per_sec: f64, latency_secs: f64) -> Self {
        Self { files: Mutex::new(HashMap::new()), bandwidth_bytes_per_sec, latency_secs }
    }

    fn transfer_time(&self, bytes: u64) -> f64 {
        self.latency_secs + (bytes as f64) / self.bandwidth_bytes_per_sec
    }
}

impl FileSystemBackend for InMemoryFileSystem {
    fn create(&self, path: &str) -> Result<(), String> {
        let mut guard = self.files.lock().unwrap();
        if !guard.contains_key(path) {
            guard.insert(path.to_string(), 0);
            debug!("fs: created '{path}'");
        }
        Ok(())
    }

    fn append(&self, path: &str, bytes: u64) -> Result<f64, String> {
        let mut guard = self.files.lock().unwrap();
        *guard.entry(path.to_string()).or_insert(0) += bytes;
        let elapsed = self.transfer_time(bytes);
        debug!("fs: appended {bytes} bytes to '{path}' ({elapsed:.6}s)");
        Ok(elapsed)
    }

    fn read(&self, path: &str, offset: u64, bytes: u64) -> Result<f64, String> {
        let guard = self.files.lock().unwrap();
        let size = guard.get(path).copied().ok_or_else(|| {
            warn!("fs: read of '{path}' failed, no such file");
            format!("no such file '{path}'")
        })?;
        if offset.saturating_add(bytes) > size {
            warn!("fs: read of {bytes} bytes at offset {offset} exceeds '{path}' size {size}");
            return Err(format!("read of {bytes} bytes at offset {offset} exceeds '{path}' size {size}"));
        }
        Ok(self.transfer_time(bytes))
    }

    fn size(&self, path: &str) -> Option<u64> {
        self.files.lock().unwrap().get(path).copied()
    }

    fn list_dir(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files.lock().unwrap().keys().filter(|p| p.starts_with(&prefix)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_size_and_charges_bandwidth_time() {
        let fs = InMemoryFileSystem::with_bandwidth(1000.0, 0.0);
        fs.create("/scratch/data.0").unwrap();
        let elapsed = fs.append("/scratch/data.0", 2000).unwrap();
        assert_eq!(elapsed, 2.0);
        assert_eq!(fs.size("/scratch/data.0"), Some(2000));
    }

    #[test]
    fn read_past_written_size_errors() {
        let fs = InMemoryFileSystem::new();
        fs.create("/scratch/data.0").unwrap();
        fs.append("/scratch/data.0", 100).unwrap();
        assert!(fs.read("/scratch/data.0", 0, 200).is_err());
        assert!(fs.read("/scratch/data.0", 0, 100).is_ok());
    }

    #[test]
    fn read_missing_file_errors() {
        let fs = InMemoryFileSystem::new();
        assert!(fs.read("/scratch/nope", 0, 1).is_err());
    }

    #[test]
    fn list_dir_returns_only_matching_prefix() {
        let fs = InMemoryFileSystem::new();
        fs.create("/scratch/data.0").unwrap();
        fs.create("/scratch/data.1").unwrap();
        fs.create("/other/data.0").unwrap();
        let mut names = fs.list_dir("/scratch");
        names.sort();
        assert_eq!(names, vec!["/scratch/data.0".to_string(), "/scratch/data.1".to_string()]);
    }
}
