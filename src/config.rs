use std::path::PathBuf;
use std::time::Duration;

use crate::model::Ms;

const WAL_FILE_NAME: &str = "appointments.wal";

/// Runtime settings of an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// Longest a mutation waits for a doctor's lock before failing with `LockTimeout`.
    pub lock_timeout: Duration,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    /// Refuse cancellations closer than this to the appointment start. Disabled when `None`.
    pub min_cancel_notice: Option<Ms>,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            lock_timeout: Duration::from_millis(2_000),
            compact_threshold: 1_000,
            min_cancel_notice: None,
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    /// Read `SLOTWISE_*` variables, falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("SLOTWISE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let lock_timeout = lookup("SLOTWISE_LOCK_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.lock_timeout);
        let compact_threshold = lookup("SLOTWISE_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        let min_cancel_notice = lookup("SLOTWISE_MIN_CANCEL_NOTICE_MS").and_then(|s| s.parse().ok());
        let metrics_port = lookup("SLOTWISE_METRICS_PORT").and_then(|s| s.parse().ok());
        Self {
            data_dir,
            lock_timeout,
            compact_threshold,
            min_cancel_notice,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let cfg = EngineConfig::from_lookup(|_| None);
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("SLOTWISE_DATA_DIR", "/var/lib/slotwise"),
            ("SLOTWISE_LOCK_TIMEOUT_MS", "250"),
            ("SLOTWISE_COMPACT_THRESHOLD", "not-a-number"),
            ("SLOTWISE_MIN_CANCEL_NOTICE_MS", "7200000"),
            ("SLOTWISE_METRICS_PORT", "9100"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/slotwise"));
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.compact_threshold, 1_000);
        assert_eq!(cfg.min_cancel_notice, Some(7_200_000));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/slotwise/appointments.wal"));
    }
}
