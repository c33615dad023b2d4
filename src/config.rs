use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 200;
pub const DEFAULT_TIMEOUT_MS: u64 = 1500;
pub const MAX_CONCURRENCY: usize = 5_000;

/// Engine knobs shared by the CLI and the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of workers, i.e. the bound on in-flight probes.
    pub concurrency: usize,
    /// Connect / read / TLS handshake deadline in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ScanConfig {
    pub fn new(concurrency: usize, timeout_ms: u64) -> Self {
        Self {
            concurrency,
            timeout_ms,
        }
    }

    /// Reject zero values and clamp concurrency to [`MAX_CONCURRENCY`].
    pub fn validate(self) -> Result<Self, ScanError> {
        if self.concurrency == 0 {
            return Err(ScanError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ScanError::InvalidConfig("timeout must be at least 1ms".into()));
        }
        Ok(Self {
            concurrency: self.concurrency.min(MAX_CONCURRENCY),
            ..self
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.concurrency, 200);
        assert_eq!(cfg.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: ScanConfig = serde_json::from_str(r#"{"timeout_ms": 50}"#).unwrap();
        assert_eq!(cfg, ScanConfig::new(DEFAULT_CONCURRENCY, 50));
    }

    #[test]
    fn validate_rejects_zero_and_clamps() {
        assert!(ScanConfig::new(0, 10).validate().is_err());
        assert!(ScanConfig::new(10, 0).validate().is_err());
        let cfg = ScanConfig::new(1_000_000, 10).validate().unwrap();
        assert_eq!(cfg.concurrency, MAX_CONCURRENCY);
    }
}
