//! Periodic sync configuration

use std::time::Duration;

use super::error::ValidationError;

/// Periodic reconciliation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Whether `serve` runs the periodic sync
    pub enabled: bool,

    /// Minutes between cycles
    pub interval_minutes: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_minutes == 0 {
            return Err(ValidationError::InvalidSyncInterval);
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SyncConfig {
            interval_minutes: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidSyncInterval));
    }
}
