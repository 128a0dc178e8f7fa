// src/utils/progress_config.rs

use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::time::Duration;

/// Configuration for progress spinners around CLI operations
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress spinners at all
    pub enabled: bool,
    /// Refresh rate for spinners in milliseconds
    pub refresh_rate_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_rate_ms: 100,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            refresh_rate_ms: env::var("PROGRESS_REFRESH_RATE_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
        }
    }

    /// A ticking spinner with `message`, or `None` when progress output is off.
    pub fn spinner(&self, message: impl Into<String>) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.into());
        pb.enable_steady_tick(Duration::from_millis(self.refresh_rate_ms.max(1)));
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert_eq!(config.refresh_rate_ms, 100);
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_REFRESH_RATE_MS", "50");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert_eq!(config.refresh_rate_ms, 50);

        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_REFRESH_RATE_MS");
    }

    #[test]
    fn test_spinner_disabled() {
        let config = ProgressConfig {
            enabled: false,
            ..ProgressConfig::default()
        };
        assert!(config.spinner("Detecting").is_none());
    }
}
