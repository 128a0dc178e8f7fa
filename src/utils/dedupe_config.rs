//! Detection settings shared by the CLI and the service layer.

use log::{debug, info, warn};
use std::env;

use crate::error::{DedupeError, DedupeResult};
use crate::matching::manager::{GroupingOptions, DEFAULT_MIN_CONFIDENCE};
use crate::models::OverlapPolicy;

/// No cap: every bucket with two or more leads is scored.
pub const DEFAULT_MAX_BUCKET_SIZE: usize = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct DedupeConfig {
    /// Default threshold when a caller does not pass one
    pub min_confidence: f64,
    /// How insert-time overlap with open groups is resolved
    pub overlap_policy: OverlapPolicy,
    /// Bucket size cap for the pairwise passes; 0 disables it
    pub max_bucket_size: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            overlap_policy: OverlapPolicy::KeepFirst,
            max_bucket_size: DEFAULT_MAX_BUCKET_SIZE,
        }
    }
}

impl DedupeConfig {
    /// Create configuration from environment variables. Unparseable values
    /// fall back to defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let min_confidence = match env::var("DEDUPE_MIN_CONFIDENCE") {
            Ok(raw) => match raw.trim().parse::<f64>().map_err(|e| e.to_string()).and_then(|v| {
                validate_min_confidence(v).map_err(|e| e.to_string())
            }) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Ignoring DEDUPE_MIN_CONFIDENCE='{}': {}", raw, e);
                    defaults.min_confidence
                }
            },
            Err(_) => defaults.min_confidence,
        };

        let overlap_policy = match env::var("DEDUPE_OVERLAP_POLICY") {
            Ok(raw) => raw.parse::<OverlapPolicy>().unwrap_or_else(|e| {
                warn!("Ignoring DEDUPE_OVERLAP_POLICY: {}", e);
                defaults.overlap_policy
            }),
            Err(_) => defaults.overlap_policy,
        };

        let max_bucket_size = env::var("DEDUPE_MAX_BUCKET_SIZE")
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(defaults.max_bucket_size);

        let config = Self {
            min_confidence,
            overlap_policy,
            max_bucket_size,
        };
        debug!("Dedupe config from env: {:?}", config);
        config
    }

    pub fn grouping_options(&self, min_confidence: Option<f64>) -> DedupeResult<GroupingOptions> {
        let min_confidence = validate_min_confidence(min_confidence.unwrap_or(self.min_confidence))?;
        Ok(GroupingOptions {
            min_confidence,
            max_bucket_size: self.max_bucket_size,
        })
    }

    pub fn log_config(&self) {
        info!("🔍 Duplicate detection settings");
        info!("   Default min confidence: {:.2}", self.min_confidence);
        info!("   Overlap policy: {}", self.overlap_policy.as_str());
        if self.max_bucket_size > 0 {
            info!("   Bucket size cap: {}", self.max_bucket_size);
        } else {
            info!("   Bucket size cap: disabled");
        }
    }
}

pub fn validate_min_confidence(value: f64) -> DedupeResult<f64> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(DedupeError::InvalidArgument(format!(
            "min_confidence must be within [0, 1], got {}",
            value
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("DEDUPE_MIN_CONFIDENCE", "0.85");
        env::set_var("DEDUPE_OVERLAP_POLICY", "keep-highest-confidence");
        env::set_var("DEDUPE_MAX_BUCKET_SIZE", "0");

        let config = DedupeConfig::from_env();
        assert_eq!(config.min_confidence, 0.85);
        assert_eq!(config.overlap_policy, OverlapPolicy::KeepHighestConfidence);
        assert_eq!(config.max_bucket_size, 0);

        env::set_var("DEDUPE_MIN_CONFIDENCE", "1.5");
        env::set_var("DEDUPE_OVERLAP_POLICY", "whatever");
        env::set_var("DEDUPE_MAX_BUCKET_SIZE", "-3");

        let config = DedupeConfig::from_env();
        assert_eq!(config, DedupeConfig::default());

        env::remove_var("DEDUPE_MIN_CONFIDENCE");
        env::remove_var("DEDUPE_OVERLAP_POLICY");
        env::remove_var("DEDUPE_MAX_BUCKET_SIZE");
    }

    #[test]
    fn test_grouping_options_override() {
        let config = DedupeConfig::default();
        let options = config.grouping_options(Some(0.9)).unwrap();
        assert_eq!(options.min_confidence, 0.9);
        assert_eq!(options.max_bucket_size, 0);

        let options = config.grouping_options(None).unwrap();
        assert_eq!(options.min_confidence, DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn test_default_config_matches_grouping_defaults() {
        let options = DedupeConfig::default().grouping_options(None).unwrap();
        let defaults = GroupingOptions::default();
        assert_eq!(options.min_confidence, defaults.min_confidence);
        assert_eq!(options.max_bucket_size, defaults.max_bucket_size);

        env::set_var("DEDUPE_MAX_BUCKET_SIZE", "250");
        assert_eq!(DedupeConfig::from_env().max_bucket_size, 250);
        env::remove_var("DEDUPE_MAX_BUCKET_SIZE");
    }

    #[test]
    fn test_invalid_min_confidence_rejected() {
        let config = DedupeConfig::default();
        assert!(matches!(
            config.grouping_options(Some(-0.1)),
            Err(DedupeError::InvalidArgument(_))
        ));
        assert!(config.grouping_options(Some(f64::NAN)).is_err());
        assert!(config.grouping_options(Some(1.0)).is_ok());
    }
}
