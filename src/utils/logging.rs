// src/utils/logging.rs - Logging helpers for the detection passes and the merge flow
use log::{info, warn};
use std::time::Instant;

use crate::models::stats_models::{DetectionSummary, MatchReasonStats};
use crate::models::MatchReason;

fn reason_label(reason: MatchReason) -> (&'static str, &'static str) {
    match reason {
        MatchReason::SameEmail => ("EMAIL", "📧"),
        MatchReason::SameDomainName => ("DOMAIN_NAME", "🏷️"),
        MatchReason::SameDomain => ("DOMAIN", "🌐"),
    }
}

#[derive(Clone)]
pub struct DetectionLogger {
    pass_name: &'static str,
    pass_emoji: &'static str,
    start_time: Instant,
}

impl DetectionLogger {
    pub fn new(reason: MatchReason) -> Self {
        let (pass_name, pass_emoji) = reason_label(reason);
        Self {
            pass_name,
            pass_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, lead_count: usize) {
        info!(
            "[{}] {} 🚀 Starting {} pass over {} leads",
            self.pass_name,
            self.pass_emoji,
            self.pass_name.to_lowercase(),
            lead_count
        );
    }

    pub fn log_buckets(&self, buckets_total: usize, multi_lead_buckets: usize, skipped: usize, cap: usize) {
        info!(
            "[{}] {} 📊 {} normalized keys → {} with 2+ leads",
            self.pass_name, self.pass_emoji, buckets_total, multi_lead_buckets
        );
        if skipped > 0 {
            warn!(
                "[{}] {} ⚠️  Skipped {} buckets larger than {} leads",
                self.pass_name, self.pass_emoji, skipped, cap
            );
        }
    }

    pub fn log_filtering(&self, raw: usize, accepted: usize, below_threshold: usize, already_claimed: usize) {
        if raw == 0 {
            return;
        }
        info!(
            "[{}] {} 🎯 Candidates: {} raw → {} kept ({} below threshold, {} already grouped by a stronger signal)",
            self.pass_name, self.pass_emoji, raw, accepted, below_threshold, already_claimed
        );
    }

    pub fn log_completion(&self, stats: &MatchReasonStats) {
        info!(
            "[{}] {} ✅ {} groups, {} leads (avg confidence: {:.3}, avg size: {:.1}) in {:.2?}",
            self.pass_name,
            self.pass_emoji,
            stats.groups_found,
            stats.leads_matched,
            stats.avg_confidence,
            stats.avg_group_size,
            self.start_time.elapsed()
        );
    }
}

pub fn log_detection_summary(organization_id: i64, summary: &DetectionSummary) {
    info!("🎉 ===== DUPLICATE DETECTION COMPLETED (org {}) =====", organization_id);
    info!("   Leads scanned: {}", summary.leads_scanned);
    info!("   Groups found: {}", summary.groups_found);
    info!("   Groups saved: {}", summary.groups_saved);
    if summary.groups_superseded > 0 {
        info!("   Pending groups superseded: {}", summary.groups_superseded);
    }
    for stats in &summary.reason_stats {
        let (name, emoji) = reason_label(stats.match_reason);
        info!(
            "  {} {}: {} groups, {} leads (avg confidence: {:.3})",
            emoji, name, stats.groups_found, stats.leads_matched, stats.avg_confidence
        );
    }
    info!("   Duration: {:.2}s", summary.duration_secs);
}
