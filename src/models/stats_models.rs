// src/models/stats_models.rs

use serde::{Deserialize, Serialize};

use crate::models::duplicate::{CandidateGroup, MatchReason};

/// Per-pass statistics for one detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReasonStats {
    pub match_reason: MatchReason,
    pub groups_found: usize,
    pub leads_matched: usize,
    pub avg_confidence: f64,
    pub avg_group_size: f64,
    /// Buckets skipped for exceeding the configured bucket size cap
    pub buckets_skipped: usize,
}

impl MatchReasonStats {
    pub fn empty(match_reason: MatchReason) -> Self {
        Self {
            match_reason,
            groups_found: 0,
            leads_matched: 0,
            avg_confidence: 0.0,
            avg_group_size: 0.0,
            buckets_skipped: 0,
        }
    }

    pub fn from_groups(match_reason: MatchReason, groups: &[CandidateGroup], buckets_skipped: usize) -> Self {
        if groups.is_empty() {
            return Self {
                buckets_skipped,
                ..Self::empty(match_reason)
            };
        }
        let leads_matched: usize = groups.iter().map(|g| g.lead_ids.len()).sum();
        let total_confidence: f64 = groups.iter().map(|g| g.confidence).sum();
        Self {
            match_reason,
            groups_found: groups.len(),
            leads_matched,
            avg_confidence: total_confidence / groups.len() as f64,
            avg_group_size: leads_matched as f64 / groups.len() as f64,
            buckets_skipped,
        }
    }
}

/// Result of a detect-and-save run, the body of `POST /duplicates/detect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub leads_scanned: usize,
    pub groups_found: usize,
    pub groups_saved: usize,
    /// Pending groups removed in favor of a more confident candidate
    pub groups_superseded: usize,
    pub min_confidence: f64,
    pub reason_stats: Vec<MatchReasonStats>,
    pub duration_secs: f64,
}

/// Body of `GET /duplicates/stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DuplicateStats {
    pub total_groups: usize,
    pub pending_groups: usize,
    pub merged_groups: usize,
    pub ignored_groups: usize,
    pub total_duplicates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::duplicate::MatchedField;

    #[test]
    fn test_reason_stats_averages() {
        let groups = vec![
            CandidateGroup::new(vec![1, 2], 0.95, MatchReason::SameEmail, [MatchedField::Email]),
            CandidateGroup::new(vec![3, 4, 5, 6], 0.95, MatchReason::SameEmail, [MatchedField::Email]),
        ];
        let stats = MatchReasonStats::from_groups(MatchReason::SameEmail, &groups, 1);
        assert_eq!(stats.groups_found, 2);
        assert_eq!(stats.leads_matched, 6);
        assert!((stats.avg_confidence - 0.95).abs() < 1e-9);
        assert!((stats.avg_group_size - 3.0).abs() < 1e-9);
        assert_eq!(stats.buckets_skipped, 1);
    }

    #[test]
    fn test_reason_stats_empty() {
        let stats = MatchReasonStats::from_groups(MatchReason::SameDomain, &[], 0);
        assert_eq!(stats, MatchReasonStats::empty(MatchReason::SameDomain));
    }
}
