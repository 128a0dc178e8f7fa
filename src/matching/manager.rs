// src/matching/manager.rs

use std::collections::HashSet;

use log::info;

use crate::matching::{email, name, url};
use crate::models::stats_models::MatchReasonStats;
use crate::models::{CandidateGroup, Lead, LeadId, MatchReason};
use crate::utils::logging::DetectionLogger;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Raw output of one signal pass, before threshold and cross-pass dedupe.
#[derive(Debug, Default)]
pub(crate) struct PassOutput {
    pub candidates: Vec<CandidateGroup>,
    pub buckets_total: usize,
    pub buckets_skipped: usize,
}

/// `true` when a bucket is too large for the pairwise passes. A cap of 0
/// disables the check.
pub(crate) fn exceeds_bucket_cap(bucket_len: usize, max_bucket_size: usize) -> bool {
    max_bucket_size > 0 && bucket_len > max_bucket_size
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupingOptions {
    pub min_confidence: f64,
    /// Largest bucket the name+domain and domain passes will score; 0 = unlimited
    pub max_bucket_size: usize,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_bucket_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupingOutcome {
    pub groups: Vec<CandidateGroup>,
    pub reason_stats: Vec<MatchReasonStats>,
}

/// Finds candidate duplicate groups whose confidence is at least `min_confidence`.
pub fn find_duplicate_groups(leads: &[Lead], min_confidence: f64) -> Vec<CandidateGroup> {
    let options = GroupingOptions {
        min_confidence,
        ..GroupingOptions::default()
    };
    find_duplicate_groups_with_options(leads, &options).groups
}

/// Runs the email, name+domain and domain passes in that order.
///
/// An id-set claimed by an earlier pass is never emitted again, so the most
/// specific signal wins; a different id-set (e.g. a superset found by the
/// domain pass) is its own group.
pub fn find_duplicate_groups_with_options(leads: &[Lead], options: &GroupingOptions) -> GroupingOutcome {
    if leads.len() < 2 {
        return GroupingOutcome {
            groups: Vec::new(),
            reason_stats: MatchReason::PRIORITY
                .iter()
                .map(|r| MatchReasonStats::empty(*r))
                .collect(),
        };
    }

    info!(
        "Finding duplicate groups across {} leads (min confidence {:.2})",
        leads.len(),
        options.min_confidence
    );

    let mut claimed: HashSet<Vec<LeadId>> = HashSet::new();
    let mut groups = Vec::new();
    let mut reason_stats = Vec::with_capacity(MatchReason::PRIORITY.len());

    for reason in MatchReason::PRIORITY {
        let logger = DetectionLogger::new(reason);
        logger.log_start(leads.len());

        let output = match reason {
            MatchReason::SameEmail => email::find_email_groups(leads),
            MatchReason::SameDomainName => name::find_domain_name_groups(leads, options.max_bucket_size),
            MatchReason::SameDomain => url::find_domain_groups(leads, options.max_bucket_size),
        };
        let raw_count = output.candidates.len();

        let mut below_threshold = 0usize;
        let mut already_claimed = 0usize;
        let mut accepted = Vec::new();
        for candidate in output.candidates {
            if candidate.lead_ids.len() < 2 {
                continue;
            }
            if candidate.confidence < options.min_confidence {
                below_threshold += 1;
                continue;
            }
            if !claimed.insert(candidate.lead_ids.clone()) {
                already_claimed += 1;
                continue;
            }
            accepted.push(candidate);
        }

        logger.log_buckets(output.buckets_total, raw_count, output.buckets_skipped, options.max_bucket_size);
        logger.log_filtering(raw_count, accepted.len(), below_threshold, already_claimed);

        let stats = MatchReasonStats::from_groups(reason, &accepted, output.buckets_skipped);
        logger.log_completion(&stats);
        reason_stats.push(stats);
        groups.extend(accepted);
    }

    info!("Found {} candidate duplicate groups", groups.len());
    GroupingOutcome { groups, reason_stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::email::SAME_EMAIL_CONFIDENCE;
    use crate::models::MatchedField;

    fn sample_population() -> Vec<Lead> {
        vec![
            Lead::new(1, 1, "Acme Inc").with_website("acme.com").with_emails(["jane@acme.com"]),
            Lead::new(2, 1, "ACME Inc.").with_website("www.acme.com").with_emails(["Jane@Acme.com"]),
            Lead::new(3, 1, "Acme Incorporated").with_website("https://acme.com/about"),
            Lead::new(4, 1, "Globex").with_website("globex.com").with_emails(["ops@globex.com"]),
            Lead::new(5, 1, "Globex Corporation").with_website("globex.com"),
            Lead::new(6, 1, "Initech").with_emails(["bill@initech.com", "ops@globex.com"]),
            Lead::new(7, 1, "Umbrella"),
        ]
    }

    #[test]
    fn test_empty_and_single_population() {
        assert!(find_duplicate_groups(&[], 0.0).is_empty());
        let one = vec![Lead::new(1, 1, "Acme").with_emails(["a@x.com"])];
        assert!(find_duplicate_groups(&one, 0.0).is_empty());
    }

    #[test]
    fn test_shared_email_scenario() {
        let leads = vec![
            Lead::new(1, 1, "").with_emails(["a@x.com"]),
            Lead::new(2, 1, "").with_emails(["a@x.com"]),
        ];
        let groups = find_duplicate_groups(&leads, 0.7);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].lead_ids, vec![1, 2]);
        assert_eq!(groups[0].confidence, 0.95);
        assert_eq!(groups[0].match_reason, MatchReason::SameEmail);
        assert_eq!(groups[0].matched_fields.iter().copied().collect::<Vec<_>>(), vec![MatchedField::Email]);
    }

    #[test]
    fn test_name_and_domain_scenario_wins_over_domain_only() {
        let leads = vec![
            Lead::new(1, 1, "Acme Inc").with_website("acme.com"),
            Lead::new(2, 1, "Acme Incorporated").with_website("acme.com"),
        ];
        let groups = find_duplicate_groups(&leads, 0.7);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.match_reason, MatchReason::SameDomainName);
        assert_eq!(group.lead_ids, vec![1, 2]);
        assert!((0.6..=0.9).contains(&group.confidence));

        // Even with no threshold the domain pass must not repeat the id-set.
        let groups = find_duplicate_groups(&leads, 0.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].match_reason, MatchReason::SameDomainName);
    }

    #[test]
    fn test_groups_are_bounded_and_never_singletons() {
        for threshold in [0.0, 0.5, 0.7, 0.95] {
            for group in find_duplicate_groups(&sample_population(), threshold) {
                assert!(group.lead_ids.len() >= 2);
                assert!((0.0..=1.0).contains(&group.confidence));
                assert!(group.confidence >= threshold);
                if group.match_reason == MatchReason::SameEmail {
                    assert_eq!(group.confidence, SAME_EMAIL_CONFIDENCE);
                }
            }
        }
    }

    #[test]
    fn test_no_duplicate_id_sets_across_passes() {
        let groups = find_duplicate_groups(&sample_population(), 0.0);
        let mut seen = HashSet::new();
        for group in &groups {
            assert!(seen.insert(group.lead_ids.clone()), "repeated {:?}", group.lead_ids);
        }
    }

    #[test]
    fn test_superset_from_weaker_signal_is_separate_group() {
        let groups = find_duplicate_groups(&sample_population(), 0.0);
        let email_pair = groups
            .iter()
            .find(|g| g.match_reason == MatchReason::SameEmail && g.lead_ids == vec![1, 2]);
        assert!(email_pair.is_some());

        let name_domain = groups
            .iter()
            .find(|g| g.match_reason == MatchReason::SameDomainName && g.lead_ids == vec![1, 2, 3]);
        assert!(name_domain.is_some());
    }

    #[test]
    fn test_threshold_filters_weak_domain_groups() {
        let leads = vec![
            Lead::new(1, 1, "Alpha").with_website("shared.io"),
            Lead::new(2, 1, "Zulu").with_website("shared.io"),
        ];
        assert!(find_duplicate_groups(&leads, 0.7).is_empty());
        let groups = find_duplicate_groups(&leads, 0.5);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].match_reason, MatchReason::SameDomain);
    }

    #[test]
    fn test_reason_stats_follow_pass_order() {
        let outcome = find_duplicate_groups_with_options(&sample_population(), &GroupingOptions::default());
        let reasons: Vec<MatchReason> = outcome.reason_stats.iter().map(|s| s.match_reason).collect();
        assert_eq!(reasons, MatchReason::PRIORITY.to_vec());
        let total: usize = outcome.reason_stats.iter().map(|s| s.groups_found).sum();
        assert_eq!(total, outcome.groups.len());
    }
}
