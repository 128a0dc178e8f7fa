// src/matching/name.rs

use std::collections::BTreeMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::matching::manager::{exceeds_bucket_cap, PassOutput};
use crate::matching::similarity::average_pairwise_similarity;
use crate::matching::url::normalize_domain;
use crate::models::{CandidateGroup, Lead, LeadId, MatchReason, MatchedField};

pub const SAME_DOMAIN_NAME_BASE_CONFIDENCE: f64 = 0.6;
pub const SAME_DOMAIN_NAME_WEIGHT: f64 = 0.3;
pub const SAME_DOMAIN_NAME_MAX_CONFIDENCE: f64 = 0.9;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").unwrap());

/// Legal-form tokens dropped from the end of a company name when building
/// the bucket key. Checked repeatedly so "acme holdings co ltd" loses both.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "llc",
    "llp",
    "lp",
    "ltd",
    "limited",
    "plc",
    "gmbh",
    "ag",
    "sa",
    "sarl",
    "bv",
    "nv",
    "pty",
    "srl",
    "spa",
];

/// Lowercases, collapses whitespace runs to one space and trims.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bucket key for the name+domain pass: the normalized name without
/// punctuation, a leading "the", or trailing legal-form suffixes.
///
/// Names made only of a suffix ("Inc.") keep their punctuation-free form so
/// they still key on something.
pub fn name_key(name: &str) -> String {
    let normalized = normalize_name(name);
    let without_punct = PUNCTUATION.replace_all(&normalized, " ");
    let mut tokens: Vec<&str> = without_punct.split_whitespace().collect();
    let full = tokens.join(" ");

    if tokens.len() > 1 && tokens[0] == "the" {
        tokens.remove(0);
    }
    while tokens.len() > 1 {
        match tokens.last() {
            Some(last) if LEGAL_SUFFIXES.contains(last) => {
                tokens.pop();
            }
            _ => break,
        }
    }

    let key = tokens.join(" ");
    if key.is_empty() {
        full
    } else {
        key
    }
}

/// Confidence for leads sharing domain and name key: 0.6 + 0.3 x average
/// pairwise name similarity, held to [0.6, 0.9].
pub fn domain_name_confidence(names: &[&str]) -> f64 {
    let avg = average_pairwise_similarity(names).unwrap_or(0.0);
    (SAME_DOMAIN_NAME_BASE_CONFIDENCE + avg * SAME_DOMAIN_NAME_WEIGHT)
        .clamp(SAME_DOMAIN_NAME_BASE_CONFIDENCE, SAME_DOMAIN_NAME_MAX_CONFIDENCE)
}

/// Name+domain pass. Leads without a name key or a domain are not
/// considered.
pub(crate) fn find_domain_name_groups(leads: &[Lead], max_bucket_size: usize) -> PassOutput {
    let mut bucket_map: BTreeMap<(String, String), Vec<&Lead>> = BTreeMap::new();
    for lead in leads {
        let Some(website) = lead.website.as_deref() else {
            continue;
        };
        let domain = normalize_domain(website);
        let key = name_key(&lead.name);
        if domain.is_empty() || key.is_empty() {
            continue;
        }
        bucket_map.entry((key, domain)).or_default().push(lead);
    }

    let buckets_total = bucket_map.len();
    let mut buckets_skipped = 0usize;
    let mut candidates = Vec::new();

    for ((key, domain), bucket) in bucket_map {
        if bucket.len() < 2 {
            continue;
        }
        if exceeds_bucket_cap(bucket.len(), max_bucket_size) {
            debug!(
                "[DOMAIN_NAME] skipping '{}' @ '{}': {} leads exceeds cap {}",
                key,
                domain,
                bucket.len(),
                max_bucket_size
            );
            buckets_skipped += 1;
            continue;
        }

        let names: Vec<String> = bucket.iter().map(|l| normalize_name(&l.name)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let confidence = domain_name_confidence(&name_refs);
        let ids: Vec<LeadId> = bucket.iter().map(|l| l.id).collect();

        debug!(
            "[DOMAIN_NAME] '{}' @ '{}' shared by {} leads (confidence {:.3})",
            key,
            domain,
            ids.len(),
            confidence
        );
        candidates.push(CandidateGroup::new(
            ids,
            confidence,
            MatchReason::SameDomainName,
            [MatchedField::Name, MatchedField::Website],
        ));
    }

    PassOutput {
        candidates,
        buckets_total,
        buckets_skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_name("  Acme   Inc "), "acme inc");
        assert_eq!(normalize_name("ACME\tInc\n"), "acme inc");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_name_normalization_is_idempotent() {
        for raw in ["  Acme   Inc ", "The  Globex Corporation", "", " \t ", "Müller & Söhne GmbH"] {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once);
        }
    }

    #[test]
    fn test_name_key_strips_legal_forms() {
        assert_eq!(name_key("Acme Inc"), "acme");
        assert_eq!(name_key("Acme Incorporated"), "acme");
        assert_eq!(name_key("ACME, Inc."), "acme");
        assert_eq!(name_key("The Globex Corporation"), "globex");
        assert_eq!(name_key("Initech Holdings Co. Ltd"), "initech holdings");
        assert_eq!(name_key("Inc."), "inc");
        assert_eq!(name_key("   "), "");
    }

    #[test]
    fn test_domain_name_confidence_range() {
        assert!((domain_name_confidence(&["acme", "acme"]) - 0.9).abs() < 1e-9);
        let c = domain_name_confidence(&["acme inc", "acme incorporated"]);
        assert!((0.6..=0.9).contains(&c));
        assert!(c > 0.7);
    }

    #[test]
    fn test_pass_groups_equivalent_names_on_same_domain() {
        let leads = vec![
            Lead::new(1, 1, "Acme Inc").with_website("acme.com"),
            Lead::new(2, 1, "Acme Incorporated").with_website("https://www.acme.com"),
            Lead::new(3, 1, "Acme Labs").with_website("acme.com"),
            Lead::new(4, 1, "Acme Inc").with_website("acme.io"),
        ];
        let output = find_domain_name_groups(&leads, 0);
        assert_eq!(output.candidates.len(), 1);
        let group = &output.candidates[0];
        assert_eq!(group.lead_ids, vec![1, 2]);
        assert_eq!(group.match_reason, MatchReason::SameDomainName);
        assert!(group.matched_fields.contains(&MatchedField::Name));
        assert!(group.matched_fields.contains(&MatchedField::Website));
    }

    #[test]
    fn test_pass_ignores_leads_without_name_or_site() {
        let leads = vec![
            Lead::new(1, 1, "").with_website("acme.com"),
            Lead::new(2, 1, "").with_website("acme.com"),
            Lead::new(3, 1, "Acme"),
            Lead::new(4, 1, "Acme"),
        ];
        assert!(find_domain_name_groups(&leads, 0).candidates.is_empty());
    }
}
