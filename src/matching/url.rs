// src/matching/url.rs

use std::collections::BTreeMap;

use log::debug;
use url::{Host, Url as StdUrl};

use crate::matching::manager::{exceeds_bucket_cap, PassOutput};
use crate::matching::name::normalize_name;
use crate::matching::similarity::average_pairwise_similarity;
use crate::models::{CandidateGroup, Lead, LeadId, MatchReason, MatchedField};

pub const SAME_DOMAIN_BASE_CONFIDENCE: f64 = 0.5;
pub const SAME_DOMAIN_NAME_WEIGHT: f64 = 0.2;
pub const SAME_DOMAIN_MAX_CONFIDENCE: f64 = 0.7;

/// Reduces a URL or bare domain to its lowercase host without scheme, `www.`
/// prefix, port or path. Input the URL parser rejects, or that parses to an
/// IP address, is stripped by hand instead.
pub fn normalize_domain(url_or_domain: &str) -> String {
    let trimmed = url_or_domain.trim().to_lowercase();
    if trimmed.is_empty() {
        return trimmed;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.clone()
    } else {
        format!("https://{}", trimmed)
    };

    match StdUrl::parse(&with_scheme) {
        Ok(parsed) => match parsed.host() {
            Some(Host::Domain(host)) if !host.trim().is_empty() => strip_www(host.trim().to_string()),
            _ => strip_url_parts(&trimmed),
        },
        Err(_) => strip_url_parts(&trimmed),
    }
}

fn strip_url_parts(raw: &str) -> String {
    let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match host_port.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host_port,
    };
    strip_www(host.trim().to_string())
}

fn strip_www(mut host: String) -> String {
    while let Some(rest) = host.strip_prefix("www.") {
        if rest.is_empty() {
            break;
        }
        host = rest.to_string();
    }
    host
}

/// Confidence for leads that share only a domain: 0.5 + 0.2 x average
/// name similarity, or a flat 0.5 when no pair has names to compare.
pub fn domain_confidence(names: &[&str]) -> f64 {
    match average_pairwise_similarity(names) {
        Some(avg) => (SAME_DOMAIN_BASE_CONFIDENCE + avg * SAME_DOMAIN_NAME_WEIGHT)
            .clamp(SAME_DOMAIN_BASE_CONFIDENCE, SAME_DOMAIN_MAX_CONFIDENCE),
        None => SAME_DOMAIN_BASE_CONFIDENCE,
    }
}

/// Domain-only pass.
pub(crate) fn find_domain_groups(leads: &[Lead], max_bucket_size: usize) -> PassOutput {
    let mut domain_map: BTreeMap<String, Vec<&Lead>> = BTreeMap::new();
    for lead in leads {
        let Some(website) = lead.website.as_deref() else {
            continue;
        };
        let domain = normalize_domain(website);
        if domain.is_empty() {
            continue;
        }
        domain_map.entry(domain).or_default().push(lead);
    }

    let buckets_total = domain_map.len();
    let mut buckets_skipped = 0usize;
    let mut candidates = Vec::new();

    for (domain, bucket) in domain_map {
        if bucket.len() < 2 {
            continue;
        }
        if exceeds_bucket_cap(bucket.len(), max_bucket_size) {
            debug!(
                "[DOMAIN] skipping '{}': {} leads exceeds cap {}",
                domain,
                bucket.len(),
                max_bucket_size
            );
            buckets_skipped += 1;
            continue;
        }

        let names: Vec<String> = bucket.iter().map(|l| normalize_name(&l.name)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let confidence = domain_confidence(&name_refs);
        let ids: Vec<LeadId> = bucket.iter().map(|l| l.id).collect();

        debug!(
            "[DOMAIN] '{}' shared by {} leads (confidence {:.3})",
            domain,
            ids.len(),
            confidence
        );
        candidates.push(CandidateGroup::new(
            ids,
            confidence,
            MatchReason::SameDomain,
            [MatchedField::Website],
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
    fn test_domain_normalization() {
        assert_eq!(normalize_domain("https://www.Acme.com/about"), "acme.com");
        assert_eq!(normalize_domain("http://acme.com"), "acme.com");
        assert_eq!(normalize_domain("www.acme.com"), "acme.com");
        assert_eq!(normalize_domain("  ACME.com/contact?x=1 "), "acme.com");
        assert_eq!(normalize_domain("acme.com:8080/path"), "acme.com");
        assert_eq!(normalize_domain("shop.acme.co.uk"), "shop.acme.co.uk");
        assert_eq!(normalize_domain(""), "");
    }

    #[test]
    fn test_unparseable_domain_falls_back() {
        assert_eq!(normalize_domain("  Not A Domain "), "not a domain");
        assert_eq!(normalize_domain("https://acme.com:99999"), "acme.com");
        assert_eq!(normalize_domain("http://www.a b.com/about"), "a b.com");
        assert_eq!(normalize_domain("1.2.3"), "1.2.3");
        assert_eq!(normalize_domain("http://10.0.0.1:8080/x"), "10.0.0.1");
    }

    #[test]
    fn test_domain_normalization_is_idempotent() {
        let samples = [
            "https://www.Acme.com/about",
            "www.www.acme.com",
            "Not A Domain",
            "http://",
            "acme.com.",
            "user@acme.com",
            "https://[::1]:8080/",
            "https://acme.com:99999/path",
            "1.2.3",
            "",
        ];
        for raw in samples {
            let once = normalize_domain(raw);
            assert_eq!(normalize_domain(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn test_domain_confidence_range() {
        assert_eq!(domain_confidence(&["", ""]), SAME_DOMAIN_BASE_CONFIDENCE);
        assert!((domain_confidence(&["acme", "acme"]) - 0.7).abs() < 1e-9);
        let partial = domain_confidence(&["acme", "globex"]);
        assert!((0.5..=0.7).contains(&partial));
    }

    #[test]
    fn test_domain_pass_groups_shared_hosts() {
        let leads = vec![
            Lead::new(1, 1, "").with_website("https://acme.com"),
            Lead::new(2, 1, "").with_website("www.acme.com/team"),
            Lead::new(3, 1, "").with_website("globex.com"),
            Lead::new(4, 1, "No Site"),
        ];
        let output = find_domain_groups(&leads, 0);
        assert_eq!(output.candidates.len(), 1);
        let group = &output.candidates[0];
        assert_eq!(group.lead_ids, vec![1, 2]);
        assert_eq!(group.confidence, SAME_DOMAIN_BASE_CONFIDENCE);
        assert_eq!(group.match_reason, MatchReason::SameDomain);
    }

    #[test]
    fn test_domain_pass_respects_bucket_cap() {
        let leads: Vec<Lead> = (1..=4)
            .map(|id| Lead::new(id, 1, "Acme").with_website("acme.com"))
            .collect();
        let output = find_domain_groups(&leads, 3);
        assert!(output.candidates.is_empty());
        assert_eq!(output.buckets_skipped, 1);
    }
}
