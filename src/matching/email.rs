// src/matching/email.rs

use std::collections::BTreeMap;

use log::debug;

use crate::matching::manager::PassOutput;
use crate::models::{CandidateGroup, Lead, LeadId, MatchReason, MatchedField};

/// Fixed confidence for leads sharing an email address.
pub const SAME_EMAIL_CONFIDENCE: f64 = 0.95;

/// Lowercases and trims. Empty input stays empty.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Email-identity pass: every normalized email shared by two or more leads
/// becomes a candidate group. A lead listing several emails can land in
/// several buckets.
pub(crate) fn find_email_groups(leads: &[Lead]) -> PassOutput {
    let mut email_map: BTreeMap<String, Vec<LeadId>> = BTreeMap::new();
    let mut invalid_formats = 0usize;

    for lead in leads {
        for email in &lead.emails {
            let normalized = normalize_email(email);
            if normalized.is_empty() {
                invalid_formats += 1;
                continue;
            }
            let entry = email_map.entry(normalized).or_default();
            if !entry.contains(&lead.id) {
                entry.push(lead.id);
            }
        }
    }

    if invalid_formats > 0 {
        debug!("[EMAIL] skipped {} blank email values", invalid_formats);
    }

    let buckets_total = email_map.len();
    let candidates: Vec<CandidateGroup> = email_map
        .into_iter()
        .filter(|(_, ids)| ids.len() >= 2)
        .map(|(email, ids)| {
            debug!("[EMAIL] '{}' shared by {} leads", email, ids.len());
            CandidateGroup::new(
                ids,
                SAME_EMAIL_CONFIDENCE,
                MatchReason::SameEmail,
                [MatchedField::Email],
            )
        })
        .collect();

    PassOutput {
        candidates,
        buckets_total,
        buckets_skipped: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
        assert_eq!(normalize_email("jane@example.com"), "jane@example.com");
        assert_eq!(normalize_email(""), "");
        assert_eq!(normalize_email("   "), "");
    }

    #[test]
    fn test_email_normalization_is_idempotent() {
        for raw in ["  A@X.com", "b+tag@Y.org ", "", "not-an-email", "ÉCOLE@Ville.fr"] {
            let once = normalize_email(raw);
            assert_eq!(normalize_email(&once), once);
        }
    }

    #[test]
    fn test_shared_email_forms_group() {
        let leads = vec![
            Lead::new(1, 1, "Acme").with_emails(["sales@acme.com"]),
            Lead::new(2, 1, "Acme Co").with_emails(["SALES@acme.com "]),
            Lead::new(3, 1, "Globex").with_emails(["info@globex.com"]),
        ];
        let output = find_email_groups(&leads);
        assert_eq!(output.candidates.len(), 1);
        assert_eq!(output.candidates[0].lead_ids, vec![1, 2]);
        assert_eq!(output.candidates[0].confidence, SAME_EMAIL_CONFIDENCE);
        assert_eq!(output.buckets_total, 2);
    }

    #[test]
    fn test_repeated_email_on_one_lead_is_not_a_group() {
        let leads = vec![
            Lead::new(1, 1, "Acme").with_emails(["a@acme.com", "A@acme.com"]),
            Lead::new(2, 1, "Other").with_emails(["b@acme.com"]),
        ];
        assert!(find_email_groups(&leads).candidates.is_empty());
    }

    #[test]
    fn test_blank_emails_ignored() {
        let leads = vec![
            Lead::new(1, 1, "Acme").with_emails([" "]),
            Lead::new(2, 1, "Globex").with_emails([""]),
        ];
        let output = find_email_groups(&leads);
        assert!(output.candidates.is_empty());
        assert_eq!(output.buckets_total, 0);
    }
}
