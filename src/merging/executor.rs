// src/merging/executor.rs - Folds a duplicate group into its canonical lead

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::error::{DedupeError, DedupeResult};
use crate::merging::policy::{MergeField, MergeFieldPolicy, MergeStrategy};
use crate::models::{DuplicateGroupDetail, GroupStatus, Lead, LeadId};

/// What a store must write to complete a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Canonical lead with every member folded in
    pub canonical: Lead,
    /// Non-canonical members to delete, in member order
    pub delete_ids: Vec<LeadId>,
    /// Members whose lead row no longer exists
    pub skipped_ids: Vec<LeadId>,
}

/// Checks a loaded group against a merge request. Order: pending status,
/// canonical membership, canonical lead present.
pub fn check_merge_preconditions(detail: &DuplicateGroupDetail, canonical_lead_id: LeadId) -> DedupeResult<()> {
    if detail.group.status != GroupStatus::Pending {
        return Err(DedupeError::Conflict(format!(
            "duplicate group {} is already {}",
            detail.group.id, detail.group.status
        )));
    }
    if !detail.has_member(canonical_lead_id) {
        return Err(DedupeError::InvalidArgument(format!(
            "lead {} is not a member of duplicate group {}",
            canonical_lead_id, detail.group.id
        )));
    }
    let canonical_present = detail
        .members
        .iter()
        .any(|m| m.member.lead_id == canonical_lead_id && m.lead.is_some());
    if !canonical_present {
        return Err(DedupeError::not_found("lead", canonical_lead_id));
    }
    Ok(())
}

/// Computes the merged canonical lead without touching storage.
pub fn plan_merge(
    detail: &DuplicateGroupDetail,
    canonical_lead_id: LeadId,
    policy: &MergeFieldPolicy,
    now: DateTime<Utc>,
) -> DedupeResult<MergePlan> {
    check_merge_preconditions(detail, canonical_lead_id)?;

    let mut canonical = detail
        .members
        .iter()
        .find(|m| m.member.lead_id == canonical_lead_id)
        .and_then(|m| m.lead.clone())
        .ok_or_else(|| DedupeError::not_found("lead", canonical_lead_id))?;

    let mut others: Vec<&Lead> = Vec::new();
    let mut delete_ids = Vec::new();
    let mut skipped_ids = Vec::new();
    for m in &detail.members {
        if m.member.lead_id == canonical_lead_id {
            continue;
        }
        match &m.lead {
            Some(lead) => {
                others.push(lead);
                delete_ids.push(lead.id);
            }
            None => {
                warn!(
                    "Group {}: member lead {} no longer exists, skipping",
                    detail.group.id, m.member.lead_id
                );
                skipped_ids.push(m.member.lead_id);
            }
        }
    }

    for (field, strategy) in policy.iter() {
        if field.is_list() {
            if strategy == MergeStrategy::Union {
                let merged = union_values(list_values(&canonical, field), others.iter().map(|l| list_values(l, field)));
                *list_values_mut(&mut canonical, field) = merged;
            }
        } else {
            let value = match strategy {
                MergeStrategy::MostRecent => most_recent_value(&canonical, &others, field),
                MergeStrategy::FirstNonEmpty => first_non_empty_value(&canonical, &others, field),
                MergeStrategy::KeepCanonical | MergeStrategy::Union => continue,
            };
            if let Some(value) = value {
                set_scalar(&mut canonical, field, value);
            }
        }
        debug!("Group {}: {} merged with {}", detail.group.id, field, strategy);
    }

    canonical.updated_at = now;
    Ok(MergePlan {
        canonical,
        delete_ids,
        skipped_ids,
    })
}

fn list_values(lead: &Lead, field: MergeField) -> &[String] {
    match field {
        MergeField::Emails => &lead.emails,
        MergeField::Phones => &lead.phones,
        _ => &lead.sources,
    }
}

fn list_values_mut(lead: &mut Lead, field: MergeField) -> &mut Vec<String> {
    match field {
        MergeField::Emails => &mut lead.emails,
        MergeField::Phones => &mut lead.phones,
        _ => &mut lead.sources,
    }
}

/// First-seen order, no repeats; the canonical's own repeats are dropped too.
fn union_values<'a>(base: &'a [String], rest: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(base.len());
    for value in base.iter().chain(rest.flatten()) {
        if !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    merged
}

fn scalar_value(lead: &Lead, field: MergeField) -> Option<&str> {
    let raw = match field {
        MergeField::Name => Some(lead.name.as_str()),
        MergeField::Website => lead.website.as_deref(),
        MergeField::Address => lead.address.as_deref(),
        _ => None,
    };
    raw.filter(|v| !v.trim().is_empty())
}

fn set_scalar(lead: &mut Lead, field: MergeField, value: String) {
    match field {
        MergeField::Name => lead.name = value,
        MergeField::Website => lead.website = Some(value),
        MergeField::Address => lead.address = Some(value),
        _ => {}
    }
}

/// Running best over canonical then members; only a strictly newer
/// `updated_at` replaces the current pick.
fn most_recent_value(canonical: &Lead, others: &[&Lead], field: MergeField) -> Option<String> {
    let mut best: Option<(&str, DateTime<Utc>)> = scalar_value(canonical, field).map(|v| (v, canonical.updated_at));
    for lead in others {
        if let Some(value) = scalar_value(lead, field) {
            match best {
                Some((_, at)) if lead.updated_at <= at => {}
                _ => best = Some((value, lead.updated_at)),
            }
        }
    }
    best.map(|(v, _)| v.to_string())
}

fn first_non_empty_value(canonical: &Lead, others: &[&Lead], field: MergeField) -> Option<String> {
    std::iter::once(canonical)
        .chain(others.iter().copied())
        .find_map(|lead| scalar_value(lead, field))
        .map(str::to_string)
}
