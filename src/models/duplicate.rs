// src/models/duplicate.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DedupeError;
use crate::models::lead::{Lead, LeadId, OrganizationId, WorkspaceId};

pub type DuplicateGroupId = i64;
pub type DuplicateMemberId = i64;

/// The signal that put a set of leads into one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// At least one normalized email shared by every lead
    SameEmail,
    /// Same normalized domain and equivalent company name
    SameDomainName,
    /// Same normalized domain only
    SameDomain,
}

impl MatchReason {
    /// Passes run in this order; earlier reasons win identical lead sets.
    pub const PRIORITY: [MatchReason; 3] = [
        MatchReason::SameEmail,
        MatchReason::SameDomainName,
        MatchReason::SameDomain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameEmail => "same_email",
            Self::SameDomainName => "same_domain_name",
            Self::SameDomain => "same_domain",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchReason {
    type Err = DedupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "same_email" => Ok(Self::SameEmail),
            "same_domain_name" => Ok(Self::SameDomainName),
            "same_domain" => Ok(Self::SameDomain),
            other => Err(DedupeError::InvalidArgument(format!(
                "unknown match reason '{}'",
                other
            ))),
        }
    }
}

/// Lead fields that contributed to a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    Email,
    Name,
    Website,
}

impl MatchedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Name => "name",
            Self::Website => "website",
        }
    }
}

impl FromStr for MatchedField {
    type Err = DedupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "name" => Ok(Self::Name),
            "website" => Ok(Self::Website),
            other => Err(DedupeError::InvalidArgument(format!(
                "unknown matched field '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle of a duplicate group. `Merged` and `Ignored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    Merged,
    Ignored,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Merged => "merged",
            Self::Ignored => "ignored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupStatus {
    type Err = DedupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "merged" => Ok(Self::Merged),
            "ignored" => Ok(Self::Ignored),
            other => Err(DedupeError::InvalidArgument(format!(
                "unknown group status '{}'",
                other
            ))),
        }
    }
}

/// What to do with a detected group that shares leads with an open (pending) group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    /// Drop the new candidate; the first-seen pending group stands.
    #[default]
    KeepFirst,
    /// Replace the overlapping pending groups when the candidate is strictly
    /// more confident than all of them, otherwise drop the candidate.
    KeepHighestConfidence,
}

impl OverlapPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeepFirst => "keep-first",
            Self::KeepHighestConfidence => "keep-highest-confidence",
        }
    }
}

impl FromStr for OverlapPolicy {
    type Err = DedupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "keep-first" => Ok(Self::KeepFirst),
            "keep-highest-confidence" => Ok(Self::KeepHighestConfidence),
            other => Err(DedupeError::InvalidArgument(format!(
                "unknown overlap policy '{}'",
                other
            ))),
        }
    }
}

/// A cluster of leads believed to be the same real-world company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: DuplicateGroupId,
    pub organization_id: OrganizationId,
    pub workspace_id: Option<WorkspaceId>,

    /// Aggregate confidence for the group (0.0-1.0)
    pub confidence_score: f64,

    pub match_reason: MatchReason,
    pub status: GroupStatus,

    /// Surviving lead, set once the group is merged
    pub canonical_lead_id: Option<LeadId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One lead's participation in a duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub id: DuplicateMemberId,
    pub duplicate_group_id: DuplicateGroupId,
    pub lead_id: LeadId,
    pub similarity_score: f64,
    pub matched_fields: BTreeSet<MatchedField>,
}

/// Grouper output before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateGroup {
    /// Sorted ascending, no repeats, at least two entries
    pub lead_ids: Vec<LeadId>,
    pub confidence: f64,
    pub match_reason: MatchReason,
    pub matched_fields: BTreeSet<MatchedField>,
}

impl CandidateGroup {
    pub fn new(
        mut lead_ids: Vec<LeadId>,
        confidence: f64,
        match_reason: MatchReason,
        matched_fields: impl IntoIterator<Item = MatchedField>,
    ) -> Self {
        lead_ids.sort_unstable();
        lead_ids.dedup();
        Self {
            lead_ids,
            confidence: confidence.clamp(0.0, 1.0),
            match_reason,
            matched_fields: matched_fields.into_iter().collect(),
        }
    }

    pub fn overlaps(&self, lead_ids: &[LeadId]) -> bool {
        lead_ids.iter().any(|id| self.lead_ids.binary_search(id).is_ok())
    }
}

/// Member row joined with the lead it points at. `lead` is `None` once the
/// lead was merged away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDetail {
    #[serde(flatten)]
    pub member: DuplicateMember,
    pub lead: Option<Lead>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroupDetail {
    #[serde(flatten)]
    pub group: DuplicateGroup,
    pub members: Vec<MemberDetail>,
}

impl DuplicateGroupDetail {
    pub fn lead_ids(&self) -> Vec<LeadId> {
        self.members.iter().map(|m| m.member.lead_id).collect()
    }

    pub fn has_member(&self, lead_id: LeadId) -> bool {
        self.members.iter().any(|m| m.member.lead_id == lead_id)
    }
}
