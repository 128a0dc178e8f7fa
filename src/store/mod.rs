// src/store/mod.rs - Persistence seam for leads and duplicate groups

use async_trait::async_trait;
use log::debug;

use crate::error::DedupeResult;
use crate::merging::MergeFieldPolicy;
use crate::models::stats_models::DuplicateStats;
use crate::models::{
    CandidateGroup, DuplicateGroup, DuplicateGroupDetail, DuplicateGroupId, GroupStatus, Lead, LeadId,
    OrganizationId, OverlapPolicy, WorkspaceId,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryDuplicateStore;
pub use postgres::PgDuplicateStore;

/// Result of persisting one batch of candidate groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOutcome {
    /// Newly inserted pending groups, in candidate order
    pub saved: Vec<DuplicateGroup>,
    /// Pending groups deleted in favor of a more confident candidate
    pub superseded: Vec<DuplicateGroupId>,
    /// Candidates dropped because they overlapped an open group
    pub skipped: usize,
}

/// Storage for leads and the duplicate groups found among them.
///
/// Every mutating call is all-or-nothing: an `Err` means nothing was written.
#[async_trait]
pub trait DuplicateStore: Send + Sync {
    /// Leads in scope, ordered by id. `None` workspace means the whole organization.
    async fn load_leads(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
    ) -> DedupeResult<Vec<Lead>>;

    async fn find_lead(&self, organization_id: OrganizationId, lead_id: LeadId) -> DedupeResult<Option<Lead>>;

    /// Inserts candidates as pending groups, resolving overlap with open
    /// groups of the organization according to `policy`.
    async fn save_duplicate_groups(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        candidates: &[CandidateGroup],
        policy: OverlapPolicy,
    ) -> DedupeResult<SaveOutcome>;

    /// Groups ordered by confidence descending, then id ascending.
    async fn list_groups(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        status: Option<GroupStatus>,
    ) -> DedupeResult<Vec<DuplicateGroupDetail>>;

    async fn get_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroupDetail>;

    /// Folds the group into `canonical_lead_id`, deletes the other member
    /// leads and marks the group merged. Returns the updated canonical lead.
    async fn merge_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
        canonical_lead_id: LeadId,
        policy: &MergeFieldPolicy,
    ) -> DedupeResult<Lead>;

    async fn ignore_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroup>;

    async fn stats(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
    ) -> DedupeResult<DuplicateStats>;
}

/// What to do with one candidate given the open groups it overlaps.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlapDecision {
    /// Insert the candidate after deleting these pending groups
    Insert { supersede: Vec<DuplicateGroupId> },
    Skip,
}

/// `overlapping` holds `(group id, confidence)` of every pending group that
/// shares at least one lead with the candidate.
pub fn resolve_overlap(
    candidate: &CandidateGroup,
    overlapping: &[(DuplicateGroupId, f64)],
    policy: OverlapPolicy,
) -> OverlapDecision {
    if overlapping.is_empty() {
        return OverlapDecision::Insert { supersede: Vec::new() };
    }
    match policy {
        OverlapPolicy::KeepFirst => {
            debug!(
                "Skipping {} candidate {:?}: overlaps {} pending group(s)",
                candidate.match_reason,
                candidate.lead_ids,
                overlapping.len()
            );
            OverlapDecision::Skip
        }
        OverlapPolicy::KeepHighestConfidence => {
            if overlapping.iter().all(|(_, conf)| candidate.confidence > *conf) {
                let mut supersede: Vec<DuplicateGroupId> = overlapping.iter().map(|(id, _)| *id).collect();
                supersede.sort_unstable();
                supersede.dedup();
                OverlapDecision::Insert { supersede }
            } else {
                OverlapDecision::Skip
            }
        }
    }
}
