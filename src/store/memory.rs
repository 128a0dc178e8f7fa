// src/store/memory.rs - In-process store backing the library's tests

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use tokio::sync::Mutex;

use crate::error::{DedupeError, DedupeResult};
use crate::merging::{plan_merge, MergeFieldPolicy};
use crate::models::stats_models::DuplicateStats;
use crate::models::{
    CandidateGroup, DuplicateGroup, DuplicateGroupDetail, DuplicateGroupId, DuplicateMember, GroupStatus, Lead,
    LeadId, MemberDetail, OrganizationId, OverlapPolicy, WorkspaceId,
};
use crate::store::{resolve_overlap, DuplicateStore, OverlapDecision, SaveOutcome};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    leads: BTreeMap<LeadId, Lead>,
    groups: BTreeMap<DuplicateGroupId, DuplicateGroup>,
    members: BTreeMap<i64, DuplicateMember>,
    next_group_id: DuplicateGroupId,
    next_member_id: i64,
}

impl MemoryState {
    fn detail(&self, group: &DuplicateGroup) -> DuplicateGroupDetail {
        let members = self
            .members
            .values()
            .filter(|m| m.duplicate_group_id == group.id)
            .map(|m| MemberDetail {
                member: m.clone(),
                lead: self
                    .leads
                    .get(&m.lead_id)
                    .filter(|l| l.organization_id == group.organization_id)
                    .cloned(),
            })
            .collect();
        DuplicateGroupDetail {
            group: group.clone(),
            members,
        }
    }

    fn group_in_org(&self, organization_id: OrganizationId, group_id: DuplicateGroupId) -> DedupeResult<&DuplicateGroup> {
        self.groups
            .get(&group_id)
            .filter(|g| g.organization_id == organization_id)
            .ok_or_else(|| DedupeError::not_found("duplicate group", group_id))
    }

    fn delete_group(&mut self, group_id: DuplicateGroupId) {
        self.groups.remove(&group_id);
        self.members.retain(|_, m| m.duplicate_group_id != group_id);
    }
}

/// [`DuplicateStore`] over a mutex-guarded map. Each call works on a copy of
/// the state and swaps it in on success, so a failed call leaves nothing behind.
#[derive(Debug, Default)]
pub struct InMemoryDuplicateStore {
    state: Mutex<MemoryState>,
    fail_next_commit: AtomicBool,
}

impl InMemoryDuplicateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leads(leads: impl IntoIterator<Item = Lead>) -> Self {
        let mut store = Self::default();
        {
            let state = store.state.get_mut();
            for lead in leads {
                state.leads.insert(lead.id, lead);
            }
        }
        store
    }

    pub async fn insert_lead(&self, lead: Lead) {
        self.state.lock().await.leads.insert(lead.id, lead);
    }

    /// Makes the next mutating call fail at commit time with a storage error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn commit(&self, state: &mut MemoryState, working: MemoryState, operation: &str) -> DedupeResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DedupeError::TransientStorage(format!(
                "Failed to commit {}: injected failure",
                operation
            )));
        }
        *state = working;
        Ok(())
    }
}

#[async_trait]
impl DuplicateStore for InMemoryDuplicateStore {
    async fn load_leads(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
    ) -> DedupeResult<Vec<Lead>> {
        let state = self.state.lock().await;
        Ok(state
            .leads
            .values()
            .filter(|l| l.in_scope(organization_id, workspace_id))
            .cloned()
            .collect())
    }

    async fn find_lead(&self, organization_id: OrganizationId, lead_id: LeadId) -> DedupeResult<Option<Lead>> {
        let state = self.state.lock().await;
        Ok(state
            .leads
            .get(&lead_id)
            .filter(|l| l.organization_id == organization_id)
            .cloned())
    }

    async fn save_duplicate_groups(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        candidates: &[CandidateGroup],
        policy: OverlapPolicy,
    ) -> DedupeResult<SaveOutcome> {
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        let mut outcome = SaveOutcome::default();

        for candidate in candidates {
            let mut overlapping: HashMap<DuplicateGroupId, f64> = HashMap::new();
            for member in working.members.values() {
                if !candidate.overlaps(&[member.lead_id]) {
                    continue;
                }
                if let Some(group) = working.groups.get(&member.duplicate_group_id) {
                    if group.organization_id == organization_id && group.status == GroupStatus::Pending {
                        overlapping.insert(group.id, group.confidence_score);
                    }
                }
            }
            let overlapping: Vec<(DuplicateGroupId, f64)> = overlapping.into_iter().collect();

            let supersede = match resolve_overlap(candidate, &overlapping, policy) {
                OverlapDecision::Insert { supersede } => supersede,
                OverlapDecision::Skip => {
                    outcome.skipped += 1;
                    continue;
                }
            };
            for group_id in &supersede {
                working.delete_group(*group_id);
            }
            outcome.saved.retain(|g| !supersede.contains(&g.id));
            outcome.superseded.extend(supersede);

            working.next_group_id += 1;
            let now = Utc::now();
            let group = DuplicateGroup {
                id: working.next_group_id,
                organization_id,
                workspace_id,
                confidence_score: candidate.confidence,
                match_reason: candidate.match_reason,
                status: GroupStatus::Pending,
                canonical_lead_id: None,
                created_at: now,
                updated_at: now,
            };
            for lead_id in &candidate.lead_ids {
                working.next_member_id += 1;
                let member = DuplicateMember {
                    id: working.next_member_id,
                    duplicate_group_id: group.id,
                    lead_id: *lead_id,
                    similarity_score: candidate.confidence,
                    matched_fields: candidate.matched_fields.clone(),
                };
                working.members.insert(member.id, member);
            }
            working.groups.insert(group.id, group.clone());
            outcome.saved.push(group);
        }

        self.commit(&mut state, working, "duplicate groups")?;
        debug!(
            "Saved {} groups for org {} ({} skipped, {} superseded)",
            outcome.saved.len(),
            organization_id,
            outcome.skipped,
            outcome.superseded.len()
        );
        Ok(outcome)
    }

    async fn list_groups(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        status: Option<GroupStatus>,
    ) -> DedupeResult<Vec<DuplicateGroupDetail>> {
        let state = self.state.lock().await;
        let mut groups: Vec<&DuplicateGroup> = state
            .groups
            .values()
            .filter(|g| g.organization_id == organization_id)
            .filter(|g| workspace_id.map_or(true, |ws| g.workspace_id == Some(ws)))
            .filter(|g| status.map_or(true, |s| g.status == s))
            .collect();
        groups.sort_by(|a, b| {
            b.confidence_score
                .total_cmp(&a.confidence_score)
                .then(a.id.cmp(&b.id))
        });
        Ok(groups.into_iter().map(|g| state.detail(g)).collect())
    }

    async fn get_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroupDetail> {
        let state = self.state.lock().await;
        let group = state.group_in_org(organization_id, group_id)?;
        Ok(state.detail(group))
    }

    async fn merge_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
        canonical_lead_id: LeadId,
        policy: &MergeFieldPolicy,
    ) -> DedupeResult<Lead> {
        let mut state = self.state.lock().await;
        let detail = state.detail(state.group_in_org(organization_id, group_id)?);
        let now = Utc::now();
        let plan = plan_merge(&detail, canonical_lead_id, policy, now)?;

        let mut working = state.clone();
        working.leads.insert(plan.canonical.id, plan.canonical.clone());
        for lead_id in &plan.delete_ids {
            working.leads.remove(lead_id);
        }
        if let Some(group) = working.groups.get_mut(&group_id) {
            group.status = GroupStatus::Merged;
            group.canonical_lead_id = Some(canonical_lead_id);
            group.updated_at = now;
        }

        self.commit(&mut state, working, "merge")?;
        info!(
            "Merged group {} into lead {} ({} leads deleted)",
            group_id,
            canonical_lead_id,
            plan.delete_ids.len()
        );
        Ok(plan.canonical)
    }

    async fn ignore_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroup> {
        let mut state = self.state.lock().await;
        let group = state.group_in_org(organization_id, group_id)?;
        if group.status != GroupStatus::Pending {
            return Err(DedupeError::Conflict(format!(
                "duplicate group {} is already {}",
                group_id, group.status
            )));
        }

        let mut working = state.clone();
        let mut ignored = group.clone();
        ignored.status = GroupStatus::Ignored;
        ignored.updated_at = Utc::now();
        working.groups.insert(group_id, ignored.clone());

        self.commit(&mut state, working, "ignore")?;
        Ok(ignored)
    }

    async fn stats(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
    ) -> DedupeResult<DuplicateStats> {
        let state = self.state.lock().await;
        let mut stats = DuplicateStats::default();
        for group in state
            .groups
            .values()
            .filter(|g| g.organization_id == organization_id)
            .filter(|g| workspace_id.map_or(true, |ws| g.workspace_id == Some(ws)))
        {
            stats.total_groups += 1;
            match group.status {
                GroupStatus::Pending => stats.pending_groups += 1,
                GroupStatus::Merged => stats.merged_groups += 1,
                GroupStatus::Ignored => stats.ignored_groups += 1,
            }
            stats.total_duplicates += state
                .members
                .values()
                .filter(|m| m.duplicate_group_id == group.id)
                .count();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchReason, MatchedField};

    fn email_candidate(ids: Vec<LeadId>, confidence: f64) -> CandidateGroup {
        CandidateGroup::new(ids, confidence, MatchReason::SameEmail, [MatchedField::Email])
    }

    fn store() -> InMemoryDuplicateStore {
        InMemoryDuplicateStore::with_leads([
            Lead::new(1, 1, "Acme").with_phones(["555-1"]),
            Lead::new(2, 1, "Acme").with_phones(["555-2"]),
            Lead::new(3, 1, "Acme"),
            Lead::new(4, 2, "Other org"),
        ])
    }

    #[tokio::test]
    async fn test_save_skips_overlap_within_one_call() {
        let store = store();
        let outcome = store
            .save_duplicate_groups(
                1,
                None,
                &[email_candidate(vec![1, 2], 0.95), email_candidate(vec![2, 3], 0.95)],
                OverlapPolicy::KeepFirst,
            )
            .await
            .unwrap();
        assert_eq!(outcome.saved.len(), 1);
        assert_eq!(outcome.skipped, 1);

        let groups = store.list_groups(1, None, None).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].lead_ids(), vec![1, 2]);
        assert!(groups[0].members.iter().all(|m| m.member.similarity_score == 0.95));
    }

    #[tokio::test]
    async fn test_keep_highest_confidence_supersedes() {
        let store = store();
        store
            .save_duplicate_groups(1, None, &[email_candidate(vec![1, 2], 0.6)], OverlapPolicy::KeepFirst)
            .await
            .unwrap();
        let outcome = store
            .save_duplicate_groups(
                1,
                None,
                &[email_candidate(vec![2, 3], 0.9)],
                OverlapPolicy::KeepHighestConfidence,
            )
            .await
            .unwrap();
        assert_eq!(outcome.superseded, vec![1]);

        let groups = store.list_groups(1, None, None).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].lead_ids(), vec![2, 3]);
        assert_eq!(store.stats(1, None).await.unwrap().total_duplicates, 2);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let store = store();
        store
            .save_duplicate_groups(1, None, &[email_candidate(vec![1, 2], 0.95)], OverlapPolicy::KeepFirst)
            .await
            .unwrap();

        store.fail_next_commit();
        let err = store
            .merge_group(1, 1, 1, &MergeFieldPolicy::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        assert!(store.find_lead(1, 2).await.unwrap().is_some());
        let group = store.get_group(1, 1).await.unwrap();
        assert_eq!(group.group.status, GroupStatus::Pending);
        assert_eq!(group.group.canonical_lead_id, None);
        assert_eq!(store.find_lead(1, 1).await.unwrap().unwrap().phones, vec!["555-1"]);
    }

    #[tokio::test]
    async fn test_groups_are_scoped_to_organization() {
        let store = store();
        store
            .save_duplicate_groups(1, None, &[email_candidate(vec![1, 2], 0.95)], OverlapPolicy::KeepFirst)
            .await
            .unwrap();
        assert!(matches!(
            store.get_group(2, 1).await,
            Err(DedupeError::NotFound { .. })
        ));
        assert!(store.list_groups(2, None, None).await.unwrap().is_empty());
        assert!(store.find_lead(1, 4).await.unwrap().is_none());
        assert_eq!(store.load_leads(2, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_workspace_scoping() {
        let store = InMemoryDuplicateStore::with_leads([
            Lead::new(1, 1, "North").with_workspace(10),
            Lead::new(2, 1, "North").with_workspace(10),
            Lead::new(3, 1, "South").with_workspace(20),
            Lead::new(4, 1, "South").with_workspace(20),
            Lead::new(5, 1, "Unassigned"),
        ]);
        assert_eq!(store.load_leads(1, None).await.unwrap().len(), 5);
        let north: Vec<LeadId> = store.load_leads(1, Some(10)).await.unwrap().iter().map(|l| l.id).collect();
        assert_eq!(north, vec![1, 2]);

        store
            .save_duplicate_groups(1, Some(10), &[email_candidate(vec![1, 2], 0.95)], OverlapPolicy::KeepFirst)
            .await
            .unwrap();
        store
            .save_duplicate_groups(1, Some(20), &[email_candidate(vec![3, 4], 0.95)], OverlapPolicy::KeepFirst)
            .await
            .unwrap();

        let groups = store.list_groups(1, Some(20), None).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group.workspace_id, Some(20));
        assert_eq!(groups[0].lead_ids(), vec![3, 4]);
        assert!(store.list_groups(1, Some(30), None).await.unwrap().is_empty());
        assert_eq!(store.list_groups(1, None, None).await.unwrap().len(), 2);

        let stats = store.stats(1, Some(10)).await.unwrap();
        assert_eq!(stats.total_groups, 1);
        assert_eq!(stats.total_duplicates, 2);
        assert_eq!(store.stats(1, None).await.unwrap().total_groups, 2);
    }

    #[tokio::test]
    async fn test_list_orders_by_confidence_then_id() {
        let store = InMemoryDuplicateStore::with_leads((1..=6).map(|id| Lead::new(id, 1, "x")));
        store
            .save_duplicate_groups(
                1,
                None,
                &[
                    email_candidate(vec![1, 2], 0.6),
                    email_candidate(vec![3, 4], 0.9),
                    email_candidate(vec![5, 6], 0.6),
                ],
                OverlapPolicy::KeepFirst,
            )
            .await
            .unwrap();
        let ids: Vec<DuplicateGroupId> = store
            .list_groups(1, None, Some(GroupStatus::Pending))
            .await
            .unwrap()
            .iter()
            .map(|d| d.group.id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!(store
            .list_groups(1, None, Some(GroupStatus::Merged))
            .await
            .unwrap()
            .is_empty());
    }
}
