// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio_postgres::{GenericClient, Row};

use crate::error::{DedupeError, DedupeResult};
use crate::merging::{plan_merge, MergeFieldPolicy};
use crate::models::stats_models::DuplicateStats;
use crate::models::{
    CandidateGroup, DuplicateGroup, DuplicateGroupDetail, DuplicateGroupId, DuplicateMember, GroupStatus, Lead,
    LeadId, MatchReason, MatchedField, MemberDetail, OrganizationId, OverlapPolicy, WorkspaceId,
};
use crate::store::{resolve_overlap, DuplicateStore, OverlapDecision, SaveOutcome};
use crate::utils::db_connect::PgPool;

const LOAD_LEADS_SQL: &str = "
    SELECT id, organization_id, workspace_id, name, website, emails, phones, sources,
           address, created_at, updated_at
    FROM public.leads
    WHERE organization_id = $1 AND ($2::BIGINT IS NULL OR workspace_id = $2)
    ORDER BY id";

const FIND_LEADS_SQL: &str = "
    SELECT id, organization_id, workspace_id, name, website, emails, phones, sources,
           address, created_at, updated_at
    FROM public.leads
    WHERE organization_id = $1 AND id = ANY($2)
    ORDER BY id";

const LOCK_LEADS_SQL: &str = "
    SELECT id, organization_id, workspace_id, name, website, emails, phones, sources,
           address, created_at, updated_at
    FROM public.leads
    WHERE organization_id = $1 AND id = ANY($2)
    ORDER BY id
    FOR UPDATE";

const ORG_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock($1)";

const OVERLAPPING_GROUPS_SQL: &str = "
    SELECT DISTINCT g.id, g.confidence_score
    FROM public.duplicate_groups g
    JOIN public.duplicate_group_members m ON m.duplicate_group_id = g.id
    WHERE g.organization_id = $1 AND g.status = 'pending' AND m.lead_id = ANY($2)";

const DELETE_GROUPS_SQL: &str = "
    DELETE FROM public.duplicate_groups
    WHERE id = ANY($1) AND status = 'pending'";

const INSERT_GROUP_SQL: &str = "
    INSERT INTO public.duplicate_groups
        (organization_id, workspace_id, confidence_score, match_reason, status,
         canonical_lead_id, created_at, updated_at)
    VALUES ($1, $2, $3, $4, 'pending', NULL, $5, $5)
    RETURNING id";

const INSERT_MEMBER_SQL: &str = "
    INSERT INTO public.duplicate_group_members
        (duplicate_group_id, lead_id, similarity_score, matched_fields)
    VALUES ($1, $2, $3, $4)";

const LIST_GROUPS_SQL: &str = "
    SELECT id, organization_id, workspace_id, confidence_score, match_reason, status,
           canonical_lead_id, created_at, updated_at
    FROM public.duplicate_groups
    WHERE organization_id = $1
      AND ($2::BIGINT IS NULL OR workspace_id = $2)
      AND ($3::TEXT IS NULL OR status = $3)
    ORDER BY confidence_score DESC, id ASC";

const GET_GROUP_SQL: &str = "
    SELECT id, organization_id, workspace_id, confidence_score, match_reason, status,
           canonical_lead_id, created_at, updated_at
    FROM public.duplicate_groups
    WHERE id = $1 AND organization_id = $2";

const LOCK_GROUP_SQL: &str = "
    SELECT id, organization_id, workspace_id, confidence_score, match_reason, status,
           canonical_lead_id, created_at, updated_at
    FROM public.duplicate_groups
    WHERE id = $1 AND organization_id = $2
    FOR UPDATE";

const GROUP_MEMBERS_SQL: &str = "
    SELECT id, duplicate_group_id, lead_id, similarity_score, matched_fields
    FROM public.duplicate_group_members
    WHERE duplicate_group_id = ANY($1)
    ORDER BY id";

const UPDATE_CANONICAL_SQL: &str = "
    UPDATE public.leads
    SET name = $3, website = $4, emails = $5, phones = $6, sources = $7,
        address = $8, updated_at = $9
    WHERE id = $1 AND organization_id = $2";

const DELETE_LEADS_SQL: &str = "DELETE FROM public.leads WHERE organization_id = $1 AND id = ANY($2)";

const CLOSE_GROUP_SQL: &str = "
    UPDATE public.duplicate_groups
    SET status = $2, canonical_lead_id = $3, updated_at = $4
    WHERE id = $1";

const STATS_SQL: &str = "
    SELECT
        COUNT(*) AS total_groups,
        COUNT(*) FILTER (WHERE g.status = 'pending') AS pending_groups,
        COUNT(*) FILTER (WHERE g.status = 'merged') AS merged_groups,
        COUNT(*) FILTER (WHERE g.status = 'ignored') AS ignored_groups,
        COALESCE(SUM((SELECT COUNT(*) FROM public.duplicate_group_members m
                       WHERE m.duplicate_group_id = g.id)), 0)::BIGINT AS total_duplicates
    FROM public.duplicate_groups g
    WHERE g.organization_id = $1 AND ($2::BIGINT IS NULL OR g.workspace_id = $2)";

fn lead_from_row(row: &Row) -> Lead {
    Lead {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        workspace_id: row.get("workspace_id"),
        name: row.get::<_, Option<String>>("name").unwrap_or_default(),
        website: row.get("website"),
        emails: row.get::<_, Option<Vec<String>>>("emails").unwrap_or_default(),
        phones: row.get::<_, Option<Vec<String>>>("phones").unwrap_or_default(),
        sources: row.get::<_, Option<Vec<String>>>("sources").unwrap_or_default(),
        address: row.get("address"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn group_from_row(row: &Row) -> DedupeResult<DuplicateGroup> {
    let match_reason: String = row.get("match_reason");
    let status: String = row.get("status");
    Ok(DuplicateGroup {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        workspace_id: row.get("workspace_id"),
        confidence_score: row.get("confidence_score"),
        match_reason: match_reason
            .parse::<MatchReason>()
            .map_err(DedupeError::storage("Unreadable duplicate_groups.match_reason"))?,
        status: status
            .parse::<GroupStatus>()
            .map_err(DedupeError::storage("Unreadable duplicate_groups.status"))?,
        canonical_lead_id: row.get("canonical_lead_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn member_from_row(row: &Row) -> DedupeResult<DuplicateMember> {
    let fields: Vec<String> = row.get::<_, Option<Vec<String>>>("matched_fields").unwrap_or_default();
    Ok(DuplicateMember {
        id: row.get("id"),
        duplicate_group_id: row.get("duplicate_group_id"),
        lead_id: row.get("lead_id"),
        similarity_score: row.get("similarity_score"),
        matched_fields: fields
            .iter()
            .map(|f| f.parse::<MatchedField>())
            .collect::<Result<_, _>>()
            .map_err(DedupeError::storage("Unreadable duplicate_group_members.matched_fields"))?,
    })
}

/// Joins groups with their members and the members' current leads.
async fn load_details<C: GenericClient + Sync>(
    client: &C,
    organization_id: OrganizationId,
    groups: Vec<DuplicateGroup>,
    lock_leads: bool,
) -> DedupeResult<Vec<DuplicateGroupDetail>> {
    if groups.is_empty() {
        return Ok(Vec::new());
    }
    let group_ids: Vec<DuplicateGroupId> = groups.iter().map(|g| g.id).collect();
    let member_rows = client
        .query(GROUP_MEMBERS_SQL, &[&group_ids])
        .await
        .map_err(DedupeError::storage("Failed to load duplicate group members"))?;
    let members = member_rows
        .iter()
        .map(member_from_row)
        .collect::<DedupeResult<Vec<_>>>()?;

    let mut lead_ids: Vec<LeadId> = members.iter().map(|m| m.lead_id).collect();
    lead_ids.sort_unstable();
    lead_ids.dedup();
    let leads_sql = if lock_leads { LOCK_LEADS_SQL } else { FIND_LEADS_SQL };
    let lead_rows = client
        .query(leads_sql, &[&organization_id, &lead_ids])
        .await
        .map_err(DedupeError::storage("Failed to load member leads"))?;
    let leads: HashMap<LeadId, Lead> = lead_rows
        .iter()
        .map(|row| {
            let lead = lead_from_row(row);
            (lead.id, lead)
        })
        .collect();

    let mut by_group: HashMap<DuplicateGroupId, Vec<MemberDetail>> = HashMap::new();
    for member in members {
        let lead = leads.get(&member.lead_id).cloned();
        by_group
            .entry(member.duplicate_group_id)
            .or_default()
            .push(MemberDetail { member, lead });
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let members = by_group.remove(&group.id).unwrap_or_default();
            DuplicateGroupDetail { group, members }
        })
        .collect())
}

/// Serializes saves, merges and ignores of one organization.
async fn lock_organization<C: GenericClient + Sync>(client: &C, organization_id: OrganizationId) -> DedupeResult<()> {
    client
        .execute(ORG_LOCK_SQL, &[&organization_id])
        .await
        .map_err(DedupeError::storage("Failed to take organization lock"))?;
    Ok(())
}

/// Only pending groups may be superseded; a shortfall means one was closed
/// underneath us and the save must roll back.
fn check_superseded(expected: usize, deleted: u64) -> DedupeResult<()> {
    if deleted != expected as u64 {
        return Err(DedupeError::Conflict(format!(
            "expected to supersede {} pending groups, {} were still pending",
            expected, deleted
        )));
    }
    Ok(())
}

/// [`DuplicateStore`] backed by PostgreSQL through the shared `bb8` pool.
#[derive(Clone)]
pub struct PgDuplicateStore {
    pool: PgPool,
}

impl PgDuplicateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DuplicateStore for PgDuplicateStore {
    async fn load_leads(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
    ) -> DedupeResult<Vec<Lead>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for loading leads"))?;
        let rows = conn
            .query(LOAD_LEADS_SQL, &[&organization_id, &workspace_id])
            .await
            .map_err(DedupeError::storage("Failed to load leads"))?;
        debug!("Loaded {} leads for org {}", rows.len(), organization_id);
        Ok(rows.iter().map(lead_from_row).collect())
    }

    async fn find_lead(&self, organization_id: OrganizationId, lead_id: LeadId) -> DedupeResult<Option<Lead>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for lead lookup"))?;
        let rows = conn
            .query(FIND_LEADS_SQL, &[&organization_id, &vec![lead_id]])
            .await
            .map_err(DedupeError::storage("Failed to look up lead"))?;
        Ok(rows.first().map(lead_from_row))
    }

    async fn save_duplicate_groups(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        candidates: &[CandidateGroup],
        policy: OverlapPolicy,
    ) -> DedupeResult<SaveOutcome> {
        let mut outcome = SaveOutcome::default();
        if candidates.is_empty() {
            return Ok(outcome);
        }

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for saving groups"))?;
        let tx = conn
            .transaction()
            .await
            .map_err(DedupeError::storage("Failed to start transaction for saving groups"))?;

        lock_organization(&tx, organization_id).await?;

        let insert_member = tx
            .prepare(INSERT_MEMBER_SQL)
            .await
            .map_err(DedupeError::storage("Failed to prepare member insert"))?;
        let now: DateTime<Utc> = Utc::now();

        for candidate in candidates {
            let rows = tx
                .query(OVERLAPPING_GROUPS_SQL, &[&organization_id, &candidate.lead_ids])
                .await
                .map_err(DedupeError::storage("Failed to check overlapping groups"))?;
            let overlapping: Vec<(DuplicateGroupId, f64)> = rows.iter().map(|r| (r.get(0), r.get(1))).collect();

            let supersede = match resolve_overlap(candidate, &overlapping, policy) {
                OverlapDecision::Insert { supersede } => supersede,
                OverlapDecision::Skip => {
                    outcome.skipped += 1;
                    continue;
                }
            };
            if !supersede.is_empty() {
                let deleted = tx
                    .execute(DELETE_GROUPS_SQL, &[&supersede])
                    .await
                    .map_err(DedupeError::storage("Failed to delete superseded groups"))?;
                check_superseded(supersede.len(), deleted)?;
                outcome.saved.retain(|g| !supersede.contains(&g.id));
                outcome.superseded.extend(supersede);
            }

            let row = tx
                .query_one(
                    INSERT_GROUP_SQL,
                    &[
                        &organization_id,
                        &workspace_id,
                        &candidate.confidence,
                        &candidate.match_reason.as_str(),
                        &now,
                    ],
                )
                .await
                .map_err(DedupeError::storage("Failed to insert duplicate group"))?;
            let group_id: DuplicateGroupId = row.get(0);

            let matched_fields: Vec<&str> = candidate.matched_fields.iter().map(|f| f.as_str()).collect();
            for lead_id in &candidate.lead_ids {
                tx.execute(
                    &insert_member,
                    &[&group_id, lead_id, &candidate.confidence, &matched_fields],
                )
                .await
                .map_err(DedupeError::storage("Failed to insert duplicate group member"))?;
            }

            outcome.saved.push(DuplicateGroup {
                id: group_id,
                organization_id,
                workspace_id,
                confidence_score: candidate.confidence,
                match_reason: candidate.match_reason,
                status: GroupStatus::Pending,
                canonical_lead_id: None,
                created_at: now,
                updated_at: now,
            });
        }

        tx.commit()
            .await
            .map_err(DedupeError::storage("Failed to commit duplicate groups"))?;
        info!(
            "Saved {} duplicate groups for org {} ({} skipped, {} superseded)",
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
        let conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for listing groups"))?;
        let status = status.map(|s| s.as_str());
        let rows = conn
            .query(LIST_GROUPS_SQL, &[&organization_id, &workspace_id, &status])
            .await
            .map_err(DedupeError::storage("Failed to list duplicate groups"))?;
        let groups = rows.iter().map(group_from_row).collect::<DedupeResult<Vec<_>>>()?;
        load_details(&*conn, organization_id, groups, false).await
    }

    async fn get_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroupDetail> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for group lookup"))?;
        let row = conn
            .query_opt(GET_GROUP_SQL, &[&group_id, &organization_id])
            .await
            .map_err(DedupeError::storage("Failed to load duplicate group"))?
            .ok_or_else(|| DedupeError::not_found("duplicate group", group_id))?;
        let group = group_from_row(&row)?;
        load_details(&*conn, organization_id, vec![group], false)
            .await?
            .pop()
            .ok_or_else(|| DedupeError::not_found("duplicate group", group_id))
    }

    async fn merge_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
        canonical_lead_id: LeadId,
        policy: &MergeFieldPolicy,
    ) -> DedupeResult<Lead> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for merge"))?;
        let tx = conn
            .transaction()
            .await
            .map_err(DedupeError::storage("Failed to start merge transaction"))?;
        lock_organization(&tx, organization_id).await?;

        let row = tx
            .query_opt(LOCK_GROUP_SQL, &[&group_id, &organization_id])
            .await
            .map_err(DedupeError::storage("Failed to lock duplicate group"))?
            .ok_or_else(|| DedupeError::not_found("duplicate group", group_id))?;
        let group = group_from_row(&row)?;
        let detail = load_details(&tx, organization_id, vec![group], true)
            .await?
            .pop()
            .ok_or_else(|| DedupeError::not_found("duplicate group", group_id))?;

        let now = Utc::now();
        let plan = plan_merge(&detail, canonical_lead_id, policy, now)?;
        let canonical = &plan.canonical;

        tx.execute(
            UPDATE_CANONICAL_SQL,
            &[
                &canonical.id,
                &organization_id,
                &canonical.name,
                &canonical.website,
                &canonical.emails,
                &canonical.phones,
                &canonical.sources,
                &canonical.address,
                &canonical.updated_at,
            ],
        )
        .await
        .map_err(DedupeError::storage("Failed to update canonical lead"))?;

        if !plan.delete_ids.is_empty() {
            tx.execute(DELETE_LEADS_SQL, &[&organization_id, &plan.delete_ids])
                .await
                .map_err(DedupeError::storage("Failed to delete merged leads"))?;
        }

        tx.execute(
            CLOSE_GROUP_SQL,
            &[&group_id, &GroupStatus::Merged.as_str(), &Some(canonical_lead_id), &now],
        )
        .await
        .map_err(DedupeError::storage("Failed to close duplicate group"))?;

        tx.commit()
            .await
            .map_err(DedupeError::storage("Failed to commit merge"))?;
        info!(
            "Merged group {} into lead {} ({} leads deleted, {} already gone)",
            group_id,
            canonical_lead_id,
            plan.delete_ids.len(),
            plan.skipped_ids.len()
        );
        Ok(plan.canonical)
    }

    async fn ignore_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroup> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for ignore"))?;
        let tx = conn
            .transaction()
            .await
            .map_err(DedupeError::storage("Failed to start ignore transaction"))?;
        lock_organization(&tx, organization_id).await?;

        let row = tx
            .query_opt(LOCK_GROUP_SQL, &[&group_id, &organization_id])
            .await
            .map_err(DedupeError::storage("Failed to lock duplicate group"))?
            .ok_or_else(|| DedupeError::not_found("duplicate group", group_id))?;
        let mut group = group_from_row(&row)?;
        if group.status != GroupStatus::Pending {
            return Err(DedupeError::Conflict(format!(
                "duplicate group {} is already {}",
                group_id, group.status
            )));
        }

        group.status = GroupStatus::Ignored;
        group.updated_at = Utc::now();
        tx.execute(
            CLOSE_GROUP_SQL,
            &[&group_id, &group.status.as_str(), &group.canonical_lead_id, &group.updated_at],
        )
        .await
        .map_err(DedupeError::storage("Failed to mark group ignored"))?;
        tx.commit()
            .await
            .map_err(DedupeError::storage("Failed to commit ignore"))?;
        Ok(group)
    }

    async fn stats(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
    ) -> DedupeResult<DuplicateStats> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(DedupeError::storage("Failed to get DB connection for stats"))?;
        let row = conn
            .query_one(STATS_SQL, &[&organization_id, &workspace_id])
            .await
            .map_err(DedupeError::storage("Failed to compute duplicate stats"))?;
        let count = |column: &str| row.get::<_, i64>(column).max(0) as usize;
        Ok(DuplicateStats {
            total_groups: count("total_groups"),
            pending_groups: count("pending_groups"),
            merged_groups: count("merged_groups"),
            ignored_groups: count("ignored_groups"),
            total_duplicates: count("total_duplicates"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_superseded_rejects_closed_groups() {
        assert!(check_superseded(2, 2).is_ok());
        assert!(matches!(check_superseded(2, 1), Err(DedupeError::Conflict(_))));
        assert!(matches!(check_superseded(1, 0), Err(DedupeError::Conflict(_))));
    }

    #[test]
    fn test_supersede_delete_only_touches_pending() {
        assert!(DELETE_GROUPS_SQL.contains("status = 'pending'"));
        assert!(OVERLAPPING_GROUPS_SQL.contains("g.status = 'pending'"));
    }
}
