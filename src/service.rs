// src/service.rs - Detect, review and merge flows over a DuplicateStore

use std::time::Instant;

use log::{info, warn};

use crate::error::DedupeResult;
use crate::matching::{find_duplicate_groups_with_options, GroupingOutcome};
use crate::merging::MergeFieldPolicy;
use crate::models::stats_models::{DetectionSummary, DuplicateStats};
use crate::models::{
    DuplicateGroup, DuplicateGroupDetail, DuplicateGroupId, GroupStatus, Lead, LeadId, OrganizationId, WorkspaceId,
};
use crate::store::DuplicateStore;
use crate::utils::dedupe_config::DedupeConfig;
use crate::utils::logging::log_detection_summary;

pub struct DuplicateService<S> {
    store: S,
    config: DedupeConfig,
}

impl<S: DuplicateStore> DuplicateService<S> {
    pub fn new(store: S, config: DedupeConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    /// Runs the grouper over the scope without saving anything.
    pub async fn preview(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        min_confidence: Option<f64>,
    ) -> DedupeResult<(usize, GroupingOutcome)> {
        let options = self.config.grouping_options(min_confidence)?;
        let leads = self.store.load_leads(organization_id, workspace_id).await?;
        let outcome = find_duplicate_groups_with_options(&leads, &options);
        Ok((leads.len(), outcome))
    }

    /// Finds duplicate groups in the scope and saves them as pending groups.
    pub async fn detect(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        min_confidence: Option<f64>,
    ) -> DedupeResult<DetectionSummary> {
        let start = Instant::now();
        let options = self.config.grouping_options(min_confidence)?;
        info!(
            "Detecting duplicates for org {} (workspace: {:?}, min confidence {:.2})",
            organization_id, workspace_id, options.min_confidence
        );

        let leads = self.store.load_leads(organization_id, workspace_id).await?;
        let outcome = find_duplicate_groups_with_options(&leads, &options);
        let saved = self
            .store
            .save_duplicate_groups(organization_id, workspace_id, &outcome.groups, self.config.overlap_policy)
            .await?;
        if saved.skipped > 0 {
            info!(
                "{} candidate groups overlapped open groups and were dropped ({} policy)",
                saved.skipped,
                self.config.overlap_policy.as_str()
            );
        }

        let summary = DetectionSummary {
            leads_scanned: leads.len(),
            groups_found: outcome.groups.len(),
            groups_saved: saved.saved.len(),
            groups_superseded: saved.superseded.len(),
            min_confidence: options.min_confidence,
            reason_stats: outcome.reason_stats,
            duration_secs: start.elapsed().as_secs_f64(),
        };
        log_detection_summary(organization_id, &summary);
        Ok(summary)
    }

    pub async fn list_groups(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
        status: Option<GroupStatus>,
    ) -> DedupeResult<Vec<DuplicateGroupDetail>> {
        self.store.list_groups(organization_id, workspace_id, status).await
    }

    pub async fn get_group(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroupDetail> {
        self.store.get_group(organization_id, group_id).await
    }

    /// Collapses a pending group into `canonical_lead_id`. Without
    /// `merge_fields` the default policy applies. Irreversible: the other
    /// member leads are deleted.
    pub async fn merge(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
        canonical_lead_id: LeadId,
        merge_fields: Option<MergeFieldPolicy>,
    ) -> DedupeResult<Lead> {
        let policy = merge_fields.unwrap_or_default();
        info!(
            "Merging duplicate group {} into lead {} (org {})",
            group_id, canonical_lead_id, organization_id
        );
        self.store
            .merge_group(organization_id, group_id, canonical_lead_id, &policy)
            .await
            .map_err(|e| {
                warn!("Merge of group {} failed, nothing was changed: {}", group_id, e);
                e
            })
    }

    pub async fn ignore(
        &self,
        organization_id: OrganizationId,
        group_id: DuplicateGroupId,
    ) -> DedupeResult<DuplicateGroup> {
        let group = self.store.ignore_group(organization_id, group_id).await?;
        info!("Duplicate group {} marked ignored", group_id);
        Ok(group)
    }

    pub async fn stats(
        &self,
        organization_id: OrganizationId,
        workspace_id: Option<WorkspaceId>,
    ) -> DedupeResult<DuplicateStats> {
        self.store.stats(organization_id, workspace_id).await
    }
}
