// src/models/lead.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type LeadId = i64;
pub type OrganizationId = i64;
pub type WorkspaceId = i64;

/// A prospect/company record owned by an organization and optionally a workspace.
///
/// Leads live in the CRM's lead table; this crate only reads them for
/// grouping and rewrites/deletes them when a duplicate group is merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub organization_id: OrganizationId,
    pub workspace_id: Option<WorkspaceId>,

    /// Display name, usually the company name
    pub name: String,

    /// Website URL or bare domain
    pub website: Option<String>,

    pub emails: Vec<String>,
    pub phones: Vec<String>,

    /// Origin tags (scraper, import, manual, ...)
    pub sources: Vec<String>,

    pub address: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(id: LeadId, organization_id: OrganizationId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            organization_id,
            workspace_id: None,
            name: name.into(),
            website: None,
            emails: Vec::new(),
            phones: Vec::new(),
            sources: Vec::new(),
            address: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_workspace(mut self, workspace_id: WorkspaceId) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    pub fn with_emails<S: Into<String>>(mut self, emails: impl IntoIterator<Item = S>) -> Self {
        self.emails = emails.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_phones<S: Into<String>>(mut self, phones: impl IntoIterator<Item = S>) -> Self {
        self.phones = phones.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sources<S: Into<String>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Whether the lead is visible in the given organization/workspace scope.
    /// A `None` workspace means the whole organization.
    pub fn in_scope(&self, organization_id: OrganizationId, workspace_id: Option<WorkspaceId>) -> bool {
        self.organization_id == organization_id
            && workspace_id.map_or(true, |ws| self.workspace_id == Some(ws))
    }
}
