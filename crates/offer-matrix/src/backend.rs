// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Backend port: everything the engine needs from the offer service.
//!
//! The engine never talks HTTP itself. Hosts implement [`OfferBackend`] over
//! whatever transport they have; tests use an in-memory fake.

use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

use crate::column::{OfferGroup, RowId};
use crate::edit::OfferPatch;
use crate::order::ViewPreferences;

/// Failure reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Network or service unavailable; retrying may help.
    #[error("transport: {0}")]
    Transport(String),
    /// Request refused (validation, permissions, conflict).
    #[error("rejected: {0}")]
    Rejected(String),
    /// Target does not exist.
    #[error("not found")]
    NotFound,
}

/// Who may open a share link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleScope {
    /// Anyone holding the link.
    #[default]
    Public,
    /// Members of the creating organization only.
    Organization,
}

/// Result of creating a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    /// Opaque share token.
    pub token: String,
    /// Link as issued by the service.
    pub url: String,
}

/// Payload behind a share token.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SharedView {
    /// Offers visible through the share.
    #[serde(default)]
    pub offer_groups: Vec<OfferGroup>,
    /// Preferences stored with the share.
    #[serde(default)]
    pub prefs: ViewPreferences,
}

/// Where a matrix instance loads its offers from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSource {
    /// Offers extracted from these documents.
    Documents(Vec<String>),
    /// Offers produced by one extraction job.
    Job(String),
    /// Offers behind a share token.
    Share(String),
}

/// Async offer service. Every call may fail with a [`BackendError`].
pub trait OfferBackend: Send + Sync + 'static {
    /// Offer groups for the given documents.
    fn list_offers_by_documents(
        &self,
        document_ids: &[String],
    ) -> impl Future<Output = Result<Vec<OfferGroup>, BackendError>> + Send;

    /// Offer groups produced by a job.
    fn list_offers_by_job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Vec<OfferGroup>, BackendError>> + Send;

    /// Row id for an identity triple, if the service knows it yet.
    fn resolve_column_row_id(
        &self,
        source_file: &str,
        insurer: &str,
        program_code: &str,
    ) -> impl Future<Output = Result<Option<RowId>, BackendError>> + Send;

    /// Persist changed fields of one row.
    fn patch_offer(
        &self,
        row_id: RowId,
        patch: &OfferPatch,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Delete one row.
    fn delete_offer(&self, row_id: RowId)
        -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Create a share link over the given documents.
    fn create_share(
        &self,
        document_ids: &[String],
        prefs: &ViewPreferences,
        editable: bool,
        role_scope: RoleScope,
    ) -> impl Future<Output = Result<ShareLink, BackendError>> + Send;

    /// Resolve a share token.
    fn fetch_share(&self, token: &str)
        -> impl Future<Output = Result<SharedView, BackendError>> + Send;

    /// Refresh the snapshot stored behind an existing share.
    fn regenerate_share(
        &self,
        token: &str,
        prefs: &ViewPreferences,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Load offer groups from `source`.
pub(crate) async fn fetch<B: OfferBackend>(
    backend: &B,
    source: &FetchSource,
) -> Result<(Vec<OfferGroup>, Option<ViewPreferences>), BackendError> {
    match source {
        FetchSource::Documents(ids) => Ok((backend.list_offers_by_documents(ids).await?, None)),
        FetchSource::Job(job) => Ok((backend.list_offers_by_job(job).await?, None)),
        FetchSource::Share(token) => {
            let shared = backend.fetch_share(token).await?;
            Ok((shared.offer_groups, Some(shared.prefs)))
        }
    }
}
