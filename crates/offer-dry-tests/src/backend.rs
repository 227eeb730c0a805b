// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory offer backend for engine tests.
//!
//! Behaves like a small offer service: patches and deletes change the data
//! later fetches return. Every call is counted, any call kind can be told to
//! fail, and fetches or saves can be held at a [`Gate`] to simulate a slow
//! server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use offer_matrix::canon;
use offer_matrix::{
    BackendError, FeatureValue, OfferBackend, OfferGroup, OfferPatch, ProgramOffer, RoleScope,
    RowId, ShareLink, SharedView, ViewPreferences,
};
use tokio::sync::Notify;

/// Holds calls until released.
#[derive(Default)]
pub struct Gate {
    held: Mutex<bool>,
    notify: Notify,
}

impl Gate {
    /// Hold every call arriving from now on.
    pub fn hold(&self) {
        *self.held.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    /// Let held and future calls through.
    pub fn release(&self) {
        *self.held.lock().unwrap_or_else(|e| e.into_inner()) = false;
        self.notify.notify_waiters();
    }

    /// True while calls are held.
    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pass(&self) {
        loop {
            let released = self.notify.notified();
            if !self.is_held() {
                return;
            }
            released.await;
        }
    }
}

/// Calls received, per kind. Failed and held calls count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Offer list and share fetches.
    pub fetches: usize,
    /// Row-id resolutions.
    pub resolves: usize,
    /// Patches.
    pub patches: usize,
    /// Deletes.
    pub deletes: usize,
    /// Shares created.
    pub shares_created: usize,
    /// Share regenerations.
    pub regenerations: usize,
}

impl CallCounts {
    /// Every call of any kind.
    pub fn total(&self) -> usize {
        self.fetches
            + self.resolves
            + self.patches
            + self.deletes
            + self.shares_created
            + self.regenerations
    }
}

#[derive(Default)]
struct Failures {
    fetch: Option<BackendError>,
    resolve: Option<BackendError>,
    patch: Option<BackendError>,
    delete: Option<BackendError>,
    regenerate: Option<BackendError>,
}

#[derive(Default)]
struct Server {
    groups: Vec<OfferGroup>,
    /// Listing served instead of `groups` while a read replica lags.
    stale: Option<Vec<OfferGroup>>,
    rows: HashMap<(String, String, String), RowId>,
    shares: HashMap<String, (Vec<String>, ViewPreferences)>,
    calls: CallCounts,
    patches: Vec<(RowId, OfferPatch)>,
    deletes: Vec<RowId>,
    regenerated: Vec<(String, ViewPreferences)>,
    fail: Failures,
}

impl Server {
    fn groups_for(&self, document_ids: &[String]) -> Vec<OfferGroup> {
        self.stale
            .as_ref()
            .unwrap_or(&self.groups)
            .iter()
            .filter(|g| {
                document_ids.is_empty()
                    || g.document_id
                        .as_ref()
                        .is_some_and(|id| document_ids.contains(id))
            })
            .cloned()
            .collect()
    }

    fn locate(&self, row_id: RowId) -> Option<(usize, usize)> {
        self.groups.iter().enumerate().find_map(|(g, group)| {
            let group_insurer = group.insurer.clone().unwrap_or_default();
            group
                .programs
                .iter()
                .position(|p| {
                    let triple = (
                        group.source_file.clone(),
                        p.insurer.clone().unwrap_or_else(|| group_insurer.clone()),
                        p.program_code.clone(),
                    );
                    p.row_id == Some(row_id) || self.rows.get(&triple) == Some(&row_id)
                })
                .map(|p| (g, p))
        })
    }

    fn program_mut(&mut self, row_id: RowId) -> Option<&mut ProgramOffer> {
        let (g, p) = self.locate(row_id)?;
        self.groups.get_mut(g)?.programs.get_mut(p)
    }

    fn apply(&mut self, row_id: RowId, patch: &OfferPatch) -> Result<(), BackendError> {
        let program = self.program_mut(row_id).ok_or(BackendError::NotFound)?;
        if let Some(v) = patch.premium_eur {
            program.premium_eur = Some(FeatureValue::Number(v));
        }
        if let Some(v) = patch.base_sum_eur {
            program.base_sum_eur = Some(FeatureValue::Number(v));
        }
        if let Some(v) = &patch.insurer {
            program.insurer = Some(v.clone());
        }
        if let Some(v) = &patch.program_code {
            program.program_code.clone_from(v);
        }
        if let Some(v) = &patch.payment_method {
            program.payment_method = Some(v.clone());
        }
        for (key, value) in &patch.features {
            program
                .features
                .retain(|raw, _| raw == key || canon::canonicalize(raw) != key);
            program.features.insert(key.clone(), value.clone());
        }
        // identity edits move the row; keep inline ids so it stays findable
        program.row_id = Some(row_id);
        Ok(())
    }

    fn remove(&mut self, row_id: RowId) -> Result<(), BackendError> {
        let (g, p) = self.locate(row_id).ok_or(BackendError::NotFound)?;
        if let Some(group) = self.groups.get_mut(g) {
            group.programs.remove(p);
        }
        self.rows.retain(|_, id| *id != row_id);
        Ok(())
    }
}

/// In-memory [`OfferBackend`]. Clones share state.
#[derive(Clone, Default)]
pub struct FakeBackend {
    server: Arc<Mutex<Server>>,
    fetch_gate: Arc<Gate>,
    patch_gate: Arc<Gate>,
}

impl FakeBackend {
    /// Backend serving `groups`.
    pub fn with_groups(groups: Vec<OfferGroup>) -> Self {
        let backend = Self::default();
        backend.set_groups(groups);
        backend
    }

    fn with<R>(&self, f: impl FnOnce(&mut Server) -> R) -> R {
        let mut server = self.server.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut server)
    }

    /// Replace the served data.
    pub fn set_groups(&self, groups: Vec<OfferGroup>) {
        self.with(|s| s.groups = groups);
    }

    /// Serve `groups` to fetches while writes keep going to the real data.
    pub fn serve_stale(&self, groups: Vec<OfferGroup>) {
        self.with(|s| s.stale = Some(groups));
    }

    /// Fetches see the real data again.
    pub fn catch_up(&self) {
        self.with(|s| s.stale = None);
    }

    /// Data as the server currently holds it.
    pub fn groups(&self) -> Vec<OfferGroup> {
        self.with(|s| s.groups.clone())
    }

    /// Make a triple resolvable to `row_id`.
    pub fn register_row(&self, source_file: &str, insurer: &str, program_code: &str, row_id: u64) {
        self.with(|s| {
            s.rows.insert(
                (
                    source_file.to_string(),
                    insurer.to_string(),
                    program_code.to_string(),
                ),
                RowId(row_id),
            );
        });
    }

    /// Register a share over `document_ids` (all documents when empty).
    pub fn add_share(&self, token: &str, document_ids: Vec<String>, prefs: ViewPreferences) {
        self.with(|s| {
            s.shares.insert(token.to_string(), (document_ids, prefs));
        });
    }

    /// Fail list and share fetches with `err` (`None` to recover).
    pub fn fail_fetches(&self, err: Option<BackendError>) {
        self.with(|s| s.fail.fetch = err);
    }

    /// Fail row-id resolution.
    pub fn fail_resolves(&self, err: Option<BackendError>) {
        self.with(|s| s.fail.resolve = err);
    }

    /// Fail patches.
    pub fn fail_patches(&self, err: Option<BackendError>) {
        self.with(|s| s.fail.patch = err);
    }

    /// Fail deletes.
    pub fn fail_deletes(&self, err: Option<BackendError>) {
        self.with(|s| s.fail.delete = err);
    }

    /// Fail share regeneration.
    pub fn fail_regenerations(&self, err: Option<BackendError>) {
        self.with(|s| s.fail.regenerate = err);
    }

    /// Gate in front of fetch responses. The data is read when the call
    /// arrives, so a held fetch returns what was current back then.
    pub fn fetch_gate(&self) -> &Gate {
        &self.fetch_gate
    }

    /// Gate in front of patch and delete processing.
    pub fn patch_gate(&self) -> &Gate {
        &self.patch_gate
    }

    /// Calls so far.
    pub fn calls(&self) -> CallCounts {
        self.with(|s| s.calls)
    }

    /// Patches received, in arrival order.
    pub fn patches(&self) -> Vec<(RowId, OfferPatch)> {
        self.with(|s| s.patches.clone())
    }

    /// Deletes received, in arrival order.
    pub fn deletes(&self) -> Vec<RowId> {
        self.with(|s| s.deletes.clone())
    }

    /// Share regenerations received.
    pub fn regenerated(&self) -> Vec<(String, ViewPreferences)> {
        self.with(|s| s.regenerated.clone())
    }

    async fn list(&self, document_ids: &[String]) -> Result<Vec<OfferGroup>, BackendError> {
        let snapshot = self.with(|s| {
            s.calls.fetches += 1;
            match &s.fail.fetch {
                Some(err) => Err(err.clone()),
                None => Ok(s.groups_for(document_ids)),
            }
        });
        self.fetch_gate.pass().await;
        snapshot
    }
}

impl OfferBackend for FakeBackend {
    async fn list_offers_by_documents(
        &self,
        document_ids: &[String],
    ) -> Result<Vec<OfferGroup>, BackendError> {
        self.list(document_ids).await
    }

    async fn list_offers_by_job(&self, _job_id: &str) -> Result<Vec<OfferGroup>, BackendError> {
        self.list(&[]).await
    }

    async fn resolve_column_row_id(
        &self,
        source_file: &str,
        insurer: &str,
        program_code: &str,
    ) -> Result<Option<RowId>, BackendError> {
        self.with(|s| {
            s.calls.resolves += 1;
            if let Some(err) = &s.fail.resolve {
                return Err(err.clone());
            }
            Ok(s
                .rows
                .get(&(
                    source_file.to_string(),
                    insurer.to_string(),
                    program_code.to_string(),
                ))
                .copied())
        })
    }

    async fn patch_offer(&self, row_id: RowId, patch: &OfferPatch) -> Result<(), BackendError> {
        self.with(|s| {
            s.calls.patches += 1;
            s.patches.push((row_id, patch.clone()));
        });
        self.patch_gate.pass().await;
        self.with(|s| match &s.fail.patch {
            Some(err) => Err(err.clone()),
            None => s.apply(row_id, patch),
        })
    }

    async fn delete_offer(&self, row_id: RowId) -> Result<(), BackendError> {
        self.with(|s| {
            s.calls.deletes += 1;
            s.deletes.push(row_id);
        });
        self.patch_gate.pass().await;
        self.with(|s| match &s.fail.delete {
            Some(err) => Err(err.clone()),
            None => s.remove(row_id),
        })
    }

    async fn create_share(
        &self,
        document_ids: &[String],
        prefs: &ViewPreferences,
        _editable: bool,
        _role_scope: RoleScope,
    ) -> Result<ShareLink, BackendError> {
        self.with(|s| {
            s.calls.shares_created += 1;
            let token = format!("share-{}", s.calls.shares_created);
            s.shares
                .insert(token.clone(), (document_ids.to_vec(), prefs.clone()));
            Ok(ShareLink {
                url: format!("https://offers.example/s/{token}"),
                token,
            })
        })
    }

    async fn fetch_share(&self, token: &str) -> Result<SharedView, BackendError> {
        let (document_ids, prefs) = self
            .with(|s| s.shares.get(token).cloned())
            .ok_or(BackendError::NotFound)?;
        let offer_groups = self.list(&document_ids).await?;
        Ok(SharedView {
            offer_groups,
            prefs,
        })
    }

    async fn regenerate_share(
        &self,
        token: &str,
        prefs: &ViewPreferences,
    ) -> Result<(), BackendError> {
        self.with(|s| {
            s.calls.regenerations += 1;
            if let Some(err) = &s.fail.regenerate {
                return Err(err.clone());
            }
            s.regenerated.push((token.to_string(), prefs.clone()));
            if let Some(share) = s.shares.get_mut(token) {
                share.1 = prefs.clone();
            }
            Ok(())
        })
    }
}
