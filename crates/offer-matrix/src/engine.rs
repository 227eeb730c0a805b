// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Optimistic reconciliation engine.
//!
//! One [`MatrixEngine`] per matrix on screen. All state sits behind a single
//! async mutex; optimistic changes are applied under that lock before any
//! backend call is awaited, so a snapshot taken right after an edit already
//! shows it. Backend mutations to the same row are queued one at a time.

use std::sync::Arc;
use std::time::Duration;

use offer_app_core::config::ConfigError;
use offer_app_core::notice::{Notice, NoticeKind};
use offer_app_core::prefs::{MatrixPrefs, PrefsPort};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::backend::{self, BackendError, FetchSource, OfferBackend, RoleScope, ShareLink};
use crate::canon;
use crate::column::{ColumnKey, RowId};
use crate::edit::ChangeSet;
use crate::error::MatrixError;
use crate::order::{HiddenFeatures, OrderEvent, OrderState, ViewEvent, ViewPreferences};
use crate::state::MatrixState;
use crate::view::MatrixView;

/// Whose view this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    /// The owner's view; preferences are saved locally under `namespace`.
    Local {
        /// Company/context name the local snapshot is keyed by.
        namespace: String,
    },
    /// Opened through a share link.
    Shared {
        /// Share token.
        token: String,
        /// Whether the share grants edit rights.
        editable: bool,
    },
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Where offers are loaded from.
    pub source: FetchSource,
    /// Local or shared view.
    pub mode: ViewMode,
    /// Maximum queued notices.
    pub notice_capacity: usize,
    /// How long a notice stays visible.
    pub notice_ttl: Duration,
}

impl EngineConfig {
    /// Local view over the given documents.
    pub fn documents<I, S>(document_ids: I, namespace: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: FetchSource::Documents(document_ids.into_iter().map(Into::into).collect()),
            mode: ViewMode::Local {
                namespace: namespace.into(),
            },
            notice_capacity: 16,
            notice_ttl: Duration::from_secs(6),
        }
    }

    /// Local view over one extraction job.
    pub fn job(job_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            source: FetchSource::Job(job_id.into()),
            ..Self::documents(Vec::<String>::new(), namespace)
        }
    }

    /// View opened from a share token.
    pub fn shared(token: impl Into<String>, editable: bool) -> Self {
        let token = token.into();
        Self {
            source: FetchSource::Share(token.clone()),
            mode: ViewMode::Shared { token, editable },
            ..Self::documents(Vec::<String>::new(), "")
        }
    }

    fn editable(&self) -> bool {
        match &self.mode {
            ViewMode::Local { .. } => true,
            ViewMode::Shared { editable, .. } => *editable,
        }
    }
}

/// Result of a successful edit submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Saved and reconciled.
    Saved,
    /// Nothing differed from the server; no request was made.
    Unchanged,
}

/// Save state of a column's edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditPhase {
    /// No unconfirmed edits.
    #[default]
    Clean,
    /// Sent, waiting for the backend.
    Pending,
    /// Accepted, waiting for a fetch that shows it.
    Reconciling,
    /// The backend refused or was unreachable; the edit is still shown.
    Failed,
}

/// Identity triple used for row-id resolution.
struct Triple {
    source_file: String,
    insurer: String,
    program_code: String,
}

impl Triple {
    fn key(&self) -> ColumnKey {
        ColumnKey::new(&self.source_file, &self.insurer, &self.program_code)
    }
}

fn unmatched(state: &mut MatrixState) {
    state.notify(
        NoticeKind::Warn,
        "Offer cannot be matched",
        Some("Several offers share this program. Refresh once the server has saved them.".to_string()),
    );
}

/// State engine for one offer matrix.
pub struct MatrixEngine<B> {
    backend: Arc<B>,
    config: Arc<EngineConfig>,
    state: Arc<Mutex<MatrixState>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<B> Clone for MatrixEngine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<B: OfferBackend> MatrixEngine<B> {
    /// Create an engine. Nothing is fetched until [`load`](Self::load) or
    /// [`refresh`](Self::refresh).
    pub fn new(backend: Arc<B>, config: EngineConfig) -> Self {
        let state = MatrixState::new(config.notice_capacity, config.notice_ttl);
        let (shutdown, _) = watch::channel(false);
        Self {
            backend,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Fetch and merge, reporting failures.
    #[instrument(skip(self), level = "debug")]
    pub async fn load(&self) -> Result<(), MatrixError> {
        self.reconcile().await
    }

    /// Background refresh: fetch and merge, logging failures.
    #[instrument(skip(self), level = "debug")]
    pub async fn refresh(&self) {
        match self.reconcile().await {
            Ok(()) | Err(MatrixError::TornDown) => {}
            Err(err) => warn!(%err, "refresh failed; will retry"),
        }
    }

    /// True once loaded and no source document is still being extracted.
    pub async fn is_settled(&self) -> bool {
        let state = self.state.lock().await;
        state.loaded && !state.processing
    }

    async fn reconcile(&self) -> Result<(), MatrixError> {
        let started = {
            let mut state = self.state.lock().await;
            state.ensure_live()?;
            state.tick()
        };
        let fetched = backend::fetch(&*self.backend, &self.config.source).await;
        let mut state = self.state.lock().await;
        if state.torn_down {
            debug!("dropping fetch result after teardown");
            return Ok(());
        }
        let (groups, shared) = fetched.map_err(MatrixError::Backend)?;
        state.apply_refresh(&groups, started, shared);
        Ok(())
    }

    /// Look up the backend row behind `key`.
    ///
    /// A duplicate column (`#n` key) shares its triple with the first one, so
    /// the lookup would name the wrong row; such columns need an inline id.
    async fn resolve_row(&self, key: &ColumnKey, triple: &Triple) -> Result<RowId, MatrixError> {
        if triple.key() != *key {
            info!(%key, "duplicate column has no row id of its own");
            let mut state = self.state.lock().await;
            state.ensure_live()?;
            unmatched(&mut state);
            return Err(MatrixError::IdentityResolution(key.clone()));
        }
        let resolved = self
            .backend
            .resolve_column_row_id(&triple.source_file, &triple.insurer, &triple.program_code)
            .await;
        let mut state = self.state.lock().await;
        state.ensure_live()?;
        match resolved {
            Ok(Some(row_id)) if state.row_shown_elsewhere(key, row_id) => {
                warn!(%key, row = %row_id, "resolved row belongs to another column");
                unmatched(&mut state);
                Err(MatrixError::IdentityResolution(key.clone()))
            }
            Ok(Some(row_id)) => {
                state.remember_row(key, row_id);
                Ok(row_id)
            }
            Ok(None) => {
                info!(%key, "row not resolvable yet");
                state.notify(
                    NoticeKind::Warn,
                    "Offer is still being saved",
                    Some("Try again shortly.".to_string()),
                );
                Err(MatrixError::IdentityResolution(key.clone()))
            }
            Err(err) => {
                warn!(%key, %err, "row resolution failed");
                state.notify(
                    NoticeKind::Warn,
                    "Offer is still being saved",
                    Some("Try again shortly.".to_string()),
                );
                Err(MatrixError::IdentityResolution(key.clone()))
            }
        }
    }

    /// Validate, apply optimistically, persist and reconcile one edit.
    #[instrument(skip(self, key, changes), fields(key = %key))]
    pub async fn submit_edit(
        &self,
        key: &ColumnKey,
        changes: &ChangeSet,
    ) -> Result<EditOutcome, MatrixError> {
        let patch = changes.validate()?;

        let (diff, known_row, triple) = {
            let state = self.state.lock().await;
            state.ensure_live()?;
            if !self.config.editable() {
                return Err(MatrixError::NotEditable(key.clone()));
            }
            let column = state.column(key)?;
            let diff = patch.diff(&state.expected_server(column));
            if diff.is_empty() {
                debug!("edit matches server state");
                return Ok(EditOutcome::Unchanged);
            }
            state.check_identity(column, &diff)?;
            let triple = Triple {
                source_file: column.source_file.clone(),
                insurer: column.insurer.clone(),
                program_code: column.program_code.clone(),
            };
            (diff, state.row_id_of(column), triple)
        };

        let row_id = match known_row {
            Some(row_id) => row_id,
            None => self.resolve_row(key, &triple).await?,
        };

        let (seq, outgoing, target, queue) = {
            let mut state = self.state.lock().await;
            state.ensure_live()?;
            let column = state.column(key)?;
            state.check_identity(column, &diff)?;
            let target = diff.identity_after(column);
            let (seq, outgoing) = state.apply_optimistic(key, row_id, &diff)?;
            (seq, outgoing, target, state.row_queue(row_id))
        };

        let saved = {
            let _turn = queue.lock().await;
            self.backend.patch_offer(row_id, &outgoing).await
        };
        drop(queue);

        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return Err(MatrixError::TornDown);
            }
            match &saved {
                Ok(()) => state.acknowledge(row_id, seq),
                Err(err) => {
                    warn!(%target, %err, "saving offer failed");
                    state.mark_failed(row_id);
                    state.notify(
                        NoticeKind::Error,
                        "Could not save offer",
                        Some(err.to_string()),
                    );
                }
            }
        }

        if let Err(err) = self.reconcile().await {
            warn!(%err, "reconcile after edit failed");
        }

        match saved {
            Ok(()) => {
                self.regenerate_share().await;
                Ok(EditOutcome::Saved)
            }
            Err(source) => Err(MatrixError::Persistence {
                key: target,
                source,
            }),
        }
    }

    /// Refresh the snapshot behind an editable share. Fire and forget.
    async fn regenerate_share(&self) {
        let ViewMode::Shared {
            token,
            editable: true,
        } = &self.config.mode
        else {
            return;
        };
        let prefs = self.view_preferences().await;
        let backend = Arc::clone(&self.backend);
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(err) = backend.regenerate_share(&token, &prefs).await {
                warn!(%err, "share snapshot not regenerated");
            }
        });
    }

    /// Remove a column now and delete its row in the backend.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn delete_column(&self, key: &ColumnKey) -> Result<(), MatrixError> {
        let (known_row, triple) = {
            let state = self.state.lock().await;
            state.ensure_live()?;
            if !self.config.editable() {
                return Err(MatrixError::NotEditable(key.clone()));
            }
            let column = state.column(key)?;
            let triple = Triple {
                source_file: column.source_file.clone(),
                insurer: column.insurer.clone(),
                program_code: column.program_code.clone(),
            };
            (state.row_id_of(column), triple)
        };

        let row_id = match known_row {
            Some(row_id) => row_id,
            None => self.resolve_row(key, &triple).await?,
        };

        let queue = {
            let mut state = self.state.lock().await;
            state.ensure_live()?;
            state.bury(key, row_id);
            state.row_queue(row_id)
        };

        let deleted = {
            let _turn = queue.lock().await;
            match self.backend.delete_offer(row_id).await {
                Err(BackendError::NotFound) => {
                    debug!(row = %row_id, "row already gone");
                    Ok(())
                }
                other => other,
            }
        };
        drop(queue);

        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return Err(MatrixError::TornDown);
            }
            match &deleted {
                Ok(()) => state.confirm_burial(row_id),
                Err(err) => {
                    warn!(%err, "deleting offer failed");
                    state.exhume(row_id);
                    state.notify(
                        NoticeKind::Error,
                        "Could not delete offer",
                        Some(err.to_string()),
                    );
                }
            }
        }

        if let Err(err) = self.reconcile().await {
            warn!(%err, "reconcile after delete failed");
        }

        deleted.map_err(|source| MatrixError::Persistence {
            key: key.clone(),
            source,
        })
    }

    /// Drag column `from` in front of column `to`.
    pub async fn move_column(&self, from: &ColumnKey, to: &ColumnKey) -> Result<(), MatrixError> {
        let mut state = self.state.lock().await;
        state.ensure_live()?;
        let order = std::mem::take(&mut state.prefs.order);
        state.prefs.order = order.apply(OrderEvent::ManualMove {
            from: from.clone(),
            to: to.clone(),
        });
        Ok(())
    }

    /// Flip visibility of a feature row. Returns true if it is now hidden.
    pub async fn toggle_hidden(&self, feature: &str) -> Result<bool, MatrixError> {
        let mut state = self.state.lock().await;
        state.ensure_live()?;
        Ok(state.prefs.hidden.toggle(canon::canonicalize(feature)))
    }

    /// Replace the hidden row set.
    pub async fn set_hidden(&self, hidden: HiddenFeatures) -> Result<(), MatrixError> {
        let mut state = self.state.lock().await;
        state.ensure_live()?;
        state.prefs.hidden = hidden
            .iter()
            .map(|k| canon::canonicalize(k).to_string())
            .collect();
        Ok(())
    }

    /// Current preferences, column order restricted to columns on screen.
    pub async fn view_preferences(&self) -> ViewPreferences {
        let state = self.state.lock().await;
        ViewPreferences {
            order: OrderState::from_keys(state.prefs.order.visible(&state.current_keys())),
            hidden: state.prefs.hidden.clone(),
        }
    }

    /// Adopt saved or shared preferences. Columns they do not mention are
    /// appended in arrival order.
    pub async fn apply_preferences(&self, prefs: ViewPreferences) -> Result<(), MatrixError> {
        let mut state = self.state.lock().await;
        state.ensure_live()?;
        let current = state.current_keys();
        state.prefs = prefs.apply(ViewEvent::Order(OrderEvent::Refresh(current)));
        Ok(())
    }

    /// Load the local snapshot. Shared views never read local preferences.
    pub async fn load_local_prefs<P: PrefsPort>(&self, port: &P) -> Result<bool, MatrixError> {
        let ViewMode::Local { namespace } = &self.config.mode else {
            return Ok(false);
        };
        let Some(saved) = port.load_prefs(namespace) else {
            return Ok(false);
        };
        self.apply_preferences(ViewPreferences::from(&saved)).await?;
        Ok(true)
    }

    /// Save the local snapshot. Shared views never write local preferences.
    pub async fn save_local_prefs<P: PrefsPort>(&self, port: &P) -> Result<(), ConfigError> {
        let ViewMode::Local { namespace } = &self.config.mode else {
            return Ok(());
        };
        let prefs = self.view_preferences().await;
        port.save_prefs(namespace, &MatrixPrefs::from(&prefs))
    }

    /// Drop a failed edit and show the server copy again.
    pub async fn discard_failed(&self, key: &ColumnKey) -> bool {
        self.state.lock().await.discard_failed(key)
    }

    /// Save state of the edits on `key`.
    pub async fn pending_phase(&self, key: &ColumnKey) -> EditPhase {
        self.state.lock().await.phase_of(key)
    }

    /// Current matrix for rendering.
    pub async fn snapshot(&self) -> MatrixView {
        let state = self.state.lock().await;
        MatrixView::build(
            state.columns(),
            &state.prefs,
            self.config.editable(),
            state.processing,
            |key| state.phase_of(key),
        )
    }

    /// Take queued notices, expired ones discarded.
    pub async fn drain_notices(&self) -> Vec<Notice> {
        self.state.lock().await.drain_notices()
    }

    /// Share the given documents with the current preferences.
    #[instrument(skip(self, document_ids))]
    pub async fn create_share(
        &self,
        document_ids: &[String],
        editable: bool,
        role_scope: RoleScope,
    ) -> Result<ShareLink, MatrixError> {
        let prefs = self.view_preferences().await;
        let link = self
            .backend
            .create_share(document_ids, &prefs, editable, role_scope)
            .await
            .map_err(MatrixError::Backend)?;
        info!(token = %link.token, "share created");
        Ok(link)
    }

    /// Stop accepting work. Pollers stop and late results are ignored.
    pub async fn teardown(&self) {
        self.state.lock().await.torn_down = true;
        self.shutdown.send_replace(true);
        debug!("matrix engine torn down");
    }

    /// Fires `true` on teardown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
