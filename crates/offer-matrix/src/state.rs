// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Matrix state behind the engine lock.
//!
//! Everything here is synchronous; the engine takes the lock, calls into this
//! module, and releases the lock before awaiting the backend. Ordering between
//! fetches and acknowledgements uses a logical clock: each fetch is stamped
//! when it starts, each acknowledgement when it lands.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use offer_app_core::notice::{Notice, NoticeKind, NoticeQueue};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::column::{build_columns, has_processing, Column, ColumnKey, OfferColumn, OfferGroup, RowId};
use crate::edit::OfferPatch;
use crate::engine::EditPhase;
use crate::error::MatrixError;
use crate::order::{OrderEvent, ViewPreferences};

/// Post-ack fetches that may still list an edited row with its old values
/// before the edit is given up on and the server copy shown.
const STALE_READ_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Pending,
    Reconciling { acked_at: u64 },
    Failed,
}

/// Unconfirmed changes to one backend row, merged across submissions.
#[derive(Debug, Clone)]
pub(crate) struct PendingEdit {
    pub(crate) row_id: RowId,
    /// Identity the server last reported.
    pub(crate) original: ColumnKey,
    /// Identity shown to the user.
    pub(crate) target: ColumnKey,
    pub(crate) patch: OfferPatch,
    /// Clock value of the latest submission.
    pub(crate) seq: u64,
    pub(crate) phase: Phase,
    /// Post-ack fetches that listed the row without the edit.
    stale_reads: u32,
}

/// A deleted row that racing fetches must not bring back.
#[derive(Debug, Clone)]
pub(crate) struct Tombstone {
    /// Displayed key plus the identity the server may still list it under.
    keys: Vec<ColumnKey>,
    row_id: RowId,
    acked_at: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct MatrixState {
    /// Columns as last fetched.
    server: Vec<Column>,
    /// Columns as displayed: server data plus pending edits.
    columns: Vec<Column>,
    pub(crate) prefs: ViewPreferences,
    pending: Vec<PendingEdit>,
    tombstones: Vec<Tombstone>,
    known_rows: HashMap<ColumnKey, RowId>,
    row_queues: HashMap<RowId, Arc<Mutex<()>>>,
    clock: u64,
    last_fetch: Option<u64>,
    pub(crate) processing: bool,
    pub(crate) loaded: bool,
    pub(crate) torn_down: bool,
    notices: NoticeQueue,
    notice_ttl: Duration,
}

impl MatrixState {
    pub(crate) fn new(notice_capacity: usize, notice_ttl: Duration) -> Self {
        Self {
            server: Vec::new(),
            columns: Vec::new(),
            prefs: ViewPreferences::default(),
            pending: Vec::new(),
            tombstones: Vec::new(),
            known_rows: HashMap::new(),
            row_queues: HashMap::new(),
            clock: 0,
            last_fetch: None,
            processing: false,
            loaded: false,
            torn_down: false,
            notices: NoticeQueue::new(notice_capacity),
            notice_ttl,
        }
    }

    pub(crate) fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub(crate) fn ensure_live(&self) -> Result<(), MatrixError> {
        if self.torn_down {
            Err(MatrixError::TornDown)
        } else {
            Ok(())
        }
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn current_keys(&self) -> Vec<ColumnKey> {
        self.columns.iter().map(|c| c.key().clone()).collect()
    }

    /// Displayed column by key; error columns are reported as not editable.
    pub(crate) fn column(&self, key: &ColumnKey) -> Result<&OfferColumn, MatrixError> {
        match self.columns.iter().find(|c| c.key() == key) {
            Some(Column::Offer(offer)) => Ok(offer),
            Some(Column::Error(_)) => Err(MatrixError::NotEditable(key.clone())),
            None => Err(MatrixError::UnknownColumn(key.clone())),
        }
    }

    fn entry_for(&self, key: &ColumnKey) -> Option<&PendingEdit> {
        self.pending.iter().find(|e| e.target == *key)
    }

    pub(crate) fn row_id_of(&self, column: &OfferColumn) -> Option<RowId> {
        column
            .row_id
            .or_else(|| self.entry_for(&column.key).map(|e| e.row_id))
            .or_else(|| self.known_rows.get(&column.key).copied())
    }

    /// True if another displayed column already stands for `row_id`.
    pub(crate) fn row_shown_elsewhere(&self, key: &ColumnKey, row_id: RowId) -> bool {
        self.columns
            .iter()
            .filter_map(Column::as_offer)
            .any(|c| c.key != *key && self.row_id_of(c) == Some(row_id))
    }

    pub(crate) fn remember_row(&mut self, key: &ColumnKey, row_id: RowId) {
        self.known_rows.insert(key.clone(), row_id);
        if let Some(offer) = self
            .columns
            .iter_mut()
            .find(|c| c.key() == key)
            .and_then(Column::as_offer_mut)
        {
            offer.row_id = Some(row_id);
        }
    }

    /// What the server should hold for `displayed` once in-flight edits land.
    /// Failed edits are excluded so they can be resubmitted.
    pub(crate) fn expected_server(&self, displayed: &OfferColumn) -> OfferColumn {
        let entry = self.entry_for(&displayed.key);
        let row = self.row_id_of(displayed);
        let identity = entry.map_or(&displayed.key, |e| &e.original);
        let server = self
            .server
            .iter()
            .filter_map(Column::as_offer)
            .find(|c| (row.is_some() && c.row_id == row) || c.key == *identity);
        match server {
            Some(server) => {
                let mut base = server.clone();
                if let Some(e) = entry.filter(|e| e.phase != Phase::Failed) {
                    e.patch.apply_to(&mut base);
                }
                base
            }
            None => displayed.clone(),
        }
    }

    /// Reject an identity change that would collide with another column or
    /// with an identity another in-flight edit is moving to or away from.
    pub(crate) fn check_identity(
        &self,
        column: &OfferColumn,
        patch: &OfferPatch,
    ) -> Result<(), MatrixError> {
        let next = patch.identity_after(column);
        if next == column.key {
            return Ok(());
        }
        let row = self.row_id_of(column);
        let taken = self.columns.iter().any(|c| *c.key() == next)
            || self
                .pending
                .iter()
                .filter(|e| Some(e.row_id) != row)
                .any(|e| e.target == next || e.original == next);
        if taken {
            Err(MatrixError::IdentityConflict(next))
        } else {
            Ok(())
        }
    }

    /// Merge `patch` into the displayed column and the row's pending edit.
    ///
    /// Returns the submission sequence and the patch to send. Resubmitting over
    /// a failed edit sends everything still unconfirmed.
    pub(crate) fn apply_optimistic(
        &mut self,
        key: &ColumnKey,
        row_id: RowId,
        patch: &OfferPatch,
    ) -> Result<(u64, OfferPatch), MatrixError> {
        let Some(offer) = self
            .columns
            .iter_mut()
            .find(|c| c.key() == key)
            .and_then(Column::as_offer_mut)
        else {
            return Err(MatrixError::UnknownColumn(key.clone()));
        };
        let before = offer.key.clone();
        patch.apply_to(offer);
        offer.row_id = Some(row_id);
        let after = offer.key.clone();

        let seq = self.tick();
        let outgoing = match self.pending.iter_mut().find(|e| e.row_id == row_id) {
            Some(entry) => {
                let resubmit = entry.phase == Phase::Failed;
                entry.patch.merge(patch);
                entry.target = after.clone();
                entry.seq = seq;
                entry.phase = Phase::Pending;
                entry.stale_reads = 0;
                if resubmit {
                    entry.patch.clone()
                } else {
                    patch.clone()
                }
            }
            None => {
                self.pending.push(PendingEdit {
                    row_id,
                    original: before.clone(),
                    target: after.clone(),
                    patch: patch.clone(),
                    seq,
                    phase: Phase::Pending,
                    stale_reads: 0,
                });
                patch.clone()
            }
        };

        self.known_rows.insert(after.clone(), row_id);
        if before != after {
            let current = self.current_keys();
            self.reorder(OrderEvent::RenameIdentity {
                old: before,
                new: after,
                current,
            });
        }
        Ok((seq, outgoing))
    }

    /// The backend accepted submission `seq`. Only the latest submission moves
    /// the edit on; a failure recorded since is kept.
    pub(crate) fn acknowledge(&mut self, row_id: RowId, seq: u64) {
        let at = self.tick();
        if let Some(entry) = self
            .pending
            .iter_mut()
            .find(|e| e.row_id == row_id && e.seq == seq && e.phase == Phase::Pending)
        {
            entry.phase = Phase::Reconciling { acked_at: at };
        }
    }

    pub(crate) fn mark_failed(&mut self, row_id: RowId) {
        if let Some(entry) = self.pending.iter_mut().find(|e| e.row_id == row_id) {
            entry.phase = Phase::Failed;
        }
    }

    /// Drop a failed edit and show the server copy again.
    pub(crate) fn discard_failed(&mut self, key: &ColumnKey) -> bool {
        let Some(at) = self
            .pending
            .iter()
            .position(|e| e.target == *key && e.phase == Phase::Failed)
        else {
            return false;
        };
        let entry = self.pending.remove(at);
        if entry.original != entry.target {
            self.known_rows.remove(&entry.target);
            self.known_rows.insert(entry.original.clone(), entry.row_id);
            let current = self
                .current_keys()
                .into_iter()
                .map(|k| if k == entry.target { entry.original.clone() } else { k })
                .collect();
            self.reorder(OrderEvent::RenameIdentity {
                old: entry.target,
                new: entry.original,
                current,
            });
        }
        self.rebuild();
        true
    }

    pub(crate) fn phase_of(&self, key: &ColumnKey) -> EditPhase {
        self.entry_for(key).map_or(EditPhase::Clean, |e| match e.phase {
            Phase::Pending => EditPhase::Pending,
            Phase::Reconciling { .. } => EditPhase::Reconciling,
            Phase::Failed => EditPhase::Failed,
        })
    }

    /// Serializes backend mutations per row.
    pub(crate) fn row_queue(&mut self, row_id: RowId) -> Arc<Mutex<()>> {
        Arc::clone(self.row_queues.entry(row_id).or_default())
    }

    /// Remove a column ahead of its backend delete.
    ///
    /// A renamed column whose edit has not landed is still listed under its
    /// old identity, so both keys are buried.
    pub(crate) fn bury(&mut self, key: &ColumnKey, row_id: RowId) {
        let mut keys = vec![key.clone()];
        for entry in self.pending.iter().filter(|e| e.row_id == row_id) {
            if !keys.contains(&entry.original) {
                keys.push(entry.original.clone());
            }
        }
        self.columns.retain(|c| c.key() != key);
        self.pending.retain(|e| e.row_id != row_id);
        self.known_rows.retain(|_, row| *row != row_id);
        self.reorder(OrderEvent::Remove(key.clone()));
        self.tombstones.push(Tombstone {
            keys,
            row_id,
            acked_at: None,
        });
    }

    pub(crate) fn confirm_burial(&mut self, row_id: RowId) {
        let at = self.tick();
        for t in self.tombstones.iter_mut().filter(|t| t.row_id == row_id) {
            t.acked_at = Some(at);
        }
    }

    /// The delete failed; show the server copy again.
    pub(crate) fn exhume(&mut self, row_id: RowId) {
        self.tombstones.retain(|t| t.row_id != row_id);
        self.rebuild();
    }

    fn is_buried(&self, column: &Column) -> bool {
        self.tombstones
            .iter()
            .any(|t| column.row_id() == Some(t.row_id) || t.keys.contains(column.key()))
    }

    /// Drop the submission queue of a row nothing is waiting on any more.
    fn release_queue(&mut self, row_id: RowId) {
        if self
            .row_queues
            .get(&row_id)
            .is_some_and(|queue| Arc::strong_count(queue) == 1)
        {
            self.row_queues.remove(&row_id);
        }
    }

    fn reorder(&mut self, event: OrderEvent) {
        self.prefs.order = mem::take(&mut self.prefs.order).apply(event);
    }

    /// Merge a fetch that started at clock value `started`.
    ///
    /// Results older than the last applied fetch are discarded. An
    /// acknowledged edit is dropped once a fetch that started after the
    /// acknowledgement lists its row with the edit applied; everything else
    /// pending is re-applied.
    pub(crate) fn apply_refresh(
        &mut self,
        groups: &[OfferGroup],
        started: u64,
        shared: Option<ViewPreferences>,
    ) -> bool {
        if let Some(last) = self.last_fetch.filter(|last| started < *last) {
            debug!(started, last, "discarding stale fetch");
            return false;
        }
        self.last_fetch = Some(started);
        if let Some(prefs) = shared.filter(|_| !self.loaded) {
            self.prefs = prefs;
        }
        self.loaded = true;
        self.processing = has_processing(groups);

        let fresh = build_columns(groups);
        let listed = |row: RowId, key: &ColumnKey| {
            fresh
                .iter()
                .find(|c| c.row_id() == Some(row) || c.key() == key)
        };

        let mut forgotten = Vec::new();
        self.tombstones.retain(|t| match t.acked_at {
            Some(at) if started > at => {
                let kept = t.keys.iter().any(|k| listed(t.row_id, k).is_some());
                if !kept {
                    forgotten.push(t.row_id);
                }
                kept
            }
            _ => true,
        });

        let mut settled = Vec::new();
        self.pending.retain_mut(|e| {
            if !matches!(e.phase, Phase::Reconciling { acked_at } if started > acked_at) {
                return true;
            }
            let Some(column) = listed(e.row_id, &e.target) else {
                return true;
            };
            if column.as_offer().is_some_and(|offer| e.patch.diff(offer).is_empty()) {
                debug!(key = %e.target, row = %e.row_id, "edit confirmed by server");
            } else if e.stale_reads < STALE_READ_LIMIT {
                e.stale_reads += 1;
                debug!(key = %e.target, reads = e.stale_reads, "server lists the row without the edit yet");
                return true;
            } else {
                warn!(key = %e.target, row = %e.row_id, "server never reflected the edit; showing its copy");
            }
            settled.push((e.row_id, e.original.clone(), e.target.clone()));
            false
        });

        for (row_id, original, target) in settled {
            if original != target && self.known_rows.get(&original) == Some(&row_id) {
                self.known_rows.remove(&original);
            }
            self.release_queue(row_id);
        }
        for row_id in forgotten {
            self.known_rows.retain(|_, row| *row != row_id);
            self.release_queue(row_id);
        }
        self.server = fresh;
        self.rebuild();
        true
    }

    /// Recompute displayed columns and order from server data, tombstones and
    /// pending edits.
    pub(crate) fn rebuild(&mut self) {
        let mut display: Vec<Column> = self
            .server
            .iter()
            .filter(|c| !self.is_buried(c))
            .cloned()
            .collect();
        for offer in display.iter_mut().filter_map(Column::as_offer_mut) {
            if offer.row_id.is_none() {
                offer.row_id = self.known_rows.get(&offer.key).copied();
            }
        }

        for entry in &self.pending {
            let slot = display
                .iter()
                .position(|c| c.row_id() == Some(entry.row_id))
                .or_else(|| display.iter().position(|c| *c.key() == entry.original))
                .or_else(|| display.iter().position(|c| *c.key() == entry.target));
            match slot {
                Some(i) => {
                    if let Some(offer) = display[i].as_offer_mut() {
                        entry.patch.apply_to(offer);
                        offer.key = entry.target.clone();
                        offer.row_id = Some(entry.row_id);
                    }
                }
                None => {
                    if let Some(previous) = self.columns.iter().find(|c| *c.key() == entry.target) {
                        debug!(key = %entry.target, "server has not caught up; keeping optimistic column");
                        display.push(previous.clone());
                    }
                }
            }
        }

        let current: Vec<ColumnKey> = display.iter().map(|c| c.key().clone()).collect();
        let mut order = mem::take(&mut self.prefs.order);
        for entry in self.pending.iter().filter(|e| e.original != e.target) {
            order = order.apply(OrderEvent::RenameIdentity {
                old: entry.original.clone(),
                new: entry.target.clone(),
                current: current.clone(),
            });
        }
        self.prefs.order = order.apply(OrderEvent::Refresh(current));
        self.columns = display;
    }

    pub(crate) fn notify(&mut self, kind: NoticeKind, title: &str, body: Option<String>) {
        let ttl = self.notice_ttl;
        self.notices.push(kind, title, body, ttl, Instant::now());
    }

    pub(crate) fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.retain_visible(Instant::now());
        self.notices.drain()
    }
}
