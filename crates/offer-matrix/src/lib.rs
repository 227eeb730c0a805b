// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! offer-matrix: state engine for insurance offer comparison matrices.
//!
//! Rows are canonical feature keys, columns are offers. The engine keeps
//! column identity and user order stable across refreshes, applies edits
//! optimistically and reconciles them with the backend, and packs view
//! preferences into tokens for share links.
//!
//! Backend access goes through [`OfferBackend`]; local preference snapshots
//! go through `offer_app_core::prefs::PrefsPort`.

pub mod backend;
pub mod canon;
pub mod cell;
pub mod codec;
pub mod column;
pub mod edit;
pub mod engine;
pub mod error;
pub mod numeric;
pub mod order;
pub mod poll;
mod state;
pub mod value;
pub mod view;

pub use backend::{BackendError, FetchSource, OfferBackend, RoleScope, ShareLink, SharedView};
pub use cell::Cell;
pub use column::{build_columns, Column, ColumnKey, GroupStatus, OfferColumn, OfferGroup, ProgramOffer, RowId};
pub use edit::{ChangeSet, OfferPatch};
pub use engine::{EditOutcome, EditPhase, EngineConfig, MatrixEngine, ViewMode};
pub use error::MatrixError;
pub use numeric::ValidationError;
pub use order::{HiddenFeatures, OrderEvent, OrderState, ViewEvent, ViewPreferences};
pub use poll::{PollExit, PollerConfig, RefreshPoller};
pub use value::{FeatureBag, FeatureValue};
pub use view::{ColumnView, MatrixView, RowView};
