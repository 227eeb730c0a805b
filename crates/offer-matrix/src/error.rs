// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Errors returned by engine operations.

use thiserror::Error;

use crate::backend::BackendError;
use crate::column::ColumnKey;
use crate::numeric::ValidationError;

/// Why a matrix operation did not go through.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    /// Input rejected before anything was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The backend does not know the row yet; retry shortly.
    #[error("row for {0} is not available yet")]
    IdentityResolution(ColumnKey),
    /// The backend call failed. Optimistic state is kept.
    #[error("could not save {key}: {source}")]
    Persistence {
        /// Column being saved.
        key: ColumnKey,
        /// Backend failure.
        source: BackendError,
    },
    /// Loading offers or creating a share failed.
    #[error("backend: {0}")]
    Backend(#[source] BackendError),
    /// Error columns and read-only shares cannot be changed.
    #[error("{0} is not editable")]
    NotEditable(ColumnKey),
    /// No such column on screen.
    #[error("unknown column {0}")]
    UnknownColumn(ColumnKey),
    /// The edit would give the column an identity already in use.
    #[error("{0} is already taken by another offer")]
    IdentityConflict(ColumnKey),
    /// The engine was torn down.
    #[error("matrix engine torn down")]
    TornDown,
}

impl MatrixError {
    /// True when the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IdentityResolution(_)
                | Self::Backend(BackendError::Transport(_))
                | Self::Persistence {
                    source: BackendError::Transport(_),
                    ..
                }
        )
    }
}
