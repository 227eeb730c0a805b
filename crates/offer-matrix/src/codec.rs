// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Preference tokens for shareable links and local snapshots.
//!
//! A token is compact JSON (`{"o":[order...],"h":[hidden...]}`) in URL-safe
//! base64 without padding. JSON keeps labels as UTF-8, so non-ASCII feature
//! names ("Homeopāts") survive unchanged. Decoding never fails the caller:
//! a malformed token degrades to empty preferences.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use offer_app_core::prefs::MatrixPrefs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::column::ColumnKey;
use crate::order::{HiddenFeatures, OrderState, ViewPreferences};

/// Query parameter carrying the share token.
pub const SHARE_PARAM: &str = "share";
/// Query parameter carrying the encoded hidden-feature set.
pub const HIDDEN_PARAM: &str = "hf";

/// Why a token could not be read.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Empty token.
    #[error("empty token")]
    Empty,
    /// Not base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Not the expected JSON shape (or not UTF-8).
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Wire {
    #[serde(rename = "o", default, skip_serializing_if = "Vec::is_empty")]
    order: Vec<ColumnKey>,
    #[serde(rename = "h", default, skip_serializing_if = "Vec::is_empty")]
    hidden: Vec<String>,
}

fn pack(wire: &Wire) -> String {
    match serde_json::to_vec(wire) {
        Ok(json) => URL_SAFE_NO_PAD.encode(json),
        Err(err) => {
            debug!(?err, "preference token not encodable");
            String::new()
        }
    }
}

fn unpack(token: &str) -> Result<Wire, DecodeError> {
    // tolerate padding and the standard alphabet from older links
    let token: String = token
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = URL_SAFE_NO_PAD.decode(token.as_bytes())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode order and hidden rows.
pub fn encode(prefs: &ViewPreferences) -> String {
    pack(&Wire {
        order: prefs.order.keys().to_vec(),
        hidden: prefs.hidden.iter().cloned().collect(),
    })
}

/// Decode a token, reporting why it failed.
pub fn try_decode(token: &str) -> Result<ViewPreferences, DecodeError> {
    let wire = unpack(token)?;
    Ok(ViewPreferences {
        order: OrderState::from_keys(wire.order),
        hidden: wire.hidden.into_iter().collect(),
    })
}

/// Decode a token; malformed input yields empty preferences.
pub fn decode(token: &str) -> ViewPreferences {
    try_decode(token).unwrap_or_else(|err| {
        debug!(%err, "ignoring unreadable preference token");
        ViewPreferences::default()
    })
}

/// Encode only the hidden set (the share URL carries nothing else).
pub fn encode_hidden(hidden: &HiddenFeatures) -> String {
    pack(&Wire {
        order: Vec::new(),
        hidden: hidden.iter().cloned().collect(),
    })
}

/// Decode a hidden-set token; malformed input yields an empty set.
pub fn decode_hidden(token: &str) -> HiddenFeatures {
    decode(token).hidden
}

/// `base?share=<token>[&hf=<hidden>]`. Existing query pairs on `base` are kept.
pub fn share_url(base: &Url, token: &str, hidden: &HiddenFeatures) -> Url {
    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(SHARE_PARAM, token);
        if !hidden.is_empty() {
            pairs.append_pair(HIDDEN_PARAM, &encode_hidden(hidden));
        }
    }
    url
}

/// Share token carried by a link, if any.
pub fn share_token_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == SHARE_PARAM)
        .map(|(_, v)| v.into_owned())
}

/// Hidden set carried by a link; absent or unreadable yields an empty set.
pub fn hidden_from_url(url: &Url) -> HiddenFeatures {
    url.query_pairs()
        .find(|(k, _)| k == HIDDEN_PARAM)
        .map(|(_, v)| decode_hidden(&v))
        .unwrap_or_default()
}

impl From<&MatrixPrefs> for ViewPreferences {
    fn from(local: &MatrixPrefs) -> Self {
        Self {
            order: OrderState::from_keys(
                local.column_order.iter().map(|k| ColumnKey::from(k.as_str())),
            ),
            hidden: local.hidden_features.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&ViewPreferences> for MatrixPrefs {
    fn from(prefs: &ViewPreferences) -> Self {
        Self {
            column_order: prefs.order.keys().iter().map(ToString::to_string).collect(),
            hidden_features: prefs.hidden.iter().cloned().collect(),
        }
    }
}
