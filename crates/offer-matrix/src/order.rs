// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Column order and row visibility as a pure reducer.
//!
//! The stored order is a superset of what is on screen: keys of columns that
//! vanish during a refresh stay stored (a refresh can be transiently empty)
//! and are skipped by [`merge`] when the view is projected. Survivors never
//! change relative order; genuinely new keys are appended.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::column::ColumnKey;

/// Visible order: stored keys still present, then present keys not yet stored.
pub fn merge(stored: &[ColumnKey], current: &[ColumnKey]) -> Vec<ColumnKey> {
    let current_set: HashSet<&ColumnKey> = current.iter().collect();
    let stored_set: HashSet<&ColumnKey> = stored.iter().collect();
    stored
        .iter()
        .filter(|k| current_set.contains(k))
        .chain(current.iter().filter(|k| !stored_set.contains(k)))
        .cloned()
        .collect()
}

/// Persisted column order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderState {
    keys: Vec<ColumnKey>,
}

/// Transitions of [`OrderState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// Columns were rebuilt; append keys never seen before.
    Refresh(Vec<ColumnKey>),
    /// Drag `from` to just before `to`.
    ManualMove {
        /// Key being moved.
        from: ColumnKey,
        /// Key it lands in front of.
        to: ColumnKey,
    },
    /// An edit changed a column's identity; keep its slot.
    RenameIdentity {
        /// Identity before the edit.
        old: ColumnKey,
        /// Identity after the edit.
        new: ColumnKey,
        /// Keys of the latest column set.
        current: Vec<ColumnKey>,
    },
    /// Column deleted.
    Remove(ColumnKey),
    /// Forget stored keys absent from `current`.
    Prune(Vec<ColumnKey>),
}

impl OrderState {
    /// Order from explicit keys (duplicates after the first are dropped).
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = ColumnKey>,
    {
        let mut seen = HashSet::new();
        Self {
            keys: keys.into_iter().filter(|k| seen.insert(k.clone())).collect(),
        }
    }

    /// Stored keys, including ones not currently on screen.
    pub fn keys(&self) -> &[ColumnKey] {
        &self.keys
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Projection onto the current column set.
    pub fn visible(&self, current: &[ColumnKey]) -> Vec<ColumnKey> {
        merge(&self.keys, current)
    }

    /// Apply one transition.
    pub fn apply(self, event: OrderEvent) -> Self {
        reduce(self, event)
    }

    fn append_new(mut self, current: &[ColumnKey]) -> Self {
        let stored: HashSet<ColumnKey> = self.keys.iter().cloned().collect();
        self.keys
            .extend(current.iter().filter(|k| !stored.contains(*k)).cloned());
        self
    }
}

/// `OrderState × OrderEvent → OrderState`.
pub fn reduce(state: OrderState, event: OrderEvent) -> OrderState {
    match event {
        OrderEvent::Refresh(current) => state.append_new(&current),
        OrderEvent::ManualMove { from, to } => {
            let mut keys = state.keys;
            if from == to || !keys.contains(&to) {
                return OrderState { keys };
            }
            let Some(at) = keys.iter().position(|k| *k == from) else {
                return OrderState { keys };
            };
            let moved = keys.remove(at);
            let before = keys.iter().position(|k| *k == to).unwrap_or(keys.len());
            keys.insert(before, moved);
            OrderState { keys }
        }
        OrderEvent::RenameIdentity { old, new, current } => {
            let mut keys = state.keys;
            if old != new {
                if let Some(at) = keys.iter().position(|k| *k == old) {
                    keys = keys
                        .into_iter()
                        .enumerate()
                        .filter_map(|(i, k)| {
                            if i == at {
                                Some(new.clone())
                            } else if k == new {
                                None
                            } else {
                                Some(k)
                            }
                        })
                        .collect();
                }
            }
            OrderState { keys }.append_new(&current)
        }
        OrderEvent::Remove(key) => {
            let mut keys = state.keys;
            keys.retain(|k| *k != key);
            OrderState { keys }
        }
        OrderEvent::Prune(current) => OrderState {
            keys: merge(&state.keys, &current),
        },
    }
}

/// Canonical feature keys hidden from the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HiddenFeatures(BTreeSet<String>);

impl HiddenFeatures {
    /// Flip membership of `key`. Returns true if it is now hidden.
    pub fn toggle(&mut self, key: &str) -> bool {
        if self.0.remove(key) {
            false
        } else {
            self.0.insert(key.to_string());
            true
        }
    }

    /// True if `key` is hidden.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// Hidden keys, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Underlying set.
    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.0
    }

    /// True when nothing is hidden.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for HiddenFeatures {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Column order plus hidden rows: the unit of persistence and sharing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewPreferences {
    /// Column order.
    #[serde(default)]
    pub order: OrderState,
    /// Hidden feature rows.
    #[serde(default)]
    pub hidden: HiddenFeatures,
}

/// Transitions of [`ViewPreferences`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// Order transition.
    Order(OrderEvent),
    /// Flip a feature row's visibility.
    ToggleHidden(String),
    /// Replace the hidden set.
    SetHidden(HiddenFeatures),
}

impl ViewPreferences {
    /// Apply one transition. Order and visibility never affect each other.
    pub fn apply(self, event: ViewEvent) -> Self {
        let Self { order, mut hidden } = self;
        match event {
            ViewEvent::Order(e) => Self {
                order: order.apply(e),
                hidden,
            },
            ViewEvent::ToggleHidden(key) => {
                hidden.toggle(&key);
                Self { order, hidden }
            }
            ViewEvent::SetHidden(hidden) => Self { order, hidden },
        }
    }

    /// True when neither order nor hidden rows are set.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty() && self.hidden.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(names: &[&str]) -> Vec<ColumnKey> {
        names.iter().map(|n| ColumnKey::from(*n)).collect()
    }

    fn state(names: &[&str]) -> OrderState {
        OrderState::from_keys(keys(names))
    }

    #[test]
    fn first_refresh_uses_arrival_order() {
        let s = OrderState::default().apply(OrderEvent::Refresh(keys(&["a", "b", "c"])));
        assert_eq!(s.keys(), keys(&["a", "b", "c"]).as_slice());
    }

    #[test]
    fn refresh_keeps_survivor_order_and_appends_new() {
        let s = state(&["c", "a", "b"]);
        let current = keys(&["a", "d", "c"]);
        assert_eq!(s.visible(&current), keys(&["c", "a", "d"]));
        let s = s.apply(OrderEvent::Refresh(current));
        // vanished "b" is kept in storage
        assert_eq!(s.keys(), keys(&["c", "a", "b", "d"]).as_slice());
    }

    #[test]
    fn empty_refresh_window_does_not_lose_order() {
        let s = state(&["b", "a"]).apply(OrderEvent::Refresh(vec![]));
        assert!(s.visible(&[]).is_empty());
        assert_eq!(s.visible(&keys(&["a", "b"])), keys(&["b", "a"]));
    }

    #[test]
    fn manual_move_inserts_before_target() {
        let s = state(&["a", "b", "c", "d"]);
        let moved = s.clone().apply(OrderEvent::ManualMove {
            from: "d".into(),
            to: "b".into(),
        });
        assert_eq!(moved.keys(), keys(&["a", "d", "b", "c"]).as_slice());
        let moved = s.clone().apply(OrderEvent::ManualMove {
            from: "a".into(),
            to: "c".into(),
        });
        assert_eq!(moved.keys(), keys(&["b", "a", "c", "d"]).as_slice());
    }

    #[test]
    fn manual_move_noops() {
        let s = state(&["a", "b"]);
        for (from, to) in [("a", "a"), ("x", "b"), ("a", "x")] {
            let after = s.clone().apply(OrderEvent::ManualMove {
                from: from.into(),
                to: to.into(),
            });
            assert_eq!(after, s);
        }
    }

    #[test]
    fn rename_preserves_position() {
        let s = state(&["A", "B", "C"]).apply(OrderEvent::RenameIdentity {
            old: "B".into(),
            new: "B2".into(),
            current: keys(&["A", "C", "B2"]),
        });
        assert_eq!(s.visible(&keys(&["A", "C", "B2"])), keys(&["A", "B2", "C"]));
    }

    #[test]
    fn rename_onto_stale_key_keeps_single_entry() {
        let s = state(&["B2", "A", "B", "C"]).apply(OrderEvent::RenameIdentity {
            old: "B".into(),
            new: "B2".into(),
            current: keys(&["A", "B2", "C"]),
        });
        assert_eq!(s.keys(), keys(&["A", "B2", "C"]).as_slice());
    }

    #[test]
    fn remove_and_prune() {
        let s = state(&["a", "b", "c"]).apply(OrderEvent::Remove("b".into()));
        assert_eq!(s.keys(), keys(&["a", "c"]).as_slice());
        let s = s.apply(OrderEvent::Prune(keys(&["c", "z"])));
        assert_eq!(s.keys(), keys(&["c", "z"]).as_slice());
    }

    #[test]
    fn hidden_toggle_is_independent_of_order() {
        let prefs = ViewPreferences {
            order: state(&["a", "b"]),
            hidden: HiddenFeatures::default(),
        };
        let prefs = prefs.apply(ViewEvent::ToggleHidden("Homeopāts".into()));
        assert!(prefs.hidden.contains("Homeopāts"));
        assert_eq!(prefs.order, state(&["a", "b"]));
        let prefs = prefs.apply(ViewEvent::ToggleHidden("Homeopāts".into()));
        assert!(prefs.hidden.is_empty());
    }

    fn key_list() -> impl Strategy<Value = Vec<ColumnKey>> {
        prop::collection::vec("[a-h]", 0..8).prop_map(|names| {
            OrderState::from_keys(names.into_iter().map(ColumnKey::from))
                .keys()
                .to_vec()
        })
    }

    proptest! {
        #[test]
        fn merge_preserves_survivors_and_appends_only_new(
            stored in key_list(),
            current in key_list(),
        ) {
            let merged = merge(&stored, &current);
            let survivors: Vec<_> = stored.iter().filter(|k| current.contains(k)).cloned().collect();
            prop_assert_eq!(&merged[..survivors.len()], survivors.as_slice());
            for k in &merged[survivors.len()..] {
                prop_assert!(!stored.contains(k));
            }
            prop_assert_eq!(merged.len(), current.len());
        }
    }
}
