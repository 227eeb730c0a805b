// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for offer matrix tools (config, prefs, notices).
//! Keeps UI/runtime adapters thin and framework-agnostic.

pub mod config;
pub mod notice;
pub mod prefs;
