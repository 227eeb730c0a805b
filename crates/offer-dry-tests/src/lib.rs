// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for offer matrix crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`backend`] - In-memory [`OfferBackend`](offer_matrix::OfferBackend) with gates and counters
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`fixtures`] - Offer group and program builders

pub mod backend;
pub mod config;
pub mod fixtures;

pub use backend::{CallCounts, FakeBackend, Gate};
pub use config::InMemoryConfigStore;
pub use fixtures::{GroupBuilder, ProgramBuilder};
