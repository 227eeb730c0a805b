// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared setup for engine integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use offer_dry_tests::{FakeBackend, GroupBuilder, ProgramBuilder};
use offer_matrix::{ColumnKey, EngineConfig, MatrixEngine, OfferColumn, OfferGroup};

pub const P1: &str = "a.pdf::BTA::P1";
pub const P2: &str = "a.pdf::BTA::P2";

pub fn key(k: &str) -> ColumnKey {
    ColumnKey::from(k)
}

/// One document, two programs with inline row ids 1 and 2.
pub fn two_offers() -> Vec<OfferGroup> {
    vec![GroupBuilder::new("a.pdf", "BTA")
        .program(
            ProgramBuilder::new("P1")
                .row(1)
                .premium(100.0)
                .feature("MR", "v"),
        )
        .program(ProgramBuilder::new("P2").row(2).premium(200.0))
        .build()]
}

/// `two_offers` as a lagging replica would list it: P1 not there yet.
pub fn without_p1() -> Vec<OfferGroup> {
    vec![GroupBuilder::new("a.pdf", "BTA")
        .program(ProgramBuilder::new("P2").row(2).premium(200.0))
        .build()]
}

pub fn engine(backend: &FakeBackend, config: EngineConfig) -> MatrixEngine<FakeBackend> {
    MatrixEngine::new(Arc::new(backend.clone()), config)
}

/// Local engine over every document, already loaded.
pub async fn loaded(backend: &FakeBackend) -> MatrixEngine<FakeBackend> {
    let engine = engine(backend, EngineConfig::job("job-1", "Acme"));
    engine.load().await.expect("initial load");
    engine
}

/// Offer column as currently displayed.
pub async fn shown(engine: &MatrixEngine<FakeBackend>, k: &str) -> Option<OfferColumn> {
    engine
        .snapshot()
        .await
        .column(&key(k))
        .and_then(|c| c.column.as_offer().cloned())
}

/// Yield to spawned tasks until `done` holds.
pub async fn wait_until(done: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(done(), "condition never became true");
}
