// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deletes, fetch ordering, background polling and teardown.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{engine, key, loaded, shown, two_offers, wait_until, without_p1, P1, P2};
use offer_app_core::notice::NoticeKind;
use offer_dry_tests::{FakeBackend, GroupBuilder, ProgramBuilder};
use offer_matrix::{
    BackendError, ChangeSet, EngineConfig, MatrixError, PollExit, PollerConfig, RefreshPoller,
    RowId,
};

#[tokio::test]
async fn deleted_column_stays_gone_while_a_refresh_races_the_delete() {
    let backend = FakeBackend::with_groups(two_offers());
    let engine = loaded(&backend).await;

    backend.patch_gate().hold();
    let delete = tokio::spawn({
        let engine = engine.clone();
        async move { engine.delete_column(&key(P1)).await }
    });
    wait_until(|| backend.calls().deletes == 1).await;
    assert!(shown(&engine, P1).await.is_none());

    engine.refresh().await;
    assert!(shown(&engine, P1).await.is_none());

    backend.patch_gate().release();
    assert_eq!(delete.await.unwrap(), Ok(()));
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P2)]);
    assert_eq!(backend.groups()[0].programs.len(), 1);
    assert_eq!(engine.view_preferences().await.order.keys().to_vec(), vec![key(P2)]);
}

#[tokio::test]
async fn deleting_a_renamed_column_mid_save_keeps_both_identities_hidden() {
    let backend = FakeBackend::with_groups(vec![GroupBuilder::new("a.pdf", "BTA")
        .program(ProgramBuilder::new("P1").row(1).premium(100.0))
        .program(ProgramBuilder::new("P3").premium(50.0))
        .build()]);
    backend.register_row("a.pdf", "BTA", "P3", 3);
    let engine = loaded(&backend).await;
    let (p3, p9) = (key("a.pdf::BTA::P3"), key("a.pdf::BTA::P9"));

    backend.patch_gate().hold();
    let rename = tokio::spawn({
        let engine = engine.clone();
        let p3 = p3.clone();
        async move {
            engine
                .submit_edit(&p3, &ChangeSet::default().program_code("P9"))
                .await
        }
    });
    wait_until(|| backend.calls().patches == 1).await;
    assert!(engine.snapshot().await.column(&p9).is_some());

    let delete = tokio::spawn({
        let engine = engine.clone();
        let p9 = p9.clone();
        async move { engine.delete_column(&p9).await }
    });
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P1)]);

    engine.refresh().await;
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P1)]);

    backend.patch_gate().release();
    assert!(rename.await.unwrap().is_ok());
    assert_eq!(delete.await.unwrap(), Ok(()));
    assert_eq!(backend.deletes(), vec![RowId(3)]);
    engine.refresh().await;
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P1)]);
}

#[tokio::test]
async fn failed_delete_brings_the_column_back() {
    let backend = FakeBackend::with_groups(two_offers());
    let engine = loaded(&backend).await;
    backend.fail_deletes(Some(BackendError::Transport("503".into())));

    let err = engine.delete_column(&key(P1)).await.unwrap_err();
    assert_eq!(
        err,
        MatrixError::Persistence {
            key: key(P1),
            source: BackendError::Transport("503".into()),
        }
    );
    assert!(shown(&engine, P1).await.is_some());
    assert!(engine
        .drain_notices()
        .await
        .iter()
        .any(|n| n.kind == NoticeKind::Error && n.title == "Could not delete offer"));
}

#[tokio::test]
async fn deleting_a_row_the_server_already_forgot_succeeds() {
    let backend = FakeBackend::with_groups(two_offers());
    let engine = loaded(&backend).await;
    backend.set_groups(without_p1());

    assert_eq!(engine.delete_column(&key(P1)).await, Ok(()));
    assert_eq!(backend.calls().deletes, 1);
    engine.refresh().await;
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P2)]);
}

#[tokio::test]
async fn delete_needs_a_resolvable_row() {
    let backend = FakeBackend::with_groups(vec![GroupBuilder::new("a.pdf", "BTA")
        .program(ProgramBuilder::new("P3"))
        .build()]);
    let engine = loaded(&backend).await;
    let p3 = key("a.pdf::BTA::P3");

    assert_eq!(
        engine.delete_column(&p3).await,
        Err(MatrixError::IdentityResolution(p3.clone()))
    );
    assert_eq!(backend.calls().deletes, 0);
    assert!(engine.snapshot().await.column(&p3).is_some());
}

#[tokio::test]
async fn older_fetch_landing_late_is_ignored() {
    let backend = FakeBackend::with_groups(two_offers());
    let engine = loaded(&backend).await;

    backend.fetch_gate().hold();
    let older = tokio::spawn({
        let engine = engine.clone();
        async move { engine.refresh().await }
    });
    wait_until(|| backend.calls().fetches == 2).await;

    backend.set_groups(without_p1());
    let newer = tokio::spawn({
        let engine = engine.clone();
        async move { engine.refresh().await }
    });
    wait_until(|| backend.calls().fetches == 3).await;

    backend.fetch_gate().release();
    older.await.unwrap();
    newer.await.unwrap();
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P2)]);
}

#[tokio::test]
async fn failed_refresh_keeps_what_is_shown() {
    let backend = FakeBackend::with_groups(two_offers());
    let engine = loaded(&backend).await;
    backend.fail_fetches(Some(BackendError::Transport("offline".into())));

    engine.refresh().await;
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P1), key(P2)]);
    assert_eq!(
        engine.load().await,
        Err(MatrixError::Backend(BackendError::Transport("offline".into())))
    );
}

#[tokio::test]
async fn nothing_runs_after_teardown() {
    let backend = FakeBackend::with_groups(two_offers());
    let engine = loaded(&backend).await;
    engine.teardown().await;
    let before = backend.calls();

    assert_eq!(
        engine
            .submit_edit(&key(P1), &ChangeSet::default().premium("1"))
            .await,
        Err(MatrixError::TornDown)
    );
    assert_eq!(engine.delete_column(&key(P1)).await, Err(MatrixError::TornDown));
    assert_eq!(
        engine.move_column(&key(P2), &key(P1)).await,
        Err(MatrixError::TornDown)
    );
    assert_eq!(engine.load().await, Err(MatrixError::TornDown));
    engine.refresh().await;
    assert_eq!(backend.calls(), before);
}

#[tokio::test]
async fn save_landing_after_teardown_is_dropped() {
    let backend = FakeBackend::with_groups(two_offers());
    let engine = loaded(&backend).await;

    backend.patch_gate().hold();
    let edit = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .submit_edit(&key(P1), &ChangeSet::default().premium("9"))
                .await
        }
    });
    wait_until(|| backend.calls().patches == 1).await;
    engine.teardown().await;
    let fetches = backend.calls().fetches;

    backend.patch_gate().release();
    assert_eq!(edit.await.unwrap(), Err(MatrixError::TornDown));
    assert_eq!(backend.calls().fetches, fetches);
}

#[tokio::test(start_paused = true)]
async fn poller_stops_once_extraction_finishes() {
    let backend = FakeBackend::with_groups(vec![GroupBuilder::processing("c.pdf")]);
    let engine = engine(&backend, EngineConfig::job("job-1", "Acme"));
    let poller = RefreshPoller::new(engine.clone(), PollerConfig::default()).spawn();

    wait_until(|| backend.calls().fetches == 1).await;
    backend.set_groups(two_offers());

    assert_eq!(poller.await.unwrap(), PollExit::Settled);
    assert_eq!(backend.calls().fetches, 2);
    assert!(engine.is_settled().await);
    assert_eq!(engine.snapshot().await.column_keys(), vec![key(P1), key(P2)]);
}

#[tokio::test(start_paused = true)]
async fn poller_stops_on_teardown() {
    let backend = FakeBackend::with_groups(vec![GroupBuilder::processing("c.pdf")]);
    let engine = engine(&backend, EngineConfig::job("job-1", "Acme"));
    let poller = RefreshPoller::new(
        engine.clone(),
        PollerConfig {
            stop_when_settled: false,
            ..PollerConfig::default()
        },
    )
    .spawn();

    wait_until(|| backend.calls().fetches >= 1).await;
    assert!(engine.snapshot().await.processing);
    engine.teardown().await;
    assert_eq!(poller.await.unwrap(), PollExit::TornDown);
}
