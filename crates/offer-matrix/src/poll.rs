// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fixed-interval refresh loop for matrices whose documents are still being
//! extracted.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::backend::OfferBackend;
use crate::engine::MatrixEngine;

/// Poller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between refreshes.
    pub interval: Duration,
    /// Stop once no source document is processing any more.
    pub stop_when_settled: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            stop_when_settled: true,
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// Every document finished extracting.
    Settled,
    /// The engine was torn down.
    TornDown,
}

fn is_down(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Calls [`MatrixEngine::refresh`] on a fixed interval.
pub struct RefreshPoller<B> {
    engine: MatrixEngine<B>,
    config: PollerConfig,
    ticks: u64,
}

impl<B: OfferBackend> RefreshPoller<B> {
    /// Poll `engine` with `config`.
    pub fn new(engine: MatrixEngine<B>, config: PollerConfig) -> Self {
        Self {
            engine,
            config,
            ticks: 0,
        }
    }

    /// Run until teardown, or until settled when so configured.
    ///
    /// The first refresh happens immediately.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> PollExit {
        let mut shutdown = self.engine.shutdown_signal();
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("refresh poller started. interval: {:?}", self.config.interval);

        loop {
            if is_down(&shutdown) {
                return PollExit::TornDown;
            }
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || is_down(&shutdown) {
                        return PollExit::TornDown;
                    }
                    continue;
                }
            }
            self.engine.refresh().await;
            self.ticks += 1;
            if self.config.stop_when_settled && self.engine.is_settled().await {
                debug!(ticks = self.ticks, "all documents settled");
                return PollExit::Settled;
            }
        }
    }

    /// Run on the current runtime in the background.
    pub fn spawn(mut self) -> tokio::task::JoinHandle<PollExit> {
        tokio::spawn(async move { self.run().await })
    }
}
