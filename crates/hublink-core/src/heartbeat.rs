// ── Heartbeat ──
//
// Periodic keep-alive ping while connected. The monitor only owns the
// ticker; the reactor sends the probe and decides what a dead link means
// (the transport's own close signal drives teardown).

use std::future::pending;
use std::time::Duration;

use hublink_api::wire::ClientMessage;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::CoreError;

#[derive(Default)]
pub(crate) struct HeartbeatMonitor {
    period: Duration,
    ticker: Option<Interval>,
}

impl HeartbeatMonitor {
    /// Start ticking one period from now. Restarts an already running timer.
    pub(crate) fn start(&mut self, period: Duration) {
        self.period = period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    pub(crate) fn stop(&mut self) {
        self.ticker = None;
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    /// Resolve at the next tick. Never resolves while stopped.
    pub(crate) async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => pending::<()>().await,
        }
    }

    /// Encode the keep-alive probe.
    pub(crate) fn probe(id: u64) -> Result<String, CoreError> {
        Ok(ClientMessage::Ping { id }.encode()?)
    }
}
