//! Polls the active session's log history and hands snapshots to the store.
//!
//! One poll loop runs per active session. Each tick spawns the fetch as its
//! own task so a slow answer never delays the next tick; fetches therefore
//! can overlap and finish out of order, which is why every snapshot carries
//! its issue sequence number. Stopping the loop drops the in-flight fetches
//! with it.

use crate::api::{ApiError, Backend};
use crate::store::LogSnapshot;
use crate::types::{LogsResponse, SessionId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Logs(LogSnapshot),
    Failed { session: SessionId, error: ApiError },
    /// The backend answered without a log list (unknown run, odd shape)
    Missing { session: SessionId, reason: Option<String> },
}

pub struct LogSynchronizer<B: Backend> {
    api: Arc<B>,
    period: Duration,
    events: mpsc::UnboundedSender<SyncEvent>,
    seq: Arc<AtomicU64>,
    live: Arc<AtomicUsize>,
    poller: Option<JoinHandle<()>>,
    session: Option<SessionId>,
}

impl<B: Backend> LogSynchronizer<B> {
    pub fn new(api: Arc<B>, period: Duration) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = Self {
            api,
            period,
            events: tx,
            seq: Arc::new(AtomicU64::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            poller: None,
            session: None,
        };
        (sync, rx)
    }

    /// Stop polling the previous session and start on `session`: one fetch
    /// now, then one per period.
    pub async fn activate(&mut self, session: SessionId) {
        self.stop().await;
        info!("Syncing session {session} every {}s", self.period.as_secs_f64());

        let api = self.api.clone();
        let events = self.events.clone();
        let seq = self.seq.clone();
        let guard = LiveGuard::new(self.live.clone());
        let period = self.period;
        let target = session.clone();
        self.poller = Some(tokio::spawn(async move {
            let _guard = guard;
            poll_loop(api, target, period, seq, events).await;
        }));
        self.session = Some(session);
    }

    /// Cancel the poll loop and its in-flight fetches. Returns once the loop
    /// is gone.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
            if let Err(e) = handle.await {
                report_join_error("Log poller", &e);
            }
            debug!("Stopped syncing {:?}", self.session);
        }
        self.session = None;
    }

    #[cfg(test)]
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// Number of poll loops currently alive
    #[cfg(test)]
    pub fn active_pollers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl<B: Backend> Drop for LogSynchronizer<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}

/// Counts a poll loop from spawn until its task is dropped
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cancellation is the normal way a poller ends; a panic is a bug worth
/// surfacing. Returns true for a panic.
fn report_join_error(what: &str, err: &JoinError) -> bool {
    if err.is_panic() {
        error!("{what} panicked: {err}");
        true
    } else {
        debug!("{what} cancelled");
        false
    }
}

async fn poll_loop<B: Backend>(
    api: Arc<B>,
    session: SessionId,
    period: Duration,
    seq: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<SyncEvent>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut inflight = JoinSet::new();

    loop {
        ticker.tick().await;
        if events.is_closed() {
            break;
        }
        while let Some(done) = inflight.try_join_next() {
            if let Err(e) = done {
                report_join_error("Log fetch", &e);
            }
        }

        let issued = seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Fetching logs for {session} (#{issued}, {} in flight)", inflight.len());
        let api = api.clone();
        let events = events.clone();
        let session = session.clone();
        inflight.spawn(async move {
            let resp = api.run_logs(&session).await;
            let event = match (resp.data, resp.error) {
                (_, Some(error)) => SyncEvent::Failed { session, error },
                (Some(LogsResponse { logs: Some(logs), status, .. }), None) => {
                    SyncEvent::Logs(LogSnapshot {
                        session,
                        seq: issued,
                        logs,
                        status: status.unwrap_or_default(),
                    })
                }
                (Some(LogsResponse { error, .. }), None) => SyncEvent::Missing { session, reason: error },
                (None, None) => SyncEvent::Missing { session, reason: None },
            };
            if events.send(event).is_err() {
                warn!("Log event dropped: console closed");
            }
        });
    }
}
