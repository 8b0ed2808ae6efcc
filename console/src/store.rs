//! Application state and the single entry point that mutates it.
//!
//! Every change to the session list, the transcript or the trading flag is an
//! [`Action`] passed to [`Store::dispatch`], which reports what happened as a
//! [`Transition`]. Log snapshots carry the session they were fetched for and
//! the sequence number they were issued with, so late answers can be told
//! apart from fresh ones.

use crate::types::{Message, SessionId};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// One successful log fetch
#[derive(Debug, Clone, PartialEq)]
pub struct LogSnapshot {
    pub session: SessionId,
    /// Issue order across all fetches; larger means issued later
    pub seq: u64,
    pub logs: Vec<Message>,
    pub status: String,
}

/// How snapshots that arrive out of issue order are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseOrdering {
    /// Drop snapshots older than the last one applied
    #[default]
    DiscardStale,
    /// Apply whatever arrives last, even if it was issued earlier
    LastResponseWins,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown response ordering '{0}' (expected discard-stale or last-wins)")]
pub struct UnknownOrdering(String);

impl FromStr for ResponseOrdering {
    type Err = UnknownOrdering;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discard-stale" | "discard_stale" | "stale" => Ok(Self::DiscardStale),
            "last-wins" | "last_wins" | "last-response-wins" => Ok(Self::LastResponseWins),
            other => Err(UnknownOrdering(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SessionsLoaded(Vec<SessionId>),
    SessionSelected(SessionId),
    SessionCreated(SessionId),
    LogsReceived(LogSnapshot),
    TradingStarted(SessionId),
    InputChanged(String),
    InputCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Fetched for a session that is no longer current
    StaleSession,
    /// Issued before a snapshot that was already applied
    OutOfOrder,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::StaleSession => write!(f, "stale session"),
            Discard::OutOfOrder => write!(f, "out of order"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Updated,
    /// A different session became current; its logs must be synchronized
    Activated(SessionId),
    /// The transcript or trading flag changed; the view should redraw
    TranscriptReplaced,
    Discarded(Discard),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub sessions: Vec<SessionId>,
    pub current: Option<SessionId>,
    pub transcript: Vec<Message>,
    pub is_trading: bool,
    pub input: String,
    /// Index of the message the view is scrolled to
    pub scroll: usize,
    last_seq: Option<u64>,
}

pub struct Store {
    state: AppState,
    trading_marker: String,
    ordering: ResponseOrdering,
}

impl Store {
    pub fn new(trading_marker: &str, ordering: ResponseOrdering) -> Self {
        Self {
            state: AppState::default(),
            trading_marker: trading_marker.to_string(),
            ordering,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn dispatch(&mut self, action: Action) -> Transition {
        let transition = self.reduce(action);
        if let Transition::Discarded(reason) = transition {
            debug!("Log snapshot discarded ({reason})");
        }
        transition
    }

    fn reduce(&mut self, action: Action) -> Transition {
        let state = &mut self.state;
        match action {
            Action::SessionsLoaded(sessions) => {
                state.sessions = sessions;
                if state.current.is_none() {
                    if let Some(latest) = state.sessions.last().cloned() {
                        activate(state, latest.clone());
                        return Transition::Activated(latest);
                    }
                }
                Transition::Updated
            }
            Action::SessionSelected(id) => {
                if state.current.as_ref() == Some(&id) {
                    return Transition::Unchanged;
                }
                activate(state, id.clone());
                Transition::Activated(id)
            }
            Action::SessionCreated(id) => {
                state.sessions.push(id.clone());
                activate(state, id.clone());
                Transition::Activated(id)
            }
            Action::LogsReceived(snapshot) => {
                if state.current.as_ref() != Some(&snapshot.session) {
                    return Transition::Discarded(Discard::StaleSession);
                }
                if self.ordering == ResponseOrdering::DiscardStale
                    && state.last_seq.is_some_and(|last| snapshot.seq <= last)
                {
                    return Transition::Discarded(Discard::OutOfOrder);
                }
                state.last_seq = Some(state.last_seq.map_or(snapshot.seq, |l| l.max(snapshot.seq)));

                let trading = snapshot.status == self.trading_marker;
                if state.transcript == snapshot.logs && state.is_trading == trading {
                    return Transition::Unchanged;
                }
                state.transcript = snapshot.logs;
                state.is_trading = trading;
                state.scroll = state.transcript.len().saturating_sub(1);
                Transition::TranscriptReplaced
            }
            Action::TradingStarted(id) => {
                if state.current.as_ref() != Some(&id) || state.is_trading {
                    return Transition::Unchanged;
                }
                state.is_trading = true;
                Transition::TranscriptReplaced
            }
            Action::InputChanged(text) => {
                state.input = text;
                Transition::Updated
            }
            Action::InputCleared => {
                state.input.clear();
                Transition::Updated
            }
        }
    }
}

fn activate(state: &mut AppState, id: SessionId) {
    state.current = Some(id);
    state.transcript.clear();
    state.is_trading = false;
    state.scroll = 0;
}
