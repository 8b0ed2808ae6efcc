use crate::api::Backend;
use crate::config::Config;
use crate::notify::{Toast, Toasts};
use crate::registry::{RegistryChoice, SessionRegistry};
use crate::store::{Action, AppState, Store, Transition};
use crate::sync::{LogSynchronizer, SyncEvent};
use crate::types::{Message, Recommendation, Role, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Chat and control surface: owns the store, the session picker and the log
/// synchronizer, and turns user intents into backend calls.
pub struct ChatSurface<B: Backend> {
    api: Arc<B>,
    store: Store,
    sync: LogSynchronizer<B>,
    registry: SessionRegistry,
    toasts: Toasts,
    width: usize,
}

impl<B: Backend> ChatSurface<B> {
    pub fn new(api: Arc<B>, cfg: &Config) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sync, events) = LogSynchronizer::new(api.clone(), cfg.poll_interval());
        let surface = Self {
            api,
            store: Store::new(&cfg.trading_status, cfg.response_ordering),
            sync,
            registry: SessionRegistry::default(),
            toasts: Toasts::default(),
            width: cfg.transcript_width,
        };
        (surface, events)
    }

    pub fn api(&self) -> Arc<B> {
        self.api.clone()
    }

    pub fn state(&self) -> &AppState {
        self.store.state()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    pub fn take_toasts(&mut self) -> Vec<Toast> {
        self.toasts.take_unseen()
    }

    pub fn active_toasts(&mut self) -> Vec<Toast> {
        self.toasts.active()
    }

    /// Load the known sessions and resume the most recent one
    pub async fn bootstrap(&mut self) {
        match self.api.list_runs().await.into_result() {
            Ok(Some(resp)) => {
                info!("{} session(s) on the backend", resp.runs.len());
                let t = self.store.dispatch(Action::SessionsLoaded(resp.runs));
                self.follow(t).await;
            }
            Ok(None) => warn!("Session list had an unexpected shape"),
            Err(e) => self.toasts.api_error("Could not load sessions", &e),
        }
    }

    pub async fn create_session(&mut self) -> Option<SessionId> {
        match self.api.create_run().await.into_result() {
            Ok(Some(resp)) => {
                info!("Created session {}", resp.run_id);
                let t = self.store.dispatch(Action::SessionCreated(resp.run_id.clone()));
                self.follow(t).await;
                Some(resp.run_id)
            }
            Ok(None) => {
                self.toasts.error("Backend did not return a session id");
                None
            }
            Err(e) => {
                self.toasts.api_error("Could not create session", &e);
                None
            }
        }
    }

    pub async fn select_session(&mut self, id: SessionId) {
        let t = self.store.dispatch(Action::SessionSelected(id));
        self.follow(t).await;
    }

    /// Apply a chooser pick
    pub async fn choose(&mut self, choice: RegistryChoice) {
        match choice {
            RegistryChoice::Select(id) => self.select_session(id).await,
            RegistryChoice::Create => {
                self.create_session().await;
            }
        }
    }

    async fn follow(&mut self, transition: Transition) {
        if let Transition::Activated(id) = transition {
            self.sync.activate(id).await;
        }
    }

    pub fn can_start(&self) -> bool {
        let state = self.state();
        state.current.is_some() && !state.is_trading
    }

    pub fn can_send(&self) -> bool {
        self.state().current.is_some()
    }

    /// Kick off a trading cycle. The trading flag is raised once the backend
    /// accepts; the next poll has the final word on it.
    pub async fn start_trading(&mut self) -> bool {
        if !self.can_start() {
            return false;
        }
        let Some(session) = self.state().current.clone() else {
            return false;
        };
        match self.api.start_cycle(&session).await.into_result() {
            Err(e) => {
                self.toasts.api_error("Could not start trading", &e);
                false
            }
            Ok(reply) => {
                if let Some(status) = reply.as_ref().and_then(|r| r.backend_error()) {
                    self.toasts.error(format!("Could not start trading: {status}"));
                    return false;
                }
                self.toasts.info(format!("Trading cycle started for {session}"));
                self.store.dispatch(Action::TradingStarted(session));
                true
            }
        }
    }

    pub fn set_input(&mut self, text: &str) {
        self.store.dispatch(Action::InputChanged(text.to_string()));
    }

    /// Send the current input as feedback. The input is cleared before the
    /// call goes out and is not restored if it fails.
    pub async fn send_feedback(&mut self) -> bool {
        let Some(session) = self.state().current.clone() else {
            return false;
        };
        let text = self.state().input.trim().to_string();
        if text.is_empty() {
            return false;
        }
        self.store.dispatch(Action::InputCleared);

        match self.api.send_feedback(&session, &text).await.into_result() {
            Err(e) => {
                self.toasts.api_error("Could not send feedback", &e);
                false
            }
            Ok(reply) => {
                if let Some(status) = reply.as_ref().and_then(|r| r.backend_error()) {
                    self.toasts.error(format!("Feedback not processed: {status}"));
                    return false;
                }
                let added = reply.map(|r| r.logs.len()).unwrap_or(0);
                debug!("Feedback accepted for {session} ({added} new log entries)");
                true
            }
        }
    }

    pub fn handle_sync_event(&mut self, event: SyncEvent) -> Transition {
        match event {
            SyncEvent::Logs(snapshot) => self.store.dispatch(Action::LogsReceived(snapshot)),
            SyncEvent::Failed { session, error } => {
                if self.state().current.as_ref() == Some(&session) {
                    self.toasts.api_error("Could not refresh messages", &error);
                }
                Transition::Unchanged
            }
            SyncEvent::Missing { session, reason } => {
                debug!("No logs for {session}: {}", reason.as_deref().unwrap_or("unexpected shape"));
                Transition::Unchanged
            }
        }
    }

    pub async fn recommendations(&mut self) -> Vec<Recommendation> {
        match self.api.recommendations().await.into_result() {
            Ok(recs) => recs.unwrap_or_default(),
            Err(e) => {
                self.toasts.api_error("Could not load recommendations", &e);
                Vec::new()
            }
        }
    }

    pub async fn health(&mut self) -> Option<String> {
        match self.api.health().await.into_result() {
            Ok(h) => h.map(|h| h.message),
            Err(e) => {
                self.toasts.api_error("Backend unreachable", &e);
                None
            }
        }
    }

    /// Header line: session trigger, trading state and available controls
    pub fn status_line(&self) -> String {
        let state = self.state();
        let mode = if state.is_trading { "TRADING" } else { "idle" };
        let start = if self.can_start() { "/start" } else { "-" };
        let send = if self.can_send() { "type to send" } else { "-" };
        format!(
            "[{}] {} | {} messages | start: {} | feedback: {}",
            self.registry.trigger_label(state.current.as_ref()),
            mode,
            state.transcript.len(),
            start,
            send,
        )
    }

    pub fn chooser_lines(&self) -> Vec<String> {
        let state = self.state();
        self.registry.chooser_lines(&state.sessions, state.current.as_ref())
    }

    /// Rendered transcript window ending at the scroll position
    pub fn transcript_window(&self, height: usize) -> Vec<String> {
        let state = self.state();
        let end = (state.scroll + 1).min(state.transcript.len());
        let lines = render_transcript(&state.transcript[..end], self.width);
        let skip = lines.len().saturating_sub(height);
        lines.into_iter().skip(skip).collect()
    }

    pub async fn shutdown(&mut self) {
        self.sync.stop().await;
    }

    #[cfg(test)]
    pub fn active_pollers(&self) -> usize {
        self.sync.active_pollers()
    }

    #[cfg(test)]
    pub fn toast_errors(&self) -> Vec<String> {
        self.toasts.errors()
    }
}

/// Assistant entries hug the left edge, user entries the right. Each entry is
/// a header with author and time, its body, and a blank separator line.
pub fn render_transcript(messages: &[Message], width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for m in messages {
        let clock = m.time.as_ref().map(|t| t.clock()).unwrap_or_default();
        let header = format!("{} {}", m.role, clock).trim_end().to_string();
        let text = m.text();
        let body = std::iter::once(header.as_str()).chain(text.lines());
        match m.role {
            Role::Assistant => out.extend(body.map(str::to_string)),
            Role::User => out.extend(body.map(|l| format!("{l:>width$}"))),
        }
        out.push(String::new());
    }
    out
}
