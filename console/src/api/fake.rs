//! In-memory backend for exercising the console without a server.

use crate::api::client::{ApiError, ApiResponse};
use crate::api::Backend;
use crate::types::{
    ActionReply, Health, KeyStatus, LogsResponse, Message, MessageBody, NewRunResponse,
    Recommendation, Role, RunsResponse, SessionId,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    key_statuses: VecDeque<ApiResponse<KeyStatus>>,
    runs: Vec<SessionId>,
    logs: HashMap<SessionId, (Vec<Message>, String)>,
    log_delays: VecDeque<Duration>,
    slow_sessions: HashMap<SessionId, Duration>,
    failing: HashSet<&'static str>,
    next_run: u64,
    log_fetches: Vec<SessionId>,
    key_updates: Vec<BTreeMap<String, String>>,
    feedback: Vec<(SessionId, String)>,
    cycles: Vec<SessionId>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

pub fn assistant(text: &str) -> Message {
    Message {
        role: Role::Assistant,
        message: MessageBody::Text(text.to_string()),
        time: None,
    }
}

fn failure(op: &str) -> ApiError {
    ApiError {
        status: 500,
        status_text: "Internal Server Error".to_string(),
        message: Some(format!("{op} failed")),
    }
}

impl FakeBackend {
    pub fn with_runs(ids: &[&str]) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().runs = ids.iter().map(|id| SessionId::new(*id)).collect();
        fake
    }

    /// Queue key-status replies; the last one repeats
    pub fn push_key_status(&self, resp: ApiResponse<KeyStatus>) {
        self.state.lock().unwrap().key_statuses.push_back(resp);
    }

    pub fn set_logs(&self, session: &str, logs: Vec<Message>, status: &str) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert(SessionId::new(session), (logs, status.to_string()));
    }

    /// Delay applied to the next log fetches, one entry per call
    pub fn push_log_delay(&self, delay: Duration) {
        self.state.lock().unwrap().log_delays.push_back(delay);
    }

    pub fn slow_session(&self, session: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .slow_sessions
            .insert(SessionId::new(session), delay);
    }

    pub fn fail(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn log_fetches(&self, session: &str) -> usize {
        let target = SessionId::new(session);
        self.state.lock().unwrap().log_fetches.iter().filter(|s| **s == target).count()
    }

    pub fn key_updates(&self) -> Vec<BTreeMap<String, String>> {
        self.state.lock().unwrap().key_updates.clone()
    }

    pub fn feedback(&self) -> Vec<(SessionId, String)> {
        self.state.lock().unwrap().feedback.clone()
    }

    pub fn cycles(&self) -> Vec<SessionId> {
        self.state.lock().unwrap().cycles.clone()
    }

    pub fn runs(&self) -> Vec<SessionId> {
        self.state.lock().unwrap().runs.clone()
    }

    fn failing(&self, op: &str) -> bool {
        self.state.lock().unwrap().failing.contains(op)
    }
}

impl Backend for FakeBackend {
    async fn key_status(&self) -> ApiResponse<KeyStatus> {
        let mut state = self.state.lock().unwrap();
        if state.key_statuses.len() > 1 {
            state.key_statuses.pop_front().unwrap_or_else(ApiResponse::empty)
        } else {
            state
                .key_statuses
                .front()
                .cloned()
                .unwrap_or_else(|| ApiResponse::ok(KeyStatus::default()))
        }
    }

    async fn update_keys(&self, keys: &BTreeMap<String, String>) -> ApiResponse<serde_json::Value> {
        if self.failing("update_keys") {
            return ApiResponse::err(failure("update_keys"));
        }
        self.state.lock().unwrap().key_updates.push(keys.clone());
        ApiResponse::ok(serde_json::json!({"ok": true}))
    }

    async fn list_runs(&self) -> ApiResponse<RunsResponse> {
        if self.failing("list_runs") {
            return ApiResponse::err(failure("list_runs"));
        }
        ApiResponse::ok(RunsResponse { runs: self.runs() })
    }

    async fn run_logs(&self, session: &SessionId) -> ApiResponse<LogsResponse> {
        let (delay, reply) = {
            let mut state = self.state.lock().unwrap();
            state.log_fetches.push(session.clone());
            let delay = state
                .log_delays
                .pop_front()
                .or_else(|| state.slow_sessions.get(session).copied());
            let reply = match state.logs.get(session) {
                Some((logs, status)) => LogsResponse {
                    logs: Some(logs.clone()),
                    status: Some(status.clone()),
                    error: None,
                },
                None => LogsResponse {
                    error: Some("Run ID not found".to_string()),
                    ..Default::default()
                },
            };
            (delay, reply)
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.failing("run_logs_panic") {
            panic!("log handler bug");
        }
        if self.failing("run_logs") {
            return ApiResponse::err(failure("run_logs"));
        }
        ApiResponse::ok(reply)
    }

    async fn create_run(&self) -> ApiResponse<NewRunResponse> {
        if self.failing("create_run") {
            return ApiResponse::err(failure("create_run"));
        }
        let mut state = self.state.lock().unwrap();
        state.next_run += 1;
        let id = SessionId::new(format!("new-{}", state.next_run));
        state.runs.push(id.clone());
        ApiResponse::ok(NewRunResponse { run_id: id })
    }

    async fn send_feedback(&self, session: &SessionId, feedback: &str) -> ApiResponse<ActionReply> {
        if self.failing("send_feedback") {
            return ApiResponse::err(failure("send_feedback"));
        }
        self.state
            .lock()
            .unwrap()
            .feedback
            .push((session.clone(), feedback.to_string()));
        ApiResponse::ok(ActionReply {
            status: Some("Feedback processed".to_string()),
            logs: Vec::new(),
        })
    }

    async fn start_cycle(&self, session: &SessionId) -> ApiResponse<ActionReply> {
        if self.failing("start_cycle") {
            return ApiResponse::err(failure("start_cycle"));
        }
        self.state.lock().unwrap().cycles.push(session.clone());
        let status = if self.failing("start_cycle_reply") { "Error" } else { "Started" };
        ApiResponse::ok(ActionReply {
            status: Some(status.to_string()),
            logs: Vec::new(),
        })
    }

    async fn health(&self) -> ApiResponse<Health> {
        ApiResponse::ok(Health {
            message: "AI Trading System is up and running!".to_string(),
        })
    }

    async fn recommendations(&self) -> ApiResponse<Vec<Recommendation>> {
        ApiResponse::ok(vec![Recommendation {
            token: "So11111111111111111111111111111111111111112".to_string(),
            action: "BUY".to_string(),
            confidence: Some(72.0),
            reasoning: Some("momentum".to_string()),
            status: Some("pending".to_string()),
        }])
    }
}
