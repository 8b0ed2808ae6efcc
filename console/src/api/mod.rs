pub mod backend;
pub mod client;
#[cfg(test)]
pub mod fake;

pub use backend::BackendApi;
pub use client::{ApiError, ApiResponse, RetryPolicy};

use crate::types::{
    ActionReply, Health, KeyStatus, LogsResponse, NewRunResponse, Recommendation, RunsResponse,
    SessionId,
};
use std::collections::BTreeMap;
use std::future::Future;

/// Operations the trading backend exposes. The HTTP implementation is
/// [`BackendApi`]; none of these calls fail with a Rust error, failures are
/// carried inside [`ApiResponse`].
pub trait Backend: Send + Sync + 'static {
    /// GET /has-keys
    fn key_status(&self) -> impl Future<Output = ApiResponse<KeyStatus>> + Send;

    /// POST /update-keys with only the non-empty values
    fn update_keys(
        &self,
        keys: &BTreeMap<String, String>,
    ) -> impl Future<Output = ApiResponse<serde_json::Value>> + Send;

    /// GET /runs
    fn list_runs(&self) -> impl Future<Output = ApiResponse<RunsResponse>> + Send;

    /// GET /runs/{id}/logs
    fn run_logs(&self, session: &SessionId) -> impl Future<Output = ApiResponse<LogsResponse>> + Send;

    /// GET /create_new_run
    fn create_run(&self) -> impl Future<Output = ApiResponse<NewRunResponse>> + Send;

    /// POST /user_feedback?session={id}
    fn send_feedback(
        &self,
        session: &SessionId,
        feedback: &str,
    ) -> impl Future<Output = ApiResponse<ActionReply>> + Send;

    /// POST /run_cycle
    fn start_cycle(&self, session: &SessionId) -> impl Future<Output = ApiResponse<ActionReply>> + Send;

    /// GET /
    fn health(&self) -> impl Future<Output = ApiResponse<Health>> + Send;

    /// GET /recommendations
    fn recommendations(&self) -> impl Future<Output = ApiResponse<Vec<Recommendation>>> + Send;
}
