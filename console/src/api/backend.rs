use crate::api::client::{ApiResponse, RequestClient, RequestOptions};
use crate::api::Backend;
use crate::config::Config;
use crate::types::{
    ActionReply, Health, KeyStatus, LogsResponse, NewRunResponse, Recommendation, RunsResponse,
    SessionId,
};
use serde_json::json;
use std::collections::BTreeMap;

/// Trading backend reached over HTTP
#[derive(Clone)]
pub struct BackendApi {
    http: RequestClient,
}

impl BackendApi {
    pub fn new(cfg: &Config) -> Self {
        Self {
            http: RequestClient::new(&cfg.api_url, cfg.retry_policy(), cfg.request_timeout()),
        }
    }

    #[cfg(test)]
    pub fn with_client(http: RequestClient) -> Self {
        Self { http }
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }
}

impl Backend for BackendApi {
    async fn key_status(&self) -> ApiResponse<KeyStatus> {
        self.http.request("/has-keys", RequestOptions::default()).await
    }

    async fn update_keys(&self, keys: &BTreeMap<String, String>) -> ApiResponse<serde_json::Value> {
        self.http.request("/update-keys", RequestOptions::json(json!(keys))).await
    }

    async fn list_runs(&self) -> ApiResponse<RunsResponse> {
        self.http.request("/runs", RequestOptions::default()).await
    }

    async fn run_logs(&self, session: &SessionId) -> ApiResponse<LogsResponse> {
        self.http.request(&logs_path(session), RequestOptions::default()).await
    }

    async fn create_run(&self) -> ApiResponse<NewRunResponse> {
        self.http.request("/create_new_run", RequestOptions::default()).await
    }

    async fn send_feedback(&self, session: &SessionId, feedback: &str) -> ApiResponse<ActionReply> {
        let opts = RequestOptions::json(json!({ "feedback": feedback })).query("session", session.as_str());
        self.http.request("/user_feedback", opts).await
    }

    async fn start_cycle(&self, session: &SessionId) -> ApiResponse<ActionReply> {
        self.http
            .request("/run_cycle", RequestOptions::json(json!({ "run_id": session })))
            .await
    }

    async fn health(&self) -> ApiResponse<Health> {
        self.http.request("/", RequestOptions::default()).await
    }

    async fn recommendations(&self) -> ApiResponse<Vec<Recommendation>> {
        self.http.request("/recommendations", RequestOptions::default()).await
    }
}

/// `/runs/{id}/logs` with the id escaped as one path segment
fn logs_path(session: &SessionId) -> String {
    let mut url = reqwest::Url::parse("http://backend/").expect("static base URL");
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.extend(["runs", session.as_str(), "logs"]);
    }
    url.path().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::tests::{fast_retry, serve};
    use crate::types::{Credential, Role};
    use axum::extract::{Path, Query, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    fn mock_backend(seen: Seen) -> Router {
        Router::new()
            .route("/", get(|| async { Json(json!({"message": "up"})) }))
            .route(
                "/has-keys",
                get(|| async { Json(json!({"has": ["ANTHROPIC_KEY"], "missing": ["WALLET_ADDRESS"]})) }),
            )
            .route(
                "/update-keys",
                post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push(("update-keys".into(), body));
                    Json(json!({"ok": true}))
                }),
            )
            .route("/runs", get(|| async { Json(json!({"runs": ["111", "222"]})) }))
            .route(
                "/runs/:id/logs",
                get(|Path(id): Path<String>| async move {
                    if id == "222" {
                        Json(json!({
                            "logs": [
                                {"role": "user", "time": 1704067200.0, "message": "buy SOL"},
                                {"role": "assistant", "time": 1704067201.0, "message": ["ok", "done"]}
                            ],
                            "status": "trading"
                        }))
                    } else {
                        Json(json!({"error": "Run ID not found"}))
                    }
                }),
            )
            .route(
                "/create_new_run",
                get(|| async { Json(json!({"run_id": "333", "status": "ready"})) }),
            )
            .route(
                "/user_feedback",
                post(
                    |State(seen): State<Seen>,
                     Query(q): Query<HashMap<String, String>>,
                     Json(body): Json<Value>| async move {
                        let session = q.get("session").cloned().unwrap_or_default();
                        seen.lock().unwrap().push((format!("feedback:{session}"), body));
                        Json(json!({"status": "Feedback processed", "logs": []}))
                    },
                ),
            )
            .route(
                "/run_cycle",
                post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push(("run_cycle".into(), body));
                    Json(json!({"status": "Started"}))
                }),
            )
            .route(
                "/recommendations",
                get(|| async {
                    Json(json!([{"token": "So11111111", "action": "BUY", "confidence": 80, "reasoning": "trend", "status": "pending"}]))
                }),
            )
            .with_state(seen)
    }

    async fn api(seen: Seen) -> BackendApi {
        let base = serve(mock_backend(seen)).await;
        BackendApi::with_client(RequestClient::new(&base, fast_retry(), None))
    }

    #[test]
    fn test_logs_path_escapes_session_id() {
        assert_eq!(logs_path(&SessionId::new("1700000001")), "/runs/1700000001/logs");
        assert_eq!(logs_path(&SessionId::new("a?b")), "/runs/a%3Fb/logs");
        assert_eq!(logs_path(&SessionId::new("x/y")), "/runs/x%2Fy/logs");
        assert_eq!(logs_path(&SessionId::new("run #2")), "/runs/run%20%232/logs");
    }

    #[tokio::test]
    async fn test_odd_session_id_stays_one_segment() {
        let app = Router::new().route(
            "/runs/:id/logs",
            get(|Path(id): Path<String>| async move {
                Json(json!({"logs": [{"role": "assistant", "message": id}], "status": "idle"}))
            }),
        );
        let base = serve(app).await;
        let api = BackendApi::with_client(RequestClient::new(&base, fast_retry(), None));

        let logs = api.run_logs(&SessionId::new("x/y?z")).await.data.unwrap().logs.unwrap();
        assert_eq!(logs[0].text(), "x/y?z");
    }

    #[tokio::test]
    async fn test_read_endpoints() {
        let api = api(Seen::default()).await;

        let keys = api.key_status().await.data.unwrap();
        assert_eq!(keys.missing, vec![Credential::WalletAddress]);

        let runs = api.list_runs().await.data.unwrap();
        assert_eq!(runs.runs, vec![SessionId::new("111"), SessionId::new("222")]);

        let logs = api.run_logs(&SessionId::new("222")).await.data.unwrap();
        let logs_list = logs.logs.unwrap();
        assert_eq!(logs_list.len(), 2);
        assert_eq!(logs_list[0].role, Role::User);
        assert_eq!(logs_list[1].text(), "ok\n\ndone");
        assert_eq!(logs.status.as_deref(), Some("trading"));

        let missing = api.run_logs(&SessionId::new("999")).await;
        assert!(missing.error.is_none());
        assert!(missing.data.unwrap().logs.is_none());

        assert_eq!(api.create_run().await.data.unwrap().run_id, SessionId::new("333"));
        assert_eq!(api.health().await.data.unwrap().message, "up");
        let recs = api.recommendations().await.data.unwrap();
        assert_eq!(recs[0].action, "BUY");
        assert_eq!(recs[0].confidence, Some(80.0));
    }

    #[tokio::test]
    async fn test_write_endpoints_send_expected_bodies() {
        let seen = Seen::default();
        let api = api(seen.clone()).await;
        let session = SessionId::new("222");

        let mut keys = BTreeMap::new();
        keys.insert("WALLET_ADDRESS".to_string(), "9xQe".to_string());
        assert!(api.update_keys(&keys).await.error.is_none());
        assert!(api.send_feedback(&session, "sell half").await.error.is_none());
        let started = api.start_cycle(&session).await.data.unwrap();
        assert_eq!(started.status.as_deref(), Some("Started"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], ("update-keys".to_string(), json!({"WALLET_ADDRESS": "9xQe"})));
        assert_eq!(seen[1], ("feedback:222".to_string(), json!({"feedback": "sell half"})));
        assert_eq!(seen[2], ("run_cycle".to_string(), json!({"run_id": "222"})));
    }
}
