use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a trading run, issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "you"),
            Role::Assistant => write!(f, "agent"),
        }
    }
}

/// Message payload: a single string or a list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Parts(Vec<String>),
}

impl MessageBody {
    /// Flatten to display text; parts are separated by a blank line.
    pub fn text(&self) -> String {
        match self {
            MessageBody::Text(t) => t.clone(),
            MessageBody::Parts(parts) => parts.join("\n\n"),
        }
    }
}

/// Log timestamp as sent by the backend: epoch seconds or an RFC 3339 string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogTime {
    Epoch(f64),
    Text(String),
}

impl LogTime {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            LogTime::Epoch(secs) => DateTime::from_timestamp_millis((secs * 1000.0).round() as i64),
            LogTime::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }

    /// Local wall-clock time, `--:--:--` when unparseable
    pub fn clock(&self) -> String {
        self.to_utc()
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string())
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub message: MessageBody,
    #[serde(default)]
    pub time: Option<LogTime>,
}

impl Message {
    pub fn text(&self) -> String {
        self.message.text()
    }
}

/// Named secret the backend needs before it can trade
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Credential {
    BirdeyeApiKey,
    AnthropicKey,
    SolanaPrivateKey,
    WalletAddress,
    Other(String),
}

impl Credential {
    pub fn name(&self) -> &str {
        match self {
            Credential::BirdeyeApiKey => "BIRDEYE_API_KEY",
            Credential::AnthropicKey => "ANTHROPIC_KEY",
            Credential::SolanaPrivateKey => "SOLANA_PRIVATE_KEY",
            Credential::WalletAddress => "WALLET_ADDRESS",
            Credential::Other(name) => name,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Credential::BirdeyeApiKey => "Birdeye API key",
            Credential::AnthropicKey => "Anthropic API key",
            Credential::SolanaPrivateKey => "Solana private key",
            Credential::WalletAddress => "Wallet address",
            Credential::Other(name) => name,
        }
    }
}

impl From<String> for Credential {
    fn from(name: String) -> Self {
        match name.as_str() {
            "BIRDEYE_API_KEY" => Credential::BirdeyeApiKey,
            "ANTHROPIC_KEY" => Credential::AnthropicKey,
            "SOLANA_PRIVATE_KEY" => Credential::SolanaPrivateKey,
            "WALLET_ADDRESS" => Credential::WalletAddress,
            _ => Credential::Other(name),
        }
    }
}

impl From<Credential> for String {
    fn from(c: Credential) -> Self {
        c.name().to_string()
    }
}

/// GET /has-keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyStatus {
    #[serde(default)]
    pub has: Vec<Credential>,
    #[serde(default)]
    pub missing: Vec<Credential>,
}

impl KeyStatus {
    /// Enforce `has ∩ missing = ∅`; a name reported in both counts as missing.
    pub fn sanitized(mut self) -> Self {
        let missing = self.missing.clone();
        self.has.retain(|c| !missing.contains(c));
        self
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// GET /runs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunsResponse {
    #[serde(default)]
    pub runs: Vec<SessionId>,
}

/// GET /runs/{id}/logs. An unknown run comes back as `{"error": ...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsResponse {
    pub logs: Option<Vec<Message>>,
    pub status: Option<String>,
    pub error: Option<String>,
}

/// GET /create_new_run
#[derive(Debug, Clone, Deserialize)]
pub struct NewRunResponse {
    pub run_id: SessionId,
}

/// Reply to POST /run_cycle and POST /user_feedback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionReply {
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<Message>,
}

impl ActionReply {
    /// The backend reports handler failures as `{"status": "Error..."}` with HTTP 200
    pub fn backend_error(&self) -> Option<&str> {
        self.status.as_deref().filter(|s| s.starts_with("Error"))
    }
}

/// GET /
#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub message: String,
}

/// GET /recommendations row
#[derive(Debug, Clone, Deserialize)]
pub struct Recommendation {
    pub token: String,
    pub action: String,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub status: Option<String>,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token: String = self.token.chars().take(8).collect();
        write!(f, "{:<8} {:<6}", token, self.action)?;
        if let Some(c) = self.confidence {
            write!(f, " {c:>3.0}%")?;
        }
        if let Some(s) = &self.status {
            write!(f, " [{s}]")?;
        }
        Ok(())
    }
}
