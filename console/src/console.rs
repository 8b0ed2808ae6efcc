//! Interactive command loop: credential gate first, then the chat surface.

use crate::api::{Backend, BackendApi};
use crate::chat::ChatSurface;
use crate::config::Config;
use crate::gate::CredentialGate;
use crate::notify::{Toast, Toasts};
use crate::store::Transition;
use crate::types::SessionId;
use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
Commands:
  /sessions     list sessions and pick one (number, n for new, q to close)
  /new          create a session and switch to it
  /use <id>     switch to a session
  /start        start a trading cycle on the current session
  /recs         show the latest recommendations
  /health       ping the backend
  /keys         check credentials and enter missing ones
  /status       show the header and recent notifications
  /help         this text
  /quit         leave
Anything else is sent to the agent as feedback.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Sessions,
    New,
    Use(String),
    Start,
    Recs,
    Health,
    Keys,
    Status,
    Help,
    Quit,
    Feedback(String),
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Feedback(line.to_string());
        }
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };
        match cmd.to_lowercase().as_str() {
            "/sessions" | "/s" => Command::Sessions,
            "/new" => Command::New,
            "/use" if !arg.is_empty() => Command::Use(arg.to_string()),
            "/start" => Command::Start,
            "/recs" => Command::Recs,
            "/health" => Command::Health,
            "/keys" => Command::Keys,
            "/status" => Command::Status,
            "/help" | "/?" => Command::Help,
            "/quit" | "/exit" | "/q" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

/// Line reader over any buffered input. A line that is not valid UTF-8 is
/// skipped with a warning; only EOF or a read failure ends the input.
pub struct LineInput<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Cancel safe: bytes read before a cancellation stay buffered.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 && self.buf.is_empty() {
                return Ok(None);
            }
            match String::from_utf8(std::mem::take(&mut self.buf)) {
                Ok(line) => {
                    return Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()));
                }
                Err(e) => warn!("Ignored a {}-byte input line that is not UTF-8", e.as_bytes().len()),
            }
        }
    }
}

/// Next input line; None on EOF or Ctrl+C
async fn read_line<R: AsyncBufRead + Unpin>(input: &mut LineInput<R>) -> Result<Option<String>> {
    tokio::select! {
        line = input.next_line() => line.context("Read stdin"),
        _ = tokio::signal::ctrl_c() => {
            info!("STOP SIGNAL (Ctrl+C)");
            Ok(None)
        }
    }
}

fn is_quit(line: &str) -> bool {
    Command::parse(line) == Command::Quit
}

/// Run the console on stdin until the user quits, stdin closes or Ctrl+C
pub async fn run(cfg: Config, initial: Option<SessionId>) -> Result<()> {
    let api = Arc::new(BackendApi::new(&cfg));
    info!("Backend: {}", api.base_url());
    let mut input = LineInput::new(BufReader::new(tokio::io::stdin()));
    drive(api, &cfg, initial, &mut input).await
}

async fn drive<B: Backend, R: AsyncBufRead + Unpin>(
    api: Arc<B>,
    cfg: &Config,
    initial: Option<SessionId>,
    input: &mut LineInput<R>,
) -> Result<()> {
    let mut gate_toasts = Toasts::default();
    if !unlock(api.as_ref(), cfg, input, &mut gate_toasts).await? {
        return Ok(());
    }

    let (mut chat, mut events) = ChatSurface::new(api, cfg);
    chat.bootstrap().await;
    if let Some(id) = initial {
        chat.select_session(id).await;
    }
    println!("{}", chat.status_line());
    println!("Type /help for commands.");

    loop {
        print_toasts(&chat.take_toasts());
        tokio::select! {
            line = read_line(input) => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if !handle_line(&mut chat, cfg, input, &mut gate_toasts, &line).await? {
                    break;
                }
            }
            Some(event) = events.recv() => {
                if chat.handle_sync_event(event) == Transition::TranscriptReplaced {
                    redraw(&chat, cfg.transcript_height);
                }
            }
        }
    }

    chat.shutdown().await;
    info!("Console closed");
    Ok(())
}

/// One-shot backend ping for `--health`
pub async fn health_check(cfg: &Config) -> Result<()> {
    let api = BackendApi::new(cfg);
    let health = api
        .health()
        .await
        .into_result()
        .with_context(|| format!("Backend unreachable at {}", api.base_url()))?;
    match health {
        Some(h) => println!("{}: {}", api.base_url(), h.message),
        None => println!("{}: up (unexpected greeting)", api.base_url()),
    }
    Ok(())
}

/// Hold the console at the credential gate until the backend reports every
/// key present. Returns false on EOF, Ctrl+C or `/quit`.
async fn unlock<B: Backend, R: AsyncBufRead + Unpin>(
    api: &B,
    cfg: &Config,
    input: &mut LineInput<R>,
    toasts: &mut Toasts,
) -> Result<bool> {
    let mut gate = CredentialGate::new();
    loop {
        if gate.is_loading() {
            gate.refresh(api, toasts).await;
            print_toasts(&toasts.take_unseen());
            if gate.is_loading() {
                eprintln!(
                    "Checking credentials again in {}s (Enter to retry now, /quit to leave)...",
                    cfg.poll_interval_secs
                );
                tokio::select! {
                    _ = tokio::time::sleep(cfg.poll_interval()) => {}
                    line = read_line(input) => match line? {
                        Some(l) if !is_quit(&l) => {}
                        _ => return Ok(false),
                    },
                }
                continue;
            }
        }
        if gate.is_ready() {
            return Ok(true);
        }

        if let Some(form) = gate.form_mut() {
            println!("The backend is missing {} credential(s).", form.fields().len());
            while let Some(credential) = form.next_empty().cloned() {
                print!("{}: ", credential.label());
                std::io::stdout().flush().ok();
                let Some(line) = read_line(input).await? else {
                    return Ok(false);
                };
                let entry = line.trim();
                if entry.starts_with('/') {
                    if is_quit(entry) {
                        return Ok(false);
                    }
                    println!("Commands are available once the credentials are saved (/quit to leave).");
                    continue;
                }
                form.set(&credential, entry);
            }
        }

        let saved = gate.submit(api, toasts).await;
        print_toasts(&toasts.take_unseen());
        if !saved {
            println!("Press Enter to try again, or /quit to leave.");
            match read_line(input).await? {
                Some(l) if !is_quit(&l) => {}
                _ => return Ok(false),
            }
        }
    }
}

/// Returns false when the console should exit
async fn handle_line<B: Backend, R: AsyncBufRead + Unpin>(
    chat: &mut ChatSurface<B>,
    cfg: &Config,
    input: &mut LineInput<R>,
    gate_toasts: &mut Toasts,
    line: &str,
) -> Result<bool> {
    if chat.registry().is_open() {
        pick_session(chat, line).await;
        return Ok(true);
    }

    match Command::parse(line) {
        Command::Empty => {}
        Command::Sessions => {
            chat.bootstrap().await;
            chat.registry_mut().open();
            for l in chat.chooser_lines() {
                println!("{l}");
            }
        }
        Command::New => {
            if let Some(id) = chat.create_session().await {
                println!("Switched to new session {id}");
                println!("{}", chat.status_line());
            }
        }
        Command::Use(id) => {
            chat.select_session(SessionId::new(id)).await;
            println!("{}", chat.status_line());
        }
        Command::Start => {
            if !chat.can_start() {
                println!("Nothing to start: pick a session, or wait for the current cycle.");
            } else if chat.start_trading().await {
                println!("{}", chat.status_line());
            }
        }
        Command::Recs => {
            let recs = chat.recommendations().await;
            if recs.is_empty() {
                println!("No recommendations yet.");
            }
            for r in recs {
                println!("  {r}");
                if let Some(why) = r.reasoning.as_deref().filter(|w| !w.is_empty()) {
                    println!("      {why}");
                }
            }
        }
        Command::Health => {
            if let Some(message) = chat.health().await {
                println!("Backend: {message}");
            }
        }
        Command::Keys => {
            let api = chat.api();
            if !unlock(api.as_ref(), cfg, input, gate_toasts).await? {
                return Ok(false);
            }
            println!("All credentials present.");
        }
        Command::Status => {
            println!("{}", chat.status_line());
            print_toasts(&chat.active_toasts());
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
        Command::Feedback(text) => {
            if !chat.can_send() {
                println!("Select a session first (/sessions or /new).");
            } else {
                chat.set_input(&text);
                chat.send_feedback().await;
            }
        }
        Command::Unknown(cmd) => println!("Unknown command {cmd}. Type /help."),
    }
    Ok(true)
}

async fn pick_session<B: Backend>(chat: &mut ChatSurface<B>, line: &str) {
    if line.trim() == "q" {
        chat.registry_mut().dismiss();
        return;
    }
    let sessions = chat.state().sessions.clone();
    match chat.registry_mut().choose(line, &sessions) {
        Some(choice) => {
            chat.choose(choice).await;
            println!("{}", chat.status_line());
        }
        None => println!("Pick a number, n for a new session, or q to close."),
    }
}

fn redraw<B: Backend>(chat: &ChatSurface<B>, height: usize) {
    println!("{}", "-".repeat(40));
    println!("{}", chat.status_line());
    for line in chat.transcript_window(height) {
        println!("{line}");
    }
}

fn print_toasts(toasts: &[Toast]) {
    for t in toasts {
        eprintln!("{t}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use crate::api::{ApiError, ApiResponse};
    use crate::types::{Credential, KeyStatus};
    use std::time::Duration;

    fn missing(names: &[Credential]) -> ApiResponse<KeyStatus> {
        ApiResponse::ok(KeyStatus {
            has: Vec::new(),
            missing: names.to_vec(),
        })
    }

    /// Drive the console over a scripted input; fails instead of hanging
    async fn drive_script(api: &Arc<FakeBackend>, script: &[u8]) {
        let mut input = LineInput::new(script);
        let cfg = Config::default();
        tokio::time::timeout(Duration::from_secs(600), drive(api.clone(), &cfg, None, &mut input))
            .await
            .expect("console exits once the script is done")
            .expect("console run");
    }

    fn feedback(api: &FakeBackend) -> Vec<(String, String)> {
        api.feedback()
            .into_iter()
            .map(|(s, text)| (s.to_string(), text))
            .collect()
    }

    #[tokio::test]
    async fn test_line_input_trims_endings_and_skips_invalid_utf8() {
        let mut input = LineInput::new(&b"first\r\n\xff\xfe\nsecond\nlast"[..]);
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(input.next_line().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_unreachable_while_credentials_missing() {
        let api = Arc::new(FakeBackend::with_runs(&["100"]));
        api.push_key_status(missing(&[Credential::AnthropicKey]));

        drive_script(&api, b"sk-ant-1\n/start\nbuy SOL\n").await;

        // Plain lines filled the form and the command was refused
        assert_eq!(api.key_updates().len(), 2);
        assert_eq!(api.key_updates()[1].get("ANTHROPIC_KEY").map(String::as_str), Some("buy SOL"));
        assert!(api.feedback().is_empty());
        assert!(api.cycles().is_empty());
        assert_eq!(api.log_fetches("100"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_at_credential_prompt_is_not_a_key() {
        let api = Arc::new(FakeBackend::with_runs(&["100"]));
        api.push_key_status(missing(&[Credential::AnthropicKey]));

        drive_script(&api, b"/quit\nsk-ant-1\n").await;

        assert!(api.key_updates().is_empty());
        assert_eq!(api.log_fetches("100"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chooser_pick_routes_feedback_to_chosen_session() {
        let api = Arc::new(FakeBackend::with_runs(&["100", "200"]));

        drive_script(&api, b"/sessions\n1\nhold position\n/quit\n").await;

        assert_eq!(feedback(&api), vec![("100".to_string(), "hold position".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_utf8_line_keeps_console_running() {
        let api = Arc::new(FakeBackend::with_runs(&["100"]));

        drive_script(&api, b"before\n\xff\xfe\nafter\n/quit\nnot sent\n").await;

        assert_eq!(
            feedback(&api),
            vec![
                ("100".to_string(), "before".to_string()),
                ("100".to_string(), "after".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_while_rechecking_credentials() {
        let api = Arc::new(FakeBackend::with_runs(&["100"]));
        api.push_key_status(ApiResponse::ok(KeyStatus::default()));
        api.push_key_status(ApiResponse::err(ApiError::network("connection refused")));

        drive_script(&api, b"/keys\n/quit\nnot sent\n").await;

        assert!(api.feedback().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_rechecks_credentials_immediately() {
        let api = Arc::new(FakeBackend::with_runs(&["100"]));
        api.push_key_status(ApiResponse::err(ApiError::network("connection refused")));
        api.push_key_status(ApiResponse::ok(KeyStatus::default()));

        drive_script(&api, b"\nhello\n/quit\n").await;

        assert_eq!(feedback(&api), vec![("100".to_string(), "hello".to_string())]);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/sessions"), Command::Sessions);
        assert_eq!(Command::parse("  /NEW "), Command::New);
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/recs"), Command::Recs);
        assert_eq!(Command::parse("/health"), Command::Health);
        assert_eq!(Command::parse("/keys"), Command::Keys);
        assert_eq!(Command::parse("/status"), Command::Status);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("/exit"), Command::Quit);
    }

    #[test]
    fn test_parse_use_needs_an_id() {
        assert_eq!(
            Command::parse("/use   4821930211 "),
            Command::Use("4821930211".into())
        );
        assert_eq!(Command::parse("/use"), Command::Unknown("/use".into()));
    }

    #[test]
    fn test_plain_text_is_feedback() {
        assert_eq!(
            Command::parse("  sell half of the SOL position "),
            Command::Feedback("sell half of the SOL position".into())
        );
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("/dance"), Command::Unknown("/dance".into()));
    }
}
