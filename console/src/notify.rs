use crate::api::ApiError;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

/// Transient notification shown to the user
#[derive(Debug, Clone)]
pub struct Toast {
    pub level: ToastLevel,
    pub text: String,
    pub raised_at: Instant,
    shown: bool,
}

impl fmt::Display for Toast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            ToastLevel::Info => write!(f, "[i] {}", self.text),
            ToastLevel::Error => write!(f, "[!] {}", self.text),
        }
    }
}

/// Bounded queue of notifications; old ones expire or fall off the front
pub struct Toasts {
    queue: VecDeque<Toast>,
    capacity: usize,
    ttl: Duration,
}

impl Default for Toasts {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(6))
    }
}

impl Toasts {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{text}");
        self.push(ToastLevel::Info, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        warn!("{text}");
        self.push(ToastLevel::Error, text);
    }

    /// Surface a failed backend call
    pub fn api_error(&mut self, context: &str, err: &ApiError) {
        self.error(format!("{context}: {}", err.summary()));
    }

    fn push(&mut self, level: ToastLevel, text: String) {
        self.prune(Instant::now());
        while self.queue.len() >= self.capacity {
            self.queue.pop_front();
        }
        self.queue.push_back(Toast {
            level,
            text,
            raised_at: Instant::now(),
            shown: false,
        });
    }

    /// Toasts raised since the last call, oldest first
    pub fn take_unseen(&mut self) -> Vec<Toast> {
        self.queue
            .iter_mut()
            .filter(|t| !t.shown)
            .map(|t| {
                t.shown = true;
                t.clone()
            })
            .collect()
    }

    /// Toasts still within their time-to-live
    pub fn active(&mut self) -> Vec<Toast> {
        self.prune(Instant::now());
        self.queue.iter().cloned().collect()
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.queue.retain(|t| now.duration_since(t.raised_at) < ttl);
    }

    #[cfg(test)]
    pub fn errors(&self) -> Vec<String> {
        self.queue
            .iter()
            .filter(|t| t.level == ToastLevel::Error)
            .map(|t| t.text.clone())
            .collect()
    }
}
