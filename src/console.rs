use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::instance::LifecycleState;

/// Identifies what produced a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleSource {
    /// Progress lines written by the orchestration engine itself.
    Engine,
    Stdout,
    Stderr,
}

/// A single line of the instance's console log along with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub line: String,
    pub source: ConsoleSource,
}

impl ConsoleLine {
    pub fn new<S: Into<String>>(line: S, source: ConsoleSource) -> Self {
        Self {
            line: line.into(),
            source,
        }
    }

    pub fn engine<S: Into<String>>(line: S) -> Self {
        Self::new(line, ConsoleSource::Engine)
    }

    pub fn stdout<S: Into<String>>(line: S) -> Self {
        Self::new(line, ConsoleSource::Stdout)
    }

    pub fn stderr<S: Into<String>>(line: S) -> Self {
        Self::new(line, ConsoleSource::Stderr)
    }
}

impl Display for ConsoleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolePayload {
    Line(ConsoleLine),
    StateChange {
        old: LifecycleState,
        new: LifecycleState,
    },
}

/// Timestamped console event delivered to live subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: ConsolePayload,
}

impl ConsoleEvent {
    fn now(payload: ConsolePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

impl Display for ConsoleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            ConsolePayload::Line(line) => write!(f, "[{}] {}", self.timestamp, line),
            ConsolePayload::StateChange { old, new } => {
                write!(f, "[{}] State changed: {:?} -> {:?}", self.timestamp, old, new)
            }
        }
    }
}

/// Append-only console buffer with live fan-out.
///
/// The buffer is readable at any time by observers; new lines and state
/// changes are additionally published on a broadcast channel so a streaming
/// consumer can follow along without polling.
#[derive(Debug)]
pub struct Console {
    lines: RwLock<Vec<ConsoleLine>>,
    tx: broadcast::Sender<ConsoleEvent>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: RwLock::new(Vec::new()),
            tx: broadcast::Sender::new(2048),
        }
    }

    pub async fn push(&self, line: ConsoleLine) {
        let mut lines = self.lines.write().await;
        lines.push(line.clone());
        drop(lines);

        _ = self.tx.send(ConsoleEvent::now(ConsolePayload::Line(line)));
    }

    /// Appends a human-readable engine progress line.
    pub async fn output<S: Into<String>>(&self, msg: S) {
        self.push(ConsoleLine::engine(msg)).await;
    }

    pub(crate) fn emit_state_change(&self, old: LifecycleState, new: LifecycleState) {
        _ = self
            .tx
            .send(ConsoleEvent::now(ConsolePayload::StateChange { old, new }));
    }

    pub fn subscribe(&self) -> BroadcastStream<ConsoleEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub async fn snapshot(&self) -> Vec<ConsoleLine> {
        self.lines.read().await.clone()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
