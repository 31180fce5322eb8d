use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::SubscriberError;

pub const WILL_START: &str = "will-start";
pub const STARTED: &str = "started";
pub const WILL_STOP: &str = "will-stop";
pub const STOPPED: &str = "stopped";
pub const INPUT: &str = "input";

/// Ephemeral lifecycle notification dispatched to plugins.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub name: String,
    pub server_id: i64,
    pub input: Option<String>,
}

impl LifecycleEvent {
    pub fn new<S: Into<String>>(name: S, server_id: i64) -> Self {
        Self {
            name: name.into(),
            server_id,
            input: None,
        }
    }

    pub fn with_input<S: Into<String>>(mut self, input: S) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// A plugin-side observer of lifecycle events.
///
/// The returned boolean is the subscriber's verdict: `false` vetoes the
/// transition for the gating events. Faults are treated as `false`.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: LifecycleEvent) -> Result<bool, SubscriberError>;
}

/// Asynchronous publish mechanism with per-subscriber verdicts.
///
/// Registration happens once at process initialization; the bus is read-only
/// during orchestration and shared behind an `Arc`. Dispatch order across
/// subscribers is unspecified and must not be relied upon.
pub struct EventBus {
    subscribers: HashMap<String, Vec<(String, Arc<dyn EventSubscriber>)>>,
    timeout: Duration,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// A subscriber that does not answer within `timeout` counts as `false`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            subscribers: HashMap::new(),
            timeout,
        }
    }

    pub fn register<E, N>(&mut self, event: E, name: N, subscriber: Arc<dyn EventSubscriber>)
    where
        E: Into<String>,
        N: Into<String>,
    {
        self.subscribers
            .entry(event.into())
            .or_default()
            .push((name.into(), subscriber));
    }

    /// Dispatches `event` to every subscriber registered for its name and
    /// collects each verdict.
    ///
    /// Subscribers run concurrently in spawned tasks; a fault, panic, or
    /// timeout counts as `false` (fail-closed). Never fails itself; zero
    /// subscribers yield an empty map.
    pub async fn broadcast(&self, event: &LifecycleEvent) -> HashMap<String, bool> {
        let mut results = HashMap::new();

        let Some(subscribers) = self.subscribers.get(&event.name) else {
            return results;
        };

        let mut handles = Vec::with_capacity(subscribers.len());
        for (name, subscriber) in subscribers {
            let subscriber = subscriber.clone();
            let event = event.clone();
            let task_name = name.clone();
            let limit = self.timeout;

            let handle = tokio::spawn(async move {
                match timeout(limit, subscriber.handle(event)).await {
                    Ok(Ok(verdict)) => verdict,
                    Ok(Err(err)) => {
                        warn!(subscriber = %task_name, %err, "subscriber fault, counting as veto");
                        false
                    }
                    Err(_) => {
                        warn!(subscriber = %task_name, "subscriber timed out, counting as veto");
                        false
                    }
                }
            });
            handles.push((name.clone(), handle));
        }

        for (name, handle) in handles {
            let verdict = match handle.await {
                Ok(verdict) => verdict,
                Err(err) => {
                    warn!(subscriber = %name, %err, "subscriber panicked, counting as veto");
                    false
                }
            };
            results.insert(name, verdict);
        }

        results
    }

    /// Fire-and-forget broadcast: dispatches on a detached task and discards
    /// the verdicts. Never blocks the caller and never surfaces failures.
    pub fn notify(self: &Arc<Self>, event: LifecycleEvent) {
        let bus = self.clone();
        tokio::spawn(async move {
            let results = bus.broadcast(&event).await;
            debug!(event = %event.name, server = event.server_id, ?results, "notification dispatched");
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// First subscriber that vetoed, if any. Iteration order is unspecified.
pub fn first_veto(results: &HashMap<String, bool>) -> Option<&str> {
    results
        .iter()
        .find(|(_, verdict)| !**verdict)
        .map(|(name, _)| name.as_str())
}
