#[cfg(feature = "process-starter")]
mod process;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{error::StarterError, instance::ServerInstance};

#[cfg(feature = "process-starter")]
pub use process::ProcessStarter;

/// A pluggable launcher capability.
///
/// The set of starters is open: external collaborators contribute
/// implementations and register them under a name at process initialization.
/// All three operations answer with a verdict boolean; the orchestrator
/// treats any fault as `false`.
#[async_trait]
pub trait Starter: Send + Sync {
    /// Launches the instance. `program` and `args` arrive with every template
    /// placeholder already substituted.
    async fn start(
        &self,
        instance: Arc<ServerInstance>,
        program: String,
        args: Vec<String>,
    ) -> Result<bool, StarterError>;

    async fn stop(&self, instance: Arc<ServerInstance>) -> Result<bool, StarterError>;

    /// Delivers free-form input to a running instance.
    async fn send_input(
        &self,
        instance: Arc<ServerInstance>,
        text: &str,
    ) -> Result<bool, StarterError>;
}

/// Name-to-capability lookup, append-only at registration time and read-only
/// during orchestration.
#[derive(Default)]
pub struct StarterRegistry {
    starters: HashMap<String, Arc<dyn Starter>>,
}

impl StarterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<N: Into<String>>(&mut self, name: N, starter: Arc<dyn Starter>) {
        self.starters.insert(name.into(), starter);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Starter>> {
        self.starters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.starters.contains_key(name)
    }
}
