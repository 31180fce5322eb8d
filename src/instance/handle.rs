use std::path::PathBuf;

use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::{console::Console, paths::DataDirs, vars::VarScope};

use super::{InstanceData, LifecycleState, StartData};

/// In-memory handle for one hosted server instance.
///
/// Constructed from the persisted record and kept for the process lifetime.
/// Base attributes are immutable; launch attributes sit behind a lock because
/// the orchestrator updates the last-core marker during a start. Lifecycle
/// state is readable by anyone at any time but mutated only by the
/// orchestrator and the active starter.
#[derive(Debug)]
pub struct ServerInstance {
    pub data: InstanceData,
    pub start: RwLock<StartData>,
    pub console: Console,
    state: RwLock<LifecycleState>,
    transition: Mutex<()>,
}

impl ServerInstance {
    pub fn new(data: InstanceData, start: StartData) -> Self {
        Self {
            data,
            start: RwLock::new(start),
            console: Console::new(),
            state: RwLock::new(LifecycleState::Stopped),
            transition: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Moves the instance to `new`, announcing the change on the console
    /// channel. Used by the orchestrator and by starter capabilities.
    pub async fn set_state(&self, new: LifecycleState) {
        let mut guard = self.state.write().await;
        let old = *guard;
        *guard = new;
        drop(guard);

        if old != new {
            self.console.emit_state_change(old, new);
        }
    }

    /// Serializes lifecycle operations on this instance.
    ///
    /// One in-flight transition at a time; the guard is held for the whole
    /// operation and released on every exit path. Operations on different
    /// instances proceed independently.
    pub async fn transition_guard(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().await
    }

    pub fn dir(&self, dirs: &DataDirs) -> PathBuf {
        dirs.server(self.data.id)
    }

    /// Snapshots the substitutable attributes for template expansion.
    pub async fn var_scope(&self, dirs: &DataDirs) -> VarScope {
        let start = self.start.read().await;
        VarScope {
            server_id: self.data.id,
            server_dir: self.dir(dirs),
            core: start.core.clone(),
            port: self.data.port,
            players: self.data.max_players,
            world: start.world.clone(),
            base_dir: dirs.root().to_path_buf(),
            core_dir: dirs.core(&start.core),
        }
    }
}
