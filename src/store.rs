use async_trait::async_trait;
use tokio::fs::{create_dir_all, read, read_dir, write};
use tracing::{debug, warn};

use crate::{
    error::StoreError,
    instance::{InstanceData, ServerInstance, StartData},
    paths::DataDirs,
};

/// Persistence seam for instance records.
///
/// The orchestrator only needs to write back launch attributes after the
/// last-core marker moves; everything else about storage is the hosting
/// environment's business.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn persist_start(&self, id: i64, start: &StartData) -> Result<(), StoreError>;
}

const RECORD_DIR: &str = ".corehost";
const DATA_FILE: &str = "instance.json";
const START_FILE: &str = "start.json";

/// File-backed store keeping each instance's record inside its own
/// directory, split into base attributes and launch attributes the same way
/// the relational schema splits them.
pub struct JsonStore {
    dirs: DataDirs,
}

impl JsonStore {
    pub fn new(dirs: DataDirs) -> Self {
        Self { dirs }
    }

    fn record_dir(&self, id: i64) -> std::path::PathBuf {
        self.dirs.server(id).join(RECORD_DIR)
    }

    /// Writes the full record (base and launch attributes) for `instance`.
    pub async fn save(&self, instance: &ServerInstance) -> Result<(), StoreError> {
        let id = instance.data.id;
        let dir = self.record_dir(id);
        create_dir_all(&dir)
            .await
            .map_err(|_| StoreError::WriteFailed(id))?;

        let data = serde_json::to_vec_pretty(&instance.data)
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        write(dir.join(DATA_FILE), data)
            .await
            .map_err(|_| StoreError::WriteFailed(id))?;

        let start = instance.start.read().await.clone();
        let start = serde_json::to_vec_pretty(&start)
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        write(dir.join(START_FILE), start)
            .await
            .map_err(|_| StoreError::WriteFailed(id))?;

        debug!(server = id, "instance record saved");
        Ok(())
    }

    pub async fn load(&self, id: i64) -> Result<(InstanceData, StartData), StoreError> {
        let dir = self.record_dir(id);

        let data = read(dir.join(DATA_FILE))
            .await
            .map_err(|_| StoreError::ReadFailed(id))?;
        let data: InstanceData =
            serde_json::from_slice(&data).map_err(|err| StoreError::Malformed(err.to_string()))?;

        let start = read(dir.join(START_FILE))
            .await
            .map_err(|_| StoreError::ReadFailed(id))?;
        let start: StartData =
            serde_json::from_slice(&start).map_err(|err| StoreError::Malformed(err.to_string()))?;

        Ok((data, start))
    }

    /// Scans the servers directory and reconstructs every instance with a
    /// readable record. Directories without one are skipped with a warning.
    pub async fn load_all(&self) -> Result<Vec<ServerInstance>, StoreError> {
        let mut entries = read_dir(self.dirs.servers())
            .await
            .map_err(|_| StoreError::DirectoryError)?;

        let mut instances = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|_| StoreError::DirectoryError)?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|_| StoreError::DirectoryError)?;
            if !meta.is_dir() {
                continue;
            }

            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i64>().ok())
            else {
                continue;
            };

            match self.load(id).await {
                Ok((data, start)) => instances.push(ServerInstance::new(data, start)),
                Err(err) => {
                    warn!(server = id, %err, "skipping server directory without readable record");
                }
            }
        }

        Ok(instances)
    }
}

#[async_trait]
impl InstanceStore for JsonStore {
    async fn persist_start(&self, id: i64, start: &StartData) -> Result<(), StoreError> {
        let dir = self.record_dir(id);
        create_dir_all(&dir)
            .await
            .map_err(|_| StoreError::WriteFailed(id))?;

        let body = serde_json::to_vec_pretty(start)
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        write(dir.join(START_FILE), body)
            .await
            .map_err(|_| StoreError::WriteFailed(id))?;

        debug!(server = id, "launch attributes persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use tempfile::TempDir;

    fn instance(id: i64) -> ServerInstance {
        ServerInstance::new(
            InstanceData {
                id,
                name: "lobby".to_string(),
                port: 25565,
                max_players: 20,
                memory_mb: 1024,
                expires_at: Utc::now() + chrono::Duration::days(7),
                auto_start: true,
            },
            StartData {
                core: "vanilla".to_string(),
                last_core: "forge".to_string(),
                starter: "process".to_string(),
                world: "world".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonStore::new(DataDirs::new(tmp.path()));

        store.save(&instance(3)).await.expect("save");
        let (data, start) = store.load(3).await.expect("load");

        assert_eq!(data.id, 3);
        assert_eq!(data.name, "lobby");
        assert_eq!(start.core, "vanilla");
        assert_eq!(start.last_core, "forge");
    }

    #[tokio::test]
    async fn persist_start_updates_only_launch_attributes() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonStore::new(DataDirs::new(tmp.path()));
        let instance = instance(4);
        store.save(&instance).await.expect("save");

        let mut start = instance.start.read().await.clone();
        start.last_core = "vanilla".to_string();
        store.persist_start(4, &start).await.expect("persist");

        let (data, reloaded) = store.load(4).await.expect("load");
        assert_eq!(data.name, "lobby");
        assert_eq!(reloaded.last_core, "vanilla");
    }

    #[tokio::test]
    async fn load_all_skips_unreadable_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let dirs = DataDirs::new(tmp.path());
        let store = JsonStore::new(dirs.clone());

        store.save(&instance(1)).await.expect("save");
        store.save(&instance(2)).await.expect("save");
        tokio::fs::create_dir_all(dirs.server(99))
            .await
            .expect("empty dir");

        let mut loaded = store.load_all().await.expect("load all");
        loaded.sort_by_key(|i| i.data.id);

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].data.id, 1);
        assert_eq!(loaded[1].data.id, 2);
    }
}
