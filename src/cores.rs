use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::fs::{read, read_dir};
use tracing::{debug, warn};

use crate::{error::CoreError, paths::DataDirs};

/// How a managed config file is structured on disk.
///
/// Only line-delimited `key=value` files are defined today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    #[default]
    Properties,
}

/// Presentation hint for a known config key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Number,
    Toggle,
    Select,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnownConfigKey {
    pub key: String,
    /// Default value template; passed through variable substitution when used.
    #[serde(default)]
    pub value: String,
    /// When set the default template always wins over file content and overrides.
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub input_type: InputKind,
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigFileSchema {
    /// Target filename inside the instance's working directory.
    pub filename: String,
    #[serde(default)]
    pub format: ConfigFormat,
    /// Required files are created empty when missing before rendering.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub known: Vec<KnownConfigKey>,
}

impl ConfigFileSchema {
    pub fn known_key(&self, key: &str) -> Option<&KnownConfigKey> {
        self.known.iter().find(|k| k.key == key)
    }
}

/// Program and argument templates used to launch an instance on this core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartDescriptor {
    pub program: String,
    #[serde(default)]
    pub args: String,
}

/// Immutable launch-core definition, loaded once at process start.
///
/// Many instances may reference the same core; the registry hands out
/// shared references and never mutates after initialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LaunchCore {
    pub name: String,
    pub start: StartDescriptor,
    #[serde(default)]
    pub configs: Vec<ConfigFileSchema>,
}

impl LaunchCore {
    pub fn config(&self, filename: &str) -> Option<&ConfigFileSchema> {
        self.configs.iter().find(|c| c.filename == filename)
    }

    /// Enforces the per-core invariant that config filenames are unique.
    fn validate(&self) -> Result<(), CoreError> {
        for (i, schema) in self.configs.iter().enumerate() {
            if self.configs[..i].iter().any(|c| c.filename == schema.filename) {
                return Err(CoreError::DuplicateConfigFile(
                    self.name.clone(),
                    schema.filename.clone(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CoreRegistry {
    cores: HashMap<String, Arc<LaunchCore>>,
}

impl CoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, core: LaunchCore) -> Result<(), CoreError> {
        core.validate()?;
        debug!(core = %core.name, "registered launch core");
        self.cores.insert(core.name.clone(), Arc::new(core));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<LaunchCore>> {
        self.cores.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cores.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cores.keys().map(String::as_str)
    }

    /// Scans `<data>/cores/<name>/core.json` and registers every definition.
    ///
    /// Directories without a parseable definition are skipped with a warning;
    /// a malformed definition inside an existing `core.json` is an error.
    pub async fn load_all(dirs: &DataDirs) -> Result<Self, CoreError> {
        let mut registry = Self::new();

        let mut entries = read_dir(dirs.cores())
            .await
            .map_err(|_| CoreError::DirectoryError)?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|_| CoreError::DirectoryError)?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|_| CoreError::DirectoryError)?;
            if !meta.is_dir() {
                continue;
            }

            let definition = entry.path().join("core.json");
            let data = match read(&definition).await {
                Ok(data) => data,
                Err(_) => {
                    warn!(path = %definition.display(), "core directory without definition, skipping");
                    continue;
                }
            };

            let core: LaunchCore = serde_json::from_slice(&data)
                .map_err(|err| CoreError::Malformed(err.to_string()))?;
            registry.register(core)?;
        }

        Ok(registry)
    }
}
