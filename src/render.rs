use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::{
    cores::{CoreRegistry, InputKind},
    error::ConfigError,
    instance::ServerInstance,
    paths::DataDirs,
    vars,
};

/// Presentation entry produced by [`ConfigRenderer::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub label: String,
    pub input_type: InputKind,
    pub value: String,
    pub options: Vec<String>,
}

/// Rewrites per-instance config files against the core-declared schema.
///
/// Works on line-delimited `key=value` files: comments and blank lines pass
/// through untouched, known keys get their value recomputed (forced default,
/// then override, then existing value), unknown keys pass through verbatim.
/// Files the schema does not mention are never touched.
pub struct ConfigRenderer {
    cores: Arc<CoreRegistry>,
    dirs: DataDirs,
}

impl ConfigRenderer {
    pub fn new(cores: Arc<CoreRegistry>, dirs: DataDirs) -> Self {
        Self { cores, dirs }
    }

    /// Rebuilds `filename` in the instance directory, applying forced schema
    /// defaults and the supplied overrides. Values run through variable
    /// substitution; a value resolving to the absent sentinel drops the
    /// key's line entirely. No-op when the filename is not in the schema.
    pub async fn render(
        &self,
        instance: &ServerInstance,
        filename: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<(), ConfigError> {
        let start = instance.start.read().await.clone();
        let Some(core) = self.cores.get(&start.core) else {
            return Ok(());
        };
        let Some(schema) = core.config(filename) else {
            return Ok(());
        };

        let path = instance.dir(&self.dirs).join(filename);
        let content = fs::read_to_string(&path).await.map_err(|err| {
            warn!(server = instance.data.id, %filename, %err, "config read failed");
            ConfigError::ReadFailed(filename.to_string())
        })?;

        let scope = instance.var_scope(&self.dirs).await;
        let mut out = String::with_capacity(content.len());

        for line in content.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                out.push_str(line);
                out.push('\n');
                continue;
            }

            let Some((raw_key, existing)) = line.split_once('=') else {
                out.push_str(line);
                out.push('\n');
                continue;
            };
            let key = raw_key.trim();

            let Some(known) = schema.known_key(key) else {
                out.push_str(line);
                out.push('\n');
                continue;
            };

            // Only substituted values can resolve to the absent sentinel; an
            // existing file value passes through untouched.
            let computed = if known.force {
                Some(scope.substitute(&known.value))
            } else {
                overrides.get(key).map(|value| scope.substitute(value))
            };

            let value = match computed {
                Some(value) if vars::is_unset(&value) => continue,
                Some(value) => value,
                None => existing.to_string(),
            };

            out.push_str(key);
            out.push('=');
            out.push_str(&value);
            out.push('\n');
        }

        fs::write(&path, &out).await.map_err(|err| {
            warn!(server = instance.data.id, %filename, %err, "config write failed");
            ConfigError::WriteFailed(filename.to_string())
        })?;

        debug!(server = instance.data.id, %filename, "config rendered");
        Ok(())
    }

    /// Parses `filename` into display entries: visible known keys with their
    /// schema metadata, unknown keys as plain text entries. Read-only.
    pub async fn list(
        &self,
        instance: &ServerInstance,
        filename: &str,
    ) -> Result<Vec<ConfigEntry>, ConfigError> {
        let start = instance.start.read().await.clone();
        let schema = self
            .cores
            .get(&start.core)
            .and_then(|core| core.config(filename).cloned());
        let Some(schema) = schema else {
            return Ok(Vec::new());
        };

        let path = instance.dir(&self.dirs).join(filename);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|_| ConfigError::ReadFailed(filename.to_string()))?;

        let mut entries = Vec::new();
        for line in content.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let Some((raw_key, value)) = line.split_once('=') else {
                continue;
            };
            let key = raw_key.trim();

            match schema.known_key(key) {
                Some(known) if !known.visible => continue,
                Some(known) => entries.push(ConfigEntry {
                    key: key.to_string(),
                    label: known.label.clone(),
                    input_type: known.input_type,
                    value: value.to_string(),
                    options: known.options.clone(),
                }),
                None => entries.push(ConfigEntry {
                    key: key.to_string(),
                    label: key.to_string(),
                    input_type: InputKind::Text,
                    value: value.to_string(),
                    options: Vec::new(),
                }),
            }
        }

        Ok(entries)
    }

    /// Creates missing required config files seeded with their substituted
    /// schema defaults, then renders every schema-declared file present in
    /// the instance directory so forced values stay current.
    pub async fn ensure_files(&self, instance: &ServerInstance) -> Result<(), ConfigError> {
        let start = instance.start.read().await.clone();
        let Some(core) = self.cores.get(&start.core) else {
            return Ok(());
        };

        let dir = instance.dir(&self.dirs);
        fs::create_dir_all(&dir)
            .await
            .map_err(|_| ConfigError::CreateFailed(dir.display().to_string()))?;

        let scope = instance.var_scope(&self.dirs).await;
        for schema in &core.configs {
            let path = dir.join(&schema.filename);
            if !path.exists() && schema.required {
                let mut seed = String::new();
                for known in &schema.known {
                    let value = scope.substitute(&known.value);
                    if vars::is_unset(&value) {
                        continue;
                    }
                    seed.push_str(&known.key);
                    seed.push('=');
                    seed.push_str(&value);
                    seed.push('\n');
                }
                fs::write(&path, seed)
                    .await
                    .map_err(|_| ConfigError::CreateFailed(schema.filename.clone()))?;
            }
            if path.exists() {
                self.render(instance, &schema.filename, &HashMap::new())
                    .await?;
            }
        }

        Ok(())
    }
}
