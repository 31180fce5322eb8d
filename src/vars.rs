use std::path::PathBuf;

/// Sentinel value for "this key has no value".
///
/// When a template resolves to exactly this string the caller treats the
/// value as absent; the config renderer drops the key's line entirely.
/// A generic substring match does not count.
pub const UNSET: &str = "{{UNSET}}";

/// Returns whether a fully substituted value is the absent sentinel.
pub fn is_unset(value: &str) -> bool {
    value == UNSET
}

/// Snapshot of an instance's substitutable attributes.
///
/// Built by [`ServerInstance::var_scope`](crate::instance::ServerInstance::var_scope)
/// and consumed by the renderer and the orchestrator when resolving config
/// defaults, overrides, and the launch command templates.
#[derive(Debug, Clone)]
pub struct VarScope {
    pub server_id: i64,
    pub server_dir: PathBuf,
    pub core: String,
    pub port: u16,
    pub players: u32,
    pub world: String,
    pub base_dir: PathBuf,
    pub core_dir: PathBuf,
}

impl VarScope {
    /// Expands every known placeholder in `template`.
    ///
    /// Total and infallible: unmatched placeholders are left verbatim.
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{{SERVERID}}", &self.server_id.to_string())
            .replace("{{SERVERDIR}}", &self.server_dir.display().to_string())
            .replace("{{CORE}}", &self.core)
            .replace("{{PORT}}", &self.port.to_string())
            .replace("{{PLAYER}}", &self.players.to_string())
            .replace("{{WORLD}}", &self.world)
            .replace("{{BASEDIR}}", &self.base_dir.display().to_string())
            .replace("{{COREDIR}}", &self.core_dir.display().to_string())
    }
}
