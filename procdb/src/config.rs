//! Session configuration
//!
//! Read from a JSON file, optionally named by `PROCDB_CONFIG`. Extra
//! plug-in directories can be added through `PROCDB_PLUGIN_PATH`
//! (colon-separated); every executable file in a plug-in directory
//! becomes a plug-in named after its file stem.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "PROCDB_CONFIG";
pub const PLUGIN_PATH_ENV: &str = "PROCDB_PLUGIN_PATH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One plug-in program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDef {
    pub name: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extensions stay resident after discovery
    #[serde(default)]
    pub extension: bool,
}

impl PluginDef {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), program: program.into(), args: Vec::new(), extension: false }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn extension(mut self) -> Self {
        self.extension = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub plugins: Vec<PluginDef>,
    pub plugin_path: Vec<PathBuf>,
    pub handshake_timeout_ms: u64,
    pub quit_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            plugin_path: Vec::new(),
            handshake_timeout_ms: 5000,
            quit_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Config named by the environment, or the default
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(dirs) = std::env::var_os(PLUGIN_PATH_ENV) {
            config.plugin_path.extend(std::env::split_paths(&dirs));
        }
        Ok(config)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.quit_timeout_ms)
    }

    /// Explicit plug-ins followed by those found on the plug-in path
    pub fn plugin_defs(&self) -> Vec<PluginDef> {
        let mut defs = self.plugins.clone();
        for dir in &self.plugin_path {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "skipping plug-in directory");
                    continue;
                }
            };
            let mut found: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_executable(path))
                .collect();
            found.sort();
            for path in found {
                let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                    continue;
                };
                if defs.iter().any(|d| d.name == name) {
                    tracing::debug!(plug_in = %name, "already defined, skipping {}", path.display());
                    continue;
                }
                defs.push(PluginDef::new(name, path));
            }
        }
        defs
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: SessionConfig = serde_json::from_str(r#"{
            "plugins": [{"name": "blur", "program": "/usr/lib/procdb/blur"}]
        }"#).unwrap();
        assert_eq!(config.handshake_timeout_ms, 5000);
        assert_eq!(config.plugins[0].args.len(), 0);
        assert!(!config.plugins[0].extension);
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procdb.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = SessionConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("procdb.json"));

        assert!(matches!(SessionConfig::load(dir.path().join("missing.json")), Err(ConfigError::Io { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_plugin_path_scan() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("sharpen");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("README"), "not a plug-in").unwrap();

        let config = SessionConfig {
            plugins: vec![PluginDef::new("blur", "/bin/blur")],
            plugin_path: vec![dir.path().to_path_buf()],
            ..SessionConfig::default()
        };
        let defs = config.plugin_defs();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["blur", "sharpen"]);
    }
}
