//! Pipeline configuration
//!
//! Plain serde structs; every field has a default so partial JSON files work.

use crate::resolver::{FileType, FsResolver};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Worker threads for async load phases. 0 means one per CPU.
    pub worker_threads: usize,
    pub thread_name_prefix: String,
    /// Stop draining completions once a tick has spent this long.
    pub update_budget_ms: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name_prefix: "cinder-loader".to_string(),
            update_budget_ms: None,
        }
    }
}

impl ManagerConfig {
    pub fn worker_count(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
    }

    pub fn update_budget(&self) -> Option<Duration> {
        self.update_budget_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub root: PathBuf,
    pub file_type: FileType,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            file_type: FileType::Internal,
        }
    }
}

impl ResolverConfig {
    pub fn build(&self) -> FsResolver {
        FsResolver::new(self.root.clone(), self.file_type)
    }
}

/// Parse a JSON config file into any of the config structs.
pub fn load_json<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ManagerConfig = serde_json::from_str(r#"{ "worker_threads": 3 }"#).unwrap();
        assert_eq!(cfg.worker_threads, 3);
        assert_eq!(cfg.thread_name_prefix, "cinder-loader");
        assert_eq!(cfg.worker_count(), 3);
        assert_eq!(cfg.update_budget(), None);
    }

    #[test]
    fn zero_workers_means_available_parallelism() {
        assert!(ManagerConfig::default().worker_count() >= 1);
    }

    #[test]
    fn resolver_config_parses_file_type() {
        let cfg: ResolverConfig =
            serde_json::from_str(r#"{ "root": "assets", "file_type": "local" }"#).unwrap();
        assert_eq!(cfg.file_type, FileType::Local);
        assert_eq!(cfg.build().root(), Path::new("assets"));
    }

    #[test]
    fn load_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = load_json::<ManagerConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().contains("bad.json"));

        let missing = load_json::<ManagerConfig>(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
