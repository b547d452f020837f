//! Runtime configuration
//!
//! One JSON file covers the pipeline, the asset root and logging. Every field
//! is optional; command-line flags override what the file says.

use cinder_asset::{ManagerConfig, ResolverConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub manager: ManagerConfig,
    pub resolver: ResolverConfig,
    pub log: LogConfig,
    /// How often the completion queue is drained.
    pub tick_rate_hz: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            resolver: ResolverConfig::default(),
            log: LogConfig::default(),
            tick_rate_hz: cinder_core::time::TICK_RATE_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_asset::config::load_json;
    use cinder_asset::FileType;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(
            &path,
            r#"{ "resolver": { "root": "assets", "file_type": "local" }, "log": { "filter": "cinder_asset=debug" } }"#,
        )
        .unwrap();

        let cfg: RuntimeConfig = load_json(&path).unwrap();
        assert_eq!(cfg.resolver.root, std::path::PathBuf::from("assets"));
        assert_eq!(cfg.resolver.file_type, FileType::Local);
        assert_eq!(cfg.log.filter, "cinder_asset=debug");
        assert_eq!(cfg.manager, ManagerConfig::default());
        assert_eq!(cfg.tick_rate_hz, 60);
    }
}
