use crate::descriptor::AssetKind;
use cinder_render::RenderError;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Why a load did not produce an asset.
///
/// Cloneable: one failure is delivered to every waiter of the task.
#[derive(Debug, Clone, Error)]
pub enum AssetError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to decode '{path}': {message}")]
    Decode { path: String, message: String },

    #[error("malformed '{path}' at line {line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("rendering context rejected '{path}': {source}")]
    ResourceCreation {
        path: String,
        #[source]
        source: RenderError,
    },

    #[error("dependency cycle: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("'{path}' cannot load because dependency '{dependency}' failed")]
    DependencyFailed {
        path: String,
        dependency: String,
        #[source]
        source: Box<AssetError>,
    },

    #[error("no loader registered for {0} assets")]
    NoLoader(AssetKind),

    #[error("loader for '{path}' produced a {actual} instead of a {expected}")]
    KindMismatch {
        path: String,
        expected: AssetKind,
        actual: AssetKind,
    },

    #[error("'{0}' is not loaded")]
    NotLoaded(String),

    #[error("{0} would block the owning thread, which is the only one that can drain")]
    WrongThread(&'static str),

    #[error("asset manager shut down before '{0}' completed")]
    Disconnected(String),

    #[error("failed to start loader workers: {0}")]
    Workers(String),
}

impl AssetError {
    pub fn io(path: impl Into<String>, err: io::Error) -> Self {
        AssetError::Io {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    pub fn decode(path: impl Into<String>, err: impl fmt::Display) -> Self {
        AssetError::Decode {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn parse(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        AssetError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn resource(path: impl Into<String>, err: RenderError) -> Self {
        AssetError::ResourceCreation {
            path: path.into(),
            source: err,
        }
    }

    /// Wrap a dependency's failure for its dependent. A cycle passes through
    /// unchanged to dependents that are themselves on it.
    pub fn for_dependent(self, path: &str, dependency: &str) -> Self {
        let on_cycle = matches!(
            &self,
            AssetError::DependencyCycle { cycle } if cycle.iter().any(|p| p == path)
        );
        if on_cycle {
            return self;
        }
        AssetError::DependencyFailed {
            path: path.to_string(),
            dependency: dependency.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error of a `DependencyFailed` chain.
    pub fn root_cause(&self) -> &AssetError {
        let mut err = self;
        while let AssetError::DependencyFailed { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, AssetError::DependencyCycle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_chain_exposes_root_cause() {
        let io = AssetError::io("page.png", io::Error::new(io::ErrorKind::NotFound, "gone"));
        let wrapped = io
            .clone()
            .for_dependent("ui.atlas", "page.png")
            .for_dependent("menu.atlas", "ui.atlas");

        assert!(matches!(wrapped, AssetError::DependencyFailed { ref path, .. } if path == "menu.atlas"));
        assert!(matches!(wrapped.root_cause(), AssetError::Io { path, .. } if path == "page.png"));
    }

    #[test]
    fn cycles_pass_through_members_only() {
        let cycle = AssetError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(cycle.to_string(), "dependency cycle: a -> b -> a");

        let member = cycle.clone().for_dependent("b", "a");
        assert!(member.is_cycle());

        let outsider = cycle.for_dependent("root", "a");
        assert!(matches!(outsider, AssetError::DependencyFailed { .. }));
        assert!(outsider.root_cause().is_cycle());
    }
}
