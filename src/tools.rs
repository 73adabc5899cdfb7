//! Host executable detection
//!
//! Works out which fetcher programs are installed. For each kind the lookup
//! order is: explicitly configured path, then `PATH` (via the `which` crate)
//! when `search_path` is enabled, then the local `tools_dir`.

use crate::config::ToolsConfig;
use crate::types::ExecutableKind;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name suffixes tried inside `tools_dir`
const LOCAL_SUFFIXES: &[&str] = &["", ".exe", ".bat"];

/// Resolved locations of the installed fetcher executables
#[derive(Clone, Debug, Default)]
pub struct ToolSet {
    paths: HashMap<ExecutableKind, PathBuf>,
}

impl ToolSet {
    /// Detect installed executables according to `config`
    pub fn detect(config: &ToolsConfig) -> Self {
        let mut paths = HashMap::new();

        for kind in ExecutableKind::ALL {
            match locate(kind, config) {
                Some(path) => {
                    tracing::info!(executable = %kind, path = %path.display(), "fetcher available");
                    paths.insert(kind, path);
                }
                None => {
                    tracing::warn!(executable = %kind, "fetcher not found, routes to it will fail");
                }
            }
        }

        Self { paths }
    }

    /// Build from known locations, skipping detection
    pub fn from_paths(paths: impl IntoIterator<Item = (ExecutableKind, PathBuf)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Location of an executable, if installed
    pub fn path(&self, kind: ExecutableKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    /// Whether an executable is installed
    pub fn is_available(&self, kind: ExecutableKind) -> bool {
        self.paths.contains_key(&kind)
    }

    /// Installed executables, in [`ExecutableKind::ALL`] order
    pub fn available(&self) -> Vec<ExecutableKind> {
        ExecutableKind::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
            .collect()
    }
}

fn locate(kind: ExecutableKind, config: &ToolsConfig) -> Option<PathBuf> {
    if let Some(explicit) = config.explicit_path(kind) {
        if explicit.is_file() {
            return Some(explicit.clone());
        }
        tracing::warn!(
            executable = %kind,
            path = %explicit.display(),
            "configured path does not exist, falling back to search"
        );
    }

    if config.search_path
        && let Ok(found) = which::which(kind.binary_name())
    {
        return Some(found);
    }

    LOCAL_SUFFIXES
        .iter()
        .map(|suffix| {
            config
                .tools_dir
                .join(format!("{}{}", kind.binary_name(), suffix))
        })
        .find(|candidate| candidate.is_file())
}
