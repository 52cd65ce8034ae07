use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_STATE_DIR: &str = ".vaul3t";

/// On-disk locations of the three durable tables and the read-only registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    pub state_dir: PathBuf,
    pub registry_path: PathBuf,
    pub tokens_path: PathBuf,
    pub connections_path: PathBuf,
    pub pending_connections_path: PathBuf,
    pub rate_limits_path: PathBuf,
}

impl StateLayout {
    pub fn for_state_dir(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            registry_path: state_dir.join("user_map.json"),
            tokens_path: state_dir.join("tokens").join("user_tokens.json"),
            connections_path: state_dir.join("connections.json"),
            pending_connections_path: state_dir.join("pending_connections.json"),
            rate_limits_path: state_dir.join("rate_limits.json"),
        }
    }

    /// Creates the directories every table lives in.
    pub fn create_dirs(&self) -> Result<()> {
        let paths = [
            self.state_dir.as_path(),
            self.registry_path.as_path(),
            self.tokens_path.as_path(),
            self.connections_path.as_path(),
            self.pending_connections_path.as_path(),
            self.rate_limits_path.as_path(),
        ];
        for path in paths {
            let dir = if path == self.state_dir.as_path() {
                Some(path)
            } else {
                path.parent().filter(|dir| !dir.as_os_str().is_empty())
            };
            if let Some(dir) = dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

impl Default for StateLayout {
    fn default() -> Self {
        Self::for_state_dir(Path::new(DEFAULT_STATE_DIR))
    }
}
