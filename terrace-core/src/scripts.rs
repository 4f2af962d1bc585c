//! Provisioning scripts embedded into instance boot scripts

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ScriptPaths;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of the three setup scripts, read once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBundle {
    pub db_setup: String,
    pub app_setup: String,
    pub db_health_check: String,
}

impl ScriptBundle {
    pub fn load(paths: &ScriptPaths) -> Result<Self, ScriptError> {
        Ok(Self {
            db_setup: read_script(&paths.db_setup)?,
            app_setup: read_script(&paths.app_setup)?,
            db_health_check: read_script(&paths.db_health_check)?,
        })
    }

    /// Resolve relative script paths against `base` before loading
    pub fn load_relative(paths: &ScriptPaths, base: &Path) -> Result<Self, ScriptError> {
        let rebase = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self::load(&ScriptPaths {
            db_setup: rebase(&paths.db_setup),
            app_setup: rebase(&paths.app_setup),
            db_health_check: rebase(&paths.db_health_check),
        })
    }
}

fn read_script(path: &Path) -> Result<String, ScriptError> {
    log::debug!("Reading script {}", path.display());
    fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })
}
