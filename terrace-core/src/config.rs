//! Topology configuration
//!
//! Read from `terrace.json` when present. Every field has a default, so an
//! empty file (or no file) describes the stock two-tier deployment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "terrace.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Which provider carries out the plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// AWS Cloud Control API
    #[default]
    Awscc,
    /// Local simulated cloud
    Simulated,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awscc" => Ok(ProviderKind::Awscc),
            "simulated" => Ok(ProviderKind::Simulated),
            other => Err(format!(
                "Unknown provider '{}', expected 'awscc' or 'simulated'",
                other
            )),
        }
    }
}

/// Locations of the provisioning scripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptPaths {
    pub db_setup: PathBuf,
    pub app_setup: PathBuf,
    pub db_health_check: PathBuf,
}

impl Default for ScriptPaths {
    fn default() -> Self {
        Self {
            db_setup: PathBuf::from("script/mysql-setup.sh"),
            app_setup: PathBuf::from("script/nodejs-setup.sh"),
            db_health_check: PathBuf::from("script/check-mysql.sh"),
        }
    }
}

/// SSH client config written after a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub path: String,
    pub user: String,
    pub app_host: String,
    pub db_host: String,
    /// Defaults to `~/.ssh/<key_name>.id_rsa`
    pub identity_file: Option<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            path: "~/.ssh/config".to_string(),
            user: "ubuntu".to_string(),
            app_host: "nodejs-server".to_string(),
            db_host: "db-server".to_string(),
            identity_file: None,
        }
    }
}

impl SshSettings {
    pub fn identity_file(&self, key_name: &str) -> String {
        self.identity_file
            .clone()
            .unwrap_or_else(|| format!("~/.ssh/{}.id_rsa", key_name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub region: String,
    pub availability_zone: String,
    pub vpc_cidr: String,
    pub public_subnet_cidr: String,
    pub private_subnet_cidr: String,
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub app_port: u16,
    pub db_port: u16,
    pub ssh_port: u16,
    pub scripts: ScriptPaths,
    pub ssh: SshSettings,
    pub provider: ProviderKind,
    pub state_path: PathBuf,
    /// Backing file of the simulated cloud
    pub simulator_path: PathBuf,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            region: "ap-southeast-1".to_string(),
            availability_zone: "ap-southeast-1a".to_string(),
            vpc_cidr: "16.0.0.0/16".to_string(),
            public_subnet_cidr: "16.0.1.0/24".to_string(),
            private_subnet_cidr: "16.0.2.0/24".to_string(),
            image_id: "ami-01811d4912b4ccb26".to_string(),
            instance_type: "t2.micro".to_string(),
            key_name: "db-cluster".to_string(),
            app_port: 3000,
            db_port: 3306,
            ssh_port: 22,
            scripts: ScriptPaths::default(),
            ssh: SshSettings::default(),
            provider: ProviderKind::default(),
            state_path: PathBuf::from("terrace.state.json"),
            simulator_path: PathBuf::from("terrace.cloud.json"),
        }
    }
}

impl TopologyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise use the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
