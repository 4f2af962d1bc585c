//! SSH client config for reaching both instances
//!
//! The application host is reached directly on its public address; the
//! database host is reached through the application host with `ProxyJump`.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::config::{SshSettings, expand_home};
use crate::resource::Value;

#[derive(Debug, thiserror::Error)]
pub enum SshConfigError {
    #[error("Output '{0}' is not known yet")]
    MissingOutput(&'static str),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render the two host entries
pub fn render(
    settings: &SshSettings,
    key_name: &str,
    app_public_ip: &str,
    db_private_ip: &str,
) -> String {
    let identity_file = settings.identity_file(key_name);
    format!(
        "Host {app_host}\n    HostName {app_ip}\n    User {user}\n    IdentityFile {identity}\n\n\
         Host {db_host}\n    ProxyJump {app_host}\n    HostName {db_ip}\n    User {user}\n    IdentityFile {identity}\n",
        app_host = settings.app_host,
        db_host = settings.db_host,
        app_ip = app_public_ip,
        db_ip = db_private_ip,
        user = settings.user,
        identity = identity_file,
    )
}

/// Write the config once both addresses are published; returns the path written
pub fn write_from_outputs(
    settings: &SshSettings,
    key_name: &str,
    outputs: &BTreeMap<String, Value>,
) -> Result<PathBuf, SshConfigError> {
    let lookup = |name: &'static str| {
        outputs
            .get(name)
            .and_then(Value::as_str)
            .ok_or(SshConfigError::MissingOutput(name))
    };
    let app_public_ip = lookup("app_public_ip")?;
    let db_private_ip = lookup("db_private_ip")?;

    let path = expand_home(&settings.path);
    let content = render(settings, key_name, app_public_ip, db_private_ip);
    let io_err = |source| SshConfigError::Io {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(&path, content).map_err(io_err)?;
    log::info!("Wrote SSH config to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn renders_jump_host_layout() {
        let content = render(&SshSettings::default(), "db-cluster", "203.0.113.10", "16.0.2.4");
        assert_eq!(
            content,
            "Host nodejs-server\n    HostName 203.0.113.10\n    User ubuntu\n    IdentityFile ~/.ssh/db-cluster.id_rsa\n\n\
             Host db-server\n    ProxyJump nodejs-server\n    HostName 16.0.2.4\n    User ubuntu\n    IdentityFile ~/.ssh/db-cluster.id_rsa\n"
        );
    }

    #[test]
    fn writes_file_when_addresses_are_known() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ssh").join("config");
        let settings = SshSettings {
            path: path.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let mut outputs = BTreeMap::new();
        outputs.insert("app_public_ip".to_string(), Value::string("203.0.113.10"));
        outputs.insert("db_private_ip".to_string(), Value::string("16.0.2.4"));

        let written = write_from_outputs(&settings, "db-cluster", &outputs).unwrap();
        assert_eq!(written, path);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("ProxyJump nodejs-server"));
    }

    #[test]
    fn missing_address_is_an_error() {
        let outputs = BTreeMap::new();
        let err = write_from_outputs(&SshSettings::default(), "db-cluster", &outputs).unwrap_err();
        assert!(matches!(err, SshConfigError::MissingOutput("app_public_ip")));
    }
}
