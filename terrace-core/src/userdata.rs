//! Boot scripts for the two instances
//!
//! Each boot script sends its output to a log file, updates packages, writes
//! the provisioning script(s) to disk through a quoted heredoc and runs them.

use crate::scripts::ScriptBundle;

pub const DB_SETUP_LOG: &str = "/var/log/mysql-setup.log";
pub const APP_SETUP_LOG: &str = "/var/log/nodejs-setup-log.log";

/// Heredoc terminator that does not occur as a line of any embedded script
fn delimiter(scripts: &[&str]) -> String {
    let mut candidate = "EOL".to_string();
    let mut n = 0;
    while scripts
        .iter()
        .any(|s| s.lines().any(|line| line.trim_end() == candidate))
    {
        n += 1;
        candidate = format!("EOL_{}", n);
    }
    candidate
}

fn heredoc(out: &mut String, target: &str, script: &str, eol: &str) {
    out.push_str(&format!("cat > {} << '{}'\n", target, eol));
    out.push_str(script);
    if !script.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(eol);
    out.push('\n');
}

/// Boot script of the database instance
pub fn db_user_data(db_setup: &str) -> String {
    let eol = delimiter(&[db_setup]);
    let mut out = String::new();
    out.push_str("#!/bin/bash\n\n");
    out.push_str(&format!("exec > >(tee {}) 2>&1\n\n", DB_SETUP_LOG));
    out.push_str("apt-get update\napt-get upgrade -y\n\n");
    out.push_str("mkdir -p /usr/local/bin\n\n");
    heredoc(&mut out, "/usr/local/bin/mysql-setup.sh", db_setup, &eol);
    out.push('\n');
    out.push_str("chmod +x /usr/local/bin/mysql-setup.sh\n\n");
    out.push_str("bash /usr/local/bin/mysql-setup.sh\n");
    out
}

/// Boot script of the application instance, pointing it at the database
pub fn app_user_data(db_private_ip: &str, scripts: &ScriptBundle) -> String {
    let eol = delimiter(&[&scripts.app_setup, &scripts.db_health_check]);
    let mut out = String::new();
    out.push_str("#!/bin/bash\n\n");
    out.push_str(&format!("exec > >(tee {}) 2>&1\n\n", APP_SETUP_LOG));
    out.push_str("apt-get update\napt-get upgrade -y\n\n");
    out.push_str(&format!(
        "echo \"DB_PRIVATE_IP={}\" >> /etc/environment\n",
        db_private_ip
    ));
    out.push_str("source /etc/environment\n\n");
    out.push_str("mkdir -p /tmp/scripts\n\n");
    heredoc(&mut out, "/tmp/scripts/nodejs-setup.sh", &scripts.app_setup, &eol);
    out.push('\n');
    heredoc(
        &mut out,
        "/tmp/scripts/check-mysql.sh",
        &scripts.db_health_check,
        &eol,
    );
    out.push('\n');
    out.push_str("chmod +x /tmp/scripts/nodejs-setup.sh\n");
    out.push_str("bash /tmp/scripts/nodejs-setup.sh\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> ScriptBundle {
        ScriptBundle {
            db_setup: "apt-get install -y mysql-server\n".to_string(),
            app_setup: "npm install\nnode index.js".to_string(),
            db_health_check: "mysqladmin ping -h \"$DB_PRIVATE_IP\"\n".to_string(),
        }
    }

    #[test]
    fn db_script_embeds_setup_verbatim() {
        let script = db_user_data(&bundle().db_setup);
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("exec > >(tee /var/log/mysql-setup.log) 2>&1\n"));
        assert!(script.contains(
            "cat > /usr/local/bin/mysql-setup.sh << 'EOL'\napt-get install -y mysql-server\nEOL\n"
        ));
        assert!(script.ends_with("bash /usr/local/bin/mysql-setup.sh\n"));
    }

    #[test]
    fn app_script_carries_db_address() {
        let script = app_user_data("16.0.2.4", &bundle());
        assert!(script.contains("echo \"DB_PRIVATE_IP=16.0.2.4\" >> /etc/environment\n"));
        assert!(script.contains("exec > >(tee /var/log/nodejs-setup-log.log) 2>&1\n"));
        assert!(script.contains("cat > /tmp/scripts/nodejs-setup.sh << 'EOL'\nnpm install\nnode index.js\nEOL\n"));
        assert!(script.contains("cat > /tmp/scripts/check-mysql.sh << 'EOL'\n"));
        assert!(script.ends_with("bash /tmp/scripts/nodejs-setup.sh\n"));
    }

    #[test]
    fn app_script_is_deterministic() {
        assert_eq!(
            app_user_data("16.0.2.4", &bundle()),
            app_user_data("16.0.2.4", &bundle())
        );
        assert_ne!(
            app_user_data("16.0.2.4", &bundle()),
            app_user_data("16.0.2.5", &bundle())
        );
    }

    #[test]
    fn delimiter_avoids_script_lines() {
        let script = db_user_data("cat <<EOL\nhello\nEOL\n");
        assert!(script.contains("<< 'EOL_1'\n"));
        assert!(script.contains("\nEOL_1\n"));
    }
}
