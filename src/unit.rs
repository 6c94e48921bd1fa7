//! Service registration against systemd
//!
//! Install writes a unit file that runs this executable in `run` mode and
//! enables it at boot; remove disables and deletes it; start/stop ask the
//! service manager to act on it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::error::{HchkError, Result};

/// Default location for system unit files
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Default service name
pub const DEFAULT_SERVICE_NAME: &str = "hchk";

/// Default unit description
pub const DEFAULT_DESCRIPTION: &str =
    "This service makes a HTTP request to a URL every minute for a healthcheck.";

/// Runs service manager commands
pub trait ServiceManager: Send + Sync + fmt::Debug {
    /// Run one command, e.g. `["enable", "hchk"]`
    fn run(&self, args: &[&str]) -> std::result::Result<(), String>;
}

/// The real `systemctl` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct Systemctl;

impl ServiceManager for Systemctl {
    fn run(&self, args: &[&str]) -> std::result::Result<(), String> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("{} {}", output.status, stderr.trim()))
        }
    }
}

/// Quote one `ExecStart=` argument.
///
/// Inside double quotes systemd still expands `%` specifiers and `$`
/// variables, and treats `\` and `"` as escapes.
fn exec_arg(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '%' => quoted.push_str("%%"),
            '$' => quoted.push_str("$$"),
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// A unit definition for the healthcheck service
#[derive(Debug, Clone)]
pub struct ServiceUnit {
    pub name: String,
    pub description: String,
    pub unit_dir: PathBuf,
    manager: Arc<dyn ServiceManager>,
}

impl Default for ServiceUnit {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            manager: Arc::new(Systemctl),
        }
    }
}

impl ServiceUnit {
    pub fn new(name: impl Into<String>, unit_dir: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            unit_dir: unit_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the unit description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Use a different service manager than `systemctl`
    pub fn with_manager(mut self, manager: Arc<dyn ServiceManager>) -> Self {
        self.manager = manager;
        self
    }

    /// Path of the unit file
    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{}.service", self.name))
    }

    pub fn is_installed(&self) -> bool {
        self.unit_path().exists()
    }

    /// Unit file text for running `executable` against `url`
    pub fn render(&self, executable: &Path, url: &str, config: Option<&Path>) -> String {
        let mut exec = exec_arg(&executable.display().to_string());
        if let Some(config) = config {
            exec.push_str(" --config ");
            exec.push_str(&exec_arg(&config.display().to_string()));
        }
        exec.push_str(" --url ");
        exec.push_str(&exec_arg(url));
        exec.push_str(" run");

        format!(
            "[Unit]\n\
             Description={description}\n\
             Wants=network-online.target\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={exec}\n\
             ExecReload=/bin/kill -HUP $MAINPID\n\
             KillSignal=SIGTERM\n\
             Restart=on-failure\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            description = self.description.replace('%', "%%"),
            exec = exec,
        )
    }

    /// Write the unit file and enable it at boot; fails if one already exists
    pub fn install(&self, executable: &Path, url: &str, config: Option<&Path>) -> Result<PathBuf> {
        let path = self.unit_path();
        if path.exists() {
            return Err(HchkError::AlreadyInstalled);
        }
        fs::create_dir_all(&self.unit_dir)?;
        fs::write(&path, self.render(executable, url, config))?;
        log::info!("Installed unit file {}", path.display());

        let activated = self
            .manager
            .run(&["daemon-reload"])
            .and_then(|_| self.manager.run(&["enable", self.name.as_str()]));
        if let Err(e) = activated {
            // leave nothing half-installed behind
            fs::remove_file(&path)?;
            return Err(HchkError::ServiceControl(format!(
                "could not enable service: {}",
                e
            )));
        }
        Ok(path)
    }

    /// Stop, disable and delete the unit; fails if there is none
    pub fn remove(&self) -> Result<()> {
        let path = self.unit_path();
        if !path.exists() {
            return Err(HchkError::NotInstalled);
        }
        self.manager
            .run(&["disable", "--now", self.name.as_str()])
            .map_err(|e| HchkError::ServiceControl(format!("could not disable service: {}", e)))?;

        fs::remove_file(&path)?;
        log::info!("Removed unit file {}", path.display());

        if let Err(e) = self.manager.run(&["daemon-reload"]) {
            log::warn!("daemon-reload after remove failed: {}", e);
        }
        Ok(())
    }

    /// `systemctl start <name>`
    pub fn start(&self) -> Result<()> {
        if !self.is_installed() {
            return Err(HchkError::NotInstalled);
        }
        self.manager
            .run(&["start", self.name.as_str()])
            .map_err(|e| HchkError::ServiceControl(format!("could not start service: {}", e)))
    }

    /// `systemctl stop <name>`
    pub fn stop(&self) -> Result<()> {
        if !self.is_installed() {
            return Err(HchkError::NotInstalled);
        }
        self.manager
            .run(&["stop", self.name.as_str()])
            .map_err(|e| HchkError::ServiceControl(format!("could not stop service: {}", e)))
    }
}
