use eyre::{Context, Result};
use hchk::unit::{DEFAULT_DESCRIPTION, DEFAULT_SERVICE_NAME, DEFAULT_UNIT_DIR, ServiceUnit};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub url: Option<String>,
    pub probe: ProbeConfig,
    pub service: ServiceConfig,
    /// File this config was loaded from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            user_agent: format!("hchk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub description: String,
    pub unit_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
        }
    }
}

impl ServiceConfig {
    pub fn unit(&self) -> ServiceUnit {
        ServiceUnit::new(&self.name, &self.unit_dir).with_description(&self.description)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            url: None,
            probe: ProbeConfig::default(),
            service: ServiceConfig::default(),
            source: None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// A config file that exists but cannot be read or parsed is an error;
    /// only a missing file falls through to the next location.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");
        let mut candidates = Vec::new();

        // Primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(
                config_dir
                    .join(project_name)
                    .join(format!("{}.yml", project_name)),
            );
        }

        // Fallback location: ./<project>.yml
        candidates.push(PathBuf::from(format!("{}.yml", project_name)));

        Self::load_first_existing(&candidates)
    }

    fn load_first_existing(candidates: &[PathBuf]) -> Result<Self> {
        for path in candidates {
            if path.exists() {
                return Self::load_from_file(path)
                    .context(format!("Failed to load config from {}", path.display()));
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.source = Some(fs::canonicalize(&path).unwrap_or_else(|_| path.as_ref().to_path_buf()));

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Command-line URL wins over the configured one
    pub fn resolve_url(&self, cli_url: Option<&str>) -> Option<String> {
        cli_url
            .map(str::to_string)
            .or_else(|| self.url.clone())
            .filter(|u| !u.trim().is_empty())
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
