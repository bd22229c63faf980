use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::retry::WaitConfig;

pub const ENV_PREFIX: &str = "EVENTLOG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub management: Management,
    pub openstack: OpenStack,
    pub elasticsearch: Elasticsearch,
    pub port_wait: PortWait,
    pub blueprint: Blueprint,
    pub execution: Execution,
    pub events: Events,
    pub test: TestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Management {
    pub ip: String,
    pub security_group: String,
    pub rest_protocol: String,
    pub rest_port: u16,
}

impl Default for Management {
    fn default() -> Self {
        Self {
            ip: String::new(),
            security_group: "cloudify-sg-management".to_string(),
            rest_protocol: "http".to_string(),
            rest_port: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenStack {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Default for OpenStack {
    fn default() -> Self {
        Self {
            auth_url: "http://127.0.0.1:5000/v2.0".to_string(),
            username: String::new(),
            password: String::new(),
            tenant_name: String::new(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Elasticsearch {
    pub port: u16,
    pub index: String,
    pub match_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl Default for Elasticsearch {
    fn default() -> Self {
        Self {
            port: crate::ELASTICSEARCH_PORT,
            index: crate::EVENTS_INDEX.to_string(),
            match_field: "deployment_id".to_string(),
            size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortWait {
    pub timeout_secs: u64,
    pub connect_timeout_ms: u64,
    pub wait: WaitConfig,
}

impl Default for PortWait {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_ms: 2000,
            wait: WaitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Blueprint {
    pub archive_path: String,
    pub main_file_name: String,
}

impl Default for Blueprint {
    fn default() -> Self {
        Self {
            archive_path: "blueprints/mocks.tar.gz".to_string(),
            main_file_name: "empty-bp.yaml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Execution {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            timeout_secs: crate::DEFAULT_EXECUTE_TIMEOUT_SECS,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Events {
    pub poll_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for Events {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSettings {
    pub id_prefix: String,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            id_prefix: "eventlog_timestamp".to_string(),
        }
    }
}

impl Settings {
    /// Load configuration: env vars > config file > defaults
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        Self::load(config_path, ENV_PREFIX)
    }

    pub fn load(config_path: Option<&str>, env_prefix: &str) -> Result<Self> {
        let defaults = config::Config::try_from(&Settings::default())
            .context("Failed to build default settings")?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder
                    .add_source(config::File::new(path, config::FileFormat::Toml).required(true));
                log::info!("Loading configuration from file: {path}");
            } else {
                log::info!("Config file not found: {path}, using defaults");
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(settings)
    }

    pub fn apply_cli_overrides(&mut self, matches: &ArgMatches) {
        if let Some(ip) = matches.get_one::<String>("management-ip") {
            self.management.ip = ip.clone();
        }

        if let Some(group) = matches.get_one::<String>("security-group") {
            self.management.security_group = group.clone();
        }

        if let Some(port) = matches.get_one::<u16>("es-port") {
            self.elasticsearch.port = *port;
        }

        if let Some(path) = matches.get_one::<String>("blueprint") {
            self.blueprint.archive_path = path.clone();
        }

        if let Some(timeout) = matches.get_one::<u64>("port-timeout") {
            self.port_wait.timeout_secs = *timeout;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.management.ip.trim().is_empty() {
            return Err(anyhow::anyhow!("management.ip must be set"));
        }

        if self.management.security_group.trim().is_empty() {
            return Err(anyhow::anyhow!("management.security_group must be set"));
        }

        if self.management.rest_port == 0 {
            return Err(anyhow::anyhow!("management.rest_port must be greater than 0"));
        }

        if self.elasticsearch.port == 0 {
            return Err(anyhow::anyhow!("elasticsearch.port must be greater than 0"));
        }

        if self.elasticsearch.index.is_empty() || self.elasticsearch.match_field.is_empty() {
            return Err(anyhow::anyhow!(
                "elasticsearch.index and elasticsearch.match_field must be set"
            ));
        }

        if self.port_wait.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!(
                "port_wait.connect_timeout_ms must be greater than 0"
            ));
        }

        self.port_wait
            .wait
            .validate()
            .map_err(|e| anyhow::anyhow!("port_wait.wait: {e}"))?;

        Ok(())
    }

    pub fn management_rest_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.management.rest_protocol, self.management.ip, self.management.rest_port
        )
    }

    pub fn elasticsearch_url(&self) -> String {
        format!("http://{}:{}", self.management.ip, self.elasticsearch.port)
    }

    pub fn port_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.port_wait.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.port_wait.connect_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    pub fn execution_poll_interval(&self) -> Duration {
        Duration::from_millis(self.execution.poll_interval_ms)
    }

    pub fn events_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.events.poll_timeout_secs)
    }

    pub fn events_poll_interval(&self) -> Duration {
        Duration::from_millis(self.events.poll_interval_ms)
    }
}

/// Load configuration: CLI args > env vars > config file > defaults
pub fn load_config(config_path: Option<&str>, matches: &ArgMatches) -> Result<Settings> {
    let mut settings = Settings::new(config_path)?;
    settings.apply_cli_overrides(matches);

    settings
        .validate()
        .with_context(|| "Configuration validation failed")?;

    log::info!("Configuration loaded successfully");
    log::debug!("Final config: {settings:?}");

    Ok(settings)
}

/// Create a sample configuration file
pub fn create_sample_config(path: &str) -> Result<()> {
    let settings = Settings::default();
    let toml_content =
        toml::to_string_pretty(&settings).context("Failed to serialize default config")?;

    fs::write(path, toml_content)
        .with_context(|| format!("Failed to write sample config to: {path}"))?;

    println!("Sample configuration written to: {path}");
    Ok(())
}
