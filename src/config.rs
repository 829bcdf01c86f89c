//! Runtime settings.
//!
//! Settings are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. `PINGWATCH_*` environment variables (`PINGWATCH_TARGETS=1.1.1.1,8.8.8.8`)
//! 4. the plain `PORT` variable
//! 5. command-line overrides, applied by the binary

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::{PingwatchError, Result};
use crate::ledger::LedgerConfig;
use crate::monitor::DEFAULT_SUBSCRIBER_BUFFER;
use crate::probe::ProbeCommand;
use crate::scheduler::Schedule;

/// Everything the service can be configured with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP listening port.
    pub port: u16,
    /// HTTP bind address.
    pub bind: String,
    /// Root of the static assets.
    pub static_dir: PathBuf,
    /// State file location.
    pub state_file: PathBuf,
    /// Hosts to probe.
    pub targets: Vec<String>,
    /// How long raw samples stay in the window, e.g. `10m`.
    pub window_span: String,
    /// Width of an aggregate bucket and period of the aggregation pass.
    pub aggregation_interval: String,
    /// How often the state file is written.
    pub persist_interval: String,
    /// How often viewers get a keep-alive comment.
    pub heartbeat_interval: String,
    /// Queue length of each viewer connection.
    pub subscriber_buffer: usize,
    /// Probe executable, run once per target.
    pub probe_program: String,
    /// Extra probe arguments, placed before the target.
    pub probe_args: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 5050,
            bind: "0.0.0.0".to_string(),
            static_dir: PathBuf::from("public"),
            state_file: PathBuf::from("aggregated.json"),
            targets: vec!["1.1.1.1".to_string(), "192.168.1.1".to_string()],
            window_span: "10m".to_string(),
            aggregation_interval: "10m".to_string(),
            persist_interval: "10s".to_string(),
            heartbeat_interval: "15s".to_string(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            probe_program: "ping".to_string(),
            probe_args: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file and the environment.
    ///
    /// The result is not validated; callers apply their own overrides first
    /// and then call [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, Environment::with_prefix("PINGWATCH"), std::env::var("PORT").ok())
    }

    fn load_from(path: Option<&Path>, env: Environment, port: Option<String>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings: Settings = builder
            .add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("targets")
                    .with_list_parse_key("probe_args"),
            )
            .set_override_option("port", port)?
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(PingwatchError::Config("no targets configured".to_string()));
        }
        let mut seen = BTreeSet::new();
        for target in &self.targets {
            if target.trim().is_empty() {
                return Err(PingwatchError::Config("empty target name".to_string()));
            }
            if !seen.insert(target.as_str()) {
                return Err(PingwatchError::Config(format!("duplicate target {}", target)));
            }
        }

        for (name, value) in [
            ("window_span", &self.window_span),
            ("aggregation_interval", &self.aggregation_interval),
            ("persist_interval", &self.persist_interval),
            ("heartbeat_interval", &self.heartbeat_interval),
        ] {
            if parse_duration(value)?.is_zero() {
                return Err(PingwatchError::Config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn ledger_config(&self) -> Result<LedgerConfig> {
        Ok(LedgerConfig {
            window_span: parse_duration(&self.window_span)?,
            aggregation_interval: parse_duration(&self.aggregation_interval)?,
        })
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Ok(Schedule {
            aggregation_interval: parse_duration(&self.aggregation_interval)?,
            persist_interval: parse_duration(&self.persist_interval)?,
            heartbeat_interval: parse_duration(&self.heartbeat_interval)?,
        })
    }

    pub fn probe_command(&self) -> ProbeCommand {
        ProbeCommand {
            program: self.probe_program.clone(),
            args: self.probe_args.clone(),
        }
    }

    /// The socket address to listen on.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .bind
            .parse()
            .map_err(|_| PingwatchError::Config(format!("invalid bind address {}", self.bind)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
