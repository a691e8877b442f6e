//! Scenario configuration.
//!
//! Scenarios can be described declaratively in YAML or JSON. Values are
//! typed: durations are written as `"2ms"`, `"1.5s"`, `"100us"` or plain
//! nanosecond integers, data rates as `"100Mbps"`, and malformed values are
//! rejected while loading rather than when the simulation runs.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   stop_time: 10s
//!   seed: 7
//!
//! groups:
//!   - name: uavs
//!     count: 15
//!     kind: uav
//!     network: 10.1.1.0
//!     positions: { type: random_disc, x: 500.0, y: 500.0, rho_max: 300.0 }
//!   - name: users
//!     count: 40
//!     kind: ground_user
//!     network: 10.1.2.0
//!     positions: { type: random_disc, x: 500.0, y: 500.0, rho_max: 400.0 }
//!
//! channels:
//!   - name: backbone
//!     members: [uavs, users]
//!     delay: 2ms
//!     data_rate: 100Mbps
//!
//! applications:
//!   - type: echo_server
//!     node: { group: uavs, index: 14 }
//!     port: 9
//!     start: 1s
//!   - type: echo_client
//!     node: { group: users, index: 39 }
//!     remote: { group: uavs, index: 14 }
//!     remote_port: 9
//!     max_packets: 100
//!     interval: 100ms
//!     packet_size: 1024
//!     start: 2s
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{DataRate, LossModel};
use crate::entity::EntityKind;
use crate::error::SimError;
use crate::mobility::{MobilityModel, PositionAllocator, Velocity};
use crate::types::{SimTime, NANOS_PER_MICRO, NANOS_PER_MILLI, NANOS_PER_SEC};

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A non-negative duration or instant as written in a configuration file.
///
/// ```
/// use aerosim::config::TimeSpec;
/// use aerosim::types::SimTime;
///
/// assert_eq!("2ms".parse::<TimeSpec>().unwrap().as_sim_time(), SimTime::from_millis(2));
/// assert_eq!("1.5s".parse::<TimeSpec>().unwrap().as_sim_time(), SimTime::from_millis(1500));
/// assert!("-1s".parse::<TimeSpec>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeRepr", into = "String")]
pub struct TimeSpec(SimTime);

impl TimeSpec {
    /// Wraps a simulated time.
    pub const fn new(time: SimTime) -> Self {
        TimeSpec(time)
    }

    /// Returns the wrapped time.
    pub const fn as_sim_time(self) -> SimTime {
        self.0
    }
}

impl From<SimTime> for TimeSpec {
    fn from(time: SimTime) -> Self {
        TimeSpec(time)
    }
}

impl From<TimeSpec> for SimTime {
    fn from(spec: TimeSpec) -> Self {
        spec.0
    }
}

impl FromStr for TimeSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(format!("time `{s}` must not be negative"));
        }
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let value: f64 = number.parse().map_err(|_| format!("invalid time `{s}`"))?;

        let nanos_per_unit = match unit.trim() {
            "ns" | "" => 1,
            "us" | "µs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "min" => 60 * NANOS_PER_SEC,
            other => return Err(format!("unknown time unit `{other}` in `{s}`")),
        };

        let nanos = (value * nanos_per_unit as f64).round();
        if !nanos.is_finite() || nanos > u64::MAX as f64 {
            return Err(format!("time `{s}` is out of range"));
        }
        Ok(TimeSpec(SimTime::from_nanos(nanos as u64)))
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            f.write_str("0s")
        } else if nanos % NANOS_PER_SEC == 0 {
            write!(f, "{}s", nanos / NANOS_PER_SEC)
        } else if nanos % NANOS_PER_MILLI == 0 {
            write!(f, "{}ms", nanos / NANOS_PER_MILLI)
        } else if nanos % NANOS_PER_MICRO == 0 {
            write!(f, "{}us", nanos / NANOS_PER_MICRO)
        } else {
            write!(f, "{nanos}ns")
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeRepr {
    Nanos(u64),
    Text(String),
}

impl TryFrom<TimeRepr> for TimeSpec {
    type Error = String;

    fn try_from(repr: TimeRepr) -> Result<Self, Self::Error> {
        match repr {
            TimeRepr::Nanos(nanos) => Ok(TimeSpec(SimTime::from_nanos(nanos))),
            TimeRepr::Text(text) => text.parse(),
        }
    }
}

impl From<TimeSpec> for String {
    fn from(spec: TimeSpec) -> Self {
        spec.to_string()
    }
}

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Time the run stops at; also the throughput duration
    #[serde(default = "default_stop_time")]
    pub stop_time: TimeSpec,

    /// Seed of the run's random number generator
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_stop_time() -> TimeSpec {
    TimeSpec(SimTime::from_secs(10))
}

fn default_seed() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_count() -> usize {
    1
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            stop_time: default_stop_time(),
            seed: default_seed(),
            log_level: default_log_level(),
        }
    }
}

/// Mobility model of a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MobilityConfig {
    #[default]
    ConstantPosition,
    ConstantVelocity {
        velocity: Velocity,
        update_interval: TimeSpec,
    },
}

impl MobilityConfig {
    /// Converts to the runtime model.
    pub fn to_model(self) -> MobilityModel {
        match self {
            MobilityConfig::ConstantPosition => MobilityModel::ConstantPosition,
            MobilityConfig::ConstantVelocity {
                velocity,
                update_interval,
            } => MobilityModel::ConstantVelocity {
                velocity,
                update_interval: update_interval.as_sim_time(),
            },
        }
    }
}

/// A group of identically configured entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Unique group name, referenced by channels and applications
    pub name: String,

    /// Number of entities
    #[serde(default = "default_count")]
    pub count: usize,

    #[serde(default)]
    pub kind: EntityKind,

    /// Network address; members get `network + 1`, `network + 2`, ...
    pub network: Ipv4Addr,

    /// Initial placement
    #[serde(default)]
    pub positions: PositionAllocator,

    #[serde(default)]
    pub mobility: MobilityConfig,
}

impl GroupConfig {
    /// Address of the `index`-th member.
    pub fn address(&self, index: usize) -> Option<Ipv4Addr> {
        let offset = u32::try_from(index).ok()?.checked_add(1)?;
        u32::from(self.network).checked_add(offset).map(Ipv4Addr::from)
    }
}

/// A channel joining whole groups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub name: String,

    /// Names of the member groups
    pub members: Vec<String>,

    /// Fixed propagation delay
    #[serde(default)]
    pub delay: Option<TimeSpec>,

    /// Signal speed for distance-derived delay, in metres per second
    #[serde(default)]
    pub propagation_speed: Option<f64>,

    #[serde(default)]
    pub data_rate: Option<DataRate>,

    #[serde(default)]
    pub loss: LossModel,
}

/// Refers to one member of a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub group: String,
    #[serde(default)]
    pub index: usize,
}

impl NodeRef {
    /// Creates a reference.
    pub fn new(group: impl Into<String>, index: usize) -> Self {
        Self {
            group: group.into(),
            index,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.group, self.index)
    }
}

/// A traffic application. A missing `stop` defaults to the simulation stop
/// time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplicationConfig {
    EchoServer {
        node: NodeRef,
        port: u16,
        #[serde(default)]
        start: TimeSpec,
        #[serde(default)]
        stop: Option<TimeSpec>,
    },
    EchoClient {
        node: NodeRef,
        remote: NodeRef,
        remote_port: u16,
        /// 0 means unlimited
        #[serde(default)]
        max_packets: u32,
        interval: TimeSpec,
        packet_size: u32,
        #[serde(default)]
        start: TimeSpec,
        #[serde(default)]
        stop: Option<TimeSpec>,
    },
}

impl ApplicationConfig {
    fn node_refs(&self) -> Vec<&NodeRef> {
        match self {
            ApplicationConfig::EchoServer { node, .. } => vec![node],
            ApplicationConfig::EchoClient { node, remote, .. } => vec![node, remote],
        }
    }

    fn window(&self) -> (TimeSpec, Option<TimeSpec>) {
        match self {
            ApplicationConfig::EchoServer { start, stop, .. }
            | ApplicationConfig::EchoClient { start, stop, .. } => (*start, *stop),
        }
    }
}

/// Complete scenario configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Entity groups
    #[serde(default)]
    pub groups: Vec<GroupConfig>,

    /// Channel definitions
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Traffic applications
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

impl ScenarioConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: ScenarioConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: ScenarioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let stop_time = self.simulation.stop_time;
        if stop_time.as_sim_time() == SimTime::ZERO {
            return Err(ConfigError::Validation(
                "simulation stop_time must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for group in &self.groups {
            if !names.insert(group.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate group name: {}",
                    group.name
                )));
            }
            if group.count == 0 {
                tracing::warn!("Group {} is empty", group.name);
            } else if group.address(group.count - 1).is_none() {
                return Err(ConfigError::Validation(format!(
                    "Group {} does not fit in the address space after {}",
                    group.name, group.network
                )));
            }
            group.positions.validate()?;
            group.mobility.to_model().validate()?;
        }

        for channel in &self.channels {
            for member in &channel.members {
                if !names.contains(member.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "Channel {} references unknown group: {member}",
                        channel.name
                    )));
                }
            }
            if channel.delay.is_some() && channel.propagation_speed.is_some() {
                return Err(ConfigError::Validation(format!(
                    "Channel {} sets both delay and propagation_speed",
                    channel.name
                )));
            }
        }

        for app in &self.applications {
            for node in app.node_refs() {
                let group = self
                    .groups
                    .iter()
                    .find(|g| g.name == node.group)
                    .ok_or_else(|| {
                        ConfigError::Validation(format!("Application references unknown group: {node}"))
                    })?;
                if node.index >= group.count {
                    return Err(ConfigError::Validation(format!(
                        "Application references {node} but group {} has {} members",
                        group.name, group.count
                    )));
                }
            }
            let (start, stop) = app.window();
            let stop = stop.unwrap_or(stop_time);
            if stop < start {
                return Err(ConfigError::Validation(format!(
                    "Application stops at {stop} before it starts at {start}"
                )));
            }
            if start > stop_time {
                tracing::warn!(%start, %stop_time, "Application starts after the simulation stops");
            }
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the total number of entities.
    pub fn entity_count(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }

    /// Finds a group by name.
    pub fn find_group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Builder for creating a [`ScenarioConfig`] programmatically.
#[derive(Default)]
pub struct ScenarioConfigBuilder {
    config: ScenarioConfig,
}

impl ScenarioConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulation stop time.
    pub fn stop_time(mut self, time: SimTime) -> Self {
        self.config.simulation.stop_time = TimeSpec(time);
        self
    }

    /// Sets the RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.simulation.seed = seed;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Adds a stationary group.
    pub fn add_group(
        mut self,
        name: impl Into<String>,
        count: usize,
        kind: EntityKind,
        network: Ipv4Addr,
        positions: PositionAllocator,
    ) -> Self {
        self.config.groups.push(GroupConfig {
            name: name.into(),
            count,
            kind,
            network,
            positions,
            mobility: MobilityConfig::ConstantPosition,
        });
        self
    }

    /// Adds a fully specified group.
    pub fn add_group_config(mut self, group: GroupConfig) -> Self {
        self.config.groups.push(group);
        self
    }

    /// Adds a lossless fixed-delay channel over the named groups.
    pub fn add_channel(
        mut self,
        name: impl Into<String>,
        members: &[&str],
        delay: SimTime,
        data_rate: Option<DataRate>,
    ) -> Self {
        self.config.channels.push(ChannelConfig {
            name: name.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            delay: Some(TimeSpec(delay)),
            propagation_speed: None,
            data_rate,
            loss: LossModel::None,
        });
        self
    }

    /// Adds a fully specified channel.
    pub fn add_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.config.channels.push(channel);
        self
    }

    /// Adds an application.
    pub fn add_application(mut self, app: ApplicationConfig) -> Self {
        self.config.applications.push(app);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<ScenarioConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
