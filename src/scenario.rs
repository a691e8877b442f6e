//! Builds a ready-to-run [`Simulation`] from a [`ScenarioConfig`].
//!
//! Groups become entities named `<group>-<index>` with sequential addresses
//! from the group's network, placed by the group's position allocator using
//! the run's seeded RNG. Channels join all members of the listed groups.
//! Applications get their start and stop events scheduled.

use std::collections::{BTreeMap, HashSet};

use crate::app::{EchoClientConfig, EchoServerConfig};
use crate::channel::ChannelDesc;
use crate::config::{ApplicationConfig, ConfigError, ConfigResult, NodeRef, ScenarioConfig};
use crate::engine::{Simulation, SimulationParams};
use crate::entity::Entity;
use crate::scheduler::RunSummary;
use crate::types::{EntityId, SimDuration};

/// A simulation together with the group layout it was built from.
#[derive(Debug)]
pub struct Scenario {
    sim: Simulation,
    groups: BTreeMap<String, Vec<EntityId>>,
}

impl Scenario {
    /// Validates `config` and builds the simulation it describes.
    ///
    /// # Example
    ///
    /// ```
    /// use aerosim::config::ScenarioConfig;
    /// use aerosim::scenario::Scenario;
    ///
    /// let config = ScenarioConfig::from_yaml(r#"
    /// simulation: { stop_time: 1s }
    /// groups:
    ///   - { name: a, network: 10.0.0.0 }
    ///   - { name: b, network: 10.0.1.0 }
    /// channels:
    ///   - { members: [a, b], delay: 2ms }
    /// "#)?;
    ///
    /// let scenario = Scenario::from_config(&config)?;
    /// assert_eq!(scenario.group("a").unwrap().len(), 1);
    /// # Ok::<(), aerosim::config::ConfigError>(())
    /// ```
    pub fn from_config(config: &ScenarioConfig) -> ConfigResult<Self> {
        config.validate()?;

        let stop_time = config.simulation.stop_time.as_sim_time();
        let params = SimulationParams::new(stop_time).with_seed(config.simulation.seed);
        let mut sim = Simulation::new(params);
        let mut groups = BTreeMap::new();
        let mut addresses = HashSet::new();

        for group in &config.groups {
            let mobility = group.mobility.to_model();
            let mut members = Vec::with_capacity(group.count);
            for index in 0..group.count {
                let address = group.address(index).ok_or_else(|| {
                    ConfigError::Validation(format!("Group {} ran out of addresses", group.name))
                })?;
                if !addresses.insert(address) {
                    return Err(ConfigError::Validation(format!(
                        "Address {address} of group {} is already in use",
                        group.name
                    )));
                }
                let entity = Entity::new(format!("{}-{index}", group.name), group.kind, address)
                    .with_mobility(mobility);
                members.push(sim.place_entity(entity, &group.positions)?);
            }
            groups.insert(group.name.clone(), members);
        }

        let mut scenario = Scenario { sim, groups };

        for channel in &config.channels {
            let mut members = Vec::new();
            for name in &channel.members {
                members.extend_from_slice(scenario.group_or_err(name)?);
            }

            let mut desc = ChannelDesc::new(members)
                .with_name(channel.name.clone())
                .with_loss(channel.loss);
            if let Some(delay) = channel.delay {
                desc = desc.with_fixed_delay(SimDuration::from(delay.as_sim_time()));
            }
            if let Some(speed) = channel.propagation_speed {
                desc = desc.with_distance_delay(speed);
            }
            if let Some(rate) = channel.data_rate {
                desc = desc.with_data_rate(rate);
            }
            scenario.sim.add_channel(desc)?;
        }

        for app in &config.applications {
            match app {
                ApplicationConfig::EchoServer {
                    node,
                    port,
                    start,
                    stop,
                } => {
                    let id = scenario.node_or_err(node)?;
                    scenario.sim.install_echo_server(
                        id,
                        EchoServerConfig {
                            port: *port,
                            start: start.as_sim_time(),
                            stop: stop.map_or(stop_time, |s| s.as_sim_time()),
                        },
                    )?;
                }
                ApplicationConfig::EchoClient {
                    node,
                    remote,
                    remote_port,
                    max_packets,
                    interval,
                    packet_size,
                    start,
                    stop,
                } => {
                    let id = scenario.node_or_err(node)?;
                    let remote = scenario.node_or_err(remote)?;
                    scenario.sim.install_echo_client(
                        id,
                        EchoClientConfig {
                            remote,
                            remote_port: *remote_port,
                            max_packets: *max_packets,
                            interval: interval.as_sim_time(),
                            packet_size: *packet_size,
                            start: start.as_sim_time(),
                            stop: stop.map_or(stop_time, |s| s.as_sim_time()),
                        },
                    )?;
                }
            }
        }

        tracing::info!(
            entities = scenario.sim.entities().len(),
            channels = config.channels.len(),
            applications = config.applications.len(),
            seed = config.simulation.seed,
            "scenario built"
        );
        Ok(scenario)
    }

    fn group_or_err(&self, name: &str) -> ConfigResult<&[EntityId]> {
        self.group(name)
            .ok_or_else(|| ConfigError::Validation(format!("Unknown group: {name}")))
    }

    fn node_or_err(&self, node: &NodeRef) -> ConfigResult<EntityId> {
        self.node(node)
            .ok_or_else(|| ConfigError::Validation(format!("Unknown node: {node}")))
    }

    /// Returns the members of a group in index order.
    pub fn group(&self, name: &str) -> Option<&[EntityId]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Returns all groups.
    pub fn groups(&self) -> &BTreeMap<String, Vec<EntityId>> {
        &self.groups
    }

    /// Resolves a node reference.
    pub fn node(&self, node: &NodeRef) -> Option<EntityId> {
        self.group(&node.group)?.get(node.index).copied()
    }

    /// Returns the simulation.
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Returns the simulation for mutation.
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Consumes the scenario, keeping only the simulation.
    pub fn into_simulation(self) -> Simulation {
        self.sim
    }

    /// Runs until the configured stop time.
    pub fn run(&mut self) -> RunSummary {
        self.sim.run()
    }
}
