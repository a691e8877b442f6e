//! The entity registry.
//!
//! Entities are the simulated nodes (UAVs, ground users). The registry is
//! their single owner: everything else refers to them by [`EntityId`] and
//! looks them up when needed, so no action ever holds a reference across
//! events.
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use aerosim::entity::{Entity, EntityKind, EntityRegistry};
//!
//! let mut registry = EntityRegistry::new();
//! let uav = registry.create_entity(Entity::new("uav-0", EntityKind::Uav, Ipv4Addr::new(10, 1, 1, 1)));
//!
//! registry.get_mut(uav).unwrap().position.z = 120.0;
//! assert_eq!(registry.get(uav).unwrap().position.z, 120.0);
//!
//! registry.remove(uav).unwrap();
//! assert!(registry.get(uav).is_err());
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::app::Application;
use crate::error::{SimError, SimResult};
use crate::mobility::{MobilityModel, Position};
use crate::types::{EntityId, EventId};

/// First port handed out by [`Entity::allocate_port`].
pub const EPHEMERAL_PORT_START: u16 = 49153;

/// What an entity represents in the scenario.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An aerial relay / base station
    Uav,
    /// A ground terminal
    GroundUser,
    #[default]
    Generic,
}

/// Per-entity traffic counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounters {
    /// Packets handed to a channel
    pub tx_packets: u64,
    /// Bytes handed to a channel
    pub tx_bytes: u64,
    /// Packets delivered to this entity
    pub rx_packets: u64,
    /// Bytes delivered to this entity
    pub rx_bytes: u64,
    /// Delivered packets with no application bound to the destination port
    pub undeliverable: u64,
}

/// Mutable simulated state of one node.
#[derive(Debug)]
pub struct Entity {
    /// Human-readable name
    pub name: String,
    /// Role in the scenario
    pub kind: EntityKind,
    /// Current position in metres
    pub position: Position,
    /// IPv4 address used in flow keys
    pub address: Ipv4Addr,
    /// How the entity moves; changed only through `Simulation::set_mobility`
    pub(crate) mobility: MobilityModel,
    /// Pending position update, if the entity moves
    pub(crate) mobility_update: Option<EventId>,
    /// Traffic counters
    pub counters: EntityCounters,
    /// Installed applications, indexed by installation order
    pub(crate) apps: Vec<Application>,
    next_port: u16,
}

impl Entity {
    /// Creates a stationary entity at the origin.
    pub fn new(name: impl Into<String>, kind: EntityKind, address: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            kind,
            position: Position::default(),
            address,
            mobility: MobilityModel::ConstantPosition,
            mobility_update: None,
            counters: EntityCounters::default(),
            apps: Vec::new(),
            next_port: EPHEMERAL_PORT_START,
        }
    }

    /// Sets the initial position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Sets the mobility model.
    pub fn with_mobility(mut self, mobility: MobilityModel) -> Self {
        self.mobility = mobility;
        self
    }

    /// Returns the mobility model.
    pub fn mobility(&self) -> &MobilityModel {
        &self.mobility
    }

    /// Returns the installed applications.
    pub fn applications(&self) -> &[Application] {
        &self.apps
    }

    /// Returns the application bound to `port`, if any.
    pub fn application_on_port(&self, port: u16) -> Option<usize> {
        self.apps.iter().position(|app| app.local_port() == port)
    }

    /// Hands out the next unused ephemeral port.
    pub fn allocate_port(&mut self) -> u16 {
        let port = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
        port
    }
}

/// Owns every entity of a run.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u64,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity and returns its fresh identifier.
    ///
    /// Identifiers are never reused, even after [`remove`](Self::remove).
    pub fn create_entity(&mut self, entity: Entity) -> EntityId {
        let id = EntityId::from_raw(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, entity);
        id
    }

    /// Looks up an entity.
    pub fn get(&self, id: EntityId) -> SimResult<&Entity> {
        self.entities.get(&id).ok_or(SimError::NotFound(id))
    }

    /// Looks up an entity for mutation.
    pub fn get_mut(&mut self, id: EntityId) -> SimResult<&mut Entity> {
        self.entities.get_mut(&id).ok_or(SimError::NotFound(id))
    }

    /// Removes an entity and returns its final state.
    pub fn remove(&mut self, id: EntityId) -> SimResult<Entity> {
        self.entities.remove(&id).ok_or(SimError::NotFound(id))
    }

    /// Returns true if the entity is registered.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Finds the entity owning an address.
    pub fn find_by_address(&self, address: Ipv4Addr) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(_, entity)| entity.address == address)
            .map(|(&id, _)| id)
    }

    /// Iterates over entities in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter().map(|(&id, entity)| (id, entity))
    }

    /// Returns the number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entities are registered.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
