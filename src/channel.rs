//! Channels and the propagation model.
//!
//! A channel connects a set of entities and describes how a transmission
//! between two of its members behaves: how long it takes (propagation plus
//! serialization) and whether it arrives at all.
//!
//! # Delay
//!
//! | Component | Formula |
//! |-----------|---------|
//! | Fixed propagation | configured constant |
//! | Distance propagation | `distance / speed` |
//! | Serialization | `bits / data_rate` (only if a data rate is set) |
//!
//! The total is never allowed to be zero: a transmission arrives at least
//! [`MIN_DELIVERY_DELAY`] after it was sent, so an action can never trigger
//! an event at its own instant through a channel.
//!
//! # Example
//!
//! ```
//! use aerosim::channel::{ChannelDesc, DataRate};
//! use aerosim::mobility::Position;
//! use aerosim::types::{EntityId, SimDuration, SimTime};
//!
//! let channel = ChannelDesc::new([EntityId::from_raw(0), EntityId::from_raw(1)])
//!     .with_fixed_delay(SimDuration::from_millis(2))
//!     .with_data_rate("100Mbps".parse::<DataRate>().unwrap());
//!
//! // 1024 bytes at 100 Mbps = 81.92 us on the wire, plus 2 ms propagation.
//! let delay = channel.delay(&Position::default(), &Position::default(), 1024 * 8);
//! assert_eq!(delay, SimTime::from_nanos(2_081_920));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::mobility::Position;
use crate::types::{ChannelId, EntityId, EventId, SimDuration, SimTime, NANOS_PER_SEC};

/// Smallest delay between a transmission and its delivery.
pub const MIN_DELIVERY_DELAY: SimTime = SimTime::from_nanos(1);

/// Speed of light in vacuum, in metres per second.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// A link data rate in bits per second.
///
/// Parses the usual unit suffixes: `bps`, `kbps`, `Mbps`, `Gbps` (also the
/// `b/s` spellings and `Bps`-style byte rates).
///
/// ```
/// use aerosim::channel::DataRate;
///
/// let rate: DataRate = "100Mbps".parse().unwrap();
/// assert_eq!(rate.bits_per_second(), 100_000_000);
/// assert!("fast".parse::<DataRate>().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(u64);

impl DataRate {
    /// Creates a rate from bits per second.
    pub const fn from_bps(bps: u64) -> Self {
        DataRate(bps)
    }

    /// Returns the rate in bits per second.
    pub const fn bits_per_second(self) -> u64 {
        self.0
    }

    /// Time needed to put `bits` on the wire.
    pub fn transmission_time(self, bits: u64) -> SimTime {
        if self.0 == 0 {
            return SimTime::ZERO;
        }
        let nanos = (bits as u128 * NANOS_PER_SEC as u128).div_ceil(self.0 as u128);
        SimTime::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

impl FromStr for DataRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid data rate `{s}`"))?;

        let multiplier = match unit.trim() {
            "bps" | "b/s" | "" => 1.0,
            "kbps" | "kb/s" | "Kbps" => 1e3,
            "Mbps" | "Mb/s" => 1e6,
            "Gbps" | "Gb/s" => 1e9,
            "Bps" | "B/s" => 8.0,
            "kBps" | "KBps" | "kB/s" => 8e3,
            "MBps" | "MB/s" => 8e6,
            "GBps" | "GB/s" => 8e9,
            other => return Err(format!("unknown data rate unit `{other}` in `{s}`")),
        };

        let bps = value * multiplier;
        if !bps.is_finite() || bps < 1.0 {
            return Err(format!("data rate `{s}` must be at least 1 bps"));
        }
        Ok(DataRate(bps.round() as u64))
    }
}

impl TryFrom<String> for DataRate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> Self {
        rate.to_string()
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.0;
        if bps % 1_000_000_000 == 0 {
            write!(f, "{}Gbps", bps / 1_000_000_000)
        } else if bps % 1_000_000 == 0 {
            write!(f, "{}Mbps", bps / 1_000_000)
        } else if bps % 1_000 == 0 {
            write!(f, "{}kbps", bps / 1_000)
        } else {
            write!(f, "{bps}bps")
        }
    }
}

/// How propagation delay is computed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropagationDelay {
    /// The same delay for every pair of members.
    Fixed(SimDuration),
    /// Distance between sender and receiver over a signal speed.
    Distance {
        /// Signal speed in metres per second
        speed_mps: f64,
    },
}

impl Default for PropagationDelay {
    fn default() -> Self {
        PropagationDelay::Fixed(SimDuration::ZERO)
    }
}

/// Loss policy of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LossModel {
    /// Every transmission arrives.
    #[default]
    None,
    /// Independent loss with a fixed probability, drawn from the run's RNG.
    Bernoulli { probability: f64 },
    /// Deterministic loss beyond a range.
    MaxRange { range_m: f64 },
}

/// Why a transmission was not delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No channel has both endpoints as members.
    NoRoute,
    /// The loss model's random draw discarded the packet.
    Loss,
    /// The receiver is farther away than the channel's range.
    OutOfRange,
    /// The receiver no longer exists at delivery time.
    ReceiverGone,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::NoRoute => "no route",
            DropReason::Loss => "loss",
            DropReason::OutOfRange => "out of range",
            DropReason::ReceiverGone => "receiver gone",
        };
        f.write_str(text)
    }
}

/// Result of handing a packet to a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A receive event was scheduled.
    Delivered {
        /// When the receiver sees the packet
        arrival_time: SimTime,
        /// The scheduled receive event
        event: EventId,
    },
    /// Nothing was scheduled.
    Dropped { reason: DropReason },
}

impl DeliveryOutcome {
    /// Returns the arrival time if delivered, None otherwise.
    pub fn arrival_time(&self) -> Option<SimTime> {
        match self {
            DeliveryOutcome::Delivered { arrival_time, .. } => Some(*arrival_time),
            DeliveryOutcome::Dropped { .. } => None,
        }
    }

    /// Returns true if the packet will be delivered.
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Describes a channel: its members, delay model, data rate and loss policy.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelDesc {
    /// Optional name, for logs
    pub name: String,
    /// Entities attached to the channel
    pub members: BTreeSet<EntityId>,
    /// Propagation delay model
    pub delay: PropagationDelay,
    /// Link rate; `None` means serialization is instantaneous
    pub data_rate: Option<DataRate>,
    /// Loss policy
    pub loss: LossModel,
}

impl ChannelDesc {
    /// Creates a lossless zero-delay channel over `members`.
    pub fn new(members: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            name: String::new(),
            members: members.into_iter().collect(),
            delay: PropagationDelay::default(),
            data_rate: None,
            loss: LossModel::None,
        }
    }

    /// Sets the channel name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Uses a fixed propagation delay.
    pub fn with_fixed_delay(mut self, delay: SimDuration) -> Self {
        self.delay = PropagationDelay::Fixed(delay);
        self
    }

    /// Derives propagation delay from distance and signal speed.
    pub fn with_distance_delay(mut self, speed_mps: f64) -> Self {
        self.delay = PropagationDelay::Distance { speed_mps };
        self
    }

    /// Sets the link data rate.
    pub fn with_data_rate(mut self, rate: DataRate) -> Self {
        self.data_rate = Some(rate);
        self
    }

    /// Sets the loss model.
    pub fn with_loss(mut self, loss: LossModel) -> Self {
        self.loss = loss;
        self
    }

    /// Checks the description before any event can depend on it.
    pub fn validate(&self) -> SimResult<()> {
        if self.members.len() < 2 {
            return Err(SimError::InvalidChannel(format!(
                "channel `{}` needs at least two members, has {}",
                self.name,
                self.members.len()
            )));
        }

        match self.delay {
            PropagationDelay::Fixed(delay) if delay.is_negative() => {
                return Err(SimError::InvalidDelay(delay));
            }
            PropagationDelay::Distance { speed_mps } if !(speed_mps > 0.0 && speed_mps.is_finite()) => {
                return Err(SimError::InvalidChannel(format!(
                    "propagation speed must be positive, got {speed_mps}"
                )));
            }
            _ => {}
        }

        if self.data_rate.is_some_and(|rate| rate.bits_per_second() == 0) {
            return Err(SimError::InvalidChannel("data rate must be positive".to_string()));
        }

        match self.loss {
            LossModel::Bernoulli { probability } if !(0.0..=1.0).contains(&probability) => {
                Err(SimError::InvalidChannel(format!(
                    "loss probability must be within [0, 1], got {probability}"
                )))
            }
            LossModel::MaxRange { range_m } if !(range_m > 0.0) => Err(SimError::InvalidChannel(
                format!("range must be positive, got {range_m}"),
            )),
            _ => Ok(()),
        }
    }

    /// Returns true if both entities are members.
    pub fn connects(&self, a: EntityId, b: EntityId) -> bool {
        self.members.contains(&a) && self.members.contains(&b)
    }

    /// Propagation delay between two positions.
    pub fn propagation_delay(&self, from: &Position, to: &Position) -> SimTime {
        match self.delay {
            PropagationDelay::Fixed(delay) => SimTime::from_nanos(delay.as_nanos().max(0) as u64),
            PropagationDelay::Distance { speed_mps } => {
                SimTime::from_secs_f64(from.distance_to(to) / speed_mps)
            }
        }
    }

    /// Total delay for `bits` sent between two positions, before the
    /// minimum-delay clamp.
    pub fn delay(&self, from: &Position, to: &Position, bits: u64) -> SimTime {
        let serialization = self
            .data_rate
            .map(|rate| rate.transmission_time(bits))
            .unwrap_or(SimTime::ZERO);
        self.propagation_delay(from, to).saturating_add(serialization)
    }

    /// Decides whether a transmission is lost. Draws from `rng` only for
    /// random loss models, so lossless channels do not perturb the stream.
    pub fn loss_decision<R: Rng + ?Sized>(&self, rng: &mut R, distance: f64) -> Option<DropReason> {
        match self.loss {
            LossModel::None => None,
            LossModel::Bernoulli { probability } => {
                if rng.gen_bool(probability) {
                    Some(DropReason::Loss)
                } else {
                    None
                }
            }
            LossModel::MaxRange { range_m } => {
                if distance > range_m {
                    Some(DropReason::OutOfRange)
                } else {
                    None
                }
            }
        }
    }
}

/// A collection of channels with fast membership lookup.
#[derive(Clone, Debug, Default)]
pub struct ChannelRegistry {
    channels: Vec<ChannelDesc>,
    /// Map from entity to the channels it is a member of
    membership: HashMap<EntityId, Vec<ChannelId>>,
}

impl ChannelRegistry {
    /// Creates a new empty channel registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and adds a channel.
    pub fn add(&mut self, channel: ChannelDesc) -> SimResult<ChannelId> {
        channel.validate()?;
        let index = self.channels.len();
        for &member in &channel.members {
            self.membership.entry(member).or_default().push(index);
        }
        self.channels.push(channel);
        Ok(index)
    }

    /// Finds the first channel (in registration order) linking two entities.
    pub fn find_link(&self, a: EntityId, b: EntityId) -> Option<(ChannelId, &ChannelDesc)> {
        self.membership
            .get(&a)?
            .iter()
            .map(|&i| (i, &self.channels[i]))
            .find(|(_, channel)| channel.members.contains(&b))
    }

    /// Returns a channel by id.
    pub fn get(&self, id: ChannelId) -> Option<&ChannelDesc> {
        self.channels.get(id)
    }

    /// Returns all channels.
    pub fn all(&self) -> &[ChannelDesc] {
        &self.channels
    }

    /// Returns the number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
