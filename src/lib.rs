//! # Aerosim
//!
//! A discrete-event simulation kernel for UAV and ground-user wireless
//! network scenarios.
//!
//! ## Design Principles
//!
//! - **Deterministic**: events run strictly in `(time, insertion sequence)`
//!   order and every random draw comes from one seeded RNG per run, so the
//!   same scenario and seed always give the same results.
//! - **Single-rooted ownership**: a [`Simulation`] owns the scheduler,
//!   entities, channels, statistics and observers. Actions refer to entities
//!   by [`EntityId`] only.
//! - **Sequential runs, parallel replications**: one run is one logical
//!   thread; independent runs can be spread over worker threads.
//!
//! ## Features
//!
//! - `parallel` - Run replications on a rayon thread pool (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use aerosim::{ChannelDesc, DataRate, Entity, EntityKind, SimDuration, SimTime, Simulation, SimulationParams};
//!
//! let mut sim = Simulation::new(SimulationParams::new(SimTime::from_secs(1)));
//! let a = sim.create_entity(Entity::new("a", EntityKind::GroundUser, Ipv4Addr::new(10, 0, 0, 1)))?;
//! let b = sim.create_entity(Entity::new("b", EntityKind::Uav, Ipv4Addr::new(10, 0, 0, 2)))?;
//! sim.add_channel(
//!     ChannelDesc::new([a, b])
//!         .with_fixed_delay(SimDuration::from_millis(2))
//!         .with_data_rate(DataRate::from_bps(100_000_000)),
//! )?;
//!
//! let packet = sim.new_packet(a, 49153, b, 9, 1024)?;
//! let outcome = sim.transmit(a, b, packet, SimTime::ZERO)?;
//! assert_eq!(outcome.arrival_time(), Some(SimTime::from_nanos(2_081_920)));
//!
//! sim.run();
//! for (flow, report) in sim.report()? {
//!     println!("{flow}: {:.3} Mbps", report.throughput_mbps());
//! }
//! # Ok::<(), aerosim::SimError>(())
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use aerosim::{Scenario, ScenarioConfig};
//!
//! let config = ScenarioConfig::from_file("demos/uav_scenario.yaml")?;
//! let mut scenario = Scenario::from_config(&config)?;
//! scenario.run();
//! ```

pub mod types;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod mobility;
pub mod packet;
pub mod channel;
pub mod app;
pub mod entity;
pub mod observer;
pub mod stats;
pub mod engine;
pub mod config;
pub mod scenario;
pub mod parallel;

// Re-export commonly used types
pub use types::{ChannelId, EntityId, EventId, SimDuration, SimTime};
pub use error::{SimError, SimResult};
pub use event::{Event, EventQueue};
pub use scheduler::{RunSummary, Scheduler, SchedulerStats, StopReason};
pub use mobility::{MobilityModel, Position, PositionAllocator, Velocity};
pub use packet::{FlowKey, Packet, Protocol};
pub use channel::{ChannelDesc, ChannelRegistry, DataRate, DeliveryOutcome, DropReason, LossModel};
pub use app::{AppStats, Application, EchoClientConfig, EchoServerConfig};
pub use entity::{Entity, EntityKind, EntityRegistry};
pub use observer::{DeliveryObserver, RecordingObserver, TraceRecord, TracingObserver};
pub use stats::{FlowReport, FlowStats, StatsCollector, Timer};
pub use engine::{Simulation, SimulationParams, World};
pub use config::{ConfigError, ConfigResult, ScenarioConfig, ScenarioConfigBuilder, TimeSpec};
pub use scenario::Scenario;
pub use parallel::{run_replications, Replication, ReplicationRunner};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// aerosim::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
