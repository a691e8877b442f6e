//! The simulation context.
//!
//! A [`Simulation`] owns everything one run needs: the [`Scheduler`] with its
//! clock and queue, and the [`World`] the scheduled actions operate on
//! (entities, channels, statistics, the seeded RNG and delivery observers).
//! There is no global state; dropping the `Simulation` discards the run.
//!
//! The scheduler and the world are kept side by side rather than nested so
//! that an action can hold `&mut Scheduler<World>` and `&mut World` at the
//! same time.
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use aerosim::app::{EchoClientConfig, EchoServerConfig};
//! use aerosim::channel::{ChannelDesc, DataRate};
//! use aerosim::engine::{Simulation, SimulationParams};
//! use aerosim::entity::{Entity, EntityKind};
//! use aerosim::types::{SimDuration, SimTime};
//!
//! let mut sim = Simulation::new(SimulationParams::new(SimTime::from_secs(10)));
//! let client = sim.create_entity(Entity::new("client", EntityKind::GroundUser, Ipv4Addr::new(10, 1, 1, 1)))?;
//! let server = sim.create_entity(Entity::new("server", EntityKind::Uav, Ipv4Addr::new(10, 1, 1, 2)))?;
//!
//! sim.add_channel(
//!     ChannelDesc::new([client, server])
//!         .with_fixed_delay(SimDuration::from_millis(2))
//!         .with_data_rate(DataRate::from_bps(100_000_000)),
//! )?;
//! sim.install_echo_server(server, EchoServerConfig {
//!     port: 9,
//!     start: SimTime::from_secs(1),
//!     stop: SimTime::from_secs(10),
//! })?;
//! sim.install_echo_client(client, EchoClientConfig {
//!     remote: server,
//!     remote_port: 9,
//!     max_packets: 10,
//!     interval: SimTime::from_millis(100),
//!     packet_size: 1024,
//!     start: SimTime::from_secs(2),
//!     stop: SimTime::from_secs(10),
//! })?;
//!
//! sim.run();
//! let report = sim.report()?;
//! assert_eq!(report.len(), 2); // request and echo flows
//! # Ok::<(), aerosim::error::SimError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::app::{AppCommand, AppEvent, Application, EchoClientConfig, EchoServerConfig};
use crate::channel::{ChannelDesc, ChannelRegistry, DeliveryOutcome, DropReason, MIN_DELIVERY_DELAY};
use crate::entity::{Entity, EntityRegistry};
use crate::error::{SimError, SimResult};
use crate::mobility::{self, MobilityModel, PositionAllocator};
use crate::observer::DeliveryObserver;
use crate::packet::{FlowKey, Packet};
use crate::scheduler::{RunSummary, Scheduler, SchedulerStats};
use crate::stats::{FlowReport, StatsCollector, Timer};
use crate::types::{ChannelId, EntityId, EventId, SimDuration, SimTime};

/// Run-wide parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulationParams {
    /// Seed of the run's random number generator
    pub seed: u64,
    /// Time `run()` stops at; also the default throughput duration
    pub stop_time: SimTime,
}

impl SimulationParams {
    /// Creates parameters with seed 1.
    pub fn new(stop_time: SimTime) -> Self {
        Self { seed: 1, stop_time }
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// The state that scheduled actions operate on.
pub struct World {
    pub(crate) entities: EntityRegistry,
    pub(crate) channels: ChannelRegistry,
    pub(crate) stats: StatsCollector,
    pub(crate) rng: ChaCha8Rng,
    observers: Vec<Box<dyn DeliveryObserver>>,
    next_packet_uid: u64,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("channels", &self.channels.len())
            .field("flows", &self.stats.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl World {
    fn new(params: &SimulationParams) -> Self {
        Self {
            entities: EntityRegistry::new(),
            channels: ChannelRegistry::new(),
            stats: StatsCollector::new(params.stop_time),
            rng: ChaCha8Rng::seed_from_u64(params.seed),
            observers: Vec::new(),
            next_packet_uid: 0,
        }
    }

    /// Returns the entity registry.
    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Looks up an entity.
    pub fn entity(&self, id: EntityId) -> SimResult<&Entity> {
        self.entities.get(id)
    }

    /// Looks up an entity for mutation.
    pub fn entity_mut(&mut self, id: EntityId) -> SimResult<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Returns the channel registry.
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Returns the flow statistics.
    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    /// Returns the run's random number generator.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Builds a UDP packet between two entities, stamped with a fresh uid.
    ///
    /// # Errors
    /// [`SimError::NotFound`] if either entity does not exist.
    pub fn new_packet(
        &mut self,
        source: EntityId,
        src_port: u16,
        destination: EntityId,
        dst_port: u16,
        size_bytes: u32,
    ) -> SimResult<Packet> {
        let src = self.entities.get(source)?.address;
        let dst = self.entities.get(destination)?.address;
        let uid = self.next_packet_uid;
        self.next_packet_uid += 1;

        Ok(Packet {
            uid,
            flow: FlowKey::udp(src, src_port, dst, dst_port),
            size_bytes,
            sent_at: SimTime::ZERO,
            source,
            destination,
        })
    }

    /// Hands `packet` to the channel linking `sender` and `receiver`.
    ///
    /// The packet is stamped with the endpoints and `at_time`, counted as
    /// transmitted and reported to the observers. If a channel links the two
    /// entities and its loss model keeps the packet, a receive event is
    /// scheduled at `at_time + max(delay, MIN_DELIVERY_DELAY)`; otherwise the
    /// packet is counted as lost and nothing is scheduled.
    ///
    /// # Errors
    /// * [`SimError::InvalidDelay`] if `at_time` is before the current time
    /// * [`SimError::NotFound`] if either entity does not exist
    pub fn transmit(
        &mut self,
        sched: &mut Scheduler<World>,
        sender: EntityId,
        receiver: EntityId,
        mut packet: Packet,
        at_time: SimTime,
    ) -> SimResult<DeliveryOutcome> {
        let now = sched.now();
        if at_time < now {
            return Err(SimError::InvalidDelay(at_time.since(now)));
        }
        let to = self.entities.get(receiver)?.position;
        let from_entity = self.entities.get_mut(sender)?;
        let from = from_entity.position;

        packet.source = sender;
        packet.destination = receiver;
        packet.sent_at = at_time;

        from_entity.counters.tx_packets += 1;
        from_entity.counters.tx_bytes += packet.size_bytes as u64;
        self.stats.record_tx(packet.flow, packet.size_bytes, at_time);
        for observer in &mut self.observers {
            observer.on_transmit(at_time, &packet);
        }

        let Some((channel_id, channel)) = self.channels.find_link(sender, receiver) else {
            return Ok(self.drop_packet(at_time, &packet, DropReason::NoRoute));
        };

        let delay = channel
            .delay(&from, &to, packet.size_bits())
            .max(MIN_DELIVERY_DELAY);
        if let Some(reason) = channel.loss_decision(&mut self.rng, from.distance_to(&to)) {
            return Ok(self.drop_packet(at_time, &packet, reason));
        }

        let arrival_time = at_time.saturating_add(delay);

        tracing::debug!(
            uid = packet.uid,
            flow = %packet.flow,
            channel = channel_id,
            %at_time,
            %arrival_time,
            "packet transmitted"
        );

        let event = sched.schedule_at(arrival_time, move |sched, world: &mut World| {
            world.deliver(sched, packet)
        })?;
        Ok(DeliveryOutcome::Delivered {
            arrival_time,
            event,
        })
    }

    fn drop_packet(&mut self, now: SimTime, packet: &Packet, reason: DropReason) -> DeliveryOutcome {
        tracing::debug!(uid = packet.uid, flow = %packet.flow, %reason, "packet dropped");
        self.stats.record_loss(packet.flow);
        for observer in &mut self.observers {
            observer.on_drop(now, packet, reason);
        }
        DeliveryOutcome::Dropped { reason }
    }

    fn deliver(&mut self, sched: &mut Scheduler<World>, packet: Packet) {
        let now = sched.now();
        let destination = packet.destination;

        let Ok(entity) = self.entities.get_mut(destination) else {
            self.drop_packet(now, &packet, DropReason::ReceiverGone);
            return;
        };
        entity.counters.rx_packets += 1;
        entity.counters.rx_bytes += packet.size_bytes as u64;
        let app = entity.application_on_port(packet.flow.dst_port);
        if app.is_none() {
            entity.counters.undeliverable += 1;
        }

        self.stats.record_rx(packet.flow, packet.size_bytes, now);
        self.stats
            .record_delay(packet.flow, SimTime::from_nanos(now.as_nanos() - packet.sent_at.as_nanos()));
        for observer in &mut self.observers {
            observer.on_receive(now, &packet);
        }
        tracing::debug!(uid = packet.uid, flow = %packet.flow, %now, "packet delivered");

        match app {
            Some(index) => self.dispatch_app(sched, destination, index, AppEvent::Receive(packet)),
            None => tracing::debug!(%destination, port = packet.flow.dst_port, "no application bound to port"),
        }
    }

    /// Feeds an event to an installed application and executes its commands.
    fn dispatch_app(&mut self, sched: &mut Scheduler<World>, entity: EntityId, index: usize, event: AppEvent) {
        let commands = match self.entities.get_mut(entity) {
            Ok(owner) => match owner.apps.get_mut(index) {
                Some(app) => app.handle(event),
                None => return,
            },
            // Entity removed; its pending application events are no-ops.
            Err(_) => return,
        };

        for command in commands {
            if let Err(err) = self.execute(sched, entity, index, command) {
                tracing::warn!(%entity, app = index, %err, "application command failed");
            }
        }
    }

    fn execute(
        &mut self,
        sched: &mut Scheduler<World>,
        entity: EntityId,
        index: usize,
        command: AppCommand,
    ) -> SimResult<()> {
        match command {
            AppCommand::Send {
                to,
                src_port,
                dst_port,
                size_bytes,
            } => {
                let now = sched.now();
                let packet = self.new_packet(entity, src_port, to, dst_port, size_bytes)?;
                self.transmit(sched, entity, to, packet, now)?;
            }
            AppCommand::ArmTimer { after } => {
                let id = sched.schedule_after(SimDuration::from(after), move |sched, world: &mut World| {
                    world.dispatch_app(sched, entity, index, AppEvent::Timer)
                })?;
                if let Some(app) = self.entities.get_mut(entity)?.apps.get_mut(index) {
                    app.timer_armed(id);
                }
            }
            AppCommand::CancelTimer(id) => sched.cancel(id)?,
        }
        Ok(())
    }
}

/// One simulation run.
pub struct Simulation {
    scheduler: Scheduler<World>,
    world: World,
    params: SimulationParams,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("params", &self.params)
            .field("scheduler", &self.scheduler)
            .field("world", &self.world)
            .finish()
    }
}

impl Simulation {
    /// Creates an empty simulation with the clock at zero.
    pub fn new(params: SimulationParams) -> Self {
        Self {
            scheduler: Scheduler::new(),
            world: World::new(&params),
            params,
        }
    }

    /// Returns the run parameters.
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Returns the current simulated time.
    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Returns the world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Returns the world for mutation.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Registers an entity. Moving entities get their first position update
    /// scheduled one interval from now.
    ///
    /// # Errors
    /// [`SimError::InvalidMobility`] if the mobility model is invalid.
    pub fn create_entity(&mut self, entity: Entity) -> SimResult<EntityId> {
        entity.mobility.validate()?;
        let interval = entity.mobility.update_interval();
        let name = entity.name.clone();
        let id = self.world.entities.create_entity(entity);
        if let Some(interval) = interval {
            let event = mobility::arm_update(&mut self.scheduler, id, interval)?;
            self.world.entities.get_mut(id)?.mobility_update = Some(event);
        }
        tracing::debug!(%id, %name, "entity created");
        Ok(id)
    }

    /// Replaces an entity's mobility model.
    ///
    /// The pending position update, if any, is cancelled; a moving model
    /// gets its first update one interval from now.
    ///
    /// # Errors
    /// * [`SimError::InvalidMobility`] if the model is invalid
    /// * [`SimError::NotFound`] if the entity does not exist
    pub fn set_mobility(&mut self, id: EntityId, model: MobilityModel) -> SimResult<()> {
        model.validate()?;
        let entity = self.world.entities.get_mut(id)?;
        if let Some(event) = entity.mobility_update.take() {
            // Already fired or cancelled is fine.
            let _ = self.scheduler.cancel(event);
        }
        entity.mobility = model;

        if let Some(interval) = model.update_interval() {
            let event = mobility::arm_update(&mut self.scheduler, id, interval)?;
            self.world.entities.get_mut(id)?.mobility_update = Some(event);
        }
        tracing::debug!(%id, ?model, "mobility changed");
        Ok(())
    }

    /// Registers an entity at a position drawn from `allocator`.
    pub fn place_entity(&mut self, entity: Entity, allocator: &PositionAllocator) -> SimResult<EntityId> {
        allocator.validate()?;
        let position = allocator.sample(&mut self.world.rng);
        self.create_entity(entity.with_position(position))
    }

    /// Looks up an entity.
    pub fn entity(&self, id: EntityId) -> SimResult<&Entity> {
        self.world.entities.get(id)
    }

    /// Looks up an entity for mutation.
    pub fn entity_mut(&mut self, id: EntityId) -> SimResult<&mut Entity> {
        self.world.entities.get_mut(id)
    }

    /// Returns the entity registry.
    pub fn entities(&self) -> &EntityRegistry {
        &self.world.entities
    }

    /// Removes an entity. Packets still in flight towards it are dropped on
    /// arrival and its pending application and mobility events do nothing.
    pub fn remove_entity(&mut self, id: EntityId) -> SimResult<Entity> {
        let entity = self.world.entities.remove(id)?;
        tracing::debug!(%id, name = %entity.name, "entity removed");
        Ok(entity)
    }

    /// Adds a channel between existing entities.
    ///
    /// # Errors
    /// [`SimError::NotFound`] for an unknown member, otherwise whatever
    /// [`ChannelDesc::validate`] reports.
    pub fn add_channel(&mut self, channel: ChannelDesc) -> SimResult<ChannelId> {
        if let Some(&missing) = channel
            .members
            .iter()
            .find(|&&member| !self.world.entities.contains(member))
        {
            return Err(SimError::NotFound(missing));
        }
        let name = channel.name.clone();
        let id = self.world.channels.add(channel)?;
        tracing::debug!(channel = id, %name, "channel added");
        Ok(id)
    }

    /// Installs an application and schedules its start and stop events.
    ///
    /// Returns the application's index on the entity.
    ///
    /// # Errors
    /// * [`SimError::NotFound`] if the entity does not exist
    /// * [`SimError::InvalidApplication`] if the port is already bound
    /// * [`SimError::InvalidDelay`] if the start time has already passed
    pub fn install_application(&mut self, entity: EntityId, app: Application) -> SimResult<usize> {
        let now = self.scheduler.now();
        let start = app.start_time();
        let stop = app.stop_time();
        if start < now {
            return Err(SimError::InvalidDelay(start.since(now)));
        }

        let owner = self.world.entities.get_mut(entity)?;
        if owner.application_on_port(app.local_port()).is_some() {
            return Err(SimError::InvalidApplication(format!(
                "port {} already bound on {entity}",
                app.local_port()
            )));
        }
        owner.apps.push(app);
        let index = owner.apps.len() - 1;

        self.scheduler.schedule_at(start, move |sched, world: &mut World| {
            world.dispatch_app(sched, entity, index, AppEvent::Start)
        })?;
        self.scheduler.schedule_at(stop, move |sched, world: &mut World| {
            world.dispatch_app(sched, entity, index, AppEvent::Stop)
        })?;
        Ok(index)
    }

    /// Installs an echo server.
    pub fn install_echo_server(&mut self, entity: EntityId, config: EchoServerConfig) -> SimResult<usize> {
        let app = Application::echo_server(config)?;
        self.install_application(entity, app)
    }

    /// Installs an echo client on a freshly allocated ephemeral port.
    pub fn install_echo_client(&mut self, entity: EntityId, config: EchoClientConfig) -> SimResult<usize> {
        if !self.world.entities.contains(config.remote) {
            return Err(SimError::NotFound(config.remote));
        }
        let port = self.world.entities.get_mut(entity)?.allocate_port();
        let app = Application::echo_client(config, port)?;
        self.install_application(entity, app)
    }

    /// Subscribes an observer to delivery events.
    pub fn add_observer(&mut self, observer: impl DeliveryObserver + 'static) {
        self.world.observers.push(Box::new(observer));
    }

    /// Schedules a custom action at an absolute time.
    pub fn schedule_at<F>(&mut self, time: SimTime, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Scheduler<World>, &mut World) + 'static,
    {
        self.scheduler.schedule_at(time, action)
    }

    /// Schedules a custom action relative to now.
    pub fn schedule_after<F>(&mut self, delay: SimDuration, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Scheduler<World>, &mut World) + 'static,
    {
        self.scheduler.schedule_after(delay, action)
    }

    /// Cancels a pending event.
    pub fn cancel(&mut self, id: EventId) -> SimResult<()> {
        self.scheduler.cancel(id)
    }

    /// Builds a packet between two entities; see [`World::new_packet`].
    pub fn new_packet(
        &mut self,
        source: EntityId,
        src_port: u16,
        destination: EntityId,
        dst_port: u16,
        size_bytes: u32,
    ) -> SimResult<Packet> {
        self.world
            .new_packet(source, src_port, destination, dst_port, size_bytes)
    }

    /// Transmits a packet outside of any action; see [`World::transmit`].
    pub fn transmit(
        &mut self,
        sender: EntityId,
        receiver: EntityId,
        packet: Packet,
        at_time: SimTime,
    ) -> SimResult<DeliveryOutcome> {
        self.world
            .transmit(&mut self.scheduler, sender, receiver, packet, at_time)
    }

    /// Runs events up to and including `stop_time`.
    pub fn run_until(&mut self, stop_time: SimTime) -> RunSummary {
        tracing::info!(now = %self.now(), %stop_time, pending = self.scheduler.pending(), "simulation started");
        let timer = Timer::start();

        let summary = self.scheduler.run_until(&mut self.world, stop_time);

        tracing::info!(
            reason = ?summary.reason,
            final_time = %summary.final_time,
            events = summary.events_executed,
            wall_ms = timer.elapsed_ms(),
            "simulation finished"
        );
        summary
    }

    /// Runs until the configured stop time.
    pub fn run(&mut self) -> RunSummary {
        self.run_until(self.params.stop_time)
    }

    /// Returns the flow statistics.
    pub fn stats(&self) -> &StatsCollector {
        &self.world.stats
    }

    /// Reports every flow over the configured stop time.
    pub fn report(&self) -> SimResult<BTreeMap<FlowKey, FlowReport>> {
        self.world.stats.report()
    }

    /// Reports every flow over its own observation window.
    pub fn report_windowed(&self) -> SimResult<BTreeMap<FlowKey, FlowReport>> {
        self.world.stats.report_windowed()
    }

    /// Returns the cumulative scheduler counters.
    pub fn scheduler_stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }

    /// Returns the number of live pending events.
    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LossModel;
    use crate::entity::EntityKind;
    use crate::mobility::{Position, Velocity};
    use crate::scheduler::StopReason;
    use std::net::Ipv4Addr;

    fn sim() -> Simulation {
        Simulation::new(SimulationParams::new(SimTime::from_secs(10)))
    }

    fn node(sim: &mut Simulation, n: u8) -> EntityId {
        sim.create_entity(Entity::new(format!("n{n}"), EntityKind::Generic, Ipv4Addr::new(10, 0, 0, n)))
            .unwrap()
    }

    #[test]
    fn test_transmit_schedules_delivery() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let b = node(&mut sim, 2);
        sim.add_channel(ChannelDesc::new([a, b]).with_fixed_delay(SimDuration::from_millis(2)))
            .unwrap();

        let packet = sim.new_packet(a, 1000, b, 2000, 100).unwrap();
        let outcome = sim.transmit(a, b, packet, SimTime::ZERO).unwrap();
        assert_eq!(outcome.arrival_time(), Some(SimTime::from_millis(2)));

        sim.run();
        assert_eq!(sim.entity(b).unwrap().counters.rx_packets, 1);
        // Nothing listens on port 2000.
        assert_eq!(sim.entity(b).unwrap().counters.undeliverable, 1);
    }

    #[test]
    fn test_zero_delay_is_clamped() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let b = node(&mut sim, 2);
        sim.add_channel(ChannelDesc::new([a, b])).unwrap();

        let packet = sim.new_packet(a, 1, b, 2, 1).unwrap();
        let outcome = sim.transmit(a, b, packet, SimTime::from_millis(1)).unwrap();
        assert_eq!(
            outcome.arrival_time(),
            Some(SimTime::from_millis(1).saturating_add(MIN_DELIVERY_DELAY))
        );
    }

    #[test]
    fn test_no_route_is_a_drop() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let b = node(&mut sim, 2);

        let packet = sim.new_packet(a, 1, b, 2, 10).unwrap();
        let flow = packet.flow;
        let outcome = sim.transmit(a, b, packet, SimTime::ZERO).unwrap();

        assert_eq!(outcome, DeliveryOutcome::Dropped { reason: DropReason::NoRoute });
        assert_eq!(sim.stats().flow(&flow).unwrap().lost_packets, 1);
        assert_eq!(sim.pending_events(), 0);
    }

    #[test]
    fn test_transmit_errors() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let b = node(&mut sim, 2);
        let ghost = EntityId::from_raw(99);

        let packet = sim.new_packet(a, 1, b, 2, 10).unwrap();
        assert_eq!(
            sim.transmit(a, ghost, packet.clone(), SimTime::ZERO),
            Err(SimError::NotFound(ghost))
        );

        sim.schedule_at(SimTime::from_secs(1), |_, _| {}).unwrap();
        sim.run_until(SimTime::from_secs(1));
        assert!(matches!(
            sim.transmit(a, b, packet, SimTime::from_millis(500)),
            Err(SimError::InvalidDelay(_))
        ));
    }

    #[test]
    fn test_receiver_removed_in_flight() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let b = node(&mut sim, 2);
        sim.add_channel(ChannelDesc::new([a, b]).with_fixed_delay(SimDuration::from_millis(5)))
            .unwrap();

        let packet = sim.new_packet(a, 1, b, 2, 10).unwrap();
        let flow = packet.flow;
        sim.transmit(a, b, packet, SimTime::ZERO).unwrap();
        sim.remove_entity(b).unwrap();
        sim.run();

        let stats = sim.stats().flow(&flow).unwrap();
        assert_eq!(stats.rx_packets, 0);
        assert_eq!(stats.lost_packets, 1);
    }

    #[test]
    fn test_lossy_channel_keeps_queue_clean() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let b = node(&mut sim, 2);
        sim.add_channel(ChannelDesc::new([a, b]).with_loss(LossModel::Bernoulli { probability: 1.0 }))
            .unwrap();

        let packet = sim.new_packet(a, 1, b, 2, 10).unwrap();
        let outcome = sim.transmit(a, b, packet, SimTime::ZERO).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Dropped { reason: DropReason::Loss });
        assert_eq!(sim.pending_events(), 0);
    }

    #[test]
    fn test_add_channel_unknown_member() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let ghost = EntityId::from_raw(42);
        assert_eq!(
            sim.add_channel(ChannelDesc::new([a, ghost])),
            Err(SimError::NotFound(ghost))
        );
    }

    #[test]
    fn test_port_conflict() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let config = EchoServerConfig {
            port: 9,
            start: SimTime::ZERO,
            stop: SimTime::from_secs(1),
        };
        sim.install_echo_server(a, config.clone()).unwrap();
        assert!(matches!(
            sim.install_echo_server(a, config),
            Err(SimError::InvalidApplication(_))
        ));
    }

    #[test]
    fn test_mobility_updates_position() {
        let mut sim = sim();
        let id = sim
            .create_entity(
                Entity::new("uav", EntityKind::Uav, Ipv4Addr::new(10, 0, 0, 1))
                    .with_position(Position::new(0.0, 0.0, 100.0))
                    .with_mobility(MobilityModel::ConstantVelocity {
                        velocity: Velocity::new(10.0, 0.0, 0.0),
                        update_interval: SimTime::from_millis(100),
                    }),
            )
            .unwrap();

        let summary = sim.run_until(SimTime::from_secs(1));
        assert_eq!(summary.reason, StopReason::StopTimeReached);
        let position = sim.entity(id).unwrap().position;
        assert!((position.x - 10.0).abs() < 1e-9, "x = {}", position.x);
        assert_eq!(position.z, 100.0);
    }

    #[test]
    fn test_set_mobility_starts_and_stops_movement() {
        let mut sim = sim();
        let id = node(&mut sim, 1);
        let moving = MobilityModel::ConstantVelocity {
            velocity: Velocity::new(5.0, 0.0, 0.0),
            update_interval: SimTime::from_millis(100),
        };

        sim.set_mobility(id, moving).unwrap();
        sim.run_until(SimTime::from_secs(1));
        assert!((sim.entity(id).unwrap().position.x - 5.0).abs() < 1e-9);

        sim.set_mobility(id, MobilityModel::ConstantPosition).unwrap();
        assert_eq!(sim.pending_events(), 0);
        sim.schedule_at(SimTime::from_secs(2), |_, _| {}).unwrap();
        sim.run_until(SimTime::from_secs(2));
        assert!((sim.entity(id).unwrap().position.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_mobility_replaces_pending_update() {
        let mut sim = sim();
        let id = node(&mut sim, 1);
        let slow = MobilityModel::ConstantVelocity {
            velocity: Velocity::new(1.0, 0.0, 0.0),
            update_interval: SimTime::from_millis(100),
        };
        let fast = MobilityModel::ConstantVelocity {
            velocity: Velocity::new(10.0, 0.0, 0.0),
            update_interval: SimTime::from_millis(500),
        };

        sim.set_mobility(id, slow).unwrap();
        sim.set_mobility(id, fast).unwrap();
        assert_eq!(sim.pending_events(), 1);

        sim.run_until(SimTime::from_secs(1));
        assert!((sim.entity(id).unwrap().position.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_mobility_rejects_zero_interval() {
        let mut sim = sim();
        let id = node(&mut sim, 1);
        let stuck = MobilityModel::ConstantVelocity {
            velocity: Velocity::new(1.0, 0.0, 0.0),
            update_interval: SimTime::ZERO,
        };

        assert!(matches!(sim.set_mobility(id, stuck), Err(SimError::InvalidMobility(_))));
        assert_eq!(sim.entity(id).unwrap().mobility(), &MobilityModel::ConstantPosition);
        assert_eq!(sim.pending_events(), 0);
    }

    #[test]
    fn test_invalid_model_ends_updates_instead_of_looping() {
        let mut sim = sim();
        let id = sim
            .create_entity(
                Entity::new("uav", EntityKind::Uav, Ipv4Addr::new(10, 0, 0, 1)).with_mobility(
                    MobilityModel::ConstantVelocity {
                        velocity: Velocity::new(1.0, 0.0, 0.0),
                        update_interval: SimTime::from_millis(100),
                    },
                ),
            )
            .unwrap();
        // Bypasses validation; the update loop must still terminate.
        sim.entity_mut(id).unwrap().mobility = MobilityModel::ConstantVelocity {
            velocity: Velocity::new(1.0, 0.0, 0.0),
            update_interval: SimTime::ZERO,
        };

        let summary = sim.run_until(SimTime::from_secs(1));
        assert_eq!(summary.reason, StopReason::QueueEmpty);
        assert_eq!(summary.events_executed, 1);
        assert_eq!(sim.now(), SimTime::from_millis(100));
    }

    #[test]
    fn test_custom_action_can_transmit() {
        let mut sim = sim();
        let a = node(&mut sim, 1);
        let b = node(&mut sim, 2);
        sim.add_channel(ChannelDesc::new([a, b]).with_fixed_delay(SimDuration::from_millis(1)))
            .unwrap();

        sim.schedule_at(SimTime::from_secs(1), move |sched, world: &mut World| {
            let now = sched.now();
            let packet = world.new_packet(a, 5, b, 6, 64).unwrap();
            world.transmit(sched, a, b, packet, now).unwrap();
        })
        .unwrap();
        sim.run();

        assert_eq!(sim.entity(b).unwrap().counters.rx_bytes, 64);
        assert_eq!(sim.entity(a).unwrap().counters.tx_packets, 1);
    }
}
