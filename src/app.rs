//! Traffic applications.
//!
//! Applications are a closed set of variants. Each one is a small state
//! machine that reacts to an [`AppEvent`] and answers with [`AppCommand`]s;
//! the simulation context executes the commands (sending packets, arming
//! or cancelling timers). Applications never touch the scheduler or other
//! entities directly.

use serde::Serialize;

use crate::error::{SimError, SimResult};
use crate::packet::Packet;
use crate::types::{EntityId, EventId, SimTime};

/// Something that happened to an application.
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    /// The configured start time was reached.
    Start,
    /// The configured stop time was reached.
    Stop,
    /// A timer armed with [`AppCommand::ArmTimer`] fired.
    Timer,
    /// A packet addressed to the application's port arrived.
    Receive(Packet),
}

/// Something an application asks the context to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppCommand {
    /// Send a UDP datagram.
    Send {
        to: EntityId,
        src_port: u16,
        dst_port: u16,
        size_bytes: u32,
    },
    /// Deliver [`AppEvent::Timer`] after `after`.
    ArmTimer { after: SimTime },
    /// Cancel a previously armed timer.
    CancelTimer(EventId),
}

/// Counters kept by every application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AppStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
}

/// Configuration of a UDP echo server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EchoServerConfig {
    /// Port to listen on
    pub port: u16,
    pub start: SimTime,
    pub stop: SimTime,
}

/// Configuration of a UDP echo client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EchoClientConfig {
    /// Entity running the server
    pub remote: EntityId,
    /// Server port
    pub remote_port: u16,
    /// Number of requests to send; 0 means no limit
    pub max_packets: u32,
    /// Gap between requests
    pub interval: SimTime,
    /// Request size in bytes
    pub packet_size: u32,
    pub start: SimTime,
    pub stop: SimTime,
}

/// Echoes every datagram back to its sender.
#[derive(Clone, Debug)]
pub struct EchoServer {
    config: EchoServerConfig,
    running: bool,
    stats: AppStats,
}

/// Sends fixed-size requests at a fixed interval and counts the echoes.
#[derive(Clone, Debug)]
pub struct EchoClient {
    config: EchoClientConfig,
    local_port: u16,
    running: bool,
    pending_timer: Option<EventId>,
    stats: AppStats,
}

/// An installed application.
#[derive(Clone, Debug)]
pub enum Application {
    EchoServer(EchoServer),
    EchoClient(EchoClient),
}

impl Application {
    /// Creates an echo server.
    pub fn echo_server(config: EchoServerConfig) -> SimResult<Self> {
        check_window(config.start, config.stop)?;
        Ok(Application::EchoServer(EchoServer {
            config,
            running: false,
            stats: AppStats::default(),
        }))
    }

    /// Creates an echo client bound to `local_port`.
    pub fn echo_client(config: EchoClientConfig, local_port: u16) -> SimResult<Self> {
        check_window(config.start, config.stop)?;
        if config.interval == SimTime::ZERO {
            return Err(SimError::InvalidApplication(
                "echo client interval must be positive".to_string(),
            ));
        }
        if config.packet_size == 0 {
            return Err(SimError::InvalidApplication(
                "echo client packet size must be positive".to_string(),
            ));
        }
        Ok(Application::EchoClient(EchoClient {
            config,
            local_port,
            running: false,
            pending_timer: None,
            stats: AppStats::default(),
        }))
    }

    /// Port the application receives on.
    pub fn local_port(&self) -> u16 {
        match self {
            Application::EchoServer(server) => server.config.port,
            Application::EchoClient(client) => client.local_port,
        }
    }

    /// Scheduled start time.
    pub fn start_time(&self) -> SimTime {
        match self {
            Application::EchoServer(server) => server.config.start,
            Application::EchoClient(client) => client.config.start,
        }
    }

    /// Scheduled stop time.
    pub fn stop_time(&self) -> SimTime {
        match self {
            Application::EchoServer(server) => server.config.stop,
            Application::EchoClient(client) => client.config.stop,
        }
    }

    /// Returns true between start and stop.
    pub fn is_running(&self) -> bool {
        match self {
            Application::EchoServer(server) => server.running,
            Application::EchoClient(client) => client.running,
        }
    }

    /// Returns the application's counters.
    pub fn stats(&self) -> &AppStats {
        match self {
            Application::EchoServer(server) => &server.stats,
            Application::EchoClient(client) => &client.stats,
        }
    }

    /// Feeds an event to the application.
    pub(crate) fn handle(&mut self, event: AppEvent) -> Vec<AppCommand> {
        match self {
            Application::EchoServer(server) => server.handle(event),
            Application::EchoClient(client) => client.handle(event),
        }
    }

    /// Records the handle of a timer armed on the application's behalf.
    pub(crate) fn timer_armed(&mut self, id: EventId) {
        if let Application::EchoClient(client) = self {
            client.pending_timer = Some(id);
        }
    }
}

fn check_window(start: SimTime, stop: SimTime) -> SimResult<()> {
    if stop < start {
        return Err(SimError::InvalidApplication(format!(
            "stop time {stop} precedes start time {start}"
        )));
    }
    Ok(())
}

impl EchoServer {
    fn handle(&mut self, event: AppEvent) -> Vec<AppCommand> {
        match event {
            AppEvent::Start => {
                self.running = true;
                Vec::new()
            }
            AppEvent::Stop => {
                self.running = false;
                Vec::new()
            }
            AppEvent::Timer => Vec::new(),
            AppEvent::Receive(packet) => {
                if !self.running {
                    return Vec::new();
                }
                self.stats.packets_received += 1;
                self.stats.bytes_received += packet.size_bytes as u64;
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += packet.size_bytes as u64;

                vec![AppCommand::Send {
                    to: packet.source,
                    src_port: self.config.port,
                    dst_port: packet.flow.src_port,
                    size_bytes: packet.size_bytes,
                }]
            }
        }
    }
}

impl EchoClient {
    fn handle(&mut self, event: AppEvent) -> Vec<AppCommand> {
        match event {
            AppEvent::Start => {
                self.running = true;
                // First send is its own event, so a Stop at the same instant
                // cancels it.
                vec![AppCommand::ArmTimer { after: SimTime::ZERO }]
            }
            AppEvent::Timer => {
                self.pending_timer = None;
                if self.running {
                    self.send_next()
                } else {
                    Vec::new()
                }
            }
            AppEvent::Stop => {
                self.running = false;
                match self.pending_timer.take() {
                    Some(id) => vec![AppCommand::CancelTimer(id)],
                    None => Vec::new(),
                }
            }
            AppEvent::Receive(packet) => {
                self.stats.packets_received += 1;
                self.stats.bytes_received += packet.size_bytes as u64;
                Vec::new()
            }
        }
    }

    fn send_next(&mut self) -> Vec<AppCommand> {
        let limit = self.config.max_packets as u64;
        if limit != 0 && self.stats.packets_sent >= limit {
            return Vec::new();
        }

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += self.config.packet_size as u64;

        let mut commands = vec![AppCommand::Send {
            to: self.config.remote,
            src_port: self.local_port,
            dst_port: self.config.remote_port,
            size_bytes: self.config.packet_size,
        }];
        if limit == 0 || self.stats.packets_sent < limit {
            commands.push(AppCommand::ArmTimer {
                after: self.config.interval,
            });
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FlowKey;
    use std::net::Ipv4Addr;

    fn client(max_packets: u32) -> Application {
        Application::echo_client(
            EchoClientConfig {
                remote: EntityId::from_raw(1),
                remote_port: 9,
                max_packets,
                interval: SimTime::from_millis(100),
                packet_size: 1024,
                start: SimTime::from_secs(2),
                stop: SimTime::from_secs(10),
            },
            49153,
        )
        .unwrap()
    }

    fn request() -> Packet {
        Packet {
            uid: 0,
            flow: FlowKey::udp(Ipv4Addr::new(10, 0, 0, 1), 49153, Ipv4Addr::new(10, 0, 0, 2), 9),
            size_bytes: 1024,
            sent_at: SimTime::ZERO,
            source: EntityId::from_raw(0),
            destination: EntityId::from_raw(1),
        }
    }

    #[test]
    fn test_client_sends_and_arms_timer() {
        let mut app = client(2);
        let commands = app.handle(AppEvent::Start);
        assert_eq!(commands, vec![AppCommand::ArmTimer { after: SimTime::ZERO }]);
        assert_eq!(app.stats().packets_sent, 0);

        let commands = app.handle(AppEvent::Timer);
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], AppCommand::Send { size_bytes: 1024, dst_port: 9, .. }));
        assert_eq!(commands[1], AppCommand::ArmTimer { after: SimTime::from_millis(100) });

        // Second and last packet: no further timer.
        let commands = app.handle(AppEvent::Timer);
        assert_eq!(commands.len(), 1);
        assert_eq!(app.stats().packets_sent, 2);

        assert!(app.handle(AppEvent::Timer).is_empty());
    }

    #[test]
    fn test_client_stop_cancels_timer() {
        let mut app = client(0);
        app.handle(AppEvent::Start);
        app.timer_armed(EventId::from_raw(7));

        let commands = app.handle(AppEvent::Stop);
        assert_eq!(commands, vec![AppCommand::CancelTimer(EventId::from_raw(7))]);
        assert!(!app.is_running());
    }

    #[test]
    fn test_server_echoes_only_while_running() {
        let mut app = Application::echo_server(EchoServerConfig {
            port: 9,
            start: SimTime::from_secs(1),
            stop: SimTime::from_secs(10),
        })
        .unwrap();

        assert!(app.handle(AppEvent::Receive(request())).is_empty());

        app.handle(AppEvent::Start);
        let commands = app.handle(AppEvent::Receive(request()));
        assert_eq!(
            commands,
            vec![AppCommand::Send {
                to: EntityId::from_raw(0),
                src_port: 9,
                dst_port: 49153,
                size_bytes: 1024,
            }]
        );
        assert_eq!(app.stats().packets_received, 1);
    }

    #[test]
    fn test_invalid_configs() {
        let server = Application::echo_server(EchoServerConfig {
            port: 9,
            start: SimTime::from_secs(5),
            stop: SimTime::from_secs(1),
        });
        assert!(matches!(server, Err(SimError::InvalidApplication(_))));

        let client = Application::echo_client(
            EchoClientConfig {
                remote: EntityId::from_raw(1),
                remote_port: 9,
                max_packets: 1,
                interval: SimTime::ZERO,
                packet_size: 10,
                start: SimTime::ZERO,
                stop: SimTime::from_secs(1),
            },
            49153,
        );
        assert!(client.is_err());
    }
}
