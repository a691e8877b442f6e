//! Configuration-driven scenarios: loading, validation and replications.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use aerosim::config::{ConfigError, NodeRef, ScenarioConfig};
use aerosim::entity::EntityKind;
use aerosim::packet::FlowKey;
use aerosim::parallel::{run_replications, seeds, summarize};
use aerosim::scenario::Scenario;
use aerosim::types::SimTime;

fn demo_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/uav_scenario.yaml")
}

const SMALL: &str = r#"
simulation: { stop_time: 10s, seed: 3 }
groups:
  - { name: uavs, count: 2, kind: uav, network: 10.1.1.0 }
  - { name: users, count: 2, kind: ground_user, network: 10.1.2.0 }
channels:
  - { name: air, members: [uavs, users], delay: 2ms, data_rate: 100Mbps }
applications:
  - { type: echo_server, node: { group: uavs, index: 1 }, port: 9, start: 1s }
  - type: echo_client
    node: { group: users, index: 1 }
    remote: { group: uavs, index: 1 }
    remote_port: 9
    max_packets: 100
    interval: 100ms
    packet_size: 1024
    start: 2s
"#;

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_demo_scenario_runs() {
    let config = ScenarioConfig::from_file(demo_path()).unwrap();
    assert_eq!(config.entity_count(), 4015);

    let mut scenario = Scenario::from_config(&config).unwrap();
    scenario.run();

    let sim = scenario.simulation();
    let uav = scenario.node(&NodeRef::new("uavs", 14)).unwrap();
    let user = scenario.node(&NodeRef::new("users", 3999)).unwrap();
    assert_eq!(sim.entity(uav).unwrap().kind, EntityKind::Uav);
    assert_eq!(sim.entity(user).unwrap().address, Ipv4Addr::new(10, 2, 15, 160));

    let report = sim.report().unwrap();
    let reply = report
        .values()
        .find(|r| r.flow.src == sim.entity(uav).unwrap().address)
        .unwrap();
    assert_eq!(reply.rx_bytes, 80 * 1024);
    assert_eq!(reply.duration, SimTime::from_secs(10));
}

#[test]
fn test_json_matches_yaml() {
    let yaml = ScenarioConfig::from_yaml(SMALL).unwrap();
    let json = ScenarioConfig::from_json(&yaml.to_json().unwrap()).unwrap();
    assert_eq!(yaml, json);
}

#[test]
fn test_file_errors() {
    assert!(matches!(
        ScenarioConfig::from_file("scenario.toml"),
        Err(ConfigError::UnknownFormat(ext)) if ext == "toml"
    ));
    assert!(matches!(
        ScenarioConfig::from_file("/nonexistent/scenario.yaml"),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn test_file_roundtrip() {
    let config = ScenarioConfig::from_yaml(SMALL).unwrap();
    let path = std::env::temp_dir().join(format!("aerosim-{}.json", std::process::id()));
    config.to_json_file(&path).unwrap();
    let restored = ScenarioConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(config, restored);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_invalid_values_rejected_at_load() {
    let cases = [
        SMALL.replace("delay: 2ms", "delay: two ms"),
        SMALL.replace("interval: 100ms", "interval: -100ms"),
        SMALL.replace("100Mbps", "100 furlongs"),
        SMALL.replace("members: [uavs, users]", "members: [uavs, drones]"),
        SMALL.replace("index: 1 }, port", "index: 7 }, port"),
        SMALL.replace("stop_time: 10s", "stop_time: 0s"),
        SMALL.replace("network: 10.1.1.0", "network: 10.1.1"),
    ];
    for yaml in &cases {
        assert!(ScenarioConfig::from_yaml(yaml).is_err(), "accepted:\n{yaml}");
    }
}

#[test]
fn test_zero_interval_rejected_at_build() {
    let config = ScenarioConfig::from_yaml(&SMALL.replace("interval: 100ms", "interval: 0ms")).unwrap();
    assert!(matches!(
        Scenario::from_config(&config),
        Err(ConfigError::Sim(aerosim::SimError::InvalidApplication(_)))
    ));
}

// ============================================================================
// Replications
// ============================================================================

#[test]
fn test_replications_with_same_seed_agree() {
    let config = ScenarioConfig::from_yaml(&SMALL.replace(
        "data_rate: 100Mbps }",
        "data_rate: 100Mbps, loss: { type: bernoulli, probability: 0.2 } }",
    ))
    .unwrap();

    let runs = run_replications(&config, &[5, 5, 6]).unwrap();
    assert_eq!(runs[0].report, runs[1].report);
    assert_eq!(runs[2].seed, 6);
}

#[test]
fn test_replication_summary() {
    let config = ScenarioConfig::from_yaml(SMALL).unwrap();
    let runs = run_replications(&config, &seeds(1, 3)).unwrap();
    let summary = summarize(&runs);

    let request = FlowKey::udp(Ipv4Addr::new(10, 1, 2, 2), 49153, Ipv4Addr::new(10, 1, 1, 2), 9);
    let stats = &summary[&request];
    assert_eq!(stats.runs, 3);
    // Lossless, so every replication delivers the same 80 packets.
    assert_eq!(stats.min_bps, stats.max_bps);
    assert_eq!(stats.mean_bps, 80.0 * 1024.0 * 8.0 / 10.0);
}
