//! UAV Network Scenario Example
//!
//! Loads a scenario file (by default `demos/uav_scenario.yaml`), runs it and
//! prints the throughput each UAV sourced over the whole run.
//!
//! Run with: `cargo run --example uav_scenario [-- path/to/scenario.yaml]`
//! Set `RUST_LOG=debug` to see every transmission.

use std::collections::HashMap;
use std::error::Error;
use std::net::Ipv4Addr;

use aerosim::{Scenario, ScenarioConfig, TracingObserver};

const DEFAULT_SCENARIO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/uav_scenario.yaml");
const UAV_GROUP: &str = "uavs";

fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    let config = ScenarioConfig::from_file(&path)?;
    aerosim::init_logging(&config.simulation.log_level);

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║              UAV Network Scenario Example                ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Configuration:                                           ║");
    for group in &config.groups {
        println!("║   {:<12} {:>6} x {:<12} from {:<15}  ║", group.name, group.count, format!("{:?}", group.kind), group.network.to_string());
    }
    println!("║   Stop Time:   {:<12} Seed: {:<20}  ║", config.simulation.stop_time.to_string(), config.simulation.seed);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let mut scenario = Scenario::from_config(&config)?;
    // Per-packet trace lines under `RUST_LOG=aerosim::trace=debug`.
    scenario.simulation_mut().add_observer(TracingObserver);
    let summary = scenario.run();
    println!(
        "Executed {} events, stopped at {} ({:?})",
        summary.events_executed, summary.final_time, summary.reason
    );
    println!();

    let sim = scenario.simulation();
    let uavs = scenario.group(UAV_GROUP).ok_or("scenario has no `uavs` group")?;

    // Address to UAV index, computed once.
    let mut index_of: HashMap<Ipv4Addr, usize> = HashMap::with_capacity(uavs.len());
    for (index, &id) in uavs.iter().enumerate() {
        if let Ok(entity) = sim.entity(id) {
            index_of.insert(entity.address, index);
        }
    }

    let mut throughput = vec![0.0_f64; uavs.len()];
    for report in sim.report()?.values() {
        if let Some(&index) = index_of.get(&report.flow.src) {
            throughput[index] += report.throughput_mbps();
        }
    }

    for (index, mbps) in throughput.iter().enumerate() {
        println!("UAV {index} throughput: {mbps:.6} Mbps");
    }

    Ok(())
}
