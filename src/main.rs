//! Velosim - Cycling Physics Simulation
//!
//! Main entry point. Loads the configuration (first argument, or the file
//! in the data directory) and runs it in the configured mode.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use velosim::sim::{EndCondition, OfflineRunner, RiderSnapshot, SimEvent, Simulation};
use velosim::storage::config::{self, RunMode, SimConfig};

/// Wall-clock interval between progress reports in real-time mode
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Velosim v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args_os().nth(1) {
        Some(path) => config::load_config_from(&PathBuf::from(path)),
        None => config::load_config(),
    }
    .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let sim = Simulation::from_config(&config).context("failed to build simulation")?;

    match config.run.mode {
        RunMode::Offline => run_offline(&sim, &config),
        RunMode::Realtime => run_realtime(sim, &config),
    }
}

fn end_condition(config: &SimConfig) -> EndCondition {
    EndCondition::Any(vec![
        EndCondition::FinishLine,
        EndCondition::TimeLimit(config.run.duration_secs),
    ])
}

fn run_offline(sim: &Simulation, config: &SimConfig) -> anyhow::Result<()> {
    let summary = OfflineRunner::new(sim, end_condition(config)).run()?;
    for snapshot in &summary.snapshots {
        report(snapshot);
    }
    if !summary.completed {
        tracing::warn!("Run stopped before the end condition was met");
    }
    Ok(())
}

fn run_realtime(mut sim: Simulation, config: &SimConfig) -> anyhow::Result<()> {
    let events = sim.event_receiver();
    let end = end_condition(config);
    sim.start()?;

    loop {
        std::thread::sleep(REPORT_INTERVAL);

        for event in events.try_iter() {
            tracing::debug!(?event, "Simulation event");
        }

        if let Some(message) = sim.physics_error() {
            sim.stop();
            sim.join()?;
            bail!("simulation failed: {}", message);
        }

        for snapshot in sim.snapshots()? {
            report(&snapshot);
        }

        let sim_seconds = sim.sim_seconds()?;
        if sim.with_engine(|engine| end.should_stop(engine, sim_seconds))? {
            break;
        }
    }

    sim.stop();
    sim.join()?;

    for event in events.try_iter() {
        if let SimEvent::PhysicsError { message } = event {
            bail!("simulation failed: {}", message);
        }
    }
    Ok(())
}

fn report(snapshot: &RiderSnapshot) {
    tracing::info!(
        "{} {:>8.1} m {:>5.1} km/h {:>5.0} W  W'bal {:>3.0}%",
        snapshot.name,
        snapshot.pos,
        snapshot.km_h,
        snapshot.power,
        snapshot.energy_fraction * 100.0
    );
}
