mod net;
mod sim;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vehicle_dynamics::mpcc::{MpccClient, MpccConfig};
use vehicle_dynamics::params::setup_vehicle_parameters;
use vehicle_dynamics::vehicle::{
    COMPACT_EV, COMPACT_EV_GEOMETRY, COMPACT_EV_MAX_STEER_RATE, COMPACT_EV_STEERING, Vehicle,
};

use crate::net::start_websocket_server;
use crate::sim::{Simulation, demo_track};
use crate::state::SharedSimState;

#[derive(Parser, Debug)]
#[command(name = "vehicle-dynamics-server")]
#[command(about = "Real-time vehicle dynamics simulation with a predictive contouring autopilot")]
struct Args {
    /// WebSocket listen address
    #[arg(long, default_value = "0.0.0.0:9001")]
    bind: SocketAddr,

    /// Simulation rate
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=1000))]
    tick_hz: u32,

    /// Parameter root holding vehicle/ and tire/ YAML files; built-in preset when absent
    #[arg(long)]
    params_dir: Option<PathBuf>,

    /// Vehicle id of the parameter file to load
    #[arg(long, default_value_t = 1)]
    vehicle_id: u32,

    /// Drive with the MPCC controller instead of websocket input
    #[arg(long)]
    autopilot: bool,

    /// Start/finish position as a centerline point index
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    start_offset: isize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vehicle_dynamics=info,vehicle_dynamics_server=info")),
        )
        .init();

    let args = Args::parse();
    info!("starting vehicle dynamics server");

    // -------------------------------
    // Vehicle + controller config
    // -------------------------------
    let (accel_cfg, geometry, steering, max_steer_rate, mpcc_cfg) = match &args.params_dir {
        Some(dir) => {
            let p = setup_vehicle_parameters(args.vehicle_id, dir)
                .with_context(|| format!("loading vehicle {} from {}", args.vehicle_id, dir.display()))?;
            let rate = if p.steering.v_max > 0.0 { p.steering.v_max } else { COMPACT_EV_MAX_STEER_RATE };
            (
                p.final_accel_config(COMPACT_EV),
                p.geometry(),
                p.steering_bounds(),
                rate,
                p.mpcc_config(MpccConfig::default()),
            )
        }
        None => (
            COMPACT_EV,
            COMPACT_EV_GEOMETRY,
            COMPACT_EV_STEERING,
            COMPACT_EV_MAX_STEER_RATE,
            MpccConfig::default(),
        ),
    };

    let track = demo_track(args.start_offset).context("building demo track")?;
    info!(track = %track.id, length = track.length, "track ready");

    let vehicle = Vehicle::new(accel_cfg, geometry, steering, max_steer_rate).context("vehicle config")?;

    let autopilot = if args.autopilot {
        let client = MpccClient::spawn().context("spawning mpcc worker")?;
        client.init(mpcc_cfg, track.clone())?.await.context("mpcc init")?;
        info!("autopilot engaged");
        Some(client)
    } else {
        None
    };

    let mut sim = Simulation::new(vehicle, track, autopilot);

    // -------------------------------
    // WebSocket server
    // -------------------------------
    let state = Arc::new(Mutex::new(SharedSimState::new()));
    let server_state = Arc::clone(&state);
    let bind = args.bind;
    tokio::spawn(async move {
        if let Err(err) = start_websocket_server(bind, server_state).await {
            error!(%err, "websocket server stopped");
        }
    });

    // -------------------------------
    // Fixed timestep loop
    // -------------------------------
    let dt = 1.0 / args.tick_hz as f64;
    let mut ticker = interval(Duration::from_secs_f64(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }

        let mut game = state.lock().await;
        game.tick += 1;
        let snapshot = sim.tick(game.tick, dt, game.input);
        if let Err(err) = game.broadcast_snapshot(&snapshot) {
            error!(%err, "snapshot serialization failed");
        }
    }

    sim.shutdown().await;
    Ok(())
}
