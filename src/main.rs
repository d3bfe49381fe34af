//! Step Sensor Agent CLI
//!
//! Drives the step counter plugin against a simulated device.

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, RecvTimeoutError};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use step_sensor_agent::{
    bridge::{PluginCall, StepCounterPlugin, GET_STEPS, START_TRACKING, STOP_TRACKING},
    config::Config,
    core::TrackingController,
    permission::{requires_runtime_grant, PermissionGate, SimulatedPermissionPlatform},
    sensor::{SensorKind, SensorSource, SimulatedSensorService},
    stats::create_shared_stats_with_persistence,
    Invocation, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "step-sensor")]
#[command(version = VERSION)]
#[command(about = "Step counting on top of hardware step sensors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a simulated step sensor through the plugin
    Simulate {
        /// Step sensors the simulated device exposes
        #[arg(long, value_enum, default_value = "cumulative")]
        sensor: SensorArg,

        /// Number of steps to walk
        #[arg(long, default_value = "20")]
        steps: u64,

        /// Step counter total since boot when the simulation starts
        #[arg(long, default_value = "0")]
        boot_count: u64,

        /// Delay between steps in milliseconds (defaults to the configured interval)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Step length in meters (defaults to the configured length)
        #[arg(long)]
        step_length: Option<f64>,

        /// Deny the activity recognition prompt
        #[arg(long)]
        deny: bool,
    },

    /// Serve the plugin over HTTP for script layer development
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind on 127.0.0.1 (0 picks a free port)
        #[arg(long, default_value = "7420")]
        port: u16,

        /// Step sensors the simulated device exposes
        #[arg(long, value_enum, default_value = "cumulative")]
        sensor: SensorArg,

        /// Step counter total since boot
        #[arg(long, default_value = "0")]
        boot_count: u64,
    },

    /// Show permission requirements and session statistics
    Status,

    /// Show configuration
    Config,

    /// Set and save the step length in meters
    SetStepLength { meters: f64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum SensorArg {
    Cumulative,
    Pulse,
    Both,
    #[value(name = "none")]
    NoSensor,
}

impl SensorArg {
    fn kinds(self) -> Vec<SensorKind> {
        match self {
            SensorArg::Cumulative => vec![SensorKind::StepCounterCumulative],
            SensorArg::Pulse => vec![SensorKind::StepDetectorPulse],
            SensorArg::Both => vec![
                SensorKind::StepCounterCumulative,
                SensorKind::StepDetectorPulse,
            ],
            SensorArg::NoSensor => Vec::new(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            sensor,
            steps,
            boot_count,
            interval_ms,
            step_length,
            deny,
        } => cmd_simulate(sensor, steps, boot_count, interval_ms, step_length, deny),
        #[cfg(feature = "server")]
        Commands::Serve {
            port,
            sensor,
            boot_count,
        } => cmd_serve(port, sensor, boot_count),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
        Commands::SetStepLength { meters } => cmd_set_step_length(meters),
    }
}

fn cmd_simulate(
    sensor: SensorArg,
    steps: u64,
    boot_count: u64,
    interval_ms: Option<u64>,
    step_length: Option<f64>,
    deny: bool,
) -> anyhow::Result<()> {
    println!("Step Sensor Agent v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_default();
    if let Some(length) = step_length {
        config.step_length_meters = length;
    }
    config.validate()?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or(config.simulation_interval);

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let sensors = Arc::new(SimulatedSensorService::new(&sensor.kinds()).with_boot_count(boot_count));
    let permissions = Arc::new(SimulatedPermissionPlatform::new(
        config.permission.platform_api_level,
    ));

    let controller = Arc::new(TrackingController::new(
        SensorSource::new(sensors.clone()),
        config.controller_config(),
        stats.clone(),
    ));
    let (update_tx, update_rx) = bounded(1_000);
    controller.attach_sink(update_tx);

    let gate = PermissionGate::new(permissions.clone(), stats.clone());
    let plugin = StepCounterPlugin::load(controller, gate);

    println!("Simulating {steps} steps");
    println!("  Step length: {:.2} m", config.step_length_meters);
    println!("  Step interval: {} ms", interval.as_millis());
    println!(
        "  Platform API level: {}",
        config.permission.platform_api_level
    );
    println!();

    let (call, answer) = PluginCall::with_channel(START_TRACKING, json!({}));
    if let Invocation::Pending(id) = plugin.dispatch(call) {
        println!("Activity recognition permission requested (operation {id})");
        println!(
            "  Simulated user {} the request",
            if deny { "denies" } else { "allows" }
        );
        permissions.decide(!deny);
    }

    match answer.recv().context("startTracking was never answered")? {
        Ok(response) => {
            println!(
                "Tracking: {} ({})",
                response.status,
                response.sensor_type.unwrap_or_else(|| "unknown sensor".to_string())
            );
        }
        Err(rejection) => {
            save_stats(&stats);
            return Err(rejection).context("startTracking rejected");
        }
    }

    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let walker = {
        let sensors = sensors.clone();
        let running = running.clone();
        thread::spawn(move || {
            for _ in 0..steps {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                thread::sleep(interval);
                sensors.step();
            }
            running.store(false, Ordering::SeqCst);
        })
    };

    loop {
        match update_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(update) => println!(
                "[{}] stepUpdate: {} steps, {:.2} m",
                Local::now().format("%H:%M:%S"),
                update.steps,
                update.distance
            ),
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let _ = walker.join();

    let (call, answer) = PluginCall::with_channel(GET_STEPS, json!({}));
    plugin.dispatch(call);
    if let Ok(Ok(response)) = answer.recv() {
        println!();
        println!(
            "Total: {} steps, {:.2} m",
            response.steps, response.distance
        );
    }

    let (call, _answer) = PluginCall::with_channel(STOP_TRACKING, json!({}));
    plugin.dispatch(call);

    println!();
    println!("{}", stats.summary());
    save_stats(&stats);
    Ok(())
}

fn save_stats(stats: &step_sensor_agent::SessionStats) {
    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16, sensor: SensorArg, boot_count: u64) -> anyhow::Result<()> {
    use step_sensor_agent::server::{run, ServerConfig};

    let config = Config::load().unwrap_or_default();
    config.validate()?;

    let mut server_config = ServerConfig::new(port, sensor.kinds(), config);
    server_config.boot_count = boot_count;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (addr, shutdown_tx) = run(server_config).await?;
        println!("Step Sensor Agent v{VERSION}");
        println!("Serving the step counter plugin on http://{addr}");
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        Ok(())
    })
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Step Sensor Agent Status");
    println!("========================");
    println!();

    let api_level = config.permission.platform_api_level;
    println!(
        "Activity Recognition Permission: {}",
        if requires_runtime_grant(api_level) {
            "required at runtime"
        } else {
            "not required"
        }
    );
    println!("  Platform API level: {api_level}");
    println!();

    println!("Configuration:");
    println!("  Step length: {:.2} m", config.step_length_meters);
    let ladder: Vec<String> = config
        .sensor
        .rate_ladder
        .iter()
        .map(|rate| rate.to_string())
        .collect();
    println!("  Registration rates: {}", ladder.join(" → "));
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for (key, label) in [
                    ("sessions_started", "Tracking sessions"),
                    ("events_accepted", "Step events accepted"),
                    ("events_discarded", "Step events discarded"),
                    ("permission_requests", "Permission requests"),
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {label}: {value}");
                    }
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_set_step_length(meters: f64) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    config.step_length_meters = meters;
    config.save()?;
    println!("Step length set to {meters:.2} m");
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
