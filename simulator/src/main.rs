use anyhow::Context;
use beaconcore::interface::BeaconReading;
use beaconcore::prelude::{Clock, MonotonicClock};
use beaconcore::runtime::{lock_engine, run_engine, shared, SharedEngine};
use beaconcore::FusionLoop;
use clap::Parser;
use generator::profile::{build_readings, ContextTrack};
use gui_bridge::bridge::GuiBridge;
use gui_bridge::model::RiskViewModel;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use tokio::sync::watch;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "BeaconGuard scenario driver and live bridge")]
struct Args {
    /// Replay the scenario on a virtual clock and emit a risk summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    #[arg(long, default_value_t = 40_000)]
    duration_ms: u64,
    #[arg(long, default_value_t = 20)]
    window: usize,
    /// Run the live engine behind the HTTP bridge
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Feed the generated scenario into the live engine in real time
    #[arg(long, default_value_t = false)]
    replay: bool,
    #[arg(long, default_value_t = 9000)]
    port: u16,
    /// Where the offline summary line is appended
    #[arg(long, default_value = "tools/data/offline_risk.log")]
    report: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.seed, args.duration_ms, args.window)
    };

    if args.offline {
        run_offline(&workflow_config, &args.report)?;
    }
    if args.serve {
        run_live(workflow_config, args.port, args.replay)?;
    }

    Ok(())
}

fn run_offline(config: &WorkflowConfig, report_path: &Path) -> anyhow::Result<()> {
    let runner = Runner::new(config.clone());
    let result = runner.run_scenario()?;

    println!(
        "Offline run -> ticks {}, peak {}, danger ticks {}, warn ticks {}, corrections {}",
        result.ticks,
        result.peak_risk.as_str(),
        result.danger_ticks,
        result.warn_ticks,
        result.corrections
    );

    let report = format!(
        "scenario={} ticks={} peak={} danger={} warn={} link_events={} metrics={}\n",
        runner.config().scenario.name.as_deref().unwrap_or("unnamed"),
        result.ticks,
        result.peak_risk.as_str(),
        result.danger_ticks,
        result.warn_ticks,
        result.link_events.len(),
        serde_json::to_string(&result.metrics).context("encoding metrics")?
    );
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(report_path)
        .with_context(|| format!("opening {}", report_path.display()))?;
    file.write_all(report.as_bytes())?;
    Ok(())
}

fn run_live(mut config: WorkflowConfig, port: u16, replay: bool) -> anyhow::Result<()> {
    config.engine.schedule.background_training = true;
    let engine = shared(FusionLoop::new(config.engine.clone()).context("building fusion engine")?);
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let readings = if replay {
        build_readings(&config.scenario)?
    } else {
        Vec::new()
    };

    let bridge = GuiBridge::new(Arc::clone(&engine), Arc::clone(&clock));
    bridge.publish(&RiskViewModel::with_status("waiting for transport"));
    bridge.serve(port);
    bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime for the live engine")?;
    runtime.block_on(async {
        let (stop, shutdown) = watch::channel(false);
        let context = ContextTrack::new(config.scenario.context.clone(), config.scenario.seed);
        let scheduler = tokio::spawn(run_engine(
            Arc::clone(&engine),
            Arc::clone(&clock),
            context,
            bridge.sink(),
            shutdown,
        ));
        if replay {
            tokio::spawn(replay_readings(
                Arc::clone(&engine),
                Arc::clone(&clock),
                readings,
            ));
        }

        signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
        let _ = stop.send(true);
        scheduler.await.context("joining scheduler")?;
        Ok::<(), anyhow::Error>(())
    })?;

    bridge.publish_status("stopped");
    Ok(())
}

/// Paces scenario packets against the live clock, as a transport adapter would.
async fn replay_readings(
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
    readings: Vec<BeaconReading>,
) {
    let origin = clock.now_ms();
    let event = lock_engine(&engine).connect(origin);
    if let Some(event) = event {
        log::info!("replay connected: {:?}", event);
    }
    for reading in readings {
        let due = origin + reading.received_at;
        let now = clock.now_ms();
        if due > now {
            tokio::time::sleep(Duration::from_millis(due - now)).await;
        }
        let live = BeaconReading::new(reading.object_id, reading.rssi_dbm, clock.now_ms());
        lock_engine(&engine).ingest(&live);
    }
    log::info!("replay finished");
}
