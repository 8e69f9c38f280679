use crate::gui_bridge::decoder::decode_batch;
use crate::gui_bridge::model::RiskViewModel;
use beaconcore::interface::{BeaconReading, LinkEvent, TickReport};
use beaconcore::prelude::{Clock, RiskSink};
use beaconcore::runtime::{lock_engine, SharedEngine};
use beaconcore::telemetry::MetricsRecorder;
use serde::Deserialize;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock, RwLockWriteGuard},
    thread,
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, hyper::body::Bytes, Filter};

const MAX_BODY_BYTES: u64 = 64 * 1024;

type SharedView = Arc<RwLock<RiskViewModel>>;

fn bind_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn read_view(state: &SharedView) -> RiskViewModel {
    match state.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write_view(state: &SharedView) -> RwLockWriteGuard<'_, RiskViewModel> {
    state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn record_link(state: &SharedView, event: Option<LinkEvent>) {
    if let Some(event) = event {
        write_view(state).last_link_event = Some(event);
    }
}

/// Single JSON packet posted by a transport adapter.
#[derive(Debug, Deserialize)]
struct IngestRequest {
    object_id: String,
    rssi_dbm: i32,
}

/// HTTP surface for transports and dashboards.
pub struct GuiBridge {
    state: SharedView,
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
}

impl GuiBridge {
    pub fn new(engine: SharedEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(RiskViewModel::with_status("starting"))),
            engine,
            clock,
        }
    }

    /// Serves the routes from a dedicated thread until the process exits.
    pub fn serve(&self, port: u16) {
        let routes = routes(
            Arc::clone(&self.state),
            Arc::clone(&self.engine),
            Arc::clone(&self.clock),
        );
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("bridge runtime failed to start: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                match warp::serve(routes).try_bind_ephemeral(bind_address(port)) {
                    Ok((address, server)) => {
                        log::info!("bridge listening on http://{}", address);
                        server.await;
                    }
                    Err(err) => log::error!("bridge failed to bind port {}: {}", port, err),
                }
            });
        });
    }

    pub fn publish(&self, model: &RiskViewModel) {
        let mut guard = write_view(&self.state);
        *guard = model.clone();
        log::info!(
            "[bridge] aggregate {}, {} active objects",
            guard.report.aggregate_risk.as_str(),
            guard.report.active_object_count
        );
    }

    pub fn publish_status(&self, message: &str) {
        write_view(&self.state).status = message.to_string();
        log::info!("[bridge] {}", message);
    }

    /// Sink that mirrors scheduler output into the served view.
    pub fn sink(&self) -> BridgeSink {
        BridgeSink {
            state: Arc::clone(&self.state),
            metrics: lock_engine(&self.engine).metrics(),
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> RiskViewModel {
        read_view(&self.state)
    }
}

pub struct BridgeSink {
    state: SharedView,
    metrics: Arc<MetricsRecorder>,
}

impl RiskSink for BridgeSink {
    fn publish(&mut self, report: &TickReport) {
        let metrics = self.metrics.snapshot();
        let mut guard = write_view(&self.state);
        guard.report = report.clone();
        guard.metrics = metrics;
    }

    fn link_changed(&mut self, event: LinkEvent) {
        log::info!("[bridge] link event {:?}", event);
        record_link(&self.state, Some(event));
    }
}

fn routes(
    state: SharedView,
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || Arc::clone(&state));
    let engine_filter = warp::any().map(move || Arc::clone(&engine));
    let clock_filter = warp::any().map(move || Arc::clone(&clock));

    let risk_route = warp::path("risk")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedView| warp::reply::json(&read_view(&state)));

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(engine_filter.clone())
        .map(|engine: SharedEngine| {
            let snapshot = lock_engine(&engine).metrics().snapshot();
            warp::reply::json(&snapshot)
        });

    let ingest_route = warp::path("ingest")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(engine_filter.clone())
        .and(clock_filter.clone())
        .map(
            |request: IngestRequest, engine: SharedEngine, clock: Arc<dyn Clock>| {
                if request.object_id.trim().is_empty() {
                    return warp::reply::with_status(
                        warp::reply::json(&json!({"status": "rejected"})),
                        StatusCode::BAD_REQUEST,
                    );
                }
                let reading =
                    BeaconReading::new(request.object_id, request.rssi_dbm, clock.now_ms());
                lock_engine(&engine).ingest(&reading);
                warp::reply::with_status(
                    warp::reply::json(&json!({"status": "ok"})),
                    StatusCode::OK,
                )
            },
        );

    let line_route = warp::path("ingest-line")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(engine_filter.clone())
        .and(clock_filter.clone())
        .map(|body: Bytes, engine: SharedEngine, clock: Arc<dyn Clock>| {
            let text = String::from_utf8_lossy(&body);
            let (readings, rejected) = decode_batch(&text, clock.now_ms());
            {
                let mut guard = lock_engine(&engine);
                for reading in &readings {
                    guard.ingest(reading);
                }
            }
            if rejected > 0 {
                log::debug!("dropped {} malformed transport lines", rejected);
            }
            warp::reply::json(&json!({"accepted": readings.len(), "rejected": rejected}))
        });

    let connect_route = warp::path("connect")
        .and(warp::path::end())
        .and(warp::post())
        .and(engine_filter.clone())
        .and(clock_filter)
        .and(state_filter.clone())
        .map(
            |engine: SharedEngine, clock: Arc<dyn Clock>, state: SharedView| {
                let event = lock_engine(&engine).connect(clock.now_ms());
                record_link(&state, event);
                warp::reply::json(&json!({ "event": event }))
            },
        );

    let disconnect_route = warp::path("disconnect")
        .and(warp::path::end())
        .and(warp::post())
        .and(engine_filter.clone())
        .and(state_filter)
        .map(|engine: SharedEngine, state: SharedView| {
            let event = lock_engine(&engine).disconnect();
            record_link(&state, event);
            warp::reply::json(&json!({ "event": event }))
        });

    let false_alarm_route = warp::path("false-alarm")
        .and(warp::path::end())
        .and(warp::post())
        .and(engine_filter)
        .map(|engine: SharedEngine| {
            let corrected = lock_engine(&engine).report_false_alarm();
            warp::reply::json(&json!({ "corrected": corrected }))
        });

    risk_route
        .or(metrics_route)
        .or(ingest_route)
        .or(line_route)
        .or(connect_route)
        .or(disconnect_route)
        .or(false_alarm_route)
}
