use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod eventbus;
mod metrics;
mod models;
mod services;

use crate::config::AppConfig;
use crate::eventbus::redis_streams::{RedisStreamsConfig, RedisStreamsEventBus};
use crate::eventbus::streams::{consumer_name, BIDS_INCOMING, ENGAGEMENT_EVENTS, USERS_STATUS};
use crate::eventbus::EventBus;
use crate::services::ingress::{bids, engagement, users};
use crate::services::matching::{Command, EnforcerConfig, Matcher, MatcherConfig};

#[derive(Clone)]
struct AppState {
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attention_matching_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    tracing::info!("starting attention-matching-engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(environment = %config.environment, "loaded configuration");

    let metrics_handle = metrics::init_metrics();

    let event_bus = Arc::new(
        RedisStreamsEventBus::new(RedisStreamsConfig {
            url: config.redis.url.clone(),
            max_retries: config.redis.max_retries,
            retry_delay_ms: config.redis.retry_delay_ms,
            approx_maxlen: config.redis.approx_maxlen,
        })
        .await?,
    );
    tracing::info!("connected to event-bus backend");

    let matcher_config = MatcherConfig {
        match_interval_ms: config.matcher.match_interval_ms,
        prune_interval_ms: config.matcher.prune_interval_ms,
        max_matches_per_iteration: config.matcher.max_matches_per_iteration,
        emit_events: config.matcher.emit_events,
    };
    let enforcer_config = EnforcerConfig {
        min_attention_seconds: config.enforcer.min_attention_seconds,
        heartbeat_timeout_ms: config.enforcer.heartbeat_timeout_ms,
        min_engagement_score: config.enforcer.min_engagement_score,
        min_liveness_score: config.enforcer.min_liveness_score,
        low_engagement_grace_period_sec: config.enforcer.low_engagement_grace_period_sec,
    };

    let (tx, rx) = mpsc::channel::<Command>(1024);
    let matcher = Matcher::new(event_bus.clone(), matcher_config.clone(), enforcer_config, rx);
    let matcher_handle = tokio::spawn(matcher.run());

    let process_id = process::id().to_string();
    let consumer = consumer_name(&process_id);

    spawn_ingress_tasks(event_bus.clone(), tx.clone(), &consumer);
    spawn_scheduler_tasks(tx.clone(), matcher_config.prune_interval_ms, matcher_config.match_interval_ms);

    let state = AppState { metrics_handle };
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    tracing::info!(%addr, "serving health and metrics endpoints");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, draining");
        }
    }

    drop(tx);
    let _ = matcher_handle.await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn spawn_ingress_tasks<B: EventBus + Clone + Send + Sync + 'static>(
    event_bus: Arc<B>,
    tx: mpsc::Sender<Command>,
    consumer: &str,
) {
    let consumer = consumer.to_string();

    {
        let event_bus = event_bus.clone();
        let tx = tx.clone();
        let consumer = consumer.clone();
        tokio::spawn(async move {
            tracing::info!(stream = BIDS_INCOMING, "starting ingress task");
            bids::run((*event_bus).clone(), tx, &consumer).await;
        });
    }
    {
        let event_bus = event_bus.clone();
        let tx = tx.clone();
        let consumer = consumer.clone();
        tokio::spawn(async move {
            tracing::info!(stream = USERS_STATUS, "starting ingress task");
            users::run((*event_bus).clone(), tx, &consumer).await;
        });
    }
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            tracing::info!(stream = ENGAGEMENT_EVENTS, "starting ingress task");
            engagement::run((*event_bus).clone(), tx, &consumer).await;
        });
    }
}

/// Feeds the single command channel with `Tick`/`Sweep` commands on a
/// fixed interval, rather than letting the match loop free-spin (§4.4).
fn spawn_scheduler_tasks(tx: mpsc::Sender<Command>, prune_interval_ms: u64, match_interval_ms: u64) {
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(match_interval_ms));
            loop {
                interval.tick().await;
                let now = chrono::Utc::now().timestamp_millis();
                if tx.send(Command::Tick { now }).await.is_err() {
                    break;
                }
            }
        });
    }
    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(prune_interval_ms));
            loop {
                interval.tick().await;
                let now = chrono::Utc::now().timestamp_millis();
                if tx.send(Command::Sweep { now }).await.is_err() {
                    break;
                }
            }
        });
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_endpoint(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    state.metrics_handle.render()
}
