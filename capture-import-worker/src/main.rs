use std::future::ready;
use std::sync::Arc;

use anyhow::{Context as _, Error};
use axum::{routing::get, Router};
use capture_import_worker::{
    config::{Config, DiscoveryMode},
    context::AppContext,
    emit::{Emitter, EmitterKind, KafkaEmitter, NoOpEmitter, StdoutEmitter},
    pipeline::IngestPipeline,
    source::{ContainerListSource, DiscoverySource, QueueSource},
    storage::{BlobStore, MessageQueue},
    worker::{CaptureWorker, QueueRetirement},
};
use envconfig::Envconfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "capture import worker"
}

fn start_health_liveness_server(context: &AppContext) -> Result<JoinHandle<()>, Error> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;
    let liveness = context.liveness.clone();
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/metrics", get(move || ready(metrics.render())));
    let bind = context.config.bind();
    Ok(tokio::task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .expect("failed to bind status server");
        axum::serve(listener, router)
            .await
            .expect("failed to serve status routes");
    }))
}

fn spawn_shutdown_listener() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
        trigger.cancel();
    });
    token
}

fn build_emitter(config: &Config) -> Result<Arc<dyn Emitter>, Error> {
    Ok(match config.emitter.parse::<EmitterKind>()? {
        EmitterKind::Kafka => Arc::new(KafkaEmitter::new(config)?),
        EmitterKind::Stdout => Arc::new(StdoutEmitter),
        EmitterKind::NoOp => Arc::new(NoOpEmitter),
    })
}

fn build_source(
    context: &AppContext,
) -> Result<(Arc<dyn DiscoverySource>, Option<QueueRetirement>), Error> {
    match &context.discovery_mode {
        DiscoveryMode::Listing(containers) => {
            let store: Arc<dyn BlobStore> = context.blob_client.clone();
            let source = ContainerListSource::new(store, containers.clone());
            Ok((Arc::new(source), None))
        }
        DiscoveryMode::Queue(queue_name) => {
            let queue = context
                .queue_client
                .clone()
                .context("queue discovery configured without a queue client")?;
            let messages: Arc<dyn MessageQueue> = queue.clone();
            let source = QueueSource::new(
                messages,
                queue_name.clone(),
                context.config.lease_duration_secs,
                context.config.queue_batch_size,
            );
            let retirement = QueueRetirement {
                queue,
                queue_name: queue_name.clone(),
            };
            Ok((Arc::new(source), Some(retirement)))
        }
    }
}

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env().context("failed to read configuration")?;
    let context = AppContext::new(config)?;

    start_health_liveness_server(&context)?;
    let shutdown = spawn_shutdown_listener();

    let emitter = build_emitter(&context.config)?;
    let (source, retirement) = build_source(&context)?;
    let store: Arc<dyn BlobStore> = context.blob_client.clone();
    let pipeline = Arc::new(IngestPipeline::new(
        store,
        emitter,
        context.config.tag.clone(),
        context.config.message_key.clone(),
        context.config.lease_duration_secs,
    ));

    let worker = CaptureWorker::new(
        pipeline,
        source,
        retirement,
        context.config.fetch_interval(),
        context.config.max_concurrent_ingests,
        context.worker_liveness.clone(),
    );

    worker.run(shutdown).await;

    info!("Shutting down");
    Ok(())
}
