use anyhow::{Context, Result};
use clap::Parser;
use device_gateway::asr::NatsRecognitionFactory;
use device_gateway::protocol::subject_to_topic;
use device_gateway::{
    create_router, AppState, Config, ControlPlane, DeviceEvents, Gateway, InboundMessage,
    LivenessSupervisor, NatsClient, SessionReaper, SessionRegistry, StreamingRecognizer,
    UdpSessionTable,
};
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "device-gateway")]
#[command(about = "Session gateway for voice-assistant devices")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/device-gateway")]
    config: String,

    /// Log filter, overrides service.log_level (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let level = args.log_level.as_deref().unwrap_or(&cfg.service.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Control subject: {}", cfg.nats.control_subject);
    info!(
        "UDP endpoint advertised as {}:{}",
        cfg.udp.external_host, cfg.udp.external_port
    );

    let nats = Arc::new(NatsClient::connect(&cfg.nats.url).await?);
    let control: Arc<dyn ControlPlane> = nats.clone();

    let registry = Arc::new(SessionRegistry::new());
    let transport = Arc::new(UdpSessionTable::new(
        cfg.udp.external_host.clone(),
        cfg.udp.external_port,
    ));
    let events = DeviceEvents::new(
        Arc::clone(&control),
        cfg.nats.device_active_subject.clone(),
        cfg.nats.device_inactive_subject.clone(),
    );
    let reaper = SessionReaper::new(Arc::clone(&registry), transport.clone(), events);

    let recognizer = StreamingRecognizer::new(
        Arc::new(NatsRecognitionFactory::new(
            Arc::clone(&nats),
            cfg.recognition_subjects(),
        )),
        cfg.recognition.result_buffer,
    );

    let gateway = Arc::new(Gateway::new(
        reaper.clone(),
        transport,
        Arc::clone(&control),
        recognizer,
        cfg.gateway_settings(),
    ));

    let shutdown = CancellationToken::new();

    // Liveness supervisor
    let supervisor = LivenessSupervisor::new(reaper, cfg.sweep_interval());
    let supervisor_task = tokio::spawn(supervisor.run(shutdown.clone()));

    // Control plane
    let subscriber = nats.subscribe(cfg.nats.control_subject.clone()).await?;
    let inbound = Box::pin(subscriber.map(|msg| {
        InboundMessage::new(subject_to_topic(&msg.subject.to_string()), msg.payload.to_vec())
    }));
    let control_task = tokio::spawn(Arc::clone(&gateway).serve(inbound, shutdown.clone()));

    // Admin API
    let listener = tokio::net::TcpListener::bind((cfg.http.bind.as_str(), cfg.http.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", cfg.http.bind, cfg.http.port))?;
    info!("HTTP admin API listening on {}:{}", cfg.http.bind, cfg.http.port);

    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(listener, create_router(AppState::new(gateway)))
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    shutdown.cancel();

    if let Err(e) = supervisor_task.await {
        error!("Supervisor task panicked: {}", e);
    }
    if let Err(e) = control_task.await {
        error!("Control task panicked: {}", e);
    }
    match http_task.await {
        Ok(Err(e)) => error!("HTTP server failed: {}", e),
        Err(e) => error!("HTTP task panicked: {}", e),
        Ok(Ok(())) => {}
    }

    nats.flush().await?;

    Ok(())
}
