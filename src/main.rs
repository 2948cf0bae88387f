// Redrive - delayed-redelivery scheduler for failed Kafka events
// ============================================================================
//
// One process runs two loops against shared Redis state:
// - the failure intake loop, consuming failure reports and parking them in
//   minute-granular time buckets
// - the drain loop, firing once per interval to republish the entries
//   whose minute has arrived (or dead-letter the exhausted ones)
//
// Horizontal scaling: run N copies of this process in one consumer group.
// Atomic bucket pops plus the GETDEL claim handshake keep redelivery
// at-most-once per identity token across instances.
//
// ============================================================================

use anyhow::{Context, Result};
use redrive::dlq::DeadLetterSink;
use redrive::kafka::{FailureConsumer, RedeliveryPublisher, RetryProducer};
use redrive::scheduler::RetryScheduler;
use redrive::worker::FailureIntake;
use redrive_config::Config;
use redrive_store::RedisStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    let config = Arc::new(config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Redrive Scheduler Starting ===");
    info!("Kafka Brokers: {}", config.kafka.brokers);
    info!("Kafka Topic: {}", config.kafka.topic);
    info!("Kafka Consumer Group: {}", config.kafka.consumer_group);
    info!("Drain Interval: {}s", config.retry.drain_interval_secs);
    info!(
        "Dead-Letter Key: {}",
        config.retry.dead_letter_key.as_deref().unwrap_or("(disabled)")
    );

    if !config.kafka.enabled {
        error!("Kafka is required for the scheduler. Set KAFKA_ENABLED=true");
        anyhow::bail!("Kafka disabled - nothing to schedule");
    }

    // Mask credentials in Redis URL for logging
    let redis_url_safe = if let Some(at_pos) = config.redis_url.find('@') {
        let protocol_end = config.redis_url.find("://").map(|p| p + 3).unwrap_or(0);
        format!(
            "{}***{}",
            &config.redis_url[..protocol_end],
            &config.redis_url[at_pos..]
        )
    } else {
        config.redis_url.clone()
    };
    info!("Connecting to Redis at: {}", redis_url_safe);

    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis");

    // Kafka boundary
    let producer = RetryProducer::new(&config.kafka).context("Failed to initialize producer")?;
    let publisher: Arc<dyn RedeliveryPublisher> = Arc::new(producer.clone());
    let consumer = FailureConsumer::new(&config.kafka).context("Failed to initialize consumer")?;

    let dead_letter = config
        .retry
        .dead_letter_key
        .as_ref()
        .map(|key| DeadLetterSink::new(store.clone(), key.clone()));

    let scheduler = Arc::new(RetryScheduler::new(
        store,
        publisher,
        dead_letter,
        Duration::from_secs(config.retry.drain_interval_secs),
    ));

    // Shutdown flag — set to true on SIGTERM/Ctrl-C
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received, initiating graceful shutdown...");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("SIGINT received, initiating graceful shutdown...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, initiating graceful shutdown...");
        }
        shutdown_signal.store(true, Ordering::SeqCst);
    });

    // Drain loop in the background, intake in the foreground
    let drain_scheduler = scheduler.clone();
    let drain_shutdown = shutdown.clone();
    let drain_handle = tokio::spawn(async move {
        drain_scheduler.run(drain_shutdown).await;
    });

    let intake = FailureIntake::new(consumer, scheduler, config.retry.failure_key.clone());
    intake.run(shutdown).await;

    if let Err(e) = drain_handle.await {
        error!(error = %e, "Drain loop task panicked");
    }

    // Graceful shutdown: flush pending redeliveries before exit
    info!("Shutdown flag set — flushing Kafka producer...");
    if let Err(e) = producer.flush(Duration::from_secs(10)).await {
        error!(error = %e, "Failed to flush Kafka producer on shutdown");
    }

    info!("Redrive scheduler stopped gracefully");
    Ok(())
}
