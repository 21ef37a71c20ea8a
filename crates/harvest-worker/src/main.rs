//! Harvest worker binary.

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use harvest_worker::metrics::init_metrics;
use harvest_worker::{HarvestConfig, Harvester};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("harvest=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting harvest-worker");

    let config = match HarvestConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Harvest config: {:?}", config);

    if let Some(addr) = &config.metrics_addr {
        if let Err(e) = init_metrics(addr) {
            error!("{}", e);
            std::process::exit(1);
        }
        info!(addr = %addr, "Prometheus exporter listening");
    }

    let harvester = match Harvester::from_config(config) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to create harvester: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl-C stops dispatching; in-flight items finish and pending writes are flushed.
    let cancel = harvester.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling run");
            cancel.cancel();
        }
    });

    match harvester.run().await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                entities = report.entities,
                successes = report.result.successes,
                failures = report.result.failures,
                skipped = report.result.skipped,
                dead_letters = report.dead_letters.len(),
                timeout_rate = report.analysis.timeout_rate,
                "Harvest finished"
            );
            for key in report.result.failed_keys() {
                warn!(item = %key, "Item failed and can be retried");
            }
            if report.result.failures > 0 || !report.dead_letters.is_empty() {
                std::process::exit(2);
            }
        }
        Err(e) => {
            error!("Harvest aborted: {}", e);
            std::process::exit(1);
        }
    }
}
