use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};

use transcription_relay::config::RelayConfig;
use transcription_relay::config_loader::load_config;
use transcription_relay::config_validator::validate_environment;
use transcription_relay::handlers::configure;
use transcription_relay::metrics::{create_metrics_exporter, Metrics};
use transcription_relay::progress::ProgressEstimator;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Seed the environment from the configuration file, then validate it
    load_config();
    let validation = validate_environment();
    if !validation.is_valid {
        error!("Invalid configuration, refusing to start");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid configuration",
        ));
    }

    let config = RelayConfig::default();

    // Initialize metrics
    let metrics = Metrics::new(create_metrics_exporter(&config.metrics_backend));

    // Start times of transcriptions, shared by all workers
    let estimator = Arc::new(ProgressEstimator::new());
    estimator
        .clone()
        .start_cleanup_task(config.progress_cleanup_interval, config.progress_retention);

    // One connection pool for every upstream call
    let http = reqwest::Client::new();

    let bind_address = format!("{}:{}", config.host, config.port);
    let workers = config.worker_count();

    info!("Starting transcription relay on http://{}", bind_address);
    match (&config.api_endpoint, &config.api_key) {
        (Some(endpoint), Some(_)) => info!("Default upstream endpoint: {}", endpoint),
        _ => warn!(
            "No default upstream configured, requests must send x-api-endpoint and x-api-key"
        ),
    }
    info!("Metrics exporter: {}", config.metrics_backend);
    info!("HTTP workers: {}", workers);

    let config = web::Data::new(config);
    let estimator = web::Data::from(estimator);
    let metrics = web::Data::new(metrics);
    let http = web::Data::new(http);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(config.clone())
            .app_data(estimator.clone())
            .app_data(metrics.clone())
            .app_data(http.clone())
            .configure(configure)
    })
    .workers(workers)
    .bind(bind_address)?
    .run()
    .await
}
