use crate::cli::ServeArgs;
use crate::infra::{in_memory_service, AppState};
use crate::routes::with_donation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use donor_match::config::AppConfig;
use donor_match::error::AppError;
use donor_match::telemetry;
use donor_match::workflows::donation::{load_donors, spawn_delivery, TracingSink};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let donors = match args.donors.take() {
        Some(path) => {
            let donors = load_donors(&path)?;
            info!(path = %path.display(), donors = donors.len(), "donor roster loaded");
            donors
        }
        None => Vec::new(),
    };

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (service, receiver) = in_memory_service(donors, &config);
    spawn_delivery(
        receiver,
        Arc::new(TracingSink),
        config.notifications.delivery_policy(),
    );

    let app = with_donation_routes(Arc::new(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "donation matching service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
