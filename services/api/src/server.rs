use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_action_routes;
use action_scheduler::config::AppConfig;
use action_scheduler::error::AppError;
use action_scheduler::store::InMemoryActionStore;
use action_scheduler::telemetry;
use action_scheduler::transport::InMemoryExchange;
use action_scheduler::workflows::fulfilment::CaseApiIssuer;
use action_scheduler::workflows::ActionRouterState;
use action_scheduler::Pipeline;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryActionStore::new());
    let exchange = Arc::new(InMemoryExchange::new());
    let issuer = Arc::new(CaseApiIssuer::new(&config.case_api));
    let pipeline = Pipeline::new(config.queues.clone(), store.clone(), issuer, exchange.clone())
        .start(config.schedule.interval);

    let router_state = ActionRouterState {
        store,
        case_queue: pipeline.case_queue().clone(),
        fulfilment_queue: pipeline.fulfilment_queue().clone(),
        exchange,
    };
    let app = with_action_routes(router_state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        schedule = %config.schedule.expression,
        case_api = %config.case_api.base_url,
        "action scheduler ready"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    readiness_flag.store(false, Ordering::Release);
    pipeline.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
