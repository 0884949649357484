use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use socketioxide::SocketIo;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use broz_matching::config::AppConfig;
use broz_matching::profile::{HttpProfileDirectory, ProfileDirectory};
use broz_matching::{events, guardians, orchestrator, routes, socket, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    broz_shared::middleware::init_tracing("broz-matching");

    let config = Arc::new(AppConfig::load()?);
    let port = config.port;

    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    let db = Pool::builder().max_size(10).build(manager)?;

    let rabbitmq = broz_shared::clients::rabbitmq::RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = broz_shared::clients::redis::RedisClient::connect(&config.redis_url).await?;

    let directory: Arc<dyn ProfileDirectory> =
        Arc::new(HttpProfileDirectory::new(config.user_service_url.clone()));

    let metrics_handle = broz_shared::middleware::init_metrics();

    let state = Arc::new(AppState {
        db: db.clone(),
        config: config.clone(),
        rabbitmq: rabbitmq.clone(),
        redis,
        directory: directory.clone(),
        metrics_handle,
    });

    // Socket.IO setup — the only path by which REST-driven state changes
    // reach a connected client faster than the next `GET /status` poll.
    let (sio_layer, io) = SocketIo::builder().with_state(state.clone()).build_layer();

    io.ns("/", socket::handlers::on_connect);

    // Background workers: the Matching Orchestrator's periodic cycle and
    // the Guardian reconciliation sweep both run for the lifetime of the
    // process, independent of any one request.
    orchestrator::spawn_periodic_cycle(db.clone(), directory.clone(), config.clone(), rabbitmq.clone());
    guardians::spawn_periodic_sweep(db.clone(), directory.clone(), config.clone(), rabbitmq.clone());

    // Bridges this service's own published events back out over Socket.IO.
    {
        let rabbitmq = rabbitmq.clone();
        let io = io.clone();
        tokio::spawn(async move {
            if let Err(e) = events::subscriber::bridge_to_sockets(rabbitmq, io).await {
                tracing::error!(error = %e, "matching socket bridge failed");
            }
        });
    }

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/matching/spin", post(routes::matching::spin))
        .route("/matching/ack", post(routes::matching::ack))
        .route("/matching/reveal-complete", post(routes::matching::reveal_complete))
        .route("/matching/vote", post(routes::matching::vote))
        .route("/matching/heartbeat", post(routes::matching::heartbeat))
        .route("/matching/leave", post(routes::matching::leave))
        .route("/matching/status", get(routes::matching::status))
        .route("/matching/admin/participants/suppressed", get(routes::admin::list_suppressed))
        .route("/matching/admin/participants/:id/clear-fatal", post(routes::admin::clear_fatal))
        .route("/matching/admin/matches/:id/complete", post(routes::admin::complete_session))
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "broz-matching starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
