use actix_web::{middleware, web, App, HttpServer};
use notification_relay::{
    config::Config,
    error::AppError,
    handlers::{build_cors, register_notifications, register_websocket},
    logging, metrics,
    services::{HttpStatusReporter, NotificationRelay},
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    logging::init_tracing();

    tracing::info!(
        env = %config.app.env,
        status_endpoint = %config.status_endpoint.url,
        status_method = %config.status_endpoint.method,
        request_timeout_secs = config.websocket.request_timeout_secs,
        heartbeat_interval_secs = config.websocket.heartbeat_interval_secs,
        "Starting notification relay"
    );

    let reporter = Arc::new(HttpStatusReporter::new(&config.status_endpoint)?);
    let relay = Arc::new(NotificationRelay::new(reporter, &config.websocket));

    let addr = config.bind_addr();
    tracing::info!("Starting HTTP server on {}", addr);

    let server_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(relay.clone()))
            .app_data(web::Data::new(server_config.clone()))
            .wrap(build_cors())
            .wrap(middleware::Logger::default())
            .wrap_fn(|req, srv| metrics::track_request(req, srv))
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(|cfg| {
                register_notifications(cfg);
                register_websocket(cfg);
            })
    })
    .bind(&addr)
    .map_err(|e| AppError::StartServer(format!("bind {addr}: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(e.to_string()))
}
