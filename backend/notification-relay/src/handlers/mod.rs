/// HTTP handlers for the relay API
use actix_cors::Cors;
use actix_web::http::header;

pub mod notifications;
pub mod websocket;

pub use notifications::register_routes as register_notifications;
pub use websocket::register_routes as register_websocket;

/// CORS policy for the trigger surface: any origin may push or poll health
pub fn build_cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::ORIGIN,
            header::HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .max_age(3600)
}
