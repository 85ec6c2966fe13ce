/// Push and health handlers for the trigger surface
use actix_web::{http::header, web, HttpResponse, Result as ActixResult};
use serde_json::json;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::NotificationMessage;
use crate::services::NotificationRelay;

/// Push a notification to a session
///
/// POST /api/PushNotification
pub async fn push_notification(
    relay: web::Data<Arc<NotificationRelay>>,
    body: web::Json<NotificationMessage>,
) -> ActixResult<HttpResponse> {
    let status = relay.push_notification(body.into_inner()).await;

    if status.is_success() {
        Ok(HttpResponse::Ok().json(json!({ "success": "true" })))
    } else {
        Ok(HttpResponse::InternalServerError().json(json!({ "success": "false" })))
    }
}

/// Connected clients and notifications processed so far
///
/// GET /api/PushNotification
pub async fn health_check(relay: web::Data<Arc<NotificationRelay>>) -> ActixResult<HttpResponse> {
    let snapshot = relay.health_check_data().await;

    Ok(HttpResponse::Ok()
        .insert_header((
            header::CACHE_CONTROL,
            "private, no-cache, no-store, must-revalidate",
        ))
        .insert_header((header::EXPIRES, "-1"))
        .insert_header((header::PRAGMA, "no-cache"))
        .json(snapshot))
}

/// Undecodable push bodies answer 400 in the relay's own JSON shape
fn push_body_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api").service(
            web::resource("/PushNotification")
                .app_data(push_body_config())
                .route(web::post().to(push_notification))
                .route(web::get().to(health_check)),
        ),
    );
}
