/// WebSocket upgrade endpoint
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;

use crate::config::Config;
use crate::models::HandshakeMetadata;
use crate::services::NotificationRelay;
use crate::websocket::WsSession;

/// Upgrade to a relay WebSocket
///
/// GET /socket?sessionID={id}
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<HandshakeMetadata>,
    relay: web::Data<Arc<NotificationRelay>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, Error> {
    let session = WsSession::new(
        query.into_inner(),
        relay.get_ref().clone(),
        config.websocket.clone(),
    );

    ws::WsResponseBuilder::new(session, &req, stream)
        .frame_size(config.websocket.max_frame_size)
        .start()
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/socket", web::get().to(ws_handler));
}
