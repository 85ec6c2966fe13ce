use actix::{Actor, ActorContext, AsyncContext, Handler, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::Instant;

use super::connection::{ConnectionCommand, WsConnection};
use super::messages::WsFrame;
use crate::config::WebSocketConfig;
use crate::models::{ConnectionId, HandshakeMetadata};
use crate::services::NotificationRelay;

/// WebSocket actor serving one client connection
pub struct WsSession {
    connection_id: ConnectionId,
    connection: Option<Arc<WsConnection>>,
    metadata: HandshakeMetadata,
    relay: Arc<NotificationRelay>,
    settings: WebSocketConfig,
    hb: Instant,
}

impl WsSession {
    pub fn new(
        metadata: HandshakeMetadata,
        relay: Arc<NotificationRelay>,
        settings: WebSocketConfig,
    ) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            connection: None,
            metadata,
            relay,
            settings,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let client_timeout = self.settings.client_timeout();
        ctx.run_interval(self.settings.heartbeat_interval(), move |act, ctx| {
            if Instant::now().duration_since(act.hb) > client_timeout {
                tracing::warn!(
                    connection_id = %act.connection_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_frame(&self, text: &str) {
        match WsFrame::from_json(text) {
            Ok(WsFrame::Ack { id, payload }) => {
                let resolved = self
                    .connection
                    .as_ref()
                    .map(|conn| conn.resolve(id, payload))
                    .unwrap_or(false);
                if !resolved {
                    tracing::warn!(
                        connection_id = %self.connection_id,
                        request_id = id,
                        "Dropping acknowledgment for unknown request"
                    );
                }
            }
            Ok(WsFrame::Request { event, .. }) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    event = %event,
                    "Client-initiated requests are not supported"
                );
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    "Failed to parse WS frame: {}",
                    e
                );
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            connection_id = %self.connection_id,
            session_id = ?self.metadata.session_id,
            "WebSocket session started"
        );

        self.hb(ctx);

        let connection = Arc::new(WsConnection::new(
            self.connection_id,
            ctx.address().recipient(),
        ));
        self.connection = Some(connection.clone());

        let relay = self.relay.clone();
        let metadata = self.metadata.clone();
        actix::spawn(async move {
            relay.handle_connect(connection, &metadata).await;
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            connection_id = %self.connection_id,
            "WebSocket session stopped"
        );

        if let Some(connection) = self.connection.take() {
            connection.shutdown();
        }

        let relay = self.relay.clone();
        let metadata = self.metadata.clone();
        let connection_id = self.connection_id;
        actix::spawn(async move {
            relay.handle_disconnect(connection_id, &metadata).await;
        });
    }
}

impl Handler<ConnectionCommand> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: ConnectionCommand, ctx: &mut Self::Context) {
        match msg {
            ConnectionCommand::Send(text) => ctx.text(text),
            ConnectionCommand::Close => {
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some("superseded by a newer connection".to_string()),
                }));
                ctx.stop();
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_frame(&text);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("WebSocket close message received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(connection_id = %self.connection_id, "WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}
