/// WebSocket transport for the relay
///
/// Architecture:
/// 1. ConnectionRegistry: one live connection per session id
/// 2. WsConnection: correlated request/acknowledge over a session actor
/// 3. WsSession: actix actor owning the socket, heartbeat and frame parsing
/// 4. WsFrame: JSON wire frames

pub mod connection;
pub mod manager;
pub mod messages;
pub mod session;

pub use connection::{ClientConnection, ConnectionCommand, WsConnection};
pub use manager::{ConnectionRecord, ConnectionRegistry};
pub use messages::{WsFrame, NOTIFICATION_EVENT, REGISTER_CLIENT_EVENT};
pub use session::WsSession;
