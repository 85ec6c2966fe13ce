pub mod dispatcher;
pub mod handshake;
pub mod relay;
pub mod status_notifier;

pub use dispatcher::{AckResult, DispatchCounters, DispatchReceipt, NotificationDispatcher};
pub use handshake::{RegistrationFailure, RegistrationHandshake, RegistrationOutcome};
pub use relay::NotificationRelay;
pub use status_notifier::{HttpStatusReporter, StatusNotifier, StatusReportResponse, StatusReporter};
