mod events;
#[allow(clippy::module_inception)]
mod service;

pub use self::events::DeviceEvent;
pub use self::service::{CHARGER_ENDPOINT, DeviceService, ServiceConfig, ServiceError};

use async_trait::async_trait;

use crate::subscriptions::Notification;

/// Transport contract for delivering subscription traffic to connected
/// zones.
///
/// The core never opens sockets itself; a transport implementation registers
/// through [`DeviceService::set_notification_transport`] and routes each
/// notification to the connection of its zone.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Delivers one notification; implementations own retry policy.
    async fn deliver(&self, notification: Notification);
}
