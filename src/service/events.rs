use crate::commissioning::{CloseReason, OpenTrigger};
use crate::model::{AttributeId, EndpointId, FeatureType, Value};
use crate::zones::ZoneId;

/// Typed events the service fans out to registered listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A commissioned zone connected.
    Connected { zone: ZoneId },
    /// A zone connection ended; the zone stays commissioned.
    Disconnected { zone: ZoneId },
    /// The commissioning window opened; pairing material is live.
    CommissioningOpened {
        trigger: OpenTrigger,
        qr_payload: String,
    },
    /// The commissioning window closed.
    CommissioningClosed { reason: CloseReason },
    /// A zone stayed silent past its failsafe duration.
    FailsafeTriggered { zone: ZoneId },
    /// A silent zone spoke again.
    FailsafeCleared { zone: ZoneId },
    /// An attribute mutated.
    ValueChanged {
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
        value: Value,
    },
    /// A persisted zone was restored at startup.
    ZoneRestored { zone: ZoneId },
    /// A zone was removed by administrative command.
    ZoneRemoved { zone: ZoneId },
}
