use crate::zones::{ZoneId, ZoneType};

/// Per-request caller identity injected by the transport layer.
///
/// Every incoming operation is dispatched with the authenticated zone identity
/// of its connection; internal device code uses [`RequestContext::internal`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    zone_id: Option<ZoneId>,
    zone_type: Option<ZoneType>,
    connection_id: Option<String>,
}

impl RequestContext {
    /// Creates a context for an authenticated zone.
    #[must_use]
    pub fn for_zone(zone_id: ZoneId, zone_type: ZoneType) -> Self {
        Self {
            zone_id: Some(zone_id),
            zone_type: Some(zone_type),
            connection_id: None,
        }
    }

    /// Creates a context for device-internal operations.
    #[must_use]
    pub fn internal() -> Self {
        Self::default()
    }

    /// Attaches the transport connection identity.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    /// Returns the authenticated zone identity, if any.
    #[must_use]
    pub fn zone_id(&self) -> Option<&ZoneId> {
        self.zone_id.as_ref()
    }

    /// Returns the authenticated zone type, if any.
    #[must_use]
    pub fn zone_type(&self) -> Option<ZoneType> {
        self.zone_type
    }

    /// Returns the transport connection identity, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }
}
