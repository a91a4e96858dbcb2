use std::time::Duration;

use strum_macros::Display as StrumDisplay;

use crate::model::{AttributeId, CommandId, EndpointId, FeatureType, ParamMap, Value};

/// Protocol operations a controller may request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay)]
pub enum Operation {
    #[strum(to_string = "read")]
    Read,
    #[strum(to_string = "write")]
    Write,
    #[strum(to_string = "invoke")]
    Invoke,
    #[strum(to_string = "subscribe")]
    Subscribe,
    #[strum(to_string = "unsubscribe")]
    Unsubscribe,
}

/// Response status codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay)]
pub enum Status {
    #[strum(to_string = "success")]
    Success,
    #[strum(to_string = "invalid_command")]
    InvalidCommand,
    #[strum(to_string = "constraint_error")]
    ConstraintError,
    #[strum(to_string = "access_denied")]
    AccessDenied,
    #[strum(to_string = "not_found")]
    NotFound,
    #[strum(to_string = "unauthorized")]
    Unauthorized,
    #[strum(to_string = "type_mismatch")]
    TypeMismatch,
    #[strum(to_string = "resource_exhausted")]
    ResourceExhausted,
}

impl Status {
    /// Returns the wire code of this status.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::InvalidCommand => 1,
            Status::ConstraintError => 2,
            Status::AccessDenied => 3,
            Status::NotFound => 4,
            Status::Unauthorized => 5,
            Status::TypeMismatch => 6,
            Status::ResourceExhausted => 7,
        }
    }
}

/// Payload of one decoded request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOperation {
    /// Read one attribute, or all attributes of the feature when `None`.
    Read { attribute: Option<AttributeId> },
    /// Write one attribute.
    Write { attribute: AttributeId, value: Value },
    /// Invoke a command with named parameters.
    Invoke {
        command: CommandId,
        parameters: ParamMap,
    },
    /// Establish a subscription on the addressed feature.
    Subscribe {
        /// Attribute selection; empty subscribes to every attribute.
        attribute_ids: Vec<AttributeId>,
        min_interval: Duration,
        max_interval: Duration,
    },
    /// Tear one subscription down.
    Unsubscribe { subscription_id: u32 },
}

impl RequestOperation {
    /// Returns the operation tag of this payload.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            RequestOperation::Read { .. } => Operation::Read,
            RequestOperation::Write { .. } => Operation::Write,
            RequestOperation::Invoke { .. } => Operation::Invoke,
            RequestOperation::Subscribe { .. } => Operation::Subscribe,
            RequestOperation::Unsubscribe { .. } => Operation::Unsubscribe,
        }
    }
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlates the response; at-most-once per connection.
    pub message_id: u32,
    pub endpoint: EndpointId,
    pub feature: FeatureType,
    pub operation: RequestOperation,
}

/// Typed response payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Single attribute value.
    Value(Value),
    /// Full attribute map of a feature.
    Attributes(std::collections::BTreeMap<AttributeId, Value>),
    /// Command result map.
    Command(ParamMap),
    /// Allocated subscription identity.
    Subscription { subscription_id: u32 },
}

/// One outbound response, correlated by message ID.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message_id: u32,
    pub status: Status,
    pub payload: Option<ResponsePayload>,
}

impl Response {
    /// Creates a success response carrying `payload`.
    #[must_use]
    pub fn success(message_id: u32, payload: ResponsePayload) -> Self {
        Self {
            message_id,
            status: Status::Success,
            payload: Some(payload),
        }
    }

    /// Creates an empty success response.
    #[must_use]
    pub fn ok(message_id: u32) -> Self {
        Self {
            message_id,
            status: Status::Success,
            payload: None,
        }
    }

    /// Creates a failure response with no payload.
    #[must_use]
    pub fn failure(message_id: u32, status: Status) -> Self {
        Self {
            message_id,
            status,
            payload: None,
        }
    }
}
