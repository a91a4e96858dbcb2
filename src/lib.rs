mod app;
mod cli;
mod commissioning;
mod context;
mod error;
mod features;
mod limits;
mod model;
mod persistence;
mod protolog;
mod service;
mod sim;
mod subscriptions;
mod telemetry;
mod wire;
mod zones;

pub use app::run;
pub use cli::{Args, Command, LogCommand, LogExportArgs, LogStatsArgs, PairingArgs, RunArgs};
pub use commissioning::{
    CloseReason, CommissioningWindow, Discriminator, OpenTrigger, PairingCode, PairingCodeError,
    SetupCode, WindowError, WindowState,
};
pub use context::RequestContext;
pub use features::{ControlState, DeviceIdentity, charging_session, device_info, electrical,
    energy_control, measurement, status};
pub use limits::{
    LimitCause, LimitDirection, LimitResolver, LimitResolverConfig, RejectReason, SetLimitRequest,
    SetLimitResponse,
};
pub use model::{
    AccessMode, Attribute, AttributeChange, AttributeId, AttributeSpec, Command as ModelCommand,
    CommandError, CommandId, DataType, Device, Endpoint, EndpointId, EndpointType, Feature,
    FeatureType, ModelError, ParamMap, ParameterSpec, Value,
};
pub use persistence::{PersistedState, PersistedZone, PersistenceError, StateStore};
pub use protolog::{
    CapabilitySnapshotEvent, Category, CodecError, ControlMsgEvent, Direction, ErrorEventData,
    EventBody, EventFilter, EventHeader, ExportError, ExportFormat, FrameEvent, Layer, LocalRole,
    LogEvent, LogStats, MessageEvent, ProtocolLogReader, ProtocolLogWriter, StateChangeEvent,
    write_csv, write_jsonl,
};
pub use service::{
    CHARGER_ENDPOINT, DeviceEvent, DeviceService, NotificationTransport, ServiceConfig,
    ServiceError,
};
pub use sim::SimulatedEvse;
pub use subscriptions::{
    HeartbeatMode, Notification, SubscribeError, SubscriptionManager, SubscriptionPolicy,
};
pub use wire::{Operation, Request, RequestOperation, Response, ResponsePayload, Status};
pub use zones::{
    FailsafeConfig, FailsafeEvent, ZoneId, ZoneRecord, ZoneRegistry, ZoneRegistryError,
    ZoneSessions, ZoneType,
};
