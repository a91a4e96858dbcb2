//! Builtin feature catalogue.
//!
//! Each module builds one standard feature: its attribute table, command
//! schemas and defaults. Command handlers are bound later by the components
//! that own the behaviour (the limit resolver binds EnergyControl).

pub mod charging_session;
pub mod device_info;
pub mod electrical;
pub mod energy_control;
pub mod measurement;
pub mod status;

pub use self::device_info::DeviceIdentity;
pub use self::energy_control::ControlState;

/// Capability bit: baseline attribute set.
pub const FEATURE_MAP_CORE: u32 = 0b0001;
/// Capability bit: flexible (time-bounded) limit handling.
pub const FEATURE_MAP_FLEX: u32 = 0b0010;
/// Capability bit: bidirectional (production) power flow.
pub const FEATURE_MAP_BATTERY: u32 = 0b0100;
