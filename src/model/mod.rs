mod attribute;
mod command;
mod device;
mod endpoint;
mod feature;
mod ids;
mod value;

pub use self::attribute::{AccessMode, Attribute, AttributeSpec, ValueViolation};
pub use self::command::{Command, CommandError, CommandHandler, ParameterSpec};
pub use self::device::{AttributeChange, ChangeDispatch, Device, ModelError};
pub use self::endpoint::Endpoint;
pub use self::feature::{Feature, ReadHook};
pub use self::ids::{AttributeId, CommandId, EndpointId, EndpointType, FeatureType};
pub use self::value::{DataType, ParamMap, Value};
