use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::instrument;

use crate::context::RequestContext;
use crate::wire::Status;

use super::attribute::ValueViolation;
use super::command::{CommandError, CommandHandler};
use super::endpoint::Endpoint;
use super::feature::ReadHook;
use super::ids::{AttributeId, CommandId, EndpointId, EndpointType, FeatureType};
use super::value::{DataType, ParamMap, Value};

/// Errors returned by model read and write operations.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ModelError {
    #[error("endpoint {endpoint} does not exist")]
    EndpointNotFound { endpoint: EndpointId },
    #[error("feature {feature} does not exist on endpoint {endpoint}")]
    FeatureNotFound {
        endpoint: EndpointId,
        feature: FeatureType,
    },
    #[error("attribute {attribute} does not exist on {feature} of endpoint {endpoint}")]
    AttributeNotFound {
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
    },
    #[error("command {command} does not exist on {feature} of endpoint {endpoint}")]
    CommandNotFound {
        endpoint: EndpointId,
        feature: FeatureType,
        command: CommandId,
    },
    #[error("access mode forbids this operation on attribute {attribute}")]
    AccessDenied { attribute: AttributeId },
    #[error("attribute {attribute} requires a {expected} value")]
    TypeMismatch {
        attribute: AttributeId,
        expected: DataType,
    },
    #[error("attribute {attribute} is not nullable")]
    NullForbidden { attribute: AttributeId },
}

impl ModelError {
    /// Returns the wire status this error maps to.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            ModelError::EndpointNotFound { .. }
            | ModelError::FeatureNotFound { .. }
            | ModelError::AttributeNotFound { .. }
            | ModelError::CommandNotFound { .. } => Status::NotFound,
            ModelError::AccessDenied { .. } => Status::AccessDenied,
            ModelError::TypeMismatch { .. } | ModelError::NullForbidden { .. } => {
                Status::TypeMismatch
            }
        }
    }
}

/// One attribute mutation as observed by change listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub endpoint: EndpointId,
    pub feature: FeatureType,
    pub attribute: AttributeId,
    pub value: Value,
}

/// Change listener registered by the subscription layer.
///
/// Invoked after the model lock is released.
pub type ChangeDispatch = Arc<dyn Fn(&[AttributeChange]) + Send + Sync>;

/// The live device model: endpoints, features, attributes and commands.
///
/// All mutation goes through this type so revisions stay monotonic and every
/// change reaches the registered dispatch exactly once.
pub struct Device {
    device_id: String,
    vendor_id: u16,
    product_id: u16,
    endpoints: Mutex<BTreeMap<EndpointId, Endpoint>>,
    change_dispatch: Mutex<Option<ChangeDispatch>>,
}

impl Device {
    /// Creates a device with the mandatory root endpoint.
    ///
    /// `device_info` becomes the root endpoint's DeviceInfo feature; every
    /// device carries it.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        vendor_id: u16,
        product_id: u16,
        device_info: super::feature::Feature,
    ) -> Arc<Self> {
        debug_assert_eq!(FeatureType::DeviceInfo, device_info.feature_type());
        let root = Endpoint::new(EndpointId::ROOT, EndpointType::DeviceRoot)
            .with_feature(device_info);
        let device = Self {
            device_id: device_id.into(),
            vendor_id,
            product_id,
            endpoints: Mutex::new(BTreeMap::from([(EndpointId::ROOT, root)])),
            change_dispatch: Mutex::new(None),
        };
        Arc::new(device)
    }

    /// Returns the device identity string.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the vendor ID.
    #[must_use]
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// Returns the product ID.
    #[must_use]
    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// Adds an endpoint; replaces any endpoint with the same ID.
    pub fn add_endpoint(&self, endpoint: Endpoint) {
        let mut endpoints = self.lock_endpoints();
        endpoints.insert(endpoint.id(), endpoint);
    }

    /// Registers the change listener; replaces any previous one.
    pub fn register_change_dispatch(&self, dispatch: ChangeDispatch) {
        *self
            .change_dispatch
            .lock()
            .expect("change dispatch mutex poisoned") = Some(dispatch);
    }

    /// Returns (endpoint count, total feature count) for capability reporting.
    #[must_use]
    pub fn capability_summary(&self) -> (u16, u16) {
        let endpoints = self.lock_endpoints();
        let features = endpoints
            .values()
            .map(|endpoint| endpoint.feature_count() as u16)
            .sum();
        (endpoints.len() as u16, features)
    }

    /// Reads one attribute as an external caller.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path and `AccessDenied` for internal
    /// attributes.
    pub fn read_attribute(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
    ) -> Result<Value, ModelError> {
        let endpoints = self.lock_endpoints();
        let found = lookup_attribute(&endpoints, endpoint, feature, attribute)?;
        if !found.spec().access.readable_externally() {
            return Err(ModelError::AccessDenied { attribute });
        }
        Ok(found.value().clone())
    }

    /// Reads one attribute, consulting the feature's read hook first.
    ///
    /// # Errors
    ///
    /// Same as [`Device::read_attribute`].
    pub fn read_attribute_with_context(
        &self,
        context: &RequestContext,
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
    ) -> Result<Value, ModelError> {
        let endpoints = self.lock_endpoints();
        let owner = lookup_feature(&endpoints, endpoint, feature)?;
        let found = owner
            .attribute(attribute)
            .ok_or(ModelError::AttributeNotFound {
                endpoint,
                feature,
                attribute,
            })?;
        if !found.spec().access.readable_externally() {
            return Err(ModelError::AccessDenied { attribute });
        }
        if let Some(hooked) = owner.hooked_value(context, attribute) {
            return Ok(hooked);
        }
        Ok(found.value().clone())
    }

    /// Reads every externally visible attribute of a feature.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path.
    pub fn read_all_attributes(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
    ) -> Result<BTreeMap<AttributeId, Value>, ModelError> {
        let endpoints = self.lock_endpoints();
        let owner = lookup_feature(&endpoints, endpoint, feature)?;
        Ok(owner
            .attributes()
            .filter(|(_, attribute)| attribute.spec().access.readable_externally())
            .map(|(id, attribute)| (id, attribute.value().clone()))
            .collect())
    }

    /// Reads every externally visible attribute, consulting the read hook.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path.
    pub fn read_all_attributes_with_context(
        &self,
        context: &RequestContext,
        endpoint: EndpointId,
        feature: FeatureType,
    ) -> Result<BTreeMap<AttributeId, Value>, ModelError> {
        let endpoints = self.lock_endpoints();
        let owner = lookup_feature(&endpoints, endpoint, feature)?;
        Ok(owner
            .attributes()
            .filter(|(_, attribute)| attribute.spec().access.readable_externally())
            .map(|(id, attribute)| {
                let value = owner
                    .hooked_value(context, id)
                    .unwrap_or_else(|| attribute.value().clone());
                (id, value)
            })
            .collect())
    }

    /// Writes one attribute as an external caller.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` unless the access mode is read-write, and
    /// `TypeMismatch`/`NullForbidden` for value violations.
    #[instrument(skip(self, value), level = "debug", fields(%endpoint, %feature, %attribute))]
    pub fn write_attribute(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
        value: Value,
    ) -> Result<(), ModelError> {
        self.store_value(endpoint, feature, attribute, value, false)
    }

    /// Writes one attribute as owning device code, bypassing the access mode.
    ///
    /// Type and nullability checks still apply.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `TypeMismatch` or `NullForbidden`.
    pub fn set_value_internal(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
        value: Value,
    ) -> Result<(), ModelError> {
        self.store_value(endpoint, feature, attribute, value, true)
    }

    /// Writes several attributes of one feature atomically.
    ///
    /// All values are validated before any is stored; listeners observe one
    /// batched change record.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure; nothing is stored on error.
    pub fn set_values_internal(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        values: BTreeMap<AttributeId, Value>,
    ) -> Result<(), ModelError> {
        let changes = {
            let mut endpoints = self.lock_endpoints();
            let owner = lookup_feature_mut(&mut endpoints, endpoint, feature)?;

            for (id, value) in &values {
                let target = owner.attribute(*id).ok_or(ModelError::AttributeNotFound {
                    endpoint,
                    feature,
                    attribute: *id,
                })?;
                target
                    .validate(value)
                    .map_err(|violation| violation_error(*id, target.spec().data_type, violation))?;
            }

            let mut changes = Vec::with_capacity(values.len());
            for (id, value) in values {
                let target = owner
                    .attribute_mut(id)
                    .expect("attribute presence verified above");
                target
                    .store(value.clone())
                    .expect("value validated above");
                changes.push(AttributeChange {
                    endpoint,
                    feature,
                    attribute: id,
                    value,
                });
            }
            changes
        };

        self.dispatch_changes(&changes);
        Ok(())
    }

    /// Invokes a command with the caller context.
    ///
    /// The handler runs outside the model lock, so it may re-enter the model.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path or unbound command,
    /// `InvalidCommand` for schema violations, and whatever typed error the
    /// handler produces.
    #[instrument(skip(self, context, parameters), level = "debug", fields(%endpoint, %feature, %command))]
    pub fn invoke_command(
        &self,
        context: &RequestContext,
        endpoint: EndpointId,
        feature: FeatureType,
        command: CommandId,
        parameters: &ParamMap,
    ) -> Result<ParamMap, CommandError> {
        let handler = {
            let endpoints = self.lock_endpoints();
            let owner = lookup_feature(&endpoints, endpoint, feature)
                .map_err(|error| CommandError::new(error.status(), error.to_string()))?;
            let found = owner.command(command).ok_or_else(|| {
                CommandError::new(
                    Status::NotFound,
                    format!("command {command} does not exist on {feature}"),
                )
            })?;
            found.validate_parameters(parameters)?;
            found.handler().ok_or_else(|| {
                CommandError::new(
                    Status::NotFound,
                    format!("command {} has no handler bound", found.name()),
                )
            })?
        };

        handler(context, parameters)
    }

    /// Binds a command handler on an existing command.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path.
    pub fn install_command_handler(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        command: CommandId,
        handler: CommandHandler,
    ) -> Result<(), ModelError> {
        let mut endpoints = self.lock_endpoints();
        let owner = lookup_feature_mut(&mut endpoints, endpoint, feature)?;
        let found = owner
            .command_mut(command)
            .ok_or(ModelError::CommandNotFound {
                endpoint,
                feature,
                command,
            })?;
        found.bind(handler);
        Ok(())
    }

    /// Installs a context-aware read hook on a feature.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing path.
    pub fn install_read_hook(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        hook: ReadHook,
    ) -> Result<(), ModelError> {
        let mut endpoints = self.lock_endpoints();
        let owner = lookup_feature_mut(&mut endpoints, endpoint, feature)?;
        owner.set_read_hook(hook);
        Ok(())
    }

    fn store_value(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
        value: Value,
        internal: bool,
    ) -> Result<(), ModelError> {
        let change = {
            let mut endpoints = self.lock_endpoints();
            let owner = lookup_feature_mut(&mut endpoints, endpoint, feature)?;
            let target = owner
                .attribute_mut(attribute)
                .ok_or(ModelError::AttributeNotFound {
                    endpoint,
                    feature,
                    attribute,
                })?;
            if !internal && !target.spec().access.writable_externally() {
                return Err(ModelError::AccessDenied { attribute });
            }
            let expected = target.spec().data_type;
            target
                .store(value.clone())
                .map_err(|violation| violation_error(attribute, expected, violation))?;
            AttributeChange {
                endpoint,
                feature,
                attribute,
                value,
            }
        };

        self.dispatch_changes(std::slice::from_ref(&change));
        Ok(())
    }

    fn dispatch_changes(&self, changes: &[AttributeChange]) {
        if changes.is_empty() {
            return;
        }
        let dispatch = self
            .change_dispatch
            .lock()
            .expect("change dispatch mutex poisoned")
            .clone();
        if let Some(dispatch) = dispatch {
            dispatch(changes);
        }
    }

    fn lock_endpoints(&self) -> std::sync::MutexGuard<'_, BTreeMap<EndpointId, Endpoint>> {
        self.endpoints.lock().expect("device model mutex poisoned")
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (endpoints, features) = self.capability_summary();
        f.debug_struct("Device")
            .field("device_id", &self.device_id)
            .field("vendor_id", &self.vendor_id)
            .field("product_id", &self.product_id)
            .field("endpoints", &endpoints)
            .field("features", &features)
            .finish()
    }
}

fn violation_error(
    attribute: AttributeId,
    expected: DataType,
    violation: ValueViolation,
) -> ModelError {
    match violation {
        ValueViolation::WrongType => ModelError::TypeMismatch {
            attribute,
            expected,
        },
        ValueViolation::NullForbidden => ModelError::NullForbidden { attribute },
    }
}

fn lookup_feature<'a>(
    endpoints: &'a BTreeMap<EndpointId, Endpoint>,
    endpoint: EndpointId,
    feature: FeatureType,
) -> Result<&'a super::feature::Feature, ModelError> {
    let found = endpoints
        .get(&endpoint)
        .ok_or(ModelError::EndpointNotFound { endpoint })?;
    found
        .feature(feature)
        .ok_or(ModelError::FeatureNotFound { endpoint, feature })
}

fn lookup_feature_mut<'a>(
    endpoints: &'a mut BTreeMap<EndpointId, Endpoint>,
    endpoint: EndpointId,
    feature: FeatureType,
) -> Result<&'a mut super::feature::Feature, ModelError> {
    let found = endpoints
        .get_mut(&endpoint)
        .ok_or(ModelError::EndpointNotFound { endpoint })?;
    found
        .feature_mut(feature)
        .ok_or(ModelError::FeatureNotFound { endpoint, feature })
}

fn lookup_attribute<'a>(
    endpoints: &'a BTreeMap<EndpointId, Endpoint>,
    endpoint: EndpointId,
    feature: FeatureType,
    attribute: AttributeId,
) -> Result<&'a super::attribute::Attribute, ModelError> {
    lookup_feature(endpoints, endpoint, feature)?
        .attribute(attribute)
        .ok_or(ModelError::AttributeNotFound {
            endpoint,
            feature,
            attribute,
        })
}
