use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;

use super::attribute::{Attribute, AttributeSpec};
use super::command::Command;
use super::ids::{AttributeId, CommandId, FeatureType};
use super::value::Value;

/// Read hook consulted before the stored value on context-aware reads.
///
/// Returning `Some` short-circuits the default read; keyed on the caller zone
/// injected into the request context.
pub type ReadHook =
    Arc<dyn Fn(&RequestContext, AttributeId) -> Option<Value> + Send + Sync>;

/// A bundle of related attributes and commands of one feature type.
pub struct Feature {
    feature_type: FeatureType,
    revision: u16,
    feature_map: u32,
    attributes: BTreeMap<AttributeId, Attribute>,
    commands: BTreeMap<CommandId, Command>,
    read_hook: Option<ReadHook>,
}

impl Feature {
    /// Creates an empty feature of `feature_type`.
    #[must_use]
    pub fn new(feature_type: FeatureType, revision: u16, feature_map: u32) -> Self {
        Self {
            feature_type,
            revision,
            feature_map,
            attributes: BTreeMap::new(),
            commands: BTreeMap::new(),
            read_hook: None,
        }
    }

    /// Adds an attribute; replaces any previous attribute with the same ID.
    #[must_use]
    pub fn with_attribute(mut self, id: AttributeId, spec: AttributeSpec) -> Self {
        self.attributes.insert(id, Attribute::new(spec));
        self
    }

    /// Adds a command; replaces any previous command with the same ID.
    #[must_use]
    pub fn with_command(mut self, id: CommandId, command: Command) -> Self {
        self.commands.insert(id, command);
        self
    }

    /// Returns the feature type.
    #[must_use]
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Returns the feature revision.
    #[must_use]
    pub fn revision(&self) -> u16 {
        self.revision
    }

    /// Returns the capability bitmap.
    #[must_use]
    pub fn feature_map(&self) -> u32 {
        self.feature_map
    }

    /// Returns one attribute.
    #[must_use]
    pub fn attribute(&self, id: AttributeId) -> Option<&Attribute> {
        self.attributes.get(&id)
    }

    /// Returns one attribute mutably.
    pub(crate) fn attribute_mut(&mut self, id: AttributeId) -> Option<&mut Attribute> {
        self.attributes.get_mut(&id)
    }

    /// Iterates all attributes in ID order.
    pub fn attributes(&self) -> impl Iterator<Item = (AttributeId, &Attribute)> {
        self.attributes.iter().map(|(id, attribute)| (*id, attribute))
    }

    /// Returns one command.
    #[must_use]
    pub fn command(&self, id: CommandId) -> Option<&Command> {
        self.commands.get(&id)
    }

    /// Returns one command mutably.
    pub(crate) fn command_mut(&mut self, id: CommandId) -> Option<&mut Command> {
        self.commands.get_mut(&id)
    }

    /// Iterates all commands in ID order.
    pub fn commands(&self) -> impl Iterator<Item = (CommandId, &Command)> {
        self.commands.iter().map(|(id, command)| (*id, command))
    }

    /// Installs the context-aware read hook.
    pub fn set_read_hook(&mut self, hook: ReadHook) {
        self.read_hook = Some(hook);
    }

    /// Consults the read hook for `id` under `context`.
    #[must_use]
    pub fn hooked_value(&self, context: &RequestContext, id: AttributeId) -> Option<Value> {
        self.read_hook.as_ref().and_then(|hook| hook(context, id))
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("feature_type", &self.feature_type)
            .field("revision", &self.revision)
            .field("feature_map", &self.feature_map)
            .field("attributes", &self.attributes.len())
            .field("commands", &self.commands.len())
            .field("hooked", &self.read_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::attribute::AccessMode;
    use super::super::value::DataType;
    use super::*;
    use crate::zones::{ZoneId, ZoneType};

    fn feature_with_hook() -> Feature {
        let mut feature = Feature::new(FeatureType::EnergyControl, 1, 0b1).with_attribute(
            AttributeId(0x12),
            AttributeSpec::new("myConsumptionLimit", DataType::I64, AccessMode::Read).nullable(),
        );
        feature.set_read_hook(Arc::new(|context, id| {
            if id != AttributeId(0x12) {
                return None;
            }
            context
                .zone_id()
                .filter(|zone| zone.as_str() == "zone-grid")
                .map(|_| Value::I64(6_000_000))
        }));
        feature
    }

    #[test]
    fn hook_answers_per_caller_zone() {
        let feature = feature_with_hook();

        let grid = RequestContext::for_zone(ZoneId::new("zone-grid"), ZoneType::Grid);
        assert_eq!(
            Some(Value::I64(6_000_000)),
            feature.hooked_value(&grid, AttributeId(0x12))
        );

        let user = RequestContext::for_zone(ZoneId::new("zone-user"), ZoneType::User);
        assert_eq!(None, feature.hooked_value(&user, AttributeId(0x12)));
    }

    #[test]
    fn attributes_iterate_in_id_order() {
        let feature = Feature::new(FeatureType::Measurement, 1, 0)
            .with_attribute(
                AttributeId(0x02),
                AttributeSpec::new("voltage", DataType::U32, AccessMode::Read),
            )
            .with_attribute(
                AttributeId(0x01),
                AttributeSpec::new("activePower", DataType::I64, AccessMode::Read),
            );
        let ids = feature.attributes().map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(vec![AttributeId(0x01), AttributeId(0x02)], ids);
    }
}
