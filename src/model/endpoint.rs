use std::collections::BTreeMap;

use super::feature::Feature;
use super::ids::{EndpointId, EndpointType, FeatureType};

/// One addressable endpoint: a typed collection of features.
///
/// An endpoint holds at most one feature of each type.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    endpoint_type: EndpointType,
    label: Option<String>,
    features: BTreeMap<u16, Feature>,
}

impl Endpoint {
    /// Creates an endpoint without features.
    #[must_use]
    pub fn new(id: EndpointId, endpoint_type: EndpointType) -> Self {
        Self {
            id,
            endpoint_type,
            label: None,
            features: BTreeMap::new(),
        }
    }

    /// Attaches a user-facing label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Adds a feature; replaces any previous feature of the same type.
    #[must_use]
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature.feature_type().id(), feature);
        self
    }

    /// Returns the endpoint ID.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Returns the endpoint type tag.
    #[must_use]
    pub fn endpoint_type(&self) -> EndpointType {
        self.endpoint_type
    }

    /// Returns the optional user label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns one feature by type.
    #[must_use]
    pub fn feature(&self, feature_type: FeatureType) -> Option<&Feature> {
        self.features.get(&feature_type.id())
    }

    /// Returns one feature mutably.
    pub(crate) fn feature_mut(&mut self, feature_type: FeatureType) -> Option<&mut Feature> {
        self.features.get_mut(&feature_type.id())
    }

    /// Iterates features in type-ID order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Returns the number of features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::feature::Feature;
    use super::*;

    #[test]
    fn endpoint_holds_one_feature_per_type() {
        let endpoint = Endpoint::new(EndpointId(1), EndpointType::EvCharger)
            .with_feature(Feature::new(FeatureType::Measurement, 1, 0))
            .with_feature(Feature::new(FeatureType::Measurement, 2, 0));

        assert_eq!(1, endpoint.feature_count());
        let feature = endpoint
            .feature(FeatureType::Measurement)
            .expect("replaced feature should resolve");
        assert_eq!(2, feature.revision());
    }

    #[test]
    fn label_is_optional() {
        let endpoint = Endpoint::new(EndpointId(1), EndpointType::Battery);
        assert_eq!(None, endpoint.label());

        let labelled = Endpoint::new(EndpointId(2), EndpointType::Battery).with_label("garage");
        assert_eq!(Some("garage"), labelled.label());
    }
}
