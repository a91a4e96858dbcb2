mod resolver;

pub use self::resolver::{LimitResolver, LimitResolverConfig, MyChangeCallback};

use std::time::Duration;

use strum_macros::Display as StrumDisplay;

/// Power-flow directions a limit applies to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay)]
pub enum LimitDirection {
    /// Power drawn from the grid.
    #[strum(to_string = "consumption")]
    Consumption,
    /// Power fed into the grid.
    #[strum(to_string = "production")]
    Production,
}

impl LimitDirection {
    /// Returns the wire encoding.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            LimitDirection::Consumption => 0,
            LimitDirection::Production => 1,
        }
    }

    /// Decodes a wire value.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LimitDirection::Consumption),
            1 => Some(LimitDirection::Production),
            _ => None,
        }
    }
}

/// Reported origin of a limit request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, StrumDisplay)]
pub enum LimitCause {
    #[default]
    #[strum(to_string = "unspecified")]
    Unspecified,
    /// Grid-operator curtailment.
    #[strum(to_string = "grid_emergency")]
    GridEmergency,
    /// Tariff-driven optimisation.
    #[strum(to_string = "tariff")]
    Tariff,
    /// Device-side watchdog for a silent zone.
    #[strum(to_string = "failsafe")]
    Failsafe,
}

impl LimitCause {
    /// Returns the wire encoding.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            LimitCause::Unspecified => 0,
            LimitCause::GridEmergency => 1,
            LimitCause::Tariff => 2,
            LimitCause::Failsafe => 3,
        }
    }

    /// Decodes a wire value; unknown codes fold to `Unspecified`.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => LimitCause::GridEmergency,
            2 => LimitCause::Tariff,
            3 => LimitCause::Failsafe,
            _ => LimitCause::Unspecified,
        }
    }
}

/// Structured soft-reject reasons carried in the SetLimit response.
///
/// `BelowMinimum` is produced when a configured minimum applies;
/// `AboveContractual` and `NotSupported` are reserved for device-application
/// validation layered on top of the resolver.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
pub enum RejectReason {
    #[strum(to_string = "below_minimum")]
    BelowMinimum,
    #[strum(to_string = "above_contractual")]
    AboveContractual,
    #[strum(to_string = "invalid_value")]
    InvalidValue,
    #[strum(to_string = "device_override")]
    DeviceOverride,
    #[strum(to_string = "not_supported")]
    NotSupported,
}

impl RejectReason {
    /// Returns the wire encoding.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            RejectReason::BelowMinimum => 1,
            RejectReason::AboveContractual => 2,
            RejectReason::InvalidValue => 3,
            RejectReason::DeviceOverride => 4,
            RejectReason::NotSupported => 5,
        }
    }
}

/// One SetLimit request after parameter decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetLimitRequest {
    /// Consumption limit in mW; `None` leaves the direction untouched.
    pub consumption_limit: Option<i64>,
    /// Production limit in mW; `None` leaves the direction untouched.
    pub production_limit: Option<i64>,
    /// Lifetime of the stored limits; `None` or zero stores them unbounded.
    pub duration: Option<Duration>,
    pub cause: LimitCause,
}

impl SetLimitRequest {
    /// Returns true when neither direction carries a limit.
    #[must_use]
    pub fn is_deactivation(&self) -> bool {
        self.consumption_limit.is_none() && self.production_limit.is_none()
    }
}

/// Outcome of a SetLimit or ClearLimit operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SetLimitResponse {
    /// False when the request was soft-rejected; state is then unchanged.
    pub applied: bool,
    pub effective_consumption: Option<i64>,
    pub effective_production: Option<i64>,
    pub reject_reason: Option<RejectReason>,
    pub control_state: crate::features::ControlState,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(LimitDirection::Consumption, 0)]
    #[case(LimitDirection::Production, 1)]
    fn direction_codes_round_trip(#[case] direction: LimitDirection, #[case] code: u8) {
        assert_eq!(code, direction.code());
        assert_eq!(Some(direction), LimitDirection::from_code(code));
    }

    #[test]
    fn unknown_cause_codes_fold_to_unspecified() {
        assert_eq!(LimitCause::Unspecified, LimitCause::from_code(200));
        assert_eq!(LimitCause::Failsafe, LimitCause::from_code(3));
    }

    #[test]
    fn request_without_limits_is_a_deactivation() {
        assert!(SetLimitRequest::default().is_deactivation());
        let request = SetLimitRequest {
            consumption_limit: Some(1),
            ..SetLimitRequest::default()
        };
        assert!(!request.is_deactivation());
    }
}
