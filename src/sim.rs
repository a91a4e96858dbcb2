use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::features::ControlState;
use crate::features::charging_session::{
    ATTR_PLUGGED_IN, ATTR_SESSION_ACTIVE, ATTR_SESSION_DURATION, ATTR_SESSION_ENERGY,
};
use crate::features::electrical::ATTR_MAX_POWER;
use crate::features::energy_control::{ATTR_CONTROL_STATE, ATTR_EFFECTIVE_CONSUMPTION_LIMIT};
use crate::features::measurement::{ATTR_ACTIVE_POWER, ATTR_TOTAL_ENERGY_IMPORTED};
use crate::model::{Device, EndpointId, FeatureType, Value};

/// Power slew rate of the simulated charger, in mW per second.
const RAMP_MW_PER_S: i64 = 2_000_000;

/// A simulated EVSE driving the Measurement and ChargingSession features.
///
/// Ramps toward the effective consumption limit and promotes the control
/// state to LIMITED while the limit actually clamps the load. Purely a
/// consumer of effective limits; it implements no control policy of its own.
pub struct SimulatedEvse {
    cancel: CancellationToken,
}

impl SimulatedEvse {
    /// Spawns the simulation loop; one step per `tick`.
    #[must_use]
    pub fn spawn(device: Arc<Device>, endpoint: EndpointId, tick: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => step(&device, endpoint, tick),
                }
            }
        });
        Self { cancel }
    }

    /// Stops the simulation loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Advances the simulation by one tick.
pub(crate) fn step(device: &Arc<Device>, endpoint: EndpointId, tick: Duration) {
    let read_i64 = |feature: FeatureType, attribute| {
        device
            .read_attribute(endpoint, feature, attribute)
            .ok()
            .and_then(|value| value.as_i64())
    };

    let max_power = read_i64(FeatureType::Electrical, ATTR_MAX_POWER).unwrap_or(0);
    let effective =
        read_i64(FeatureType::EnergyControl, ATTR_EFFECTIVE_CONSUMPTION_LIMIT);
    let current = read_i64(FeatureType::Measurement, ATTR_ACTIVE_POWER).unwrap_or(0);

    let target = effective.map_or(max_power, |limit| limit.min(max_power)).max(0);
    let ramp = (RAMP_MW_PER_S * i64::try_from(tick.as_millis()).unwrap_or(1000)) / 1000;
    let next = if current < target {
        (current + ramp).min(target)
    } else {
        (current - ramp).max(target)
    };

    let elapsed_s = tick.as_secs();
    let energy_step = (u64::try_from(next).unwrap_or(0) * elapsed_s) / 3600;
    let imported = device
        .read_attribute(endpoint, FeatureType::Measurement, ATTR_TOTAL_ENERGY_IMPORTED)
        .ok()
        .and_then(|value| value.as_u64())
        .unwrap_or(0);

    let measurements = BTreeMap::from([
        (ATTR_ACTIVE_POWER, Value::I64(next)),
        (
            ATTR_TOTAL_ENERGY_IMPORTED,
            Value::U64(imported + energy_step),
        ),
    ]);
    if let Err(error) =
        device.set_values_internal(endpoint, FeatureType::Measurement, measurements)
    {
        warn!(%error, "simulation failed to publish measurements");
        return;
    }

    let session_energy = device
        .read_attribute(endpoint, FeatureType::ChargingSession, ATTR_SESSION_ENERGY)
        .ok()
        .and_then(|value| value.as_u64())
        .unwrap_or(0);
    let session_duration = device
        .read_attribute(endpoint, FeatureType::ChargingSession, ATTR_SESSION_DURATION)
        .ok()
        .and_then(|value| value.as_u64())
        .unwrap_or(0);
    let session = BTreeMap::from([
        (ATTR_PLUGGED_IN, Value::Bool(true)),
        (ATTR_SESSION_ACTIVE, Value::Bool(next > 0)),
        (ATTR_SESSION_ENERGY, Value::U64(session_energy + energy_step)),
        (
            ATTR_SESSION_DURATION,
            Value::U32((session_duration + elapsed_s).min(u64::from(u32::MAX)) as u32),
        ),
    ]);
    if let Err(error) =
        device.set_values_internal(endpoint, FeatureType::ChargingSession, session)
    {
        warn!(%error, "simulation failed to publish session state");
    }

    promote_control_state(device, endpoint, effective, next);
}

// CONTROLLED means a limit is stored; LIMITED means the load actually sits at
// the clamp. Both directions of the promotion are the application's call.
fn promote_control_state(
    device: &Arc<Device>,
    endpoint: EndpointId,
    effective: Option<i64>,
    power: i64,
) {
    let current = device
        .read_attribute(endpoint, FeatureType::EnergyControl, ATTR_CONTROL_STATE)
        .ok()
        .and_then(|value| match value {
            Value::U8(code) => ControlState::from_code(code),
            _ => None,
        });
    let clamped = effective.is_some_and(|limit| power >= limit);

    let next = match current {
        Some(ControlState::Controlled) if clamped => Some(ControlState::Limited),
        Some(ControlState::Limited) if !clamped => Some(ControlState::Controlled),
        _ => None,
    };
    if let Some(next) = next {
        debug!(state = %next, "control state promoted");
        if let Err(error) = device.set_value_internal(
            endpoint,
            FeatureType::EnergyControl,
            ATTR_CONTROL_STATE,
            Value::U8(next.code()),
        ) {
            warn!(%error, "failed to promote control state");
        }
    }
}
