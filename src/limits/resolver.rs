use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bon::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::context::RequestContext;
use crate::features::ControlState;
use crate::features::energy_control::{
    ATTR_CONTROL_STATE, ATTR_EFFECTIVE_CONSUMPTION_LIMIT, ATTR_EFFECTIVE_PRODUCTION_LIMIT,
    ATTR_MY_CONSUMPTION_LIMIT, ATTR_MY_PRODUCTION_LIMIT, CMD_CLEAR_LIMIT, CMD_SET_LIMIT,
};
use crate::model::{
    AttributeId, CommandError, Device, EndpointId, FeatureType, ModelError, ParamMap, ReadHook,
    Value,
};
use crate::zones::{ZoneId, ZoneType};

use super::{LimitCause, LimitDirection, RejectReason, SetLimitRequest, SetLimitResponse};

/// Callback fired after a zone's own limit view changed.
///
/// Carries the changed `my*` attributes; invoked outside the resolver lock.
pub type MyChangeCallback = Arc<dyn Fn(&ZoneId, &[(AttributeId, Value)]) + Send + Sync>;

/// Extracts the caller zone identity from a request context.
pub type ZoneIdExtractor = Arc<dyn Fn(&RequestContext) -> Option<ZoneId> + Send + Sync>;

/// Extracts the caller zone type from a request context.
pub type ZoneTypeExtractor = Arc<dyn Fn(&RequestContext) -> Option<ZoneType> + Send + Sync>;

/// Device-capacity bounds and validation settings.
#[derive(Debug, Clone, Builder)]
pub struct LimitResolverConfig {
    /// Upper bound for consumption limits in mW; zero means unbounded.
    #[builder(default = 0)]
    pub max_consumption_mw: i64,
    /// Upper bound for production limits in mW; zero means unbounded.
    #[builder(default = 0)]
    pub max_production_mw: i64,
    /// Optional lower bound; values below it soft-reject with `BelowMinimum`.
    pub min_limit_mw: Option<i64>,
}

impl Default for LimitResolverConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone)]
struct LimitEntry {
    value_mw: i64,
    zone_type: ZoneType,
    sequence: u64,
}

#[derive(Default)]
struct ResolverState {
    consumption: HashMap<ZoneId, LimitEntry>,
    production: HashMap<ZoneId, LimitEntry>,
    timers: HashMap<(u8, LimitDirection), CancellationToken>,
    zone_indices: HashMap<ZoneId, u8>,
    next_zone_index: u8,
    next_sequence: u64,
    published_consumption: Option<i64>,
    published_production: Option<i64>,
}

struct Resolution {
    effective_consumption: Option<i64>,
    effective_production: Option<i64>,
    any_entries: bool,
}

/// Turns concurrent per-zone limit requests into one effective limit per
/// direction under most-restrictive-wins, and answers per-zone "my" reads.
///
/// All operations serialise on one internal mutex; attribute publication and
/// expiry timers happen as part of the owning operation.
pub struct LimitResolver {
    weak_self: Weak<LimitResolver>,
    device: Arc<Device>,
    endpoint: EndpointId,
    config: LimitResolverConfig,
    state: Mutex<ResolverState>,
    /// Per-zone view the read hook answers from. The hook runs under the
    /// device lock and takes only this lock, so the device lock never nests
    /// inside the resolver lock.
    my_view: Arc<Mutex<HashMap<(ZoneId, LimitDirection), i64>>>,
    zone_id_from_context: ZoneIdExtractor,
    zone_type_from_context: ZoneTypeExtractor,
    on_zone_my_change: Mutex<Option<MyChangeCallback>>,
    cancel: CancellationToken,
}

impl LimitResolver {
    /// Creates a resolver bound to the EnergyControl feature on `endpoint`.
    #[must_use]
    pub fn new(device: Arc<Device>, endpoint: EndpointId, config: LimitResolverConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            device,
            endpoint,
            config,
            state: Mutex::new(ResolverState::default()),
            my_view: Arc::new(Mutex::new(HashMap::new())),
            zone_id_from_context: Arc::new(|context| context.zone_id().cloned()),
            zone_type_from_context: Arc::new(RequestContext::zone_type),
            on_zone_my_change: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Creates a resolver with custom context extractors.
    #[must_use]
    pub fn with_extractors(
        device: Arc<Device>,
        endpoint: EndpointId,
        config: LimitResolverConfig,
        zone_id_from_context: ZoneIdExtractor,
        zone_type_from_context: ZoneTypeExtractor,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            device,
            endpoint,
            config,
            state: Mutex::new(ResolverState::default()),
            my_view: Arc::new(Mutex::new(HashMap::new())),
            zone_id_from_context,
            zone_type_from_context,
            on_zone_my_change: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Registers the per-zone change callback.
    pub fn set_my_change_callback(&self, callback: MyChangeCallback) {
        *self
            .on_zone_my_change
            .lock()
            .expect("my-change callback mutex poisoned") = Some(callback);
    }

    /// Binds the SetLimit/ClearLimit handlers and the `my*` read hook.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the endpoint lacks an EnergyControl feature.
    pub fn install(self: &Arc<Self>) -> Result<(), ModelError> {
        let my_view = Arc::clone(&self.my_view);
        let extract_zone = Arc::clone(&self.zone_id_from_context);
        let hook: ReadHook = Arc::new(move |context, attribute| {
            let direction = match attribute {
                ATTR_MY_CONSUMPTION_LIMIT => LimitDirection::Consumption,
                ATTR_MY_PRODUCTION_LIMIT => LimitDirection::Production,
                _ => return None,
            };
            let zone = extract_zone(context)?;
            let view = my_view.lock().expect("my-view mutex poisoned");
            Some(
                view.get(&(zone, direction))
                    .map_or(Value::Null, |value| Value::I64(*value)),
            )
        });
        self.device
            .install_read_hook(self.endpoint, FeatureType::EnergyControl, hook)?;

        let weak = self.weak_self.clone();
        self.device.install_command_handler(
            self.endpoint,
            FeatureType::EnergyControl,
            CMD_SET_LIMIT,
            Arc::new(move |context, parameters| {
                let resolver = weak
                    .upgrade()
                    .ok_or_else(|| CommandError::invalid("limit resolver is gone"))?;
                let request = decode_set_limit(parameters);
                let response = resolver.handle_set_limit(context, request)?;
                Ok(encode_response(&response))
            }),
        )?;

        let weak = self.weak_self.clone();
        self.device.install_command_handler(
            self.endpoint,
            FeatureType::EnergyControl,
            CMD_CLEAR_LIMIT,
            Arc::new(move |context, parameters| {
                let resolver = weak
                    .upgrade()
                    .ok_or_else(|| CommandError::invalid("limit resolver is gone"))?;
                let direction = decode_clear_direction(parameters)?;
                let response = resolver.handle_clear_limit(context, direction)?;
                Ok(encode_response(&response))
            }),
        )?;

        Ok(())
    }

    /// Applies one SetLimit request for the caller zone.
    ///
    /// Soft rejects report a [`RejectReason`] in the response and leave state
    /// untouched; capacity violations are hard `ConstraintError`s.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintError` when a value exceeds device capacity.
    #[instrument(skip(self, context, request), level = "debug")]
    pub fn handle_set_limit(
        &self,
        context: &RequestContext,
        request: SetLimitRequest,
    ) -> Result<SetLimitResponse, CommandError> {
        let Some(zone) = (self.zone_id_from_context)(context) else {
            return Ok(self.soft_reject(RejectReason::InvalidValue));
        };

        for value in [request.consumption_limit, request.production_limit]
            .into_iter()
            .flatten()
        {
            if value < 0 {
                return Ok(self.soft_reject(RejectReason::InvalidValue));
            }
            if let Some(minimum) = self.config.min_limit_mw
                && value < minimum
            {
                return Ok(self.soft_reject(RejectReason::BelowMinimum));
            }
        }

        if let Some(value) = request.consumption_limit
            && self.config.max_consumption_mw > 0
            && value > self.config.max_consumption_mw
        {
            return Err(CommandError::constraint(format!(
                "consumption limit {value} mW exceeds device capacity {} mW",
                self.config.max_consumption_mw
            )));
        }
        if let Some(value) = request.production_limit
            && self.config.max_production_mw > 0
            && value > self.config.max_production_mw
        {
            return Err(CommandError::constraint(format!(
                "production limit {value} mW exceeds device capacity {} mW",
                self.config.max_production_mw
            )));
        }

        if self.current_control_state() == ControlState::Override {
            return Ok(self.soft_reject(RejectReason::DeviceOverride));
        }

        let zone_type = (self.zone_type_from_context)(context).unwrap_or(ZoneType::User);
        let mut my_changes = Vec::new();

        let response = {
            let mut state = self.lock_state();

            if request.is_deactivation() {
                self.remove_entry(&mut state, &zone, LimitDirection::Consumption);
                self.remove_entry(&mut state, &zone, LimitDirection::Production);
                my_changes.push((ATTR_MY_CONSUMPTION_LIMIT, Value::Null));
                my_changes.push((ATTR_MY_PRODUCTION_LIMIT, Value::Null));
                debug!(zone = %zone, "zone limits deactivated");
            } else {
                // Both directions are stored before any timer is scheduled so
                // a cancellation between the two stores cannot be observed.
                let stored = [
                    (LimitDirection::Consumption, request.consumption_limit),
                    (LimitDirection::Production, request.production_limit),
                ];
                for (direction, value) in stored {
                    let Some(value) = value else { continue };
                    let sequence = state.next_sequence;
                    state.next_sequence += 1;
                    let entry = LimitEntry {
                        value_mw: value,
                        zone_type,
                        sequence,
                    };
                    match direction {
                        LimitDirection::Consumption => {
                            state.consumption.insert(zone.clone(), entry);
                        }
                        LimitDirection::Production => {
                            state.production.insert(zone.clone(), entry);
                        }
                    }
                    my_changes.push((my_attribute(direction), Value::I64(value)));
                }

                for (direction, value) in stored {
                    if value.is_none() {
                        continue;
                    }
                    match request.duration {
                        Some(duration) if !duration.is_zero() => {
                            self.schedule_expiry(&mut state, &zone, direction, duration);
                        }
                        _ => self.cancel_timer(&mut state, &zone, direction),
                    }
                }
                debug!(zone = %zone, cause = %request.cause, "zone limits stored");
            }

            self.sync_my_view(&state);
            let resolution = resolve(&state);
            let control_state = self.publish(&mut state, &resolution);
            SetLimitResponse {
                applied: true,
                effective_consumption: resolution.effective_consumption,
                effective_production: resolution.effective_production,
                reject_reason: None,
                control_state,
            }
        };

        self.notify_my_change(&zone, &my_changes);
        Ok(response)
    }

    /// Clears one or both directions for the caller zone.
    ///
    /// # Errors
    ///
    /// The current validation set cannot fail; the signature matches the
    /// command binding.
    #[instrument(skip(self, context), level = "debug")]
    pub fn handle_clear_limit(
        &self,
        context: &RequestContext,
        direction: Option<LimitDirection>,
    ) -> Result<SetLimitResponse, CommandError> {
        let Some(zone) = (self.zone_id_from_context)(context) else {
            return Ok(self.soft_reject(RejectReason::InvalidValue));
        };

        let directions = match direction {
            Some(direction) => vec![direction],
            None => vec![LimitDirection::Consumption, LimitDirection::Production],
        };

        let mut my_changes = Vec::new();
        let response = {
            let mut state = self.lock_state();
            for direction in &directions {
                self.remove_entry(&mut state, &zone, *direction);
                my_changes.push((my_attribute(*direction), Value::Null));
            }
            self.sync_my_view(&state);
            let resolution = resolve(&state);
            let control_state = self.publish(&mut state, &resolution);
            SetLimitResponse {
                applied: true,
                effective_consumption: resolution.effective_consumption,
                effective_production: resolution.effective_production,
                reject_reason: None,
                control_state,
            }
        };

        self.notify_my_change(&zone, &my_changes);
        Ok(response)
    }

    /// Drops every entry and timer of `zone`; used on disconnect and removal.
    ///
    /// Calling this twice is equivalent to calling it once.
    #[instrument(skip(self), level = "debug", fields(zone = %zone))]
    pub fn clear_zone(&self, zone: &ZoneId) {
        {
            let mut state = self.lock_state();
            self.remove_entry(&mut state, zone, LimitDirection::Consumption);
            self.remove_entry(&mut state, zone, LimitDirection::Production);
            self.sync_my_view(&state);
            let resolution = resolve(&state);
            self.publish(&mut state, &resolution);
        }
        self.notify_my_change(
            zone,
            &[
                (ATTR_MY_CONSUMPTION_LIMIT, Value::Null),
                (ATTR_MY_PRODUCTION_LIMIT, Value::Null),
            ],
        );
    }

    /// Stores a zone's preconfigured failsafe limits on its behalf.
    pub fn apply_failsafe_limits(
        &self,
        zone: &ZoneId,
        zone_type: ZoneType,
        consumption_limit: Option<i64>,
        production_limit: Option<i64>,
    ) {
        if consumption_limit.is_none() && production_limit.is_none() {
            return;
        }

        let mut my_changes = Vec::new();
        {
            let mut state = self.lock_state();
            let stored = [
                (LimitDirection::Consumption, consumption_limit),
                (LimitDirection::Production, production_limit),
            ];
            for (direction, value) in stored {
                let Some(value) = value else { continue };
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                self.cancel_timer(&mut state, zone, direction);
                let entry = LimitEntry {
                    value_mw: value,
                    zone_type,
                    sequence,
                };
                match direction {
                    LimitDirection::Consumption => {
                        state.consumption.insert(zone.clone(), entry);
                    }
                    LimitDirection::Production => {
                        state.production.insert(zone.clone(), entry);
                    }
                }
                my_changes.push((my_attribute(direction), Value::I64(value)));
            }
            self.sync_my_view(&state);
            let resolution = resolve(&state);
            self.publish(&mut state, &resolution);
        }
        self.notify_my_change(zone, &my_changes);
    }

    /// Returns the current effective limits (consumption, production).
    #[must_use]
    pub fn effective_limits(&self) -> (Option<i64>, Option<i64>) {
        let state = self.lock_state();
        let resolution = resolve(&state);
        (
            resolution.effective_consumption,
            resolution.effective_production,
        )
    }

    /// Returns `zone`'s own stored limits (consumption, production).
    #[must_use]
    pub fn zone_limits(&self, zone: &ZoneId) -> (Option<i64>, Option<i64>) {
        let state = self.lock_state();
        (
            state.consumption.get(zone).map(|entry| entry.value_mw),
            state.production.get(zone).map(|entry| entry.value_mw),
        )
    }

    /// Cancels all pending expiry timers.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn soft_reject(&self, reason: RejectReason) -> SetLimitResponse {
        let state = self.lock_state();
        let resolution = resolve(&state);
        SetLimitResponse {
            applied: false,
            effective_consumption: resolution.effective_consumption,
            effective_production: resolution.effective_production,
            reject_reason: Some(reason),
            control_state: self.current_control_state(),
        }
    }

    fn current_control_state(&self) -> ControlState {
        self.device
            .read_attribute(self.endpoint, FeatureType::EnergyControl, ATTR_CONTROL_STATE)
            .ok()
            .and_then(|value| match value {
                Value::U8(code) => ControlState::from_code(code),
                _ => None,
            })
            .unwrap_or(ControlState::Autonomous)
    }

    fn remove_entry(&self, state: &mut ResolverState, zone: &ZoneId, direction: LimitDirection) {
        let removed = match direction {
            LimitDirection::Consumption => state.consumption.remove(zone),
            LimitDirection::Production => state.production.remove(zone),
        };
        if removed.is_some() {
            self.cancel_timer(state, zone, direction);
        }
    }

    fn cancel_timer(&self, state: &mut ResolverState, zone: &ZoneId, direction: LimitDirection) {
        let Some(index) = state.zone_indices.get(zone).copied() else {
            return;
        };
        if let Some(token) = state.timers.remove(&(index, direction)) {
            token.cancel();
        }
    }

    fn zone_index(&self, state: &mut ResolverState, zone: &ZoneId) -> u8 {
        if let Some(index) = state.zone_indices.get(zone) {
            return *index;
        }
        let index = state.next_zone_index;
        state.next_zone_index = state.next_zone_index.wrapping_add(1);
        state.zone_indices.insert(zone.clone(), index);
        index
    }

    fn schedule_expiry(
        &self,
        state: &mut ResolverState,
        zone: &ZoneId,
        direction: LimitDirection,
        duration: Duration,
    ) {
        self.cancel_timer(state, zone, direction);
        let index = self.zone_index(state, zone);

        let sequence = match direction {
            LimitDirection::Consumption => state.consumption.get(zone),
            LimitDirection::Production => state.production.get(zone),
        }
        .map(|entry| entry.sequence)
        .expect("expiry is scheduled for a just-stored entry");

        let token = self.cancel.child_token();
        state.timers.insert((index, direction), token.clone());

        let weak = self.weak_self.clone();
        let zone = zone.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    if let Some(resolver) = weak.upgrade() {
                        resolver.expire(&zone, direction, sequence);
                    }
                }
            }
        });
    }

    fn expire(&self, zone: &ZoneId, direction: LimitDirection, sequence: u64) {
        {
            let mut state = self.lock_state();
            let entries = match direction {
                LimitDirection::Consumption => &mut state.consumption,
                LimitDirection::Production => &mut state.production,
            };
            // The entry may have been replaced after this timer was armed.
            let armed_entry = entries
                .get(zone)
                .is_some_and(|entry| entry.sequence == sequence);
            if !armed_entry {
                return;
            }
            entries.remove(zone);
            if let Some(index) = state.zone_indices.get(zone).copied() {
                state.timers.remove(&(index, direction));
            }
            self.sync_my_view(&state);
            let resolution = resolve(&state);
            self.publish(&mut state, &resolution);
            debug!(zone = %zone, %direction, "zone limit expired");
        }
        self.notify_my_change(zone, &[(my_attribute(direction), Value::Null)]);
    }

    fn sync_my_view(&self, state: &ResolverState) {
        let mut view = self.my_view.lock().expect("my-view mutex poisoned");
        view.clear();
        for (zone, entry) in &state.consumption {
            view.insert((zone.clone(), LimitDirection::Consumption), entry.value_mw);
        }
        for (zone, entry) in &state.production {
            view.insert((zone.clone(), LimitDirection::Production), entry.value_mw);
        }
    }

    fn publish(&self, state: &mut ResolverState, resolution: &Resolution) -> ControlState {
        let current = self.current_control_state();
        let target = target_control_state(current, resolution.any_entries);

        let mut values = BTreeMap::new();
        if state.published_consumption != resolution.effective_consumption {
            values.insert(
                ATTR_EFFECTIVE_CONSUMPTION_LIMIT,
                resolution
                    .effective_consumption
                    .map_or(Value::Null, Value::I64),
            );
        }
        if state.published_production != resolution.effective_production {
            values.insert(
                ATTR_EFFECTIVE_PRODUCTION_LIMIT,
                resolution
                    .effective_production
                    .map_or(Value::Null, Value::I64),
            );
        }
        if target != current {
            values.insert(ATTR_CONTROL_STATE, Value::U8(target.code()));
        }

        if !values.is_empty()
            && let Err(error) =
                self.device
                    .set_values_internal(self.endpoint, FeatureType::EnergyControl, values)
        {
            warn!(%error, "failed to publish effective limits");
        }

        state.published_consumption = resolution.effective_consumption;
        state.published_production = resolution.effective_production;
        target
    }

    fn notify_my_change(&self, zone: &ZoneId, changes: &[(AttributeId, Value)]) {
        if changes.is_empty() {
            return;
        }
        let callback = self
            .on_zone_my_change
            .lock()
            .expect("my-change callback mutex poisoned")
            .clone();
        if let Some(callback) = callback {
            callback(zone, changes);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ResolverState> {
        self.state.lock().expect("limit resolver mutex poisoned")
    }
}

fn my_attribute(direction: LimitDirection) -> AttributeId {
    match direction {
        LimitDirection::Consumption => ATTR_MY_CONSUMPTION_LIMIT,
        LimitDirection::Production => ATTR_MY_PRODUCTION_LIMIT,
    }
}

fn target_control_state(current: ControlState, any_entries: bool) -> ControlState {
    match (any_entries, current) {
        (true, ControlState::Autonomous) => ControlState::Controlled,
        (false, ControlState::Controlled | ControlState::Limited) => ControlState::Autonomous,
        (_, unchanged) => unchanged,
    }
}

fn resolve(state: &ResolverState) -> Resolution {
    Resolution {
        effective_consumption: resolve_direction(&state.consumption),
        effective_production: resolve_direction(&state.production),
        any_entries: !state.consumption.is_empty() || !state.production.is_empty(),
    }
}

fn resolve_direction(entries: &HashMap<ZoneId, LimitEntry>) -> Option<i64> {
    let mut best: Option<&LimitEntry> = None;
    for entry in entries.values() {
        best = match best {
            None => Some(entry),
            Some(current) if wins_over(entry, current) => Some(entry),
            Some(current) => Some(current),
        };
    }
    best.map(|entry| entry.value_mw)
}

// Most restrictive wins; value ties break by zone priority, then recency.
fn wins_over(candidate: &LimitEntry, current: &LimitEntry) -> bool {
    if candidate.value_mw != current.value_mw {
        return candidate.value_mw < current.value_mw;
    }
    let (candidate_priority, current_priority) = (
        candidate.zone_type.priority(),
        current.zone_type.priority(),
    );
    if candidate_priority != current_priority {
        return candidate_priority > current_priority;
    }
    candidate.sequence > current.sequence
}

fn decode_set_limit(parameters: &ParamMap) -> SetLimitRequest {
    let limit_of = |name: &str| {
        parameters
            .get(name)
            .filter(|value| !value.is_null())
            .and_then(Value::as_i64)
    };
    SetLimitRequest {
        consumption_limit: limit_of("consumptionLimit"),
        production_limit: limit_of("productionLimit"),
        duration: parameters
            .get("duration")
            .and_then(Value::as_u64)
            .map(Duration::from_secs),
        cause: parameters
            .get("cause")
            .and_then(Value::as_u64)
            .map_or(LimitCause::Unspecified, |code| {
                LimitCause::from_code(code as u8)
            }),
    }
}

fn decode_clear_direction(parameters: &ParamMap) -> Result<Option<LimitDirection>, CommandError> {
    match parameters.get("direction") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::U8(code)) => LimitDirection::from_code(*code)
            .map(Some)
            .ok_or_else(|| CommandError::invalid(format!("unknown direction code {code}"))),
        Some(other) => Err(CommandError::invalid(format!(
            "direction must be u8, got {other}"
        ))),
    }
}

fn encode_response(response: &SetLimitResponse) -> ParamMap {
    let mut parameters = ParamMap::new();
    parameters.insert("applied".to_string(), Value::Bool(response.applied));
    parameters.insert(
        "effectiveConsumptionLimit".to_string(),
        response
            .effective_consumption
            .map_or(Value::Null, Value::I64),
    );
    parameters.insert(
        "effectiveProductionLimit".to_string(),
        response.effective_production.map_or(Value::Null, Value::I64),
    );
    if let Some(reason) = response.reject_reason {
        parameters.insert("rejectReason".to_string(), Value::U8(reason.code()));
    }
    parameters.insert(
        "controlState".to_string(),
        Value::U8(response.control_state.code()),
    );
    parameters
}
