use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bon::Builder;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::commissioning::{
    CloseReason, CommissioningWindow, DEFAULT_WINDOW_TIMEOUT, OpenTrigger, PairingCode,
    WindowError, WindowState,
};
use crate::context::RequestContext;
use crate::features::energy_control::ATTR_CONTROL_STATE;
use crate::features::{
    ControlState, DeviceIdentity, charging_session, device_info, electrical,
    electrical::ElectricalRatings, energy_control, measurement, status,
};
use crate::limits::{LimitResolver, LimitResolverConfig};
use crate::model::{
    Device, Endpoint, EndpointId, EndpointType, FeatureType, ModelError, Value,
};
use crate::persistence::{PersistedState, PersistenceError, StateStore};
use crate::protolog::{
    CapabilitySnapshotEvent, Category, ControlMsgEvent, Direction, ErrorEventData, EventBody,
    EventHeader, Layer, LocalRole, LogEvent, MessageEvent, ProtocolLogWriter, StateChangeEvent,
};
use crate::subscriptions::{Notification, SubscriptionManager, SubscriptionPolicy};
use crate::wire::{Request, RequestOperation, Response, ResponsePayload, Status};
use crate::zones::{
    FailsafeEvent, ZoneId, ZoneRecord, ZoneRegistry, ZoneRegistryError, ZoneSessions,
};

use super::events::DeviceEvent;
use super::NotificationTransport;

/// The endpoint hosting the controllable load features.
pub const CHARGER_ENDPOINT: EndpointId = EndpointId(1);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors returned by service composition and administration.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Registry(#[from] ZoneRegistryError),
}

/// Pre-parsed runtime configuration the composition root consumes.
#[derive(Builder, Debug)]
pub struct ServiceConfig {
    pub identity: DeviceIdentity,
    #[builder(default = ElectricalRatings::default())]
    pub ratings: ElectricalRatings,
    #[builder(default = LimitResolverConfig::default())]
    pub limits: LimitResolverConfig,
    #[builder(default = SubscriptionPolicy::default())]
    pub subscription_policy: SubscriptionPolicy,
    #[builder(default = DEFAULT_WINDOW_TIMEOUT)]
    pub pase_timeout: Duration,
    pub pairing: PairingCode,
    pub store: Option<StateStore>,
    pub log_path: Option<PathBuf>,
    /// Granularity of the notification tick; bounded well under one second.
    #[builder(default = Duration::from_millis(250))]
    pub notification_tick: Duration,
}

/// Composition root of the device runtime.
///
/// Owns the model, resolver, subscription manager, commissioning window, zone
/// sessions, protocol log and persistence, and routes every incoming
/// operation to the owning component.
pub struct DeviceService {
    device: Arc<Device>,
    resolver: Arc<LimitResolver>,
    subscriptions: Arc<SubscriptionManager>,
    window: Arc<CommissioningWindow>,
    registry: Arc<ZoneRegistry>,
    sessions: Arc<ZoneSessions>,
    log: Arc<ProtocolLogWriter>,
    store: Option<StateStore>,
    certificates: Mutex<Vec<u8>>,
    events: broadcast::Sender<DeviceEvent>,
    transport: Arc<Mutex<Option<Arc<dyn NotificationTransport>>>>,
    pairing: PairingCode,
    cancel: CancellationToken,
}

impl DeviceService {
    /// Builds and starts the runtime; must be called inside a Tokio runtime.
    ///
    /// Restores persisted zones when a store is configured, then enters
    /// commissioning mode when no zone is known yet.
    ///
    /// # Errors
    ///
    /// Returns `Window` for an out-of-bounds PASE timeout. Persistence and
    /// log-file failures degrade with a warning instead of failing startup.
    #[instrument(skip(config), fields(device_id = %config.identity.device_id))]
    pub fn start(config: ServiceConfig) -> Result<Arc<Self>, ServiceError> {
        let device = Device::new(
            config.identity.device_id.clone(),
            config.identity.vendor_id,
            config.identity.product_id,
            device_info::feature(&config.identity),
        );
        device.add_endpoint(
            Endpoint::new(CHARGER_ENDPOINT, EndpointType::EvCharger)
                .with_label("charger")
                .with_feature(electrical::feature(&config.ratings))
                .with_feature(measurement::feature())
                .with_feature(energy_control::feature(
                    config.limits.max_consumption_mw,
                    config.limits.max_production_mw,
                ))
                .with_feature(status::feature())
                .with_feature(charging_session::feature()),
        );

        let log = Arc::new(match &config.log_path {
            Some(path) => ProtocolLogWriter::open(path).unwrap_or_else(|error| {
                warn!(%error, path = %path.display(), "protocol log disabled");
                ProtocolLogWriter::disabled()
            }),
            None => ProtocolLogWriter::disabled(),
        });

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let transport: Arc<Mutex<Option<Arc<dyn NotificationTransport>>>> =
            Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        // One forwarder drains the queue so per-subscription delivery order
        // matches generation order.
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<Notification>();
        let forward_transport = Arc::clone(&transport);
        let forward_token = cancel.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = forward_token.cancelled() => break,
                    notification = notify_rx.recv() => {
                        let Some(notification) = notification else { break };
                        let delivery = forward_transport
                            .lock()
                            .expect("notification transport mutex poisoned")
                            .clone();
                        if let Some(delivery) = delivery {
                            delivery.deliver(notification).await;
                        }
                    }
                }
            }
        });

        let subscriptions = SubscriptionManager::new(
            config.subscription_policy,
            Arc::new(move |notification| {
                let _ = notify_tx.send(notification);
            }),
        );

        // The model dispatches into the subscription layer; the manager holds
        // only (endpoint, feature) keys, never feature references.
        let dispatch_subscriptions = Arc::clone(&subscriptions);
        let dispatch_events = events.clone();
        device.register_change_dispatch(Arc::new(move |changes| {
            for change in changes {
                dispatch_subscriptions.notify_change(
                    change.endpoint,
                    change.feature,
                    change.attribute,
                    change.value.clone(),
                );
                let _ = dispatch_events.send(DeviceEvent::ValueChanged {
                    endpoint: change.endpoint,
                    feature: change.feature,
                    attribute: change.attribute,
                    value: change.value.clone(),
                });
            }
        }));

        let resolver = LimitResolver::new(Arc::clone(&device), CHARGER_ENDPOINT, config.limits);
        resolver.install()?;
        let my_change_subscriptions = Arc::clone(&subscriptions);
        resolver.set_my_change_callback(Arc::new(move |zone, changes| {
            my_change_subscriptions.notify_zone_changes(
                zone,
                CHARGER_ENDPOINT,
                FeatureType::EnergyControl,
                changes,
            );
        }));

        let window = CommissioningWindow::new(config.pase_timeout)?;
        let window_log = Arc::clone(&log);
        let window_device_id = config.identity.device_id.clone();
        window.set_on_state_change(Arc::new(move |from, to| {
            let header = EventHeader::new(
                "commissioning",
                Direction::Out,
                Layer::Service,
                Category::State,
            )
            .with_local_role(LocalRole::Device)
            .with_device_id(window_device_id.clone());
            window_log.append(&LogEvent::new(
                header,
                EventBody::StateChange(StateChangeEvent {
                    subject: "commissioning_window".to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                }),
            ));
        }));
        let timeout_events = events.clone();
        window.set_on_timeout(Arc::new(move || {
            let _ = timeout_events.send(DeviceEvent::CommissioningClosed {
                reason: CloseReason::Timeout,
            });
        }));

        let registry = Arc::new(ZoneRegistry::new());
        let sessions = ZoneSessions::new(Arc::clone(&registry));
        let failsafe_registry = Arc::clone(&registry);
        let failsafe_resolver = Arc::clone(&resolver);
        let failsafe_device = Arc::clone(&device);
        let failsafe_events = events.clone();
        sessions.set_failsafe_hook(Arc::new(move |event| match event {
            FailsafeEvent::Triggered { zone } => {
                let Some(record) = failsafe_registry.get(&zone) else {
                    return;
                };
                failsafe_resolver.apply_failsafe_limits(
                    &zone,
                    record.zone_type,
                    record.failsafe.consumption_limit,
                    record.failsafe.production_limit,
                );
                publish_control_state(&failsafe_device, ControlState::Failsafe);
                let _ = failsafe_events.send(DeviceEvent::FailsafeTriggered { zone });
            }
            FailsafeEvent::Cleared { zone } => {
                failsafe_resolver.clear_zone(&zone);
                recover_from_failsafe(&failsafe_device, &failsafe_resolver, &failsafe_registry);
                let _ = failsafe_events.send(DeviceEvent::FailsafeCleared { zone });
            }
        }));

        let mut certificates = Vec::new();
        if let Some(store) = &config.store {
            match store.load() {
                Ok(Some((stored_certificates, state))) => {
                    certificates = stored_certificates;
                    let records = state.into_records();
                    info!(zones = records.len(), "device state restored");
                    for record in &records {
                        let _ = events.send(DeviceEvent::ZoneRestored {
                            zone: record.id.clone(),
                        });
                    }
                    registry.restore(records);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, "state restore failed; starting with empty state");
                }
            }
        }

        let service = Arc::new(Self {
            device,
            resolver,
            subscriptions,
            window,
            registry,
            sessions,
            log,
            store: config.store,
            certificates: Mutex::new(certificates),
            events,
            transport,
            pairing: config.pairing,
            cancel,
        });

        service.spawn_notification_tick(config.notification_tick);

        if service.registry.is_empty() {
            service.enter_commissioning_mode(OpenTrigger::FactoryReset);
        } else {
            info!(zones = service.registry.len(), "operational; known zones present");
            service.log_control("operational", None);
        }

        Ok(service)
    }

    /// Returns the live device model.
    #[must_use]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the limit resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<LimitResolver> {
        &self.resolver
    }

    /// Returns the subscription manager.
    #[must_use]
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Returns the commissioning window.
    #[must_use]
    pub fn window(&self) -> &Arc<CommissioningWindow> {
        &self.window
    }

    /// Returns the zone registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    /// Returns the advertised pairing material.
    #[must_use]
    pub fn pairing(&self) -> &PairingCode {
        &self.pairing
    }

    /// Subscribes to the typed event stream.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Returns the typed events as a `Stream` for async consumers.
    #[must_use]
    pub fn event_stream(&self) -> BroadcastStream<DeviceEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    /// Registers the notification transport.
    pub fn set_notification_transport(&self, transport: Arc<dyn NotificationTransport>) {
        *self
            .transport
            .lock()
            .expect("notification transport mutex poisoned") = Some(transport);
    }

    /// Builds the request context for an authenticated zone.
    ///
    /// # Errors
    ///
    /// Returns `Registry` when the zone is not commissioned.
    pub fn request_context(&self, zone: &ZoneId) -> Result<RequestContext, ServiceError> {
        let record = self
            .registry
            .get(zone)
            .ok_or_else(|| ZoneRegistryError::ZoneNotFound { zone: zone.clone() })?;
        Ok(RequestContext::for_zone(record.id, record.zone_type))
    }

    /// Handles one decoded request and produces its response.
    ///
    /// Every request from a zone resets that zone's failsafe countdown. A
    /// panic inside dispatch is caught and answered as `InvalidCommand`.
    #[instrument(skip(self, context, request), fields(message_id = request.message_id))]
    pub fn handle_request(&self, context: &RequestContext, request: Request) -> Response {
        if let Some(zone) = context.zone_id() {
            self.sessions.message_received(zone);
        }
        self.log_message(context, &request, None);

        let message_id = request.message_id;
        let response = match catch_unwind(AssertUnwindSafe(|| self.dispatch(context, request))) {
            Ok(response) => response,
            Err(panic) => {
                let detail = panic_message(&panic);
                warn!(detail = %detail, "request handler panicked");
                self.log_error(context, &detail);
                Response::failure(message_id, Status::InvalidCommand)
            }
        };

        self.log_response(context, &response);
        response
    }

    /// Tracks a newly established zone connection.
    ///
    /// # Errors
    ///
    /// Returns `Registry` when the zone is not commissioned.
    pub fn zone_connected(
        &self,
        zone: &ZoneId,
        connection_id: &str,
    ) -> Result<(), ServiceError> {
        if self.registry.get(zone).is_none() {
            return Err(ZoneRegistryError::ZoneNotFound { zone: zone.clone() }.into());
        }
        self.sessions.connected(zone);

        let (endpoint_count, feature_count) = self.device.capability_summary();
        let header = EventHeader::new(
            connection_id,
            Direction::Out,
            Layer::Service,
            Category::Snapshot,
        )
        .with_local_role(LocalRole::Device)
        .with_device_id(self.device.device_id())
        .with_zone_id(zone.as_str());
        self.log.append(&LogEvent::new(
            header,
            EventBody::CapabilitySnapshot(CapabilitySnapshotEvent {
                endpoint_count,
                feature_count,
            }),
        ));

        let _ = self.events.send(DeviceEvent::Connected { zone: zone.clone() });
        Ok(())
    }

    /// Tears down a zone connection: purges its subscriptions and limits.
    ///
    /// The zone record stays; the zone may reconnect and re-establish
    /// everything.
    pub fn zone_disconnected(&self, zone: &ZoneId) {
        self.sessions.disconnected(zone);
        self.subscriptions.clear_zone(zone);
        self.resolver.clear_zone(zone);
        recover_from_failsafe(&self.device, &self.resolver, &self.registry);
        let _ = self
            .events
            .send(DeviceEvent::Disconnected { zone: zone.clone() });
        self.persist();
    }

    /// Opens the commissioning window and advertises pairing material.
    pub fn enter_commissioning_mode(&self, trigger: OpenTrigger) {
        self.window.open(trigger);
        info!(%trigger, qr = %self.pairing.qr_payload(), "commissioning window open");
        let _ = self.events.send(DeviceEvent::CommissioningOpened {
            trigger,
            qr_payload: self.pairing.qr_payload(),
        });
    }

    /// Starts the single PASE session.
    ///
    /// # Errors
    ///
    /// Returns `Window` when the window is closed or busy.
    pub fn begin_pase(&self) -> Result<String, ServiceError> {
        let session = self.window.begin_pase()?;
        self.log_control("pase_started", Some(&session));
        Ok(session)
    }

    /// Completes commissioning: stores the zone and closes the window.
    ///
    /// # Errors
    ///
    /// Returns `Window` for a stale session.
    pub fn complete_commissioning(
        &self,
        session_id: &str,
        record: ZoneRecord,
    ) -> Result<(), ServiceError> {
        self.window.end_pase(session_id, true)?;
        info!(zone = %record.id, zone_type = %record.zone_type, "zone commissioned");
        self.registry.add(record);
        self.persist();
        let _ = self.events.send(DeviceEvent::CommissioningClosed {
            reason: CloseReason::Commissioned,
        });
        Ok(())
    }

    /// Aborts a failed PASE attempt; the window may stay open.
    ///
    /// # Errors
    ///
    /// Returns `Window` for a stale session.
    pub fn abort_pase(&self, session_id: &str) -> Result<(), ServiceError> {
        let resulting = self.window.end_pase(session_id, false)?;
        self.log_control("pase_failed", Some(session_id));
        if resulting == WindowState::Closed {
            let _ = self.events.send(DeviceEvent::CommissioningClosed {
                reason: CloseReason::Timeout,
            });
        }
        Ok(())
    }

    /// Removes a zone permanently and re-opens commissioning when it was the
    /// last one.
    ///
    /// # Errors
    ///
    /// Returns `Registry` when the zone is unknown.
    pub fn remove_zone(&self, zone: &ZoneId) -> Result<(), ServiceError> {
        self.registry.remove(zone)?;
        self.sessions.forget(zone);
        self.subscriptions.clear_zone(zone);
        self.resolver.clear_zone(zone);
        let _ = self.events.send(DeviceEvent::ZoneRemoved { zone: zone.clone() });
        self.persist();
        if self.registry.is_empty() {
            self.enter_commissioning_mode(OpenTrigger::Command);
        }
        Ok(())
    }

    /// Replaces the stored certificate material and persists.
    pub fn set_certificates(&self, certificates: Vec<u8>) {
        *self
            .certificates
            .lock()
            .expect("certificate store mutex poisoned") = certificates;
        self.persist();
    }

    /// Stops timers and tasks, persists state, and closes the log.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.sessions.shutdown();
        self.resolver.shutdown();
        self.window.shutdown();
        self.subscriptions.clear_all();
        self.persist();
        self.log.close();
        info!("device service stopped");
    }

    fn dispatch(&self, context: &RequestContext, request: Request) -> Response {
        let Some(zone) = context.zone_id().cloned() else {
            return Response::failure(request.message_id, Status::Unauthorized);
        };
        let Request {
            message_id,
            endpoint,
            feature,
            operation,
        } = request;

        match operation {
            RequestOperation::Read { attribute: Some(attribute) } => {
                match self
                    .device
                    .read_attribute_with_context(context, endpoint, feature, attribute)
                {
                    Ok(value) => Response::success(message_id, ResponsePayload::Value(value)),
                    Err(error) => Response::failure(message_id, error.status()),
                }
            }
            RequestOperation::Read { attribute: None } => {
                match self
                    .device
                    .read_all_attributes_with_context(context, endpoint, feature)
                {
                    Ok(values) => {
                        Response::success(message_id, ResponsePayload::Attributes(values))
                    }
                    Err(error) => Response::failure(message_id, error.status()),
                }
            }
            RequestOperation::Write { attribute, value } => {
                match self.device.write_attribute(endpoint, feature, attribute, value) {
                    Ok(()) => Response::ok(message_id),
                    Err(error) => Response::failure(message_id, error.status()),
                }
            }
            RequestOperation::Invoke { command, parameters } => {
                match self
                    .device
                    .invoke_command(context, endpoint, feature, command, &parameters)
                {
                    Ok(result) => Response::success(message_id, ResponsePayload::Command(result)),
                    Err(error) => Response::failure(message_id, error.status),
                }
            }
            RequestOperation::Subscribe {
                attribute_ids,
                min_interval,
                max_interval,
            } => {
                let current_values = match self
                    .device
                    .read_all_attributes_with_context(context, endpoint, feature)
                {
                    Ok(values) => values,
                    Err(error) => return Response::failure(message_id, error.status()),
                };
                match self.subscriptions.subscribe(
                    zone,
                    endpoint,
                    feature,
                    attribute_ids,
                    min_interval,
                    max_interval,
                    current_values,
                ) {
                    Ok(subscription_id) => Response::success(
                        message_id,
                        ResponsePayload::Subscription { subscription_id },
                    ),
                    Err(error) => Response::failure(message_id, error.status()),
                }
            }
            RequestOperation::Unsubscribe { subscription_id } => {
                if self.subscriptions.unsubscribe(subscription_id) {
                    Response::ok(message_id)
                } else {
                    Response::failure(message_id, Status::NotFound)
                }
            }
        }
    }

    fn spawn_notification_tick(&self, tick: Duration) {
        let subscriptions = Arc::clone(&self.subscriptions);
        let token = self.cancel.child_token();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => subscriptions.process_notifications(),
                }
            }
        });
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        let certificates = self
            .certificates
            .lock()
            .expect("certificate store mutex poisoned")
            .clone();
        let state = PersistedState::new(self.device.device_id(), self.registry.records());
        if let Err(error) = store.save(&certificates, &state) {
            warn!(%error, "state persistence failed");
        }
    }

    fn connection_of(context: &RequestContext) -> &str {
        context.connection_id().unwrap_or("local")
    }

    fn log_message(&self, context: &RequestContext, request: &Request, status: Option<u8>) {
        let mut header = EventHeader::new(
            Self::connection_of(context),
            Direction::In,
            Layer::Wire,
            Category::Message,
        )
        .with_local_role(LocalRole::Device)
        .with_device_id(self.device.device_id());
        if let Some(zone) = context.zone_id() {
            header = header.with_zone_id(zone.as_str());
        }
        self.log.append(&LogEvent::new(
            header,
            EventBody::Message(MessageEvent {
                message_id: request.message_id,
                operation: Some(request.operation.operation().to_string()),
                endpoint: Some(request.endpoint.0),
                feature: Some(request.feature.id()),
                status,
                payload_len: None,
            }),
        ));
    }

    fn log_response(&self, context: &RequestContext, response: &Response) {
        let mut header = EventHeader::new(
            Self::connection_of(context),
            Direction::Out,
            Layer::Wire,
            Category::Message,
        )
        .with_local_role(LocalRole::Device)
        .with_device_id(self.device.device_id());
        if let Some(zone) = context.zone_id() {
            header = header.with_zone_id(zone.as_str());
        }
        self.log.append(&LogEvent::new(
            header,
            EventBody::Message(MessageEvent {
                message_id: response.message_id,
                operation: None,
                endpoint: None,
                feature: None,
                status: Some(response.status.code()),
                payload_len: None,
            }),
        ));
    }

    fn log_error(&self, context: &RequestContext, detail: &str) {
        let header = EventHeader::new(
            Self::connection_of(context),
            Direction::In,
            Layer::Service,
            Category::Error,
        )
        .with_local_role(LocalRole::Device)
        .with_device_id(self.device.device_id());
        self.log.append(&LogEvent::new(
            header,
            EventBody::Error(ErrorEventData {
                code: None,
                message: detail.to_string(),
            }),
        ));
    }

    fn log_control(&self, kind: &str, detail: Option<&str>) {
        let header = EventHeader::new(
            "service",
            Direction::Out,
            Layer::Service,
            Category::Control,
        )
        .with_local_role(LocalRole::Device)
        .with_device_id(self.device.device_id());
        self.log.append(&LogEvent::new(
            header,
            EventBody::ControlMsg(ControlMsgEvent {
                kind: kind.to_string(),
                detail: detail.map(str::to_string),
            }),
        ));
    }
}

// Leaves OVERRIDE (and any non-failsafe state) untouched; only the failsafe
// owner may unwind FAILSAFE.
fn recover_from_failsafe(
    device: &Arc<Device>,
    resolver: &Arc<LimitResolver>,
    registry: &Arc<ZoneRegistry>,
) {
    if registry.any_failsafe_active() {
        return;
    }
    let current = device
        .read_attribute(
            CHARGER_ENDPOINT,
            FeatureType::EnergyControl,
            ATTR_CONTROL_STATE,
        )
        .ok()
        .and_then(|value| match value {
            Value::U8(code) => ControlState::from_code(code),
            _ => None,
        });
    if current != Some(ControlState::Failsafe) {
        return;
    }
    let (consumption, production) = resolver.effective_limits();
    let recovered = if consumption.is_some() || production.is_some() {
        ControlState::Controlled
    } else {
        ControlState::Autonomous
    };
    publish_control_state(device, recovered);
}

fn publish_control_state(device: &Arc<Device>, state: ControlState) {
    if let Err(error) = device.set_value_internal(
        CHARGER_ENDPOINT,
        FeatureType::EnergyControl,
        ATTR_CONTROL_STATE,
        Value::U8(state.code()),
    ) {
        warn!(%error, "failed to publish control state");
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
