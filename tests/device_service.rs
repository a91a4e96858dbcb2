use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

use mash::device_info::ATTR_DEVICE_ID;
use mash::energy_control::{
    ATTR_CONTROL_STATE, ATTR_EFFECTIVE_CONSUMPTION_LIMIT, CMD_SET_LIMIT,
};
use mash::{
    CHARGER_ENDPOINT, ControlState, DeviceEvent, DeviceIdentity, DeviceService, Discriminator,
    EndpointId, FailsafeConfig, FeatureType, LimitResolverConfig, Notification,
    NotificationTransport, PairingCode, ParamMap, Request, RequestOperation, Response,
    ResponsePayload, ServiceConfig, SetupCode, StateStore, Status, Value, WindowState, ZoneId,
    ZoneRecord, ZoneType,
};

fn unique_temp_path(file_name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("mash-{file_name}-{suffix}.bin"))
}

fn pairing() -> PairingCode {
    PairingCode::new(
        Discriminator::new(3840).expect("discriminator fits"),
        SetupCode::new("26031549").expect("setup code is valid"),
    )
}

fn identity() -> DeviceIdentity {
    DeviceIdentity::builder()
        .device_id("mash-evse-01")
        .vendor_id(0xFFF1)
        .product_id(0x8001)
        .vendor_name("MASH Labs")
        .product_name("Wallbox One")
        .serial_number("WB1-000123")
        .software_version("0.1.0")
        .build()
}

fn config(state_path: Option<PathBuf>) -> ServiceConfig {
    ServiceConfig::builder()
        .identity(identity())
        .limits(
            LimitResolverConfig::builder()
                .max_consumption_mw(22_000_000)
                .build(),
        )
        .pairing(pairing())
        .maybe_store(state_path.map(StateStore::new))
        .build()
}

fn grid_record(failsafe_consumption: Option<i64>, failsafe_secs: u64) -> ZoneRecord {
    ZoneRecord::new(
        ZoneId::new("zone-grid"),
        ZoneType::Grid,
        FailsafeConfig {
            duration: Duration::from_secs(failsafe_secs),
            consumption_limit: failsafe_consumption,
            production_limit: None,
        },
    )
}

fn commission(service: &DeviceService, record: ZoneRecord) {
    let session = service.begin_pase().expect("PASE should begin");
    service
        .complete_commissioning(&session, record)
        .expect("commissioning should complete");
}

fn invoke_set_limit(service: &DeviceService, zone: &ZoneId, limit_mw: i64) -> Response {
    let context = service
        .request_context(zone)
        .expect("zone should be commissioned");
    service.handle_request(
        &context,
        Request {
            message_id: 10,
            endpoint: CHARGER_ENDPOINT,
            feature: FeatureType::EnergyControl,
            operation: RequestOperation::Invoke {
                command: CMD_SET_LIMIT,
                parameters: ParamMap::from([
                    ("consumptionLimit".to_string(), Value::I64(limit_mw)),
                    ("cause".to_string(), Value::U8(0)),
                ]),
            },
        },
    )
}

struct CollectingTransport(Mutex<Vec<Notification>>);

#[async_trait]
impl NotificationTransport for CollectingTransport {
    async fn deliver(&self, notification: Notification) {
        self.0
            .lock()
            .expect("test transport mutex poisoned")
            .push(notification);
    }
}

#[tokio::test]
async fn fresh_devices_open_commissioning_and_accept_a_zone() {
    let service = DeviceService::start(config(None)).expect("service should start");
    assert_eq!(WindowState::Open, service.window().state());

    commission(&service, grid_record(None, 120));
    assert_eq!(WindowState::Closed, service.window().state());
    assert_eq!(1, service.registry().len());

    let zone = ZoneId::new("zone-grid");
    service
        .zone_connected(&zone, "conn-1")
        .expect("commissioned zone should connect");

    let context = service
        .request_context(&zone)
        .expect("zone should be commissioned");
    let response = service.handle_request(
        &context,
        Request {
            message_id: 1,
            endpoint: EndpointId::ROOT,
            feature: FeatureType::DeviceInfo,
            operation: RequestOperation::Read {
                attribute: Some(ATTR_DEVICE_ID),
            },
        },
    );
    assert_eq!(Status::Success, response.status);
    assert_eq!(
        Some(ResponsePayload::Value(Value::Text("mash-evse-01".into()))),
        response.payload
    );

    service.shutdown();
}

#[tokio::test]
async fn set_limit_requests_update_the_effective_attribute() {
    let service = DeviceService::start(config(None)).expect("service should start");
    commission(&service, grid_record(None, 120));
    let zone = ZoneId::new("zone-grid");
    service
        .zone_connected(&zone, "conn-1")
        .expect("commissioned zone should connect");

    let response = invoke_set_limit(&service, &zone, 9_000_000);
    assert_eq!(Status::Success, response.status);
    let Some(ResponsePayload::Command(result)) = response.payload else {
        panic!("invoke should return a command payload");
    };
    assert_eq!(Some(&Value::Bool(true)), result.get("applied"));

    let effective = service
        .device()
        .read_attribute(
            CHARGER_ENDPOINT,
            FeatureType::EnergyControl,
            ATTR_EFFECTIVE_CONSUMPTION_LIMIT,
        )
        .expect("effective limit should read");
    assert_eq!(Value::I64(9_000_000), effective);

    service.shutdown();
}

#[tokio::test]
async fn requests_without_zone_identity_are_unauthorized() {
    let service = DeviceService::start(config(None)).expect("service should start");

    let response = service.handle_request(
        &mash::RequestContext::internal(),
        Request {
            message_id: 5,
            endpoint: EndpointId::ROOT,
            feature: FeatureType::DeviceInfo,
            operation: RequestOperation::Read { attribute: None },
        },
    );
    assert_eq!(Status::Unauthorized, response.status);

    service.shutdown();
}

#[tokio::test]
async fn subscriptions_prime_through_the_registered_transport() {
    let service = DeviceService::start(config(None)).expect("service should start");
    let transport = Arc::new(CollectingTransport(Mutex::new(Vec::new())));
    service.set_notification_transport(Arc::clone(&transport) as Arc<dyn NotificationTransport>);

    commission(&service, grid_record(None, 120));
    let zone = ZoneId::new("zone-grid");
    service
        .zone_connected(&zone, "conn-1")
        .expect("commissioned zone should connect");

    let context = service
        .request_context(&zone)
        .expect("zone should be commissioned");
    let response = service.handle_request(
        &context,
        Request {
            message_id: 2,
            endpoint: CHARGER_ENDPOINT,
            feature: FeatureType::EnergyControl,
            operation: RequestOperation::Subscribe {
                attribute_ids: Vec::new(),
                min_interval: Duration::from_millis(100),
                max_interval: Duration::from_secs(1),
            },
        },
    );
    assert_matches!(
        response.payload,
        Some(ResponsePayload::Subscription { .. })
    );
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let delivered = transport.0.lock().expect("test transport mutex poisoned");
    assert_eq!(1, delivered.len());
    assert!(delivered[0].is_priming);
    assert!(
        delivered[0]
            .attributes
            .contains_key(&ATTR_EFFECTIVE_CONSUMPTION_LIMIT)
    );

    service.shutdown();
}

#[tokio::test(start_paused = true)]
async fn silent_zones_trip_the_failsafe_and_recover_on_traffic() {
    let service = DeviceService::start(config(None)).expect("service should start");
    let mut events = service.subscribe_events();
    commission(&service, grid_record(Some(2_000_000), 5));
    let zone = ZoneId::new("zone-grid");
    service
        .zone_connected(&zone, "conn-1")
        .expect("commissioned zone should connect");

    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    assert!(service.registry().is_failsafe_active(&zone));
    let effective = service
        .device()
        .read_attribute(
            CHARGER_ENDPOINT,
            FeatureType::EnergyControl,
            ATTR_EFFECTIVE_CONSUMPTION_LIMIT,
        )
        .expect("effective limit should read");
    assert_eq!(Value::I64(2_000_000), effective);
    let state = service
        .device()
        .read_attribute(CHARGER_ENDPOINT, FeatureType::EnergyControl, ATTR_CONTROL_STATE)
        .expect("control state should read");
    assert_eq!(Value::U8(ControlState::Failsafe.code()), state);

    // The zone speaks again: failsafe clears without a disconnect.
    let context = service
        .request_context(&zone)
        .expect("zone should be commissioned");
    service.handle_request(
        &context,
        Request {
            message_id: 3,
            endpoint: EndpointId::ROOT,
            feature: FeatureType::DeviceInfo,
            operation: RequestOperation::Read { attribute: None },
        },
    );
    tokio::task::yield_now().await;

    assert!(!service.registry().is_failsafe_active(&zone));
    assert!(service.registry().is_connected(&zone));
    let effective = service
        .device()
        .read_attribute(
            CHARGER_ENDPOINT,
            FeatureType::EnergyControl,
            ATTR_EFFECTIVE_CONSUMPTION_LIMIT,
        )
        .expect("effective limit should read");
    assert_eq!(Value::Null, effective);

    let mut saw_triggered = false;
    let mut saw_cleared = false;
    while let Ok(event) = events.try_recv() {
        match event {
            DeviceEvent::FailsafeTriggered { zone: fired } if fired == zone => {
                saw_triggered = true;
            }
            DeviceEvent::FailsafeCleared { zone: fired } if fired == zone => {
                saw_cleared = true;
            }
            _ => {}
        }
    }
    assert!(saw_triggered);
    assert!(saw_cleared);

    service.shutdown();
}

#[tokio::test]
async fn zones_survive_a_restart_without_their_subscriptions() {
    let state_path = unique_temp_path("service-restart");

    {
        let service =
            DeviceService::start(config(Some(state_path.clone()))).expect("service should start");
        commission(&service, grid_record(Some(2_000_000), 120));
        service.set_certificates(b"device certificate material".to_vec());
        service.shutdown();
    }

    let service =
        DeviceService::start(config(Some(state_path.clone()))).expect("service should restart");
    // A known zone exists, so the device goes operational instead of
    // opening commissioning.
    assert_eq!(WindowState::Closed, service.window().state());
    assert_eq!(1, service.registry().len());

    let zone = ZoneId::new("zone-grid");
    let record = service
        .registry()
        .get(&zone)
        .expect("restored zone should be known");
    assert_eq!(ZoneType::Grid, record.zone_type);
    assert_eq!(Some(2_000_000), record.failsafe.consumption_limit);
    assert!(!service.registry().is_connected(&zone));
    assert_eq!(0, service.subscriptions().subscription_count());

    service.shutdown();
    std::fs::remove_file(&state_path).expect("temp state should remove");
}

#[tokio::test]
async fn disconnect_purges_subscriptions_and_limits_but_keeps_the_zone() {
    let service = DeviceService::start(config(None)).expect("service should start");
    commission(&service, grid_record(None, 120));
    let zone = ZoneId::new("zone-grid");
    service
        .zone_connected(&zone, "conn-1")
        .expect("commissioned zone should connect");

    invoke_set_limit(&service, &zone, 9_000_000);
    let context = service
        .request_context(&zone)
        .expect("zone should be commissioned");
    service.handle_request(
        &context,
        Request {
            message_id: 4,
            endpoint: CHARGER_ENDPOINT,
            feature: FeatureType::EnergyControl,
            operation: RequestOperation::Subscribe {
                attribute_ids: Vec::new(),
                min_interval: Duration::from_millis(100),
                max_interval: Duration::from_secs(1),
            },
        },
    );
    assert_eq!(1, service.subscriptions().subscription_count());

    service.zone_disconnected(&zone);

    assert_eq!(0, service.subscriptions().subscription_count());
    assert_eq!((None, None), service.resolver().effective_limits());
    assert_eq!(1, service.registry().len());

    service.shutdown();
}

#[tokio::test]
async fn removing_the_last_zone_reopens_commissioning() {
    let service = DeviceService::start(config(None)).expect("service should start");
    commission(&service, grid_record(None, 120));
    assert_eq!(WindowState::Closed, service.window().state());

    let zone = ZoneId::new("zone-grid");
    service.remove_zone(&zone).expect("known zone should remove");

    assert_eq!(0, service.registry().len());
    assert_eq!(WindowState::Open, service.window().state());
    assert_matches!(
        service.remove_zone(&zone),
        Err(mash::ServiceError::Registry(_))
    );

    service.shutdown();
}

#[tokio::test]
async fn panics_inside_handlers_answer_as_invalid_command() {
    let service = DeviceService::start(config(None)).expect("service should start");
    commission(&service, grid_record(None, 120));
    let zone = ZoneId::new("zone-grid");
    service
        .zone_connected(&zone, "conn-1")
        .expect("commissioned zone should connect");

    service
        .device()
        .install_command_handler(
            CHARGER_ENDPOINT,
            FeatureType::EnergyControl,
            mash::energy_control::CMD_CLEAR_LIMIT,
            Arc::new(|_context, _parameters| panic!("handler exploded")),
        )
        .expect("handler should rebind");

    let context = service
        .request_context(&zone)
        .expect("zone should be commissioned");
    let response = service.handle_request(
        &context,
        Request {
            message_id: 6,
            endpoint: CHARGER_ENDPOINT,
            feature: FeatureType::EnergyControl,
            operation: RequestOperation::Invoke {
                command: mash::energy_control::CMD_CLEAR_LIMIT,
                parameters: ParamMap::new(),
            },
        },
    );
    assert_eq!(Status::InvalidCommand, response.status);

    service.shutdown();
}
