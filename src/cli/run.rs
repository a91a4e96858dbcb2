use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::info;

use crate::service::{CHARGER_ENDPOINT, DeviceEvent, DeviceService};
use crate::sim::SimulatedEvse;

use super::command::RunArgs;

/// Runs the device runtime until Ctrl+C.
pub(crate) async fn run<W: Write>(args: RunArgs, out: &mut W) -> anyhow::Result<()> {
    let config = args.service_config()?;
    let service = DeviceService::start(config)?;

    writeln!(out, "device:      {}", service.device().device_id())?;
    writeln!(out, "qr payload:  {}", service.pairing().qr_payload())?;
    writeln!(out, "manual code: {}", service.pairing().manual_code())?;
    for record in service.registry().records() {
        writeln!(out, "known zone:  {} ({})", record.id, record.zone_type)?;
    }
    out.flush()?;

    let mut events = service.event_stream();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => log_event(&event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    info!(skipped, "event listener lagged");
                }
            }
        }
    });

    let simulation = if args.no_sim {
        None
    } else {
        Some(SimulatedEvse::spawn(
            std::sync::Arc::clone(service.device()),
            CHARGER_ENDPOINT,
            Duration::from_secs(1),
        ))
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed while waiting for Ctrl+C")?;
    info!("shutting down");

    if let Some(simulation) = &simulation {
        simulation.shutdown();
    }
    service.shutdown();
    event_task.abort();
    Ok(())
}

fn log_event(event: &DeviceEvent) {
    match event {
        DeviceEvent::Connected { zone } => info!(%zone, "zone connected"),
        DeviceEvent::Disconnected { zone } => info!(%zone, "zone disconnected"),
        DeviceEvent::CommissioningOpened { trigger, qr_payload } => {
            info!(%trigger, %qr_payload, "commissioning opened");
        }
        DeviceEvent::CommissioningClosed { reason } => {
            info!(%reason, "commissioning closed");
        }
        DeviceEvent::FailsafeTriggered { zone } => info!(%zone, "failsafe triggered"),
        DeviceEvent::FailsafeCleared { zone } => info!(%zone, "failsafe cleared"),
        DeviceEvent::ValueChanged {
            endpoint,
            feature,
            attribute,
            value,
        } => {
            tracing::debug!(%endpoint, %feature, %attribute, %value, "value changed");
        }
        DeviceEvent::ZoneRestored { zone } => info!(%zone, "zone restored"),
        DeviceEvent::ZoneRemoved { zone } => info!(%zone, "zone removed"),
    }
}
