use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::commissioning::{Discriminator, PairingCode, SetupCode};
use crate::error::CliConfigError;
use crate::features::DeviceIdentity;
use crate::features::electrical::ElectricalRatings;
use crate::limits::LimitResolverConfig;
use crate::persistence::StateStore;
use crate::protolog::{Category, Direction, EventFilter, ExportFormat, Layer};
use crate::service::ServiceConfig;

/// Command-line options for the MASH device runtime.
#[derive(Debug, Parser)]
#[command(name = "mash", about = "Run and inspect MASH energy devices.")]
pub struct Args {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the device runtime with a simulated EVSE.
    Run(RunArgs),
    /// Inspects a protocol log file.
    #[command(subcommand)]
    Log(LogCommand),
    /// Prints the commissioning QR payload and manual pairing code.
    PairingCode(PairingArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Device identity string.
    #[arg(long, default_value = "mash-evse-01")]
    pub device_id: String,
    /// Vendor ID.
    #[arg(long, default_value_t = 0xFFF1)]
    pub vendor_id: u16,
    /// Product ID.
    #[arg(long, default_value_t = 0x8001)]
    pub product_id: u16,
    /// Device capacity for consumption limits, in mW (0 = unbounded).
    #[arg(long, default_value_t = 22_000_000)]
    pub max_consumption: i64,
    /// Device capacity for production limits, in mW (0 = unbounded).
    #[arg(long, default_value_t = 0)]
    pub max_production: i64,
    /// Commissioning window timeout (e.g. `120s`).
    #[arg(long, value_parser = parse_duration, default_value = "120s")]
    pub pase_timeout: Duration,
    /// Pairing discriminator in 0..=4095.
    #[arg(long, default_value_t = 3840)]
    pub discriminator: u16,
    /// 8-digit pairing setup code.
    #[arg(long, default_value = "26031549")]
    pub setup_code: String,
    /// State file path; defaults to the platform state directory.
    #[arg(long)]
    pub state_path: Option<PathBuf>,
    /// Protocol log file path; logging is off without it.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Disables the simulated EVSE loop.
    #[arg(long)]
    pub no_sim: bool,
}

impl RunArgs {
    /// Builds the pre-parsed service configuration the core consumes.
    pub(crate) fn service_config(&self) -> anyhow::Result<ServiceConfig> {
        if self.device_id.trim().is_empty() {
            return Err(CliConfigError::EmptyDeviceId.into());
        }
        let pairing = PairingCode::new(
            Discriminator::new(self.discriminator)?,
            SetupCode::new(self.setup_code.clone())?,
        );
        let identity = DeviceIdentity::builder()
            .device_id(self.device_id.clone())
            .vendor_id(self.vendor_id)
            .product_id(self.product_id)
            .vendor_name("MASH Labs")
            .product_name("Wallbox One")
            .serial_number(format!("{}-sn", self.device_id))
            .software_version(env!("CARGO_PKG_VERSION"))
            .build();
        let store = Some(match &self.state_path {
            Some(path) => StateStore::new(path.clone()),
            None => StateStore::at_default_path(),
        });

        Ok(ServiceConfig::builder()
            .identity(identity)
            .ratings(ElectricalRatings {
                max_power_mw: if self.max_consumption > 0 {
                    self.max_consumption
                } else {
                    ElectricalRatings::default().max_power_mw
                },
                ..ElectricalRatings::default()
            })
            .limits(
                LimitResolverConfig::builder()
                    .max_consumption_mw(self.max_consumption)
                    .max_production_mw(self.max_production)
                    .build(),
            )
            .pase_timeout(self.pase_timeout)
            .pairing(pairing)
            .maybe_store(store)
            .maybe_log_path(self.log_file.clone())
            .build())
    }
}

#[derive(Debug, Subcommand)]
pub enum LogCommand {
    /// Summarises a protocol log file.
    Stats(LogStatsArgs),
    /// Exports a protocol log file as JSON lines or CSV.
    Export(LogExportArgs),
}

#[derive(Debug, clap::Args)]
pub struct LogStatsArgs {
    /// Protocol log file to read.
    pub file: PathBuf,
    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, clap::Args)]
pub struct LogExportArgs {
    /// Protocol log file to read.
    pub file: PathBuf,
    /// Output encoding.
    #[arg(long, value_enum, default_value = "jsonl")]
    pub format: FormatArg,
    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Shared event-filter flags.
#[derive(Debug, Default, clap::Args)]
pub struct FilterArgs {
    /// Keep only events of one connection.
    #[arg(long)]
    pub connection: Option<String>,
    /// Keep only events flowing one way.
    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,
    /// Keep only events of one stack layer.
    #[arg(long, value_enum)]
    pub layer: Option<LayerArg>,
    /// Keep only events of one category.
    #[arg(long, value_enum)]
    pub category: Option<CategoryArg>,
    /// Keep only events at or after this RFC 3339 instant.
    #[arg(long, value_parser = parse_instant)]
    pub since: Option<OffsetDateTime>,
    /// Keep only events strictly before this RFC 3339 instant.
    #[arg(long, value_parser = parse_instant)]
    pub until: Option<OffsetDateTime>,
    /// Keep only events of one device.
    #[arg(long)]
    pub device: Option<String>,
    /// Keep only events of one zone.
    #[arg(long)]
    pub zone: Option<String>,
}

impl FilterArgs {
    pub(crate) fn event_filter(&self) -> EventFilter {
        EventFilter {
            connection_id: self.connection.clone(),
            direction: self.direction.map(DirectionArg::into_direction),
            layer: self.layer.map(LayerArg::into_layer),
            category: self.category.map(CategoryArg::into_category),
            time_start: self.since,
            time_end: self.until,
            device_id: self.device.clone(),
            zone_id: self.zone.clone(),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct PairingArgs {
    /// Pairing discriminator in 0..=4095.
    #[arg(long, default_value_t = 3840)]
    pub discriminator: u16,
    /// 8-digit pairing setup code.
    #[arg(long, default_value = "26031549")]
    pub setup_code: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    In,
    Out,
}

impl DirectionArg {
    fn into_direction(self) -> Direction {
        match self {
            DirectionArg::In => Direction::In,
            DirectionArg::Out => Direction::Out,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LayerArg {
    Transport,
    Wire,
    Service,
}

impl LayerArg {
    fn into_layer(self) -> Layer {
        match self {
            LayerArg::Transport => Layer::Transport,
            LayerArg::Wire => Layer::Wire,
            LayerArg::Service => Layer::Service,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum CategoryArg {
    Message,
    Control,
    State,
    Error,
    Snapshot,
}

impl CategoryArg {
    fn into_category(self) -> Category {
        match self {
            CategoryArg::Message => Category::Message,
            CategoryArg::Control => Category::Control,
            CategoryArg::State => Category::State,
            CategoryArg::Error => Category::Error,
            CategoryArg::Snapshot => Category::Snapshot,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum FormatArg {
    Jsonl,
    Csv,
}

impl FormatArg {
    pub(crate) fn into_format(self) -> ExportFormat {
        match self {
            FormatArg::Jsonl => ExportFormat::Jsonl,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

fn parse_instant(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(value, &Rfc3339)
}
