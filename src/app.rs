use std::io;

use anyhow::Result;

use crate::cli::{Args, Command, LogCommand};
use crate::commissioning::{Discriminator, PairingCode, SetupCode};
use crate::telemetry;

/// Runs the CLI with already parsed arguments.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = mash::Args::try_parse_from(["mash", "pairing-code", "--discriminator", "77"])?;
/// let mut out = Vec::new();
/// mash::run(args, &mut out).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the configuration is
/// invalid, the runtime fails, or output writing fails.
pub async fn run<W>(args: Args, out: &mut W) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing("mash")?;

    match args.command {
        Command::Run(run_args) => crate::cli::run::run(run_args, out).await,
        Command::Log(LogCommand::Stats(stats_args)) => crate::cli::logview::stats(&stats_args, out),
        Command::Log(LogCommand::Export(export_args)) => {
            crate::cli::logview::export(&export_args, out)
        }
        Command::PairingCode(pairing_args) => {
            let pairing = PairingCode::new(
                Discriminator::new(pairing_args.discriminator)?,
                SetupCode::new(pairing_args.setup_code)?,
            );
            writeln!(out, "qr payload:  {}", pairing.qr_payload())?;
            writeln!(out, "manual code: {}", pairing.manual_code())?;
            Ok(())
        }
    }
}
