use std::io::{self, IsTerminal, Write};

use anyhow::Context;

use crate::protolog::{ExportFormat, LogStats, ProtocolLogReader, write_csv, write_jsonl};

use super::command::{LogExportArgs, LogStatsArgs};
use super::render::{Painter, Table};

/// Summarises a protocol log file into terminal tables.
pub(crate) fn stats<W: Write>(args: &LogStatsArgs, out: &mut W) -> anyhow::Result<()> {
    let reader = ProtocolLogReader::open(&args.file)
        .with_context(|| format!("failed to open log file `{}`", args.file.display()))?
        .with_filter(args.filter.event_filter());
    let stats = LogStats::collect(reader);
    let painter = Painter::new(io::stdout().is_terminal());

    writeln!(out, "{}", painter.heading("protocol log summary"))?;
    let overview = Table::key_value(
        &painter,
        vec![
            ("events", painter.value(stats.total_events.to_string())),
            ("errors", stats.errors.to_string()),
            ("connections", stats.connections.len().to_string()),
            ("duration", format!("{:?}", stats.duration())),
        ],
    );
    writeln!(out, "{overview}")?;

    let mut breakdown = Vec::new();
    for (layer, count) in &stats.by_layer {
        breakdown.push(vec!["layer".to_string(), layer.to_string(), count.to_string()]);
    }
    for (category, count) in &stats.by_category {
        breakdown.push(vec![
            "category".to_string(),
            category.to_string(),
            count.to_string(),
        ]);
    }
    for (direction, count) in &stats.by_direction {
        breakdown.push(vec![
            "direction".to_string(),
            direction.to_string(),
            count.to_string(),
        ]);
    }
    writeln!(out, "{}", Table::grid(["group", "key", "events"], breakdown))?;

    if !stats.connections.is_empty() {
        writeln!(out, "{}", painter.heading("connections"))?;
        let rows = stats
            .connections
            .iter()
            .map(|(connection_id, connection)| {
                vec![
                    connection_id.clone(),
                    connection.events.to_string(),
                    connection.snapshots.to_string(),
                    connection.device_id.clone().unwrap_or_default(),
                    connection.zone_id.clone().unwrap_or_default(),
                    connection.first_seen.to_string(),
                    connection.last_seen.to_string(),
                ]
            })
            .collect();
        writeln!(
            out,
            "{}",
            Table::grid(
                [
                    "connection",
                    "events",
                    "snapshots",
                    "device",
                    "zone",
                    "first seen",
                    "last seen",
                ],
                rows,
            )
        )?;
    }

    Ok(())
}

/// Exports a protocol log file as JSON lines or CSV.
pub(crate) fn export<W: Write>(args: &LogExportArgs, out: &mut W) -> anyhow::Result<()> {
    let reader = ProtocolLogReader::open(&args.file)
        .with_context(|| format!("failed to open log file `{}`", args.file.display()))?
        .with_filter(args.filter.event_filter());

    let exported = match args.format.into_format() {
        ExportFormat::Jsonl => write_jsonl(reader, out)?,
        ExportFormat::Csv => write_csv(reader, out)?,
    };
    tracing::info!(exported, "log export finished");
    Ok(())
}
