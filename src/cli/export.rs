use std::{collections::HashMap, fmt::Display, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use tracing::warn;

use crate::{
    export::{
        aggregation::WeeklyUnit,
        export_to_sink,
        sink::{CsvDirectorySink, ExportSink, JsonSink, TerminalSink},
        ExportRange,
    },
    session::registry::ProjectRegistry,
    storage::record_storage::RecordStorageImpl,
    utils::dir::AppPaths,
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
    Table,
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Table => write!(f, "table"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ExportCommand {
    #[arg(
        long,
        short,
        help = "Output location. A directory for csv, a file for json. Defaults to the exports directory for csv and stdout for json"
    )]
    out: Option<PathBuf>,
    #[arg(long, short, default_value_t = ExportFormat::Csv)]
    format: ExportFormat,
    #[arg(
        long = "from",
        help = "First exported day. Examples are \"yesterday\", \"last monday\", \"15/03/2025\""
    )]
    from_date: Option<String>,
    #[arg(
        long = "to",
        help = "Last exported day. Examples are \"yesterday\", \"last monday\", \"15/03/2025\""
    )]
    to_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        short,
        long,
        help = "Write weekly tables as percentages regardless of the configuration"
    )]
    percentage: bool,
}

/// Command to process `export`. The configuration is only needed for the weekly unit and the
/// project colors, so exporting still works without one.
pub async fn process_export_command(
    ExportCommand {
        out,
        format,
        from_date,
        to_date,
        date_style,
        percentage,
    }: ExportCommand,
    paths: &AppPaths,
) -> Result<()> {
    let range = parse_range(from_date, to_date, date_style)?;

    let registry = match ProjectRegistry::load(&paths.config) {
        Ok(load) => Some(load.registry),
        Err(e) => {
            warn!("Exporting without configuration: {e}");
            None
        }
    };
    let unit = WeeklyUnit::from(
        percentage || registry.as_ref().is_some_and(|r| r.output_percentage()),
    );

    let storage = RecordStorageImpl::new(paths.records.clone())?;

    let mut sink: Box<dyn ExportSink> = match format {
        ExportFormat::Csv => Box::new(CsvDirectorySink::new(
            out.clone().unwrap_or_else(|| paths.exports()),
        )),
        ExportFormat::Json => match &out {
            Some(path) => Box::new(JsonSink::new(std::io::BufWriter::new(
                std::fs::File::create(path)
                    .with_context(|| format!("Failed to create {path:?}"))?,
            ))),
            None => Box::new(JsonSink::new(std::io::stdout())),
        },
        ExportFormat::Table => {
            let colors = registry
                .iter()
                .flat_map(|r| r.projects())
                .map(|p| (p.name.clone(), p.color.clone()))
                .collect::<HashMap<_, _>>();
            Box::new(TerminalSink::new(std::io::stdout(), colors))
        }
    };

    let years = export_to_sink(&storage, range, unit, sink.as_mut()).await?;
    if format == ExportFormat::Csv {
        let dir = out.unwrap_or_else(|| paths.exports());
        eprintln!("Exported {years} years into {}", dir.display());
    }
    Ok(())
}

fn parse_range(
    from_date: Option<String>,
    to_date: Option<String>,
    date_style: DateStyle,
) -> Result<ExportRange> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();
    let parse = |value: Option<String>, name: &str| -> Result<Option<NaiveDate>> {
        match value.map(|s| parse_date_string(&s, now, dialect)) {
            Some(Ok(v)) => Ok(Some(v.date_naive())),
            Some(Err(e)) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate {name} date {e}"),
                )
                .into()),
            None => Ok(None),
        }
    };
    let range = ExportRange {
        from: parse(from_date, "from")?,
        to: parse(to_date, "to")?,
    };

    if let ExportRange {
        from: Some(from),
        to: Some(to),
    } = range
    {
        if from > to {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Range starts on {from} after it ends on {to}"),
                )
                .into());
        }
    }
    Ok(range)
}
