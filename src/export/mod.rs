pub mod aggregation;
pub mod sink;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{error, info};

use crate::storage::{entities::DayLog, record_storage::RecordStorage};

use aggregation::{aggregate, WeeklyUnit};
use sink::ExportSink;

/// Inclusive range of dates to export. Missing bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ExportRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| from <= date) && self.to.map_or(true, |to| date <= to)
    }
}

/// Reads every day log in `range`. A few files are read ahead while earlier ones are parsed.
/// Any corrupted log fails the whole collection.
pub async fn collect_day_logs(
    storage: &impl RecordStorage,
    range: ExportRange,
) -> Result<Vec<DayLog>> {
    let days = storage
        .list_days()
        .await
        .context("Failed to list day logs")?;

    stream::iter(days.into_iter().filter(|day| range.contains(*day)))
        .map(|day| async move {
            storage.get_data_for(day).await.inspect_err(|e| {
                error!("Failed to process file {day} {e}");
            })
        })
        .buffered(4)
        .map_err(anyhow::Error::from)
        .try_collect()
        .await
}

/// Aggregates every day log in `range` and hands the result to `sink` year by year. Returns the
/// number of exported years.
pub async fn export_to_sink(
    storage: &impl RecordStorage,
    range: ExportRange,
    unit: WeeklyUnit,
    sink: &mut dyn ExportSink,
) -> Result<usize> {
    let days = collect_day_logs(storage, range).await?;
    let day_count = days.len();
    let years = aggregate(days, unit);
    for year in &years {
        sink.write_year(year)?;
    }
    sink.finish()?;
    info!("Exported {day_count} days in {} years", years.len());
    Ok(years.len())
}
