//! Turns day logs into per-year daily and weekly tables.
//!
//! Project columns are ordered by the total time spent on them during the year, most first.
//! Projects with equal totals keep the order in which they were first seen, walking days in
//! ascending order.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::{
    storage::entities::{DayLog, LogRecord},
    utils::{
        percentage::normalize_percentages,
        time::{iso_week, seconds_to_minutes},
    },
};

/// What weekly cells contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WeeklyUnit {
    Minutes,
    Percentage,
}

impl From<bool> for WeeklyUnit {
    fn from(output_percentage: bool) -> Self {
        if output_percentage {
            WeeklyUnit::Percentage
        } else {
            WeeklyUnit::Minutes
        }
    }
}

/// Minutes per project spent on a single date. [None] means the project wasn't tracked that
/// day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub iso_week: u32,
    pub minutes: Vec<Option<u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyRow {
    pub iso_week: u32,
    pub values: Vec<Option<u64>>,
}

/// Everything exported for one calendar year. Cells of every row follow `projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearExport {
    pub year: i32,
    pub projects: Vec<Arc<str>>,
    pub weekly_unit: WeeklyUnit,
    pub daily: Vec<DailyRow>,
    pub weekly: Vec<WeeklyRow>,
}

/// Groups day logs by year, ascending. Logs for the same date are merged.
pub fn aggregate(days: Vec<DayLog>, unit: WeeklyUnit) -> Vec<YearExport> {
    let mut by_date = BTreeMap::<NaiveDate, Vec<LogRecord>>::new();
    for day in days {
        by_date.entry(day.date).or_default().extend(day.records);
    }

    let mut by_year = BTreeMap::<i32, Vec<DayLog>>::new();
    for (date, records) in by_date {
        by_year
            .entry(date.year())
            .or_default()
            .push(DayLog::new(date, records));
    }

    by_year
        .into_iter()
        .map(|(year, days)| aggregate_year(year, &days, unit))
        .collect()
}

fn aggregate_year(year: i32, days: &[DayLog], unit: WeeklyUnit) -> YearExport {
    let day_totals = days
        .iter()
        .map(|day| (day.date, day.totals()))
        .collect::<Vec<_>>();

    let projects = rank_projects(day_totals.iter().flat_map(|(_, totals)| totals));
    let columns = projects
        .iter()
        .enumerate()
        .map(|(index, name)| (name.clone(), index))
        .collect::<HashMap<_, _>>();

    let mut daily = Vec::with_capacity(day_totals.len());
    let mut weeks = BTreeMap::<u32, Vec<Option<u64>>>::new();
    for (date, totals) in &day_totals {
        let week = iso_week(*date);
        let mut seconds = vec![None; projects.len()];
        let week_seconds = weeks
            .entry(week)
            .or_insert_with(|| vec![None; projects.len()]);
        for record in totals {
            let column = columns[&record.project_name];
            seconds[column] = Some(record.duration_seconds);
            let week_total = week_seconds[column].get_or_insert(0);
            *week_total = week_total.saturating_add(record.duration_seconds);
        }

        daily.push(DailyRow {
            date: *date,
            iso_week: week,
            minutes: to_minutes(&seconds),
        });
    }

    let weekly = weeks
        .into_iter()
        .map(|(iso_week, seconds)| WeeklyRow {
            iso_week,
            values: match unit {
                WeeklyUnit::Minutes => to_minutes(&seconds),
                WeeklyUnit::Percentage => to_percentages(&seconds),
            },
        })
        .collect();

    YearExport {
        year,
        projects,
        weekly_unit: unit,
        daily,
        weekly,
    }
}

/// Orders projects by total seconds, most first. Equal totals keep first appearance order.
fn rank_projects<'a>(records: impl Iterator<Item = &'a LogRecord>) -> Vec<Arc<str>> {
    let mut positions = HashMap::<Arc<str>, usize>::new();
    let mut totals = Vec::<(Arc<str>, u64)>::new();
    for record in records {
        match positions.get(&record.project_name) {
            Some(&position) => {
                totals[position].1 = totals[position].1.saturating_add(record.duration_seconds)
            }
            None => {
                positions.insert(record.project_name.clone(), totals.len());
                totals.push((record.project_name.clone(), record.duration_seconds));
            }
        }
    }

    // sort_by is stable, which keeps ties in discovery order.
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    totals.into_iter().map(|(name, _)| name).collect()
}

fn to_minutes(seconds: &[Option<u64>]) -> Vec<Option<u64>> {
    seconds.iter().map(|s| s.map(seconds_to_minutes)).collect()
}

/// Every column gets a value, projects without time count as 0. Weeks without any time get no
/// values at all.
fn to_percentages(seconds: &[Option<u64>]) -> Vec<Option<u64>> {
    let totals = seconds.iter().map(|s| s.unwrap_or(0)).collect::<Vec<_>>();
    match normalize_percentages(&totals) {
        Some(percentages) => percentages
            .into_iter()
            .map(|p| Some(u64::from(p)))
            .collect(),
        None => vec![None; seconds.len()],
    }
}
