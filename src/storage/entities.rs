use std::{collections::HashMap, fmt::Display, sync::Arc};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Longest period a single record may hold, a leap year. Keeping every record below this makes
/// summing a day or a year of records overflow free.
pub const MAX_DURATION_SECONDS: u64 = 366 * 24 * 60 * 60;

/// One finished active period as it is stored on disk. Periods are never merged when written,
/// so the same project may appear many times in one day.
#[derive(PartialEq, Eq, Debug, Serialize, Clone)]
pub struct LogRecord {
    pub project_name: Arc<str>,
    pub duration_seconds: u64,
}

/// Reasons a single day log line can't be parsed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LineError {
    #[error("expected 2 comma separated fields, found {0}")]
    FieldCount(usize),
    #[error("project name is empty")]
    EmptyName,
    #[error("duration {0:?} is not a non-negative integer")]
    InvalidDuration(String),
    #[error("duration of {0} seconds is longer than a year")]
    DurationTooLong(u64),
}

impl LogRecord {
    pub fn new(project_name: impl Into<Arc<str>>, duration_seconds: u64) -> Self {
        Self {
            project_name: project_name.into(),
            duration_seconds,
        }
    }

    /// Parses a line without its line break.
    pub fn parse_line(line: &str) -> Result<Self, LineError> {
        let fields = line.split(',').collect::<Vec<_>>();
        let [name, duration] = fields.as_slice() else {
            return Err(LineError::FieldCount(fields.len()));
        };
        if name.is_empty() {
            return Err(LineError::EmptyName);
        }
        let duration_seconds = duration
            .trim()
            .parse::<u64>()
            .map_err(|_| LineError::InvalidDuration(duration.to_string()))?;
        if duration_seconds > MAX_DURATION_SECONDS {
            return Err(LineError::DurationTooLong(duration_seconds));
        }
        Ok(Self::new(*name, duration_seconds))
    }
}

impl Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.project_name, self.duration_seconds)
    }
}

/// Contents of a single day log.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct DayLog {
    pub date: NaiveDate,
    pub records: Vec<LogRecord>,
}

impl DayLog {
    pub fn new(date: NaiveDate, records: Vec<LogRecord>) -> Self {
        Self { date, records }
    }

    /// Sums durations per project. Projects keep the order in which they first appear in the
    /// log.
    pub fn totals(&self) -> Vec<LogRecord> {
        let mut positions = HashMap::<Arc<str>, usize>::new();
        let mut totals = Vec::<LogRecord>::new();
        for record in &self.records {
            match positions.get(&record.project_name) {
                Some(&position) => {
                    let total = &mut totals[position].duration_seconds;
                    *total = total.saturating_add(record.duration_seconds);
                }
                None => {
                    positions.insert(record.project_name.clone(), totals.len());
                    totals.push(record.clone());
                }
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DayLog, LineError, LogRecord, MAX_DURATION_SECONDS};

    #[test]
    fn parse_valid_line() {
        assert_eq!(
            LogRecord::parse_line("Alpha,1800"),
            Ok(LogRecord::new("Alpha", 1800))
        );
        assert_eq!(
            LogRecord::parse_line("Deep work ,5"),
            Ok(LogRecord::new("Deep work ", 5))
        );
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert_eq!(LogRecord::parse_line("Alpha"), Err(LineError::FieldCount(1)));
        assert_eq!(
            LogRecord::parse_line("Alpha,1,2"),
            Err(LineError::FieldCount(3))
        );
        assert_eq!(LogRecord::parse_line(",10"), Err(LineError::EmptyName));
        assert_eq!(
            LogRecord::parse_line("Alpha,ten"),
            Err(LineError::InvalidDuration("ten".into()))
        );
        assert_eq!(
            LogRecord::parse_line("Alpha,-4"),
            Err(LineError::InvalidDuration("-4".into()))
        );
    }

    #[test]
    fn parse_rejects_durations_that_could_overflow_totals() {
        assert_eq!(
            LogRecord::parse_line("Alpha,18446744073709551615"),
            Err(LineError::DurationTooLong(u64::MAX))
        );
        assert_eq!(
            LogRecord::parse_line("Alpha,31622401"),
            Err(LineError::DurationTooLong(31_622_401))
        );
        assert_eq!(
            LogRecord::parse_line("Alpha,31622400"),
            Ok(LogRecord::new("Alpha", MAX_DURATION_SECONDS))
        );
    }

    #[test]
    fn totals_never_wrap() {
        let log = DayLog::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            vec![LogRecord::new("Alpha", u64::MAX), LogRecord::new("Alpha", 1)],
        );
        assert_eq!(log.totals(), vec![LogRecord::new("Alpha", u64::MAX)]);
    }

    #[test]
    fn display_matches_file_layout() {
        assert_eq!(LogRecord::new("Alpha", 12).to_string(), "Alpha,12");
    }

    #[test]
    fn totals_merge_in_first_appearance_order() {
        let log = DayLog::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            vec![
                LogRecord::new("Beta", 10),
                LogRecord::new("Alpha", 5),
                LogRecord::new("Beta", 20),
                LogRecord::new("Alpha", 0),
            ],
        );
        assert_eq!(
            log.totals(),
            vec![LogRecord::new("Beta", 30), LogRecord::new("Alpha", 5)]
        );
    }
}
