use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncSeek, AsyncWrite, AsyncWriteExt, BufReader,
        Lines,
    },
};
use tracing::{debug, info, warn};

use crate::{
    fs::operations::ends_with_line_break,
    utils::time::{
        date_to_record_name, looks_like_record_name, record_name_to_date, RECORD_EXTENSION,
    },
};

use super::entities::{DayLog, LineError, LogRecord, MAX_DURATION_SECONDS};

#[derive(Error, Debug)]
pub enum LogError {
    /// A day log contains a line that isn't a record. Aggregating around it would silently lose
    /// time, so reads stop here.
    #[error("corrupted day log {path:?} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: LineError,
    },
    #[error("project name {0:?} can't be stored in a day log")]
    UnstorableName(String),
    #[error("duration of {0} seconds is longer than a year and can't be stored")]
    UnstorableDuration(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Interface for abstracting storage of day logs.
pub trait RecordStorage {
    /// Appends a record to the day log of `date`, creating the log if it doesn't exist yet.
    fn append(
        &self,
        date: NaiveDate,
        record: &LogRecord,
    ) -> impl Future<Output = Result<(), LogError>>;

    /// Retrieves all records of a day in the order they were written. A day without a log is
    /// empty.
    fn get_data_for(&self, date: NaiveDate)
        -> impl Future<Output = Result<DayLog, LogError>> + Send;

    /// Dates of all day logs present in storage in ascending order.
    fn list_days(&self) -> impl Future<Output = Result<Vec<NaiveDate>, LogError>> + Send;
}

impl<T: Deref> RecordStorage for T
where
    T::Target: RecordStorage,
{
    fn append(
        &self,
        date: NaiveDate,
        record: &LogRecord,
    ) -> impl Future<Output = Result<(), LogError>> {
        self.deref().append(date, record)
    }

    fn get_data_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<DayLog, LogError>> + Send {
        self.deref().get_data_for(date)
    }

    fn list_days(&self) -> impl Future<Output = Result<Vec<NaiveDate>, LogError>> + Send {
        self.deref().list_days()
    }
}

/// Outcome of [RecordStorageImpl::consolidate].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub files: usize,
    pub lines_before: usize,
    pub lines_after: usize,
}

/// The main realization of [RecordStorage]. Keeps one `.lstrac` file per day in `record_dir`.
pub struct RecordStorageImpl {
    record_dir: PathBuf,
}

impl RecordStorageImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    fn record_path(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    async fn read_inner(path: &Path, date: NaiveDate) -> Result<DayLog, LogError> {
        async fn extract(path: &Path) -> Result<Vec<LogRecord>, LogError> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let mut lines = BufReader::new(file).lines();
            let result = parse_lines(path, &mut lines).await;
            lines.into_inner().into_inner().unlock_async().await?;
            result
        }

        match extract(path).await {
            Ok(records) => Ok(DayLog::new(date, records)),
            Err(LogError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Ok(DayLog::new(date, vec![]))
            }
            Err(e) => Err(e),
        }
    }

    /// Merges all records of the same project within each day log into one, after copying every
    /// day log into `backup_dir`. Old day logs lying in `backup_dir` are replaced. The record
    /// sequence of a day is lost afterwards.
    ///
    /// Every day log is parsed before anything is touched, so a corrupted log leaves all of them
    /// as they were.
    pub async fn consolidate(&self, backup_dir: &Path) -> Result<ConsolidationReport, LogError> {
        let mut logs = vec![];
        for day in self.list_days().await? {
            logs.push(self.get_data_for(day).await?);
        }

        tokio::fs::create_dir_all(backup_dir).await?;

        let mut stale = tokio::fs::read_dir(backup_dir).await?;
        while let Some(entry) = stale.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|v| v == RECORD_EXTENSION) {
                debug!("Removing stale backup {path:?}");
                tokio::fs::remove_file(path).await?;
            }
        }

        for log in &logs {
            let name = date_to_record_name(log.date);
            tokio::fs::copy(self.record_dir.join(&name), backup_dir.join(&name)).await?;
        }

        let mut report = ConsolidationReport::default();
        for log in logs {
            let totals = log.totals();
            let mut content = String::new();
            for record in &totals {
                content.push_str(&record.to_string());
                content.push('\n');
            }

            let file = File::options()
                .write(true)
                .truncate(false)
                .open(self.record_path(log.date))
                .await?;
            file.lock_exclusive()?;
            rewrite(file, content.as_bytes()).await?;

            report.files += 1;
            report.lines_before += log.records.len();
            report.lines_after += totals.len();
        }

        info!("Consolidated {report:?} with backup in {backup_dir:?}");
        Ok(report)
    }
}

impl RecordStorage for RecordStorageImpl {
    async fn append(&self, date: NaiveDate, record: &LogRecord) -> Result<(), LogError> {
        if record.project_name.contains([',', '\n', '\r']) {
            return Err(LogError::UnstorableName(record.project_name.to_string()));
        }
        if record.duration_seconds > MAX_DURATION_SECONDS {
            return Err(LogError::UnstorableDuration(record.duration_seconds));
        }

        let path = self.record_path(date);
        let mut file = File::options()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        // The lock is released even if the write fails.
        file.lock_exclusive()?;
        let result = append_record(&mut file, record).await;
        file.unlock_async().await?;
        result?;
        debug!("Appended {record} to {path:?}");
        Ok(())
    }

    async fn get_data_for(&self, date: NaiveDate) -> Result<DayLog, LogError> {
        let path = self.record_path(date);
        Self::read_inner(&path, date).await
    }

    async fn list_days(&self) -> Result<Vec<NaiveDate>, LogError> {
        let mut entries = tokio::fs::read_dir(&self.record_dir).await?;
        let mut days = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                debug!("Skipping {file_name:?}, not a day log");
                continue;
            };
            let Some(day) = record_name_to_date(name) else {
                if looks_like_record_name(name) {
                    warn!("Skipping {name:?}, day logs are named like track2024_1_5.lstrac");
                } else {
                    debug!("Skipping {name:?}, not a day log");
                }
                continue;
            };
            if !entry.file_type().await?.is_file() {
                debug!("Skipping {file_name:?}, not a file");
                continue;
            }
            days.push(day);
        }
        days.sort();
        Ok(days)
    }
}

async fn parse_lines(
    path: &Path,
    lines: &mut Lines<impl AsyncBufRead + Unpin>,
) -> Result<Vec<LogRecord>, LogError> {
    let mut records = vec![];
    let mut line_number = 0;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record = LogRecord::parse_line(&line).map_err(|reason| LogError::Malformed {
            path: path.to_owned(),
            line: line_number,
            reason,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Writes a record as a new line. If the previous write was cut off, the record still starts on
/// its own line.
async fn append_record(
    file: &mut (impl AsyncSeek + AsyncRead + AsyncWrite + Unpin),
    record: &LogRecord,
) -> Result<(), LogError> {
    let mut line = String::new();
    if !ends_with_line_break(file).await? {
        line.push('\n');
    }
    line.push_str(&record.to_string());
    line.push('\n');

    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

async fn rewrite(mut file: File, content: &[u8]) -> Result<(), LogError> {
    let result = async {
        file.set_len(0).await?;
        file.write_all(content).await?;
        file.flush().await
    }
    .await;
    file.unlock_async().await?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::{tempdir, tempfile};
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use crate::storage::{
        entities::{LineError, LogRecord},
        record_storage::{append_record, LogError, RecordStorage, RecordStorageImpl},
    };

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    #[tokio::test]
    async fn test_appender_repairs_cut_off_line() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(b"Alpha,10\nBeta,2")?;
        let mut file = tokio::fs::File::from_std(file);

        append_record(&mut file, &LogRecord::new("Gamma", 7)).await?;

        file.rewind().await?;
        let mut s = String::new();
        file.read_to_string(&mut s).await?;
        assert_eq!(s, "Alpha,10\nBeta,2\nGamma,7\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_day_log_is_created_lazily() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        assert!(storage.list_days().await?.is_empty());
        assert!(storage.get_data_for(TEST_DATE).await?.records.is_empty());

        storage
            .append(TEST_DATE, &LogRecord::new("Alpha", 1800))
            .await?;

        let written = std::fs::read_to_string(dir.path().join("track2024_1_1.lstrac"))?;
        assert_eq!(written, "Alpha,1800\n");
        assert_eq!(storage.list_days().await?, vec![TEST_DATE]);
        Ok(())
    }

    #[tokio::test]
    async fn test_records_keep_write_order() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let records = [
            LogRecord::new("Alpha", 10),
            LogRecord::new("Beta", 20),
            LogRecord::new("Alpha", 30),
        ];
        for record in &records {
            storage.append(TEST_DATE, record).await?;
        }

        let log = storage.get_data_for(TEST_DATE).await?;
        assert_eq!(log.date, TEST_DATE);
        assert_eq!(log.records, records.to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join("track2024_1_1.lstrac"),
            "Alpha,10\n\n   \nBeta,20\n",
        )?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        let log = storage.get_data_for(TEST_DATE).await?;
        assert_eq!(
            log.records,
            vec![LogRecord::new("Alpha", 10), LogRecord::new("Beta", 20)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_line_fails_the_read() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join("track2024_1_1.lstrac"),
            "Alpha,10\n\nBeta,twenty\n",
        )?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        match storage.get_data_for(TEST_DATE).await {
            Err(LogError::Malformed { line, reason, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(reason, LineError::InvalidDuration("twenty".into()));
            }
            other => panic!("Expected a malformed line error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unstorable_names_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        let result = storage.append(TEST_DATE, &LogRecord::new("A,B", 10)).await;
        assert!(matches!(result, Err(LogError::UnstorableName(_))));
        assert!(storage.list_days().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_overlong_durations_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        let result = storage
            .append(TEST_DATE, &LogRecord::new("Alpha", u64::MAX))
            .await;
        assert!(matches!(result, Err(LogError::UnstorableDuration(u64::MAX))));
        assert!(storage.list_days().await?.is_empty());

        std::fs::write(
            dir.path().join("track2024_1_1.lstrac"),
            "Alpha,18446744073709551615\nAlpha,1\n",
        )?;
        match storage.get_data_for(TEST_DATE).await {
            Err(LogError::Malformed { line, reason, .. }) => {
                assert_eq!(line, 1);
                assert_eq!(reason, LineError::DurationTooLong(u64::MAX));
            }
            other => panic!("Expected a malformed line error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_skips_foreign_files() -> Result<()> {
        let dir = tempdir()?;
        for name in [
            "track2024_1_8.lstrac",
            "track2023_12_31.lstrac",
            "notes.txt",
            "track2024_2_30.lstrac",
            "track2024_1_1.lstrac.bak",
            "track2024_01_09.lstrac",
        ] {
            std::fs::write(dir.path().join(name), "Alpha,1\n")?;
        }
        std::fs::create_dir(dir.path().join("track2024_1_2.lstrac"))?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;

        assert_eq!(
            storage.list_days().await?,
            vec![
                NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_consolidation_merges_and_backs_up() -> Result<()> {
        let dir = tempdir()?;
        let records = dir.path().join("records");
        let backup = dir.path().join("backup_2024_1_2");
        std::fs::create_dir_all(&backup)?;
        std::fs::write(backup.join("track2020_1_1.lstrac"), "Old,1\n")?;

        let storage = RecordStorageImpl::new(records.clone())?;
        for record in [
            LogRecord::new("Alpha", 10),
            LogRecord::new("Beta", 20),
            LogRecord::new("Alpha", 30),
        ] {
            storage.append(TEST_DATE, &record).await?;
        }

        let report = storage.consolidate(&backup).await?;

        assert_eq!(report.files, 1);
        assert_eq!(report.lines_before, 3);
        assert_eq!(report.lines_after, 2);
        assert_eq!(
            std::fs::read_to_string(records.join("track2024_1_1.lstrac"))?,
            "Alpha,40\nBeta,20\n"
        );
        assert_eq!(
            std::fs::read_to_string(backup.join("track2024_1_1.lstrac"))?,
            "Alpha,10\nBeta,20\nAlpha,30\n"
        );
        assert!(!backup.join("track2020_1_1.lstrac").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_log_stops_consolidation_before_any_rewrite() -> Result<()> {
        let dir = tempdir()?;
        let records = dir.path().join("records");
        let backup = dir.path().join("backup_2024_1_3");
        let storage = RecordStorageImpl::new(records.clone())?;
        std::fs::write(records.join("track2024_1_1.lstrac"), "A,1\nA,2\n")?;
        std::fs::write(records.join("track2024_1_2.lstrac"), "A,1\nbad\n")?;

        let result = storage.consolidate(&backup).await;

        assert!(matches!(result, Err(LogError::Malformed { line: 2, .. })));
        assert_eq!(
            std::fs::read_to_string(records.join("track2024_1_1.lstrac"))?,
            "A,1\nA,2\n"
        );
        assert_eq!(
            std::fs::read_to_string(records.join("track2024_1_2.lstrac"))?,
            "A,1\nbad\n"
        );
        assert!(!backup.exists());
        Ok(())
    }
}
