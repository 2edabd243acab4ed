//! The tracking session owns everything a running tracker needs: the project registry, the timer
//! and the day log storage. It is created once the registry is loaded and consumed by
//! [TrackingSession::exit], which flushes the period that is still running.

use chrono::{DateTime, Local, NaiveDate};
use registry::{Project, ProjectRegistry};
use thiserror::Error;
use timer::{StoppedPeriod, TimerState};
use tracing::{error, info};

use crate::{
    export::{
        aggregation::{aggregate, YearExport},
        collect_day_logs, ExportRange,
    },
    storage::{
        entities::LogRecord,
        record_storage::{LogError, RecordStorage},
    },
    utils::clock::Clock,
};

pub mod registry;
pub mod shutdown;
pub mod timer;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("there is no project number {}", .0 + 1)]
    UnknownIndex(usize),
    #[error("there is no project named {0:?}")]
    UnknownName(String),
    #[error("failed to save the finished period: {0}")]
    Storage(#[from] LogError),
}

/// What a call to [TrackingSession::select] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    Started { project: usize },
    Stopped { record: LogRecord },
    Switched { record: LogRecord, started: usize },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Status<'a> {
    Idle,
    Active {
        project: &'a Project,
        started_at: DateTime<Local>,
        elapsed_seconds: u64,
    },
}

pub struct TrackingSession<R: RecordStorage> {
    registry: ProjectRegistry,
    timer: TimerState,
    storage: R,
    clock: Box<dyn Clock>,
}

impl<R: RecordStorage> TrackingSession<R> {
    pub fn new(registry: ProjectRegistry, storage: R, clock: Box<dyn Clock>) -> Self {
        Self {
            registry,
            timer: TimerState::default(),
            storage,
            clock,
        }
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    /// Local date according to the session's clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.time().date_naive()
    }

    /// Toggles the project at registry position `index`. The finished period, if any, is written
    /// to the day log before this returns. If writing fails the timer is left as it was, so the
    /// period isn't lost and the toggle can be retried.
    pub async fn select(&mut self, index: usize) -> Result<Toggle, SessionError> {
        if self.registry.get(index).is_none() {
            return Err(SessionError::UnknownIndex(index));
        }

        let now = self.clock.time();
        let previous = self.timer;
        let Some(period) = self.timer.select(index, now) else {
            info!("Started {index} at {now}");
            return Ok(Toggle::Started { project: index });
        };

        let record = match self.persist(&period).await {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to persist {period:?}: {e}");
                self.timer = previous;
                return Err(e);
            }
        };

        Ok(match self.timer.active_project() {
            Some(started) => Toggle::Switched { record, started },
            None => Toggle::Stopped { record },
        })
    }

    pub async fn select_by_name(&mut self, name: &str) -> Result<Toggle, SessionError> {
        let index = self
            .registry
            .find(name)
            .map(|p| p.order_index)
            .ok_or_else(|| SessionError::UnknownName(name.to_string()))?;
        self.select(index).await
    }

    pub fn status(&self) -> Status<'_> {
        match self.timer {
            TimerState::Idle => Status::Idle,
            TimerState::Active {
                project,
                started_at,
            } => match self.registry.get(project) {
                Some(project) => Status::Active {
                    project,
                    started_at,
                    elapsed_seconds: StoppedPeriod {
                        project: project.order_index,
                        started_at,
                        stopped_at: self.clock.time(),
                    }
                    .duration_seconds(),
                },
                None => Status::Idle,
            },
        }
    }

    /// Aggregates every day log in `range`. The period that is currently running isn't included
    /// until it is stopped.
    pub async fn request_export(&self, range: ExportRange) -> anyhow::Result<Vec<YearExport>> {
        let days = collect_day_logs(&self.storage, range).await?;
        Ok(aggregate(days, self.registry.output_percentage().into()))
    }

    /// Ends the session, saving the running period if there is one.
    pub async fn exit(self) -> Result<Option<LogRecord>, SessionError> {
        if self.timer == TimerState::Idle {
            info!("Exiting without an active project");
            return Ok(None);
        }
        let Some(period) = self.timer.stop(self.clock.time()) else {
            return Ok(None);
        };
        let record = self.persist(&period).await?;
        info!("Exiting after saving {record}");
        Ok(Some(record))
    }

    async fn persist(&self, period: &StoppedPeriod) -> Result<LogRecord, SessionError> {
        let project = self
            .registry
            .get(period.project)
            .ok_or(SessionError::UnknownIndex(period.project))?;
        let record = LogRecord::new(project.name.clone(), period.duration_seconds());
        self.storage
            .append(period.stopped_at.date_naive(), &record)
            .await?;
        info!(
            "Spent {} seconds on {}",
            record.duration_seconds, record.project_name
        );
        Ok(record)
    }
}

#[cfg(test)]
mod session_tests {
    use std::future::Future;

    use anyhow::Result;
    use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
    use tempfile::tempdir;

    use super::{
        registry::{Project, ProjectRegistry},
        SessionError, Status, Toggle, TrackingSession,
    };
    use crate::{
        export::ExportRange,
        storage::{
            entities::{DayLog, LogRecord},
            record_storage::{LogError, RecordStorage, RecordStorageImpl},
        },
        utils::{clock::MockClock, logging::TEST_LOGGING},
    };

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn registry(output_percentage: bool) -> ProjectRegistry {
        let projects = ["Alpha", "Beta", "Gamma"]
            .into_iter()
            .enumerate()
            .map(|(order_index, name)| Project {
                name: name.into(),
                color: "#1f77b4".into(),
                order_index,
            })
            .collect();
        ProjectRegistry::new(projects, output_percentage)
    }

    /// Clock returning the start time plus the given offsets in seconds, one per call.
    fn clock(offsets: &[i64]) -> MockClock {
        let mut times = offsets
            .iter()
            .map(|&s| start() + Duration::seconds(s))
            .collect::<Vec<_>>()
            .into_iter();
        let mut clock = MockClock::new();
        clock
            .expect_time()
            .returning(move || times.next().unwrap())
            .times(offsets.len());
        clock
    }

    fn today() -> NaiveDate {
        start().date_naive()
    }

    #[tokio::test]
    async fn toggle_pair_writes_one_record() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut session = TrackingSession::new(registry(false), &storage, Box::new(clock(&[0, 45])));

        assert_eq!(session.select(0).await?, Toggle::Started { project: 0 });
        assert_eq!(
            session.select(0).await?,
            Toggle::Stopped {
                record: LogRecord::new("Alpha", 45)
            }
        );
        assert_eq!(session.status(), Status::Idle);
        assert_eq!(session.exit().await?, None);

        let log = storage.get_data_for(today()).await?;
        assert_eq!(log.records, vec![LogRecord::new("Alpha", 45)]);
        Ok(())
    }

    #[tokio::test]
    async fn switching_records_only_the_outgoing_project() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut session =
            TrackingSession::new(registry(false), &storage, Box::new(clock(&[0, 20, 25])));

        session.select_by_name("Alpha").await?;
        assert_eq!(
            session.select_by_name("Beta").await?,
            Toggle::Switched {
                record: LogRecord::new("Alpha", 20),
                started: 1
            }
        );
        assert_eq!(
            storage.get_data_for(today()).await?.records,
            vec![LogRecord::new("Alpha", 20)]
        );

        match session.status() {
            Status::Active {
                project,
                elapsed_seconds,
                ..
            } => {
                assert_eq!(&*project.name, "Beta");
                assert_eq!(elapsed_seconds, 5);
            }
            Status::Idle => panic!("Beta should be active"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn exit_flushes_the_active_period() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut session = TrackingSession::new(registry(false), &storage, Box::new(clock(&[0, 70])));

        session.select(2).await?;
        assert_eq!(session.exit().await?, Some(LogRecord::new("Gamma", 70)));
        assert_eq!(
            storage.get_data_for(today()).await?.records,
            vec![LogRecord::new("Gamma", 70)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_projects_leave_the_state_untouched() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut session = TrackingSession::new(registry(false), &storage, Box::new(clock(&[0, 5])));

        session.select(1).await?;
        assert!(matches!(
            session.select(7).await,
            Err(SessionError::UnknownIndex(7))
        ));
        assert!(matches!(
            session.select_by_name("Delta").await,
            Err(SessionError::UnknownName(_))
        ));
        assert!(
            matches!(session.status(), Status::Active { project, .. } if &*project.name == "Beta"),
            "Beta should still be running"
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_registry_selects_nothing() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut session = TrackingSession::new(
            ProjectRegistry::new(vec![], false),
            &storage,
            Box::new(MockClock::new()),
        );

        assert!(session.select(0).await.is_err());
        assert!(session.request_export(ExportRange::default()).await?.is_empty());
        Ok(())
    }

    struct FailingStorage;

    impl RecordStorage for FailingStorage {
        fn append(
            &self,
            _date: NaiveDate,
            _record: &LogRecord,
        ) -> impl Future<Output = Result<(), LogError>> {
            async {
                Err(LogError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read only",
                )))
            }
        }

        fn get_data_for(
            &self,
            date: NaiveDate,
        ) -> impl Future<Output = Result<DayLog, LogError>> + Send {
            async move { Ok(DayLog::new(date, vec![])) }
        }

        fn list_days(&self) -> impl Future<Output = Result<Vec<NaiveDate>, LogError>> + Send {
            async { Ok(vec![]) }
        }
    }

    #[tokio::test]
    async fn failed_write_keeps_the_period_running() -> Result<()> {
        let mut session =
            TrackingSession::new(registry(false), FailingStorage, Box::new(clock(&[0, 10, 15])));

        session.select(0).await?;
        assert!(matches!(
            session.select(1).await,
            Err(SessionError::Storage(_))
        ));
        match session.status() {
            Status::Active {
                project,
                elapsed_seconds,
                ..
            } => {
                assert_eq!(&*project.name, "Alpha");
                assert_eq!(elapsed_seconds, 15);
            }
            Status::Idle => panic!("Alpha should still be active"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn export_sees_finished_periods() -> Result<()> {
        let dir = tempdir()?;
        let storage = RecordStorageImpl::new(dir.path().to_owned())?;
        let mut session =
            TrackingSession::new(registry(true), &storage, Box::new(clock(&[0, 1800, 3600])));

        session.select(0).await?;
        session.select(1).await?;
        session.select(1).await?;

        let exports = session.request_export(ExportRange::default()).await?;
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].year, 2024);
        assert_eq!(exports[0].daily[0].minutes, vec![Some(30), Some(30)]);
        assert_eq!(exports[0].weekly[0].values, vec![Some(50), Some(50)]);
        Ok(())
    }
}
