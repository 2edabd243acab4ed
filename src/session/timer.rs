use chrono::{DateTime, Local};

/// Which project is being timed. Projects are referred to by their registry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Idle,
    Active {
        project: usize,
        started_at: DateTime<Local>,
    },
}

/// A finished active period, produced exactly once for every period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppedPeriod {
    pub project: usize,
    pub started_at: DateTime<Local>,
    pub stopped_at: DateTime<Local>,
}

impl StoppedPeriod {
    /// Wall clock duration truncated to whole seconds. A clock that went backwards counts as 0.
    pub fn duration_seconds(&self) -> u64 {
        u64::try_from((self.stopped_at - self.started_at).num_seconds()).unwrap_or(0)
    }
}

impl TimerState {
    /// Toggles `project`:
    ///  - idle: starts timing it,
    ///  - it is already active: stops it and returns to idle,
    ///  - another project is active: stops that one and starts `project` at the same instant.
    pub fn select(&mut self, project: usize, now: DateTime<Local>) -> Option<StoppedPeriod> {
        match *self {
            TimerState::Idle => {
                *self = TimerState::Active {
                    project,
                    started_at: now,
                };
                None
            }
            TimerState::Active {
                project: active,
                started_at,
            } => {
                *self = if active == project {
                    TimerState::Idle
                } else {
                    TimerState::Active {
                        project,
                        started_at: now,
                    }
                };
                Some(StoppedPeriod {
                    project: active,
                    started_at,
                    stopped_at: now,
                })
            }
        }
    }

    /// Ends the timer for good, returning the period that was still running.
    pub fn stop(self, now: DateTime<Local>) -> Option<StoppedPeriod> {
        match self {
            TimerState::Idle => None,
            TimerState::Active {
                project,
                started_at,
            } => Some(StoppedPeriod {
                project,
                started_at,
                stopped_at: now,
            }),
        }
    }

    pub fn active_project(&self) -> Option<usize> {
        match self {
            TimerState::Idle => None,
            TimerState::Active { project, .. } => Some(*project),
        }
    }
}
