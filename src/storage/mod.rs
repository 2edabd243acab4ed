//!  Storage is organized through [record_storage::RecordStorageImpl].
//!  The basic idea is:
//!   - There is a directory with all the day logs.
//!   - Every local calendar date gets its own file, created on the first write for that date.
//!   - Each line is one finished active period: `project_name,duration_seconds`.

pub mod entities;
pub mod record_storage;
