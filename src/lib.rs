//! Personal project time tracker. One project is timed at a time, finished periods are appended
//! to a plain text log per day, and the logs can be exported as daily and weekly tables per year.
//!

pub mod cli;
pub mod export;
pub mod fs;
pub mod session;
pub mod storage;
pub mod utils;
