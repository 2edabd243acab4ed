use chrono::{Datelike, NaiveDate};

/// Extension of every day log file.
pub const RECORD_EXTENSION: &str = "lstrac";

const RECORD_PREFIX: &str = "track";

/// This is the standard way of converting a date to a day log file name in projtrack.
/// Components are not zero padded, e.g. `track2024_1_5.lstrac`.
pub fn date_to_record_name(date: NaiveDate) -> String {
    format!(
        "{RECORD_PREFIX}{}_{}_{}.{RECORD_EXTENSION}",
        date.year(),
        date.month(),
        date.day()
    )
}

/// Inverse of [date_to_record_name]. Returns [None] for anything that isn't a day log, including
/// names that encode an impossible date or aren't written the way [date_to_record_name] writes
/// them (zero padded components), since those would never be read back for their date.
pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    let stem = name
        .strip_suffix(RECORD_EXTENSION)?
        .strip_suffix('.')?
        .strip_prefix(RECORD_PREFIX)?;

    let mut parts = stem.split('_');
    let year = parse_digits(parts.next()?)?;
    let month = parse_digits(parts.next()?)?;
    let day = parse_digits(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
    (date_to_record_name(date) == name).then_some(date)
}

/// Whether `name` is shaped like a day log without necessarily being a valid one, e.g.
/// `track2024_01_09.lstrac`.
pub fn looks_like_record_name(name: &str) -> bool {
    name.strip_prefix(RECORD_PREFIX)
        .and_then(|v| v.strip_suffix(RECORD_EXTENSION))
        .is_some_and(|v| v.ends_with('.'))
}

fn parse_digits(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Name of the directory consolidation copies day logs into before rewriting them.
pub fn backup_dir_name(date: NaiveDate) -> String {
    format!("backup_{}_{}_{}", date.year(), date.month(), date.day())
}

/// ISO-8601 week number, the `KW` column of exports.
pub fn iso_week(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// Converts seconds to whole minutes rounding half to even, so 30s is 0 minutes and 90s is 2.
pub fn seconds_to_minutes(seconds: u64) -> u64 {
    let minutes = seconds / 60;
    match (seconds % 60).cmp(&30) {
        std::cmp::Ordering::Less => minutes,
        std::cmp::Ordering::Greater => minutes + 1,
        std::cmp::Ordering::Equal if minutes % 2 == 0 => minutes,
        std::cmp::Ordering::Equal => minutes + 1,
    }
}
