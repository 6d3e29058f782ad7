//! Timestamp formats embedded in file names and log lines, and the calendar
//! math behind retention cutoffs.

use time::{
    format_description::FormatItem, macros::format_description, Date, Month, OffsetDateTime,
    PrimitiveDateTime,
};

/// Compact timestamp embedded in bundle archive names (`yyyyMMddTHHmmss`).
pub const ARCHIVE_STAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");

/// Date embedded in run-log file names (`yyyy-MM-dd`).
pub const LOG_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Prefix of every run-log line (`yyyy:MM:dd HH:mm:ss`).
pub const LOG_LINE: &[FormatItem<'static>] =
    format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

/// Format the archive timestamp for a moment in time.
pub fn archive_stamp(moment: OffsetDateTime) -> Result<String, time::error::Format> {
    moment.format(ARCHIVE_STAMP)
}

/// Parse the timestamp embedded in a bundle file name
/// (`<data_source>_<yyyyMMddTHHmmss>.zip`).
pub fn parse_archive_stamp(file_name: &str) -> Option<PrimitiveDateTime> {
    let stem = file_name.strip_suffix(".zip")?;
    let (_, stamp) = stem.rsplit_once('_')?;
    PrimitiveDateTime::parse(stamp, ARCHIVE_STAMP).ok()
}

/// Parse the date embedded in a run-log file name
/// (`<data_source>_<yyyy-MM-dd>.txt`).
pub fn parse_log_date(file_name: &str) -> Option<Date> {
    let stem = file_name.strip_suffix(".txt")?;
    let (_, date) = stem.rsplit_once('_')?;
    Date::parse(date, LOG_DATE).ok()
}

/// `date` minus a whole number of years, clamping Feb 29 to Feb 28.
pub fn subtract_years(date: Date, years: i32) -> Date {
    subtract_months(date, years * 12)
}

/// `date` minus a whole number of calendar months, clamping the day of month
/// to the target month's length (e.g. Mar 31 minus one month is Feb 28/29).
pub fn subtract_months(date: Date, months: i32) -> Date {
    let total = date.year() * 12 + date.month() as i32 - 1 - months;
    let year = total.div_euclid(12);
    let Ok(month) = Month::try_from(total.rem_euclid(12) as u8 + 1) else {
        return date;
    };

    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}
