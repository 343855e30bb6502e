//! Coherent date+time shifting (`time-shift`, §4.6 step 7).
//!
//! DICOM stores a date (`DA`, `YYYYMMDD`) and a time (`TM`, `HHMMSS.FFFFFF`)
//! as separate elements. Shifting only the hour-of-day, as naive
//! implementations do, silently wraps around midnight without rolling the
//! date over. This recomposes the pair into one instant, shifts it, and
//! splits the result back so the combined instant moves coherently.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{AnonError, Result};

/// Shift a DICOM (date, time) pair by `offset_hours`, positive or negative.
/// Returns the new `(DA, TM)` strings in the original formats.
pub fn shift_date_time(date: &str, time: &str, offset_hours: i64) -> Result<(String, String)> {
    let naive_date = parse_da(date)?;
    let (naive_time, fraction) = parse_tm(time)?;

    let combined = NaiveDateTime::new(naive_date, naive_time);
    let shifted = combined + Duration::hours(offset_hours);

    Ok((
        shifted.format("%Y%m%d").to_string(),
        format_tm(shifted.time(), &fraction),
    ))
}

fn parse_da(date: &str) -> Result<NaiveDate> {
    if date.len() < 8 {
        return Err(malformed("DA", date));
    }
    NaiveDate::parse_from_str(&date[..8], "%Y%m%d").map_err(|_| malformed("DA", date))
}

/// Returns the parsed time and the fractional-seconds digits present
/// verbatim, so the output preserves the caller's precision (`HHMMSS` vs
/// `HHMMSS.FFFFFF`) — whole-hour shifts never touch the seconds component,
/// so the original fraction digits are always still correct.
fn parse_tm(time: &str) -> Result<(NaiveTime, String)> {
    if time.len() < 6 {
        return Err(malformed("TM", time));
    }
    let hhmmss = &time[..6];
    let fraction = time.get(7..).unwrap_or("").to_string();
    let parsed = NaiveTime::parse_from_str(hhmmss, "%H%M%S").map_err(|_| malformed("TM", time))?;
    Ok((parsed, fraction))
}

fn format_tm(time: NaiveTime, fraction: &str) -> String {
    if fraction.is_empty() {
        time.format("%H%M%S").to_string()
    } else {
        format!("{}.{fraction}", time.format("%H%M%S"))
    }
}

fn malformed(kind: &str, value: &str) -> AnonError {
    AnonError::Other(anyhow::anyhow!("could not parse {kind} value '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_within_the_same_day() {
        let (date, time) = shift_date_time("20240101", "120000", -3).unwrap();
        assert_eq!(date, "20240101");
        assert_eq!(time, "090000");
    }

    #[test]
    fn rolls_date_backward_over_midnight() {
        let (date, time) = shift_date_time("20240101", "010000", -3).unwrap();
        assert_eq!(date, "20231231");
        assert_eq!(time, "220000");
    }

    #[test]
    fn rolls_date_forward_over_midnight() {
        let (date, time) = shift_date_time("20240101", "230000", 3).unwrap();
        assert_eq!(date, "20240102");
        assert_eq!(time, "020000");
    }

    #[test]
    fn preserves_fractional_precision() {
        let (_, time) = shift_date_time("20240101", "120000.500000", 1).unwrap();
        assert_eq!(time, "130000.500000");
    }
}
