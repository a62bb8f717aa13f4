//! Day-resolution bounds for the subset of EDTF used by the catalog.
//!
//! A value such as `2021`, `2021-11`, `197X`, `2021-11-09~` or
//! `2021-05/2021-11-09` is reduced to the earliest and latest calendar day it
//! could denote. `..` (and an empty value) is open; `uuuu` is unknown and
//! cannot be compared.

use time::{Date, Month};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EdtfError {
    #[error("date '{0}' is unknown")]
    Unknown(String),
    #[error("date '{value}' is invalid: {reason}")]
    Invalid { value: String, reason: String },
}

/// Inclusive day bounds; `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EdtfSpan {
    pub earliest: Option<Date>,
    pub latest: Option<Date>,
}

impl EdtfSpan {
    pub const OPEN: Self = Self { earliest: None, latest: None };

    /// # Errors
    /// Returns [`EdtfError::Unknown`] for `uuuu`-style values and
    /// [`EdtfError::Invalid`] for anything outside the supported subset.
    pub fn parse(value: &str) -> Result<Self, EdtfError> {
        let trimmed = value.trim();
        if let Some((start, end)) = trimmed.split_once('/') {
            let start = parse_endpoint(start, value)?;
            let end = parse_endpoint(end, value)?;
            let span = Self { earliest: start.earliest, latest: end.latest };
            if let (Some(earliest), Some(latest)) = (span.earliest, span.latest) {
                if earliest > latest {
                    return Err(invalid(value, "interval ends before it starts"));
                }
            }
            return Ok(span);
        }
        parse_endpoint(trimmed, value)
    }

    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.earliest.is_some() && self.latest.is_some()
    }
}

fn invalid(value: &str, reason: &str) -> EdtfError {
    EdtfError::Invalid { value: value.to_string(), reason: reason.to_string() }
}

fn parse_endpoint(part: &str, original: &str) -> Result<EdtfSpan, EdtfError> {
    let part = part.trim();
    match part {
        "" | ".." | "open" => return Ok(EdtfSpan::OPEN),
        "unknown" => return Err(EdtfError::Unknown(original.to_string())),
        _ => {}
    }

    let cleaned: String = part.chars().filter(|ch| !matches!(ch, '?' | '~' | '%')).collect();
    let mut pieces = cleaned.split('-');
    let year = pieces.next().unwrap_or_default();
    let month = pieces.next();
    let day = pieces.next();
    if pieces.next().is_some() {
        return Err(invalid(original, "too many date components"));
    }

    let (first_year, last_year) = year_range(year, original)?;
    let Some(month) = month else {
        return Ok(EdtfSpan {
            earliest: Some(day_of(first_year, Month::January, 1, original)?),
            latest: Some(day_of(last_year, Month::December, 31, original)?),
        });
    };

    if first_year != last_year && !is_unspecified(month) {
        return Err(invalid(original, "month given for an unspecified year"));
    }

    if is_unspecified(month) {
        if day.is_some_and(|day| !is_unspecified(day)) {
            return Err(invalid(original, "day given for an unspecified month"));
        }
        return Ok(EdtfSpan {
            earliest: Some(day_of(first_year, Month::January, 1, original)?),
            latest: Some(day_of(last_year, Month::December, 31, original)?),
        });
    }

    let month_number: u8 = month.parse().map_err(|_| invalid(original, "month is not numeric"))?;
    if (21..=24).contains(&month_number) {
        if day.is_some() {
            return Err(invalid(original, "day given for a season"));
        }
        return season(first_year, month_number, original);
    }

    let month = Month::try_from(month_number).map_err(|_| invalid(original, "month out of range"))?;
    let last_day = time::util::days_in_year_month(first_year, month);
    match day {
        None => Ok(EdtfSpan {
            earliest: Some(day_of(first_year, month, 1, original)?),
            latest: Some(day_of(first_year, month, last_day, original)?),
        }),
        Some(day) if is_unspecified(day) => Ok(EdtfSpan {
            earliest: Some(day_of(first_year, month, 1, original)?),
            latest: Some(day_of(first_year, month, last_day, original)?),
        }),
        Some(day) => {
            let day: u8 = day.parse().map_err(|_| invalid(original, "day is not numeric"))?;
            let date = day_of(first_year, month, day, original)?;
            Ok(EdtfSpan { earliest: Some(date), latest: Some(date) })
        }
    }
}

fn is_unspecified(component: &str) -> bool {
    !component.is_empty() && component.chars().all(|ch| matches!(ch, 'X' | 'x' | 'u'))
}

/// `2021` → (2021, 2021); `197X` → (1970, 1979); `uuuu` → unknown.
fn year_range(year: &str, original: &str) -> Result<(i32, i32), EdtfError> {
    if year.len() != 4 {
        return Err(invalid(original, "year MUST have four digits"));
    }
    if is_unspecified(year) {
        return Err(EdtfError::Unknown(original.to_string()));
    }

    let digits = year.trim_end_matches(['X', 'x', 'u']);
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(invalid(original, "year is not numeric"));
    }

    let unspecified = u32::try_from(year.len() - digits.len()).unwrap_or(0);
    let scale = 10_i32.pow(unspecified);
    let prefix: i32 = digits.parse().map_err(|_| invalid(original, "year is not numeric"))?;
    Ok((prefix * scale, prefix * scale + scale - 1))
}

fn season(year: i32, code: u8, original: &str) -> Result<EdtfSpan, EdtfError> {
    let (start, end, end_year) = match code {
        21 => (Month::March, Month::May, year),
        22 => (Month::June, Month::August, year),
        23 => (Month::September, Month::November, year),
        _ => (Month::December, Month::February, year + 1),
    };
    let last_day = time::util::days_in_year_month(end_year, end);
    Ok(EdtfSpan {
        earliest: Some(day_of(year, start, 1, original)?),
        latest: Some(day_of(end_year, end, last_day, original)?),
    })
}

fn day_of(year: i32, month: Month, day: u8, original: &str) -> Result<Date, EdtfError> {
    Date::from_calendar_date(year, month, day).map_err(|err| invalid(original, &err.to_string()))
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn span(value: &str) -> EdtfSpan {
        match EdtfSpan::parse(value) {
            Ok(span) => span,
            Err(err) => panic!("{value} should parse: {err}"),
        }
    }

    #[test]
    fn full_date_is_a_single_day() {
        let parsed = span("2024-06-17");
        assert_eq!(parsed.earliest, Some(date!(2024 - 06 - 17)));
        assert_eq!(parsed.latest, Some(date!(2024 - 06 - 17)));
    }

    #[test]
    fn partial_precision_widens_to_the_enclosing_period() {
        let year = span("2021");
        assert_eq!(year.earliest, Some(date!(2021 - 01 - 01)));
        assert_eq!(year.latest, Some(date!(2021 - 12 - 31)));

        let month = span("2024-02");
        assert_eq!(month.latest, Some(date!(2024 - 02 - 29)));

        let decade = span("197X");
        assert_eq!(decade.earliest, Some(date!(1970 - 01 - 01)));
        assert_eq!(decade.latest, Some(date!(1979 - 12 - 31)));

        let unspecified_month = span("2021-XX");
        assert_eq!(unspecified_month.latest, Some(date!(2021 - 12 - 31)));
    }

    #[test]
    fn qualifiers_do_not_change_bounds() {
        assert_eq!(span("2021-11-09~"), span("2021-11-09"));
        assert_eq!(span("2021?"), span("2021"));
        assert_eq!(span("2021-11%"), span("2021-11"));
    }

    #[test]
    fn open_and_empty_values_are_unbounded() {
        assert_eq!(span(".."), EdtfSpan::OPEN);
        assert_eq!(span(""), EdtfSpan::OPEN);
        assert!(!span("..").is_bounded());
    }

    #[test]
    fn intervals_take_outer_bounds() {
        let parsed = span("2021-05/2021-11-09");
        assert_eq!(parsed.earliest, Some(date!(2021 - 05 - 01)));
        assert_eq!(parsed.latest, Some(date!(2021 - 11 - 09)));

        let open_ended = span("2021-05-25/..");
        assert_eq!(open_ended.earliest, Some(date!(2021 - 05 - 25)));
        assert_eq!(open_ended.latest, None);
    }

    #[test]
    fn seasons_cover_three_months() {
        let winter = span("2021-24");
        assert_eq!(winter.earliest, Some(date!(2021 - 12 - 01)));
        assert_eq!(winter.latest, Some(date!(2022 - 02 - 28)));
    }

    #[test]
    fn unknown_and_garbage_are_rejected() {
        assert!(matches!(EdtfSpan::parse("uuuu"), Err(EdtfError::Unknown(_))));
        assert!(matches!(EdtfSpan::parse("XXXX"), Err(EdtfError::Unknown(_))));
        assert!(matches!(EdtfSpan::parse("2021-13-01"), Err(EdtfError::Invalid { .. })));
        assert!(matches!(EdtfSpan::parse("2021-02-30"), Err(EdtfError::Invalid { .. })));
        assert!(matches!(EdtfSpan::parse("yesterday"), Err(EdtfError::Invalid { .. })));
        assert!(matches!(EdtfSpan::parse("2022/2021"), Err(EdtfError::Invalid { .. })));
    }
}
