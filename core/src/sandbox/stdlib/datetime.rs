//! `datetime` module and the Timestamp / date / Timedelta scalars

use super::{Args, KW};
use crate::sandbox::types::errors::py_str_repr;
use crate::sandbox::types::{raise, EvalResult, ExcKind, Module, Val};
use crate::table::{midnight, parse_datetime, Cell};
use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt::Write;

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/* ===================== Formatting & Parsing ===================== */

/// `strftime` that reports bad patterns instead of panicking
pub fn strftime(t: &NaiveDateTime, pattern: &str) -> EvalResult<String> {
    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return raise(
            ExcKind::ValueError,
            format!("Invalid format string {}", py_str_repr(pattern)),
        );
    }
    let mut out = String::new();
    if write!(out, "{}", t.format_with_items(items.iter())).is_err() {
        return raise(
            ExcKind::ValueError,
            format!("Invalid format string {}", py_str_repr(pattern)),
        );
    }
    Ok(out)
}

pub fn strptime(text: &str, pattern: &str) -> EvalResult<NaiveDateTime> {
    if let Ok(t) = NaiveDateTime::parse_from_str(text, pattern) {
        return Ok(t);
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, pattern) {
        return Ok(midnight(d));
    }
    raise(
        ExcKind::ValueError,
        format!(
            "time data {} does not match format {}",
            py_str_repr(text),
            py_str_repr(pattern)
        ),
    )
}

/// Seconds in one `unit` (pandas/numpy unit spellings)
pub fn unit_seconds(unit: &str) -> Option<f64> {
    Some(match unit.trim().to_ascii_lowercase().as_str() {
        "w" | "week" | "weeks" => 604_800.0,
        "d" | "day" | "days" => 86_400.0,
        "h" | "hr" | "hour" | "hours" => 3_600.0,
        "m" | "min" | "minute" | "minutes" | "t" => 60.0,
        "s" | "sec" | "second" | "seconds" => 1.0,
        "ms" | "millisecond" | "milliseconds" => 0.001,
        "us" | "microsecond" | "microseconds" => 0.000_001,
        "ns" | "nanosecond" | "nanoseconds" => 0.000_000_001,
        _ => return None,
    })
}

/// Parse `"1 days 02:00:00"`, `"02:30:00"`, `"90min"`, `"1h30m"`, `"2D"`
pub fn parse_timedelta(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, text),
    };
    let mut total = 0f64;
    let mut rest = text;

    if let Some((days, clock)) = rest.split_once(" days") {
        total += days.trim().parse::<f64>().ok()? * 86_400.0;
        rest = clock.trim_start_matches(',').trim();
    } else if let Some((days, clock)) = rest.split_once(" day") {
        total += days.trim().parse::<f64>().ok()? * 86_400.0;
        rest = clock.trim_start_matches(',').trim();
    }

    if rest.contains(':') {
        let parts: Vec<f64> = rest
            .split(':')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        let clock = match parts.as_slice() {
            [h, m, s] => h * 3600.0 + m * 60.0 + s,
            [m, s] => m * 60.0 + s,
            _ => return None,
        };
        total += clock;
    } else if !rest.is_empty() {
        // sequence of <number><unit>
        let mut number = String::new();
        let mut unit = String::new();
        let mut flush = |number: &mut String, unit: &mut String| -> Option<()> {
            if number.is_empty() {
                return None;
            }
            let value: f64 = number.parse().ok()?;
            let scale = if unit.is_empty() { Some(1.0) } else { unit_seconds(unit) }?;
            total += value * scale;
            number.clear();
            unit.clear();
            Some(())
        };
        for c in rest.chars() {
            if c.is_ascii_digit() || c == '.' {
                if !unit.is_empty() {
                    flush(&mut number, &mut unit)?;
                }
                number.push(c);
            } else if !c.is_whitespace() {
                unit.push(c);
            }
        }
        flush(&mut number, &mut unit)?;
    }

    let seconds = total.round() as i64;
    Some(if negative { -seconds } else { seconds })
}

/// Accept Timestamp, date or a parseable string as a datetime
pub fn coerce_time(value: &Val) -> EvalResult<NaiveDateTime> {
    match value {
        Val::Time(t) => Ok(*t),
        Val::Date(d) => Ok(midnight(*d)),
        Val::Str(s) => match parse_datetime(s) {
            Some(t) => Ok(t),
            None => raise(
                ExcKind::ValueError,
                format!("could not convert string to Timestamp: {}", py_str_repr(s)),
            ),
        },
        other => raise(
            ExcKind::TypeError,
            format!("Cannot convert input of type {} to Timestamp", other.type_name()),
        ),
    }
}

pub fn day_name(date: NaiveDate) -> &'static str {
    DAY_NAMES[date.weekday().num_days_from_monday() as usize]
}

pub fn month_name(date: NaiveDate) -> &'static str {
    MONTH_NAMES[date.month0() as usize]
}

/* ===================== Fields ===================== */

/// Calendar or clock field shared by scalars and the `.dt` accessor
pub fn time_field(t: &NaiveDateTime, name: &str) -> Option<Cell> {
    let date = t.date();
    Some(match name {
        "year" => Cell::Int(date.year() as i64),
        "month" => Cell::Int(date.month() as i64),
        "day" => Cell::Int(date.day() as i64),
        "hour" => Cell::Int(t.hour() as i64),
        "minute" => Cell::Int(t.minute() as i64),
        "second" => Cell::Int(t.second() as i64),
        "microsecond" | "nanosecond" => Cell::Int(0),
        "dayofweek" | "day_of_week" | "weekday" => {
            Cell::Int(date.weekday().num_days_from_monday() as i64)
        }
        "dayofyear" | "day_of_year" => Cell::Int(date.ordinal() as i64),
        "quarter" => Cell::Int(((date.month() - 1) / 3 + 1) as i64),
        "week" | "weekofyear" => Cell::Int(date.iso_week().week() as i64),
        "days_in_month" | "daysinmonth" => Cell::Int(days_in_month(date) as i64),
        "is_month_start" => Cell::Bool(date.day() == 1),
        "is_month_end" => Cell::Bool(date.day() == days_in_month(date)),
        "is_leap_year" => Cell::Bool(NaiveDate::from_ymd_opt(date.year(), 2, 29).is_some()),
        "date" => Cell::Date(date),
        "time" => Cell::Str(t.time().format("%H:%M:%S").to_string()),
        "normalize" => Cell::Time(midnight(date)),
        _ => return None,
    })
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

pub fn delta_field(seconds: i64, name: &str) -> Option<Cell> {
    Some(match name {
        "days" => Cell::Int(seconds.div_euclid(86_400)),
        "seconds" => Cell::Int(seconds.rem_euclid(86_400)),
        "microseconds" | "nanoseconds" => Cell::Int(0),
        "total_seconds" => Cell::Float(seconds as f64),
        _ => return None,
    })
}

/* ===================== Module ===================== */

pub fn module_attr(attr: &str) -> EvalResult<Val> {
    match attr {
        "datetime" | "date" | "timedelta" => {
            Ok(Val::method(Val::Module(Module::Datetime), attr))
        }
        "timezone" | "time" | "MINYEAR" | "MAXYEAR" => Ok(Val::Inert),
        other => raise(
            ExcKind::AttributeError,
            format!("module 'datetime' has no attribute '{}'", other),
        ),
    }
}

fn component(args: &Args, index: usize, name: &str, default: i64) -> EvalResult<i64> {
    Ok(args.int_opt(index, name)?.unwrap_or(default))
}

pub fn call_function(name: &str, args: Args) -> EvalResult<Val> {
    match name {
        "datetime" => {
            let date = build_date(&args)?;
            let time = NaiveTime::from_hms_opt(
                component(&args, 3, "hour", 0)? as u32,
                component(&args, 4, "minute", 0)? as u32,
                component(&args, 5, "second", 0)? as u32,
            );
            match time {
                Some(time) => Ok(Val::Time(date.and_time(time))),
                None => raise(ExcKind::ValueError, "hour must be in 0..23"),
            }
        }
        "date" => Ok(Val::Date(build_date(&args)?)),
        "timedelta" => {
            let mut seconds = 0f64;
            let units = [
                (0, "days", 86_400.0),
                (1, "seconds", 1.0),
                (2, "microseconds", 0.000_001),
                (3, "milliseconds", 0.001),
                (4, "minutes", 60.0),
                (5, "hours", 3_600.0),
                (6, "weeks", 604_800.0),
            ];
            for (index, unit, scale) in units {
                if let Some(value) = args.float_opt(index, unit)? {
                    seconds += value * scale;
                }
            }
            Ok(Val::Delta(seconds.round() as i64))
        }
        "datetime.now" | "datetime.today" | "datetime.utcnow" => {
            Ok(Val::Time(chrono::Local::now().naive_local()))
        }
        "date.today" => Ok(Val::Date(chrono::Local::now().date_naive())),
        "datetime.strptime" => {
            let text = args.str_opt(0, "date_string")?.unwrap_or_default();
            let pattern = args.str_opt(1, "format")?.unwrap_or_default();
            strptime(&text, &pattern).map(Val::Time)
        }
        "datetime.fromisoformat" | "date.fromisoformat" => {
            let text = args.str_opt(0, "date_string")?.unwrap_or_default();
            match parse_datetime(&text) {
                Some(t) if name.starts_with("date.") => Ok(Val::Date(t.date())),
                Some(t) => Ok(Val::Time(t)),
                None => raise(
                    ExcKind::ValueError,
                    format!("Invalid isoformat string: {}", py_str_repr(&text)),
                ),
            }
        }
        "datetime.combine" => {
            let date = coerce_time(args.required(0, "date", "combine")?)?;
            Ok(Val::Time(date))
        }
        other => raise(
            ExcKind::AttributeError,
            format!("module 'datetime' has no attribute '{}'", other),
        ),
    }
}

fn build_date(args: &Args) -> EvalResult<NaiveDate> {
    let year = component(args, 0, "year", 1970)?;
    let month = component(args, 1, "month", 1)?;
    let day = component(args, 2, "day", 1)?;
    match NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32) {
        Some(date) => Ok(date),
        None => raise(ExcKind::ValueError, "day is out of range for month"),
    }
}

/* ===================== Scalars ===================== */

pub fn attr(receiver: &Val, attr: &str) -> EvalResult<Val> {
    let method = || -> EvalResult<Val> { Ok(Val::method(receiver.clone(), attr)) };
    match receiver {
        Val::Time(t) => match attr {
            "strftime" | "date" | "weekday" | "isoweekday" | "isoformat" | "day_name"
            | "month_name" | "isocalendar" | "replace" | "normalize" | "timestamp"
            | "to_pydatetime" | "floor" | "ceil" | "round" | "to_period" | "time" => method(),
            other => match time_field(t, other) {
                Some(cell) => Ok(Val::from_cell(&cell)),
                None => super::no_attribute(receiver, other),
            },
        },
        Val::Date(d) => match attr {
            "strftime" | "weekday" | "isoweekday" | "isoformat" | "isocalendar" | "replace" => {
                method()
            }
            other => match time_field(&midnight(*d), other) {
                Some(cell) if matches!(other, "year" | "month" | "day") => Ok(Val::from_cell(&cell)),
                _ => super::no_attribute(receiver, other),
            },
        },
        Val::Delta(s) => match attr {
            "total_seconds" | "to_pytimedelta" => method(),
            "components" => Ok(Val::tuple(vec![
                Val::Int(s.div_euclid(86_400)),
                Val::Int(s.rem_euclid(86_400) / 3600),
                Val::Int(s.rem_euclid(3600) / 60),
                Val::Int(s.rem_euclid(60)),
            ])),
            other => match delta_field(*s, other) {
                Some(cell) => Ok(Val::from_cell(&cell)),
                None => super::no_attribute(receiver, other),
            },
        },
        other => super::no_attribute(other, attr),
    }
}

pub fn call_method(receiver: &Val, name: &str, args: Args) -> EvalResult<Val> {
    match receiver {
        Val::Delta(s) => match name {
            "total_seconds" => Ok(Val::Float(*s as f64)),
            "to_pytimedelta" => Ok(Val::Delta(*s)),
            _ => super::no_attribute(receiver, name),
        },
        Val::Time(_) | Val::Date(_) => {
            let t = coerce_time(receiver)?;
            let date = t.date();
            match name {
                "strftime" => {
                    let pattern = args.str_opt(0, "format")?.unwrap_or_default();
                    strftime(&t, &pattern).map(Val::Str)
                }
                "date" => Ok(Val::Date(date)),
                "time" => Ok(Val::Str(t.time().format("%H:%M:%S").to_string())),
                "weekday" => Ok(Val::Int(date.weekday().num_days_from_monday() as i64)),
                "isoweekday" => Ok(Val::Int(date.weekday().number_from_monday() as i64)),
                "isoformat" => Ok(Val::Str(match receiver {
                    Val::Date(d) => d.format("%Y-%m-%d").to_string(),
                    _ => {
                        let sep = args.str_opt(0, "sep")?.unwrap_or_else(|| "T".to_string());
                        format!("{}{}{}", date.format("%Y-%m-%d"), sep, t.format("%H:%M:%S"))
                    }
                })),
                "day_name" => Ok(Val::str(day_name(date))),
                "month_name" => Ok(Val::str(month_name(date))),
                "isocalendar" => {
                    let week = date.iso_week();
                    Ok(Val::tuple(vec![
                        Val::Int(week.year() as i64),
                        Val::Int(week.week() as i64),
                        Val::Int(date.weekday().number_from_monday() as i64),
                    ]))
                }
                "normalize" | "floor" | "ceil" | "round" => {
                    let unit = args.str_opt(0, "freq")?.unwrap_or_else(|| "D".to_string());
                    floor_time(&t, &unit, name).map(Val::Time)
                }
                "to_period" => {
                    let freq = args.str_opt(0, "freq")?.unwrap_or_else(|| "M".to_string());
                    Ok(Val::Str(period_label(&t, &freq)))
                }
                "timestamp" => Ok(Val::Float(t.and_utc().timestamp() as f64)),
                "to_pydatetime" => Ok(Val::Time(t)),
                "replace" => {
                    let year = args.int_opt(KW, "year")?.unwrap_or(date.year() as i64);
                    let month = args.int_opt(KW, "month")?.unwrap_or(date.month() as i64);
                    let day = args.int_opt(KW, "day")?.unwrap_or(date.day() as i64);
                    let hour = args.int_opt(KW, "hour")?.unwrap_or(t.hour() as i64);
                    let minute = args.int_opt(KW, "minute")?.unwrap_or(t.minute() as i64);
                    let second = args.int_opt(KW, "second")?.unwrap_or(t.second() as i64);
                    let built = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32));
                    match (built, receiver) {
                        (Some(t), Val::Date(_)) => Ok(Val::Date(t.date())),
                        (Some(t), _) => Ok(Val::Time(t)),
                        (None, _) => raise(ExcKind::ValueError, "day is out of range for month"),
                    }
                }
                _ => super::no_attribute(receiver, name),
            }
        }
        other => super::no_attribute(other, name),
    }
}

/// Truncate (or round) a timestamp to a calendar unit
pub fn floor_time(t: &NaiveDateTime, freq: &str, mode: &str) -> EvalResult<NaiveDateTime> {
    let Some(step) = unit_seconds(freq) else {
        return raise(
            ExcKind::ValueError,
            format!("Invalid frequency: {}", freq),
        );
    };
    let step = step as i64;
    if step <= 0 {
        return Ok(*t);
    }
    let epoch = t.and_utc().timestamp();
    let floored = epoch - epoch.rem_euclid(step);
    let value = match mode {
        "ceil" if floored != epoch => floored + step,
        "round" if epoch - floored >= step / 2 => floored + step,
        _ => floored,
    };
    match chrono::DateTime::from_timestamp(value, 0) {
        Some(dt) => Ok(dt.naive_utc()),
        None => raise(ExcKind::ValueError, "timestamp out of range"),
    }
}

/// pandas Period text for a timestamp (`2024-03`, `2024Q1`, `2024`)
pub fn period_label(t: &NaiveDateTime, freq: &str) -> String {
    let date = t.date();
    match freq.to_ascii_uppercase().chars().next() {
        Some('Y') | Some('A') => format!("{}", date.year()),
        Some('Q') => format!("{}Q{}", date.year(), (date.month() - 1) / 3 + 1),
        Some('W') => {
            let offset = date.weekday().num_days_from_monday() as u64;
            let monday = date.checked_sub_days(Days::new(offset)).unwrap_or(date);
            let sunday = monday.checked_add_days(Days::new(6)).unwrap_or(monday);
            format!("{}/{}", monday.format("%Y-%m-%d"), sunday.format("%Y-%m-%d"))
        }
        Some('D') => date.format("%Y-%m-%d").to_string(),
        _ => date.format("%Y-%m").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timedelta_spellings() {
        assert_eq!(parse_timedelta("1 days 02:00:00"), Some(93_600));
        assert_eq!(parse_timedelta("00:30:00"), Some(1_800));
        assert_eq!(parse_timedelta("90min"), Some(5_400));
        assert_eq!(parse_timedelta("1h30m"), Some(5_400));
        assert_eq!(parse_timedelta("2D"), Some(172_800));
        assert_eq!(parse_timedelta("soon"), None);
    }

    #[test]
    fn test_strftime_rejects_bad_patterns() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(7, 5, 0))
            .unwrap();
        assert_eq!(strftime(&t, "%B %d, %Y").unwrap(), "March 09, 2024");
        assert!(strftime(&t, "%Q").is_err());
    }

    #[test]
    fn test_period_labels() {
        let t = midnight(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
        assert_eq!(period_label(&t, "M"), "2024-05");
        assert_eq!(period_label(&t, "Q"), "2024Q2");
        assert_eq!(period_label(&t, "W"), "2024-05-13/2024-05-19");
    }
}
