//! `Date`, backed by `chrono`.
//!
//! Times are milliseconds since the epoch in an `f64`, NaN for an invalid
//! date. The session has no time zone: local accessors report UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use super::{arg, constructor, method, type_error};
use crate::bridge::BuiltinFn;
use crate::coerce::Hint;
use crate::error::Result;
use crate::exception::ErrorKind;
use crate::object::ObjectKind;
use crate::session::VmSession;
use crate::value::Value;

const MS_PER_DAY: f64 = 86_400_000.0;
const MAX_TIME: f64 = 8.64e15;

const YEAR: usize = 0;
const MONTH: usize = 1;
const DAY: usize = 2;
const HOURS: usize = 3;
const MINUTES: usize = 4;
const SECONDS: usize = 5;
const MILLIS: usize = 6;

pub(super) fn install(vm: &mut VmSession) -> Result<()> {
    let proto = vm.intrinsics.date_prototype;
    let ctor = constructor(vm, "Date", 7, date_call, date_construct, proto)?;
    method(vm, ctor, "now", 0, now)?;
    method(vm, ctor, "parse", 1, parse)?;
    method(vm, ctor, "UTC", 7, utc)?;

    let getters: [(&str, &str, BuiltinFn); 7] = [
        ("getFullYear", "getUTCFullYear", get_component::<YEAR>),
        ("getMonth", "getUTCMonth", get_component::<MONTH>),
        ("getDate", "getUTCDate", get_component::<DAY>),
        ("getHours", "getUTCHours", get_component::<HOURS>),
        ("getMinutes", "getUTCMinutes", get_component::<MINUTES>),
        ("getSeconds", "getUTCSeconds", get_component::<SECONDS>),
        ("getMilliseconds", "getUTCMilliseconds", get_component::<MILLIS>),
    ];
    for (local, utc, func) in getters {
        method(vm, proto, local, 0, func)?;
        method(vm, proto, utc, 0, func)?;
    }

    let setters: [(&str, &str, u32, BuiltinFn); 7] = [
        ("setFullYear", "setUTCFullYear", 3, set_components::<YEAR>),
        ("setMonth", "setUTCMonth", 2, set_components::<MONTH>),
        ("setDate", "setUTCDate", 1, set_components::<DAY>),
        ("setHours", "setUTCHours", 4, set_components::<HOURS>),
        ("setMinutes", "setUTCMinutes", 3, set_components::<MINUTES>),
        ("setSeconds", "setUTCSeconds", 2, set_components::<SECONDS>),
        ("setMilliseconds", "setUTCMilliseconds", 1, set_components::<MILLIS>),
    ];
    for (local, utc, arity, func) in setters {
        method(vm, proto, local, arity, func)?;
        method(vm, proto, utc, arity, func)?;
    }

    let others: [(&str, u32, BuiltinFn); 12] = [
        ("getDay", 0, get_day),
        ("getUTCDay", 0, get_day),
        ("getTime", 0, get_time),
        ("valueOf", 0, get_time),
        ("getTimezoneOffset", 0, get_timezone_offset),
        ("setTime", 1, set_time),
        ("toISOString", 0, to_iso_string),
        ("toString", 0, to_string),
        ("toUTCString", 0, to_utc_string),
        ("toDateString", 0, to_date_string),
        ("toTimeString", 0, to_time_string),
        ("toLocaleString", 0, to_string),
    ];
    for (name, arity, func) in others {
        method(vm, proto, name, arity, func)?;
    }
    Ok(())
}

/// Current time in milliseconds.
pub(crate) fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// Clamp to the representable range, truncating to whole milliseconds.
pub(crate) fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > MAX_TIME {
        return f64::NAN;
    }
    t.trunc() + 0.0
}

fn datetime(t: f64) -> Option<DateTime<Utc>> {
    if t.is_nan() {
        return None;
    }
    Utc.timestamp_millis_opt(t as i64).single()
}

/// Days since the epoch of a proleptic Gregorian date, `month` in 1..=12.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Compose a time value from year, zero-based month and the rest.
fn make_time(parts: &[f64; 7]) -> f64 {
    if parts.iter().any(|p| !p.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hours, minutes, seconds, millis] = parts.map(f64::trunc);
    let year = year + (month / 12.0).floor();
    let month = month.rem_euclid(12.0);
    if year.abs() > 400_000.0 {
        return f64::NAN;
    }
    let days = days_from_civil(year as i64, month as i64 + 1, 1) as f64 + day - 1.0;
    let time = hours * 3_600_000.0 + minutes * 60_000.0 + seconds * 1000.0 + millis;
    time_clip(days * MS_PER_DAY + time)
}

fn components(t: f64) -> Option<[f64; 7]> {
    let dt = datetime(t)?;
    Some([
        dt.year() as f64,
        dt.month0() as f64,
        dt.day() as f64,
        dt.hour() as f64,
        dt.minute() as f64,
        dt.second() as f64,
        dt.timestamp_subsec_millis() as f64,
    ])
}

/// Parse the formats the runtime prints plus ISO 8601 and RFC 2822.
fn parse_time(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp_millis() as f64;
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return naive.and_utc().timestamp_millis() as f64;
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return midnight.and_utc().timestamp_millis() as f64;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return dt.timestamp_millis() as f64;
    }
    let without_zone_name = text.split(" (").next().unwrap_or(text);
    if let Ok(dt) = DateTime::parse_from_str(without_zone_name, "%a %b %d %Y %H:%M:%S GMT%z") {
        return dt.timestamp_millis() as f64;
    }
    f64::NAN
}

fn this_time(vm: &mut VmSession, this: &Value) -> Result<f64> {
    if let Value::Object(obj) = this {
        let slot = vm.resolve(obj)?;
        if let ObjectKind::Date(t) = vm.cell(slot)?.kind {
            return Ok(t);
        }
    }
    Err(type_error(vm, "this is not a Date object."))
}

fn store_time(vm: &mut VmSession, this: &Value, t: f64) -> Result<Value> {
    let t = time_clip(t);
    let slot = vm.object_slot(this, "set time")?;
    if let ObjectKind::Date(time) = &mut vm.cell_mut(slot)?.kind {
        *time = t;
    }
    Ok(Value::Number(t))
}

fn format_time(t: f64, pattern: &str) -> String {
    match datetime(t) {
        Some(dt) => dt.format(pattern).to_string(),
        None => "Invalid Date".to_string(),
    }
}

/// Component arguments of `new Date(y, m, ...)` and `Date.UTC`.
fn component_args(vm: &mut VmSession, args: &[Value]) -> Result<[f64; 7]> {
    let mut parts = [f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    for (i, a) in args.iter().take(7).enumerate() {
        parts[i] = vm.to_number(a)?;
    }
    let year = parts[YEAR];
    if year.is_finite() && (0.0..=99.0).contains(&year.trunc()) {
        parts[YEAR] = 1900.0 + year.trunc();
    }
    Ok(parts)
}

fn date_call(_vm: &mut VmSession, _this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::String(format_time(now_ms(), DISPLAY_FORMAT)))
}

fn date_construct(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let time = match args {
        [] => return vm.create_date(None),
        [single] => {
            if single.is_date() {
                this_time(vm, single)?
            } else {
                match vm.to_primitive(single, Hint::Default)? {
                    Value::String(text) => parse_time(&text),
                    other => vm.to_number(&other)?,
                }
            }
        }
        _ => make_time(&component_args(vm, args)?),
    };
    vm.create_date(Some(time))
}

fn now(_vm: &mut VmSession, _this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(now_ms()))
}

fn parse(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    let text = vm.to_display_string(&arg(args, 0))?;
    Ok(Value::Number(time_clip(parse_time(&text))))
}

fn utc(vm: &mut VmSession, _this: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::Number(make_time(&component_args(vm, args)?)))
}

fn get_component<const C: usize>(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    Ok(Value::Number(components(t).map_or(f64::NAN, |parts| parts[C])))
}

/// `setHours(h, m, s, ms)` and friends: overwrite component `C` and the
/// ones after it that were supplied.
fn set_components<const C: usize>(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    let base = match components(t) {
        Some(parts) => parts,
        None if C == YEAR => [f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        None => return Ok(Value::Number(f64::NAN)),
    };
    let mut parts = base;
    let supplied = args.len().max(1);
    for offset in 0..supplied.min(7 - C) {
        parts[C + offset] = vm.to_number(&arg(args, offset))?;
    }
    store_time(vm, this, make_time(&parts))
}

fn get_day(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    Ok(Value::Number(datetime(t).map_or(f64::NAN, |dt| {
        dt.weekday().num_days_from_sunday() as f64
    })))
}

fn get_time(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(this_time(vm, this)?))
}

fn get_timezone_offset(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    Ok(Value::Number(if t.is_nan() { f64::NAN } else { 0.0 }))
}

fn set_time(vm: &mut VmSession, this: &Value, args: &[Value]) -> Result<Value> {
    this_time(vm, this)?;
    let t = vm.to_number(&arg(args, 0))?;
    store_time(vm, this, t)
}

const DISPLAY_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)";

fn to_iso_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    match datetime(t) {
        Some(dt) => Ok(Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())),
        None => Err(vm.raise(ErrorKind::RangeError, "Invalid time value")),
    }
}

fn to_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    Ok(Value::String(format_time(t, DISPLAY_FORMAT)))
}

fn to_utc_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    Ok(Value::String(format_time(t, "%a, %d %b %Y %H:%M:%S GMT")))
}

fn to_date_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    Ok(Value::String(format_time(t, "%a %b %d %Y")))
}

fn to_time_string(vm: &mut VmSession, this: &Value, _args: &[Value]) -> Result<Value> {
    let t = this_time(vm, this)?;
    Ok(Value::String(format_time(
        t,
        "%H:%M:%S GMT+0000 (Coordinated Universal Time)",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_days_match_known_dates() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
        assert_eq!(days_from_civil(1969, 12, 31), -1);
    }

    #[test]
    fn make_time_normalises_overflowing_months() {
        let a = make_time(&[2020.0, 12.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        let b = make_time(&[2021.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(a, b);
        assert_eq!(b, 1_609_459_200_000.0);
    }

    #[test]
    fn parses_iso_and_printed_forms() {
        assert_eq!(parse_time("1970-01-02"), MS_PER_DAY);
        assert_eq!(parse_time("2021-01-01T00:00:00.500Z"), 1_609_459_200_500.0);
        let printed = format_time(1_609_459_200_000.0, DISPLAY_FORMAT);
        assert_eq!(parse_time(&printed), 1_609_459_200_000.0);
        assert!(parse_time("not a date").is_nan());
    }

    #[test]
    fn time_clip_rejects_out_of_range() {
        assert!(time_clip(8.64e15 + 1.0).is_nan());
        assert_eq!(time_clip(1.7), 1.0);
    }

    #[test]
    fn guest_date_round_trip() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval(
                "var d = new Date(Date.UTC(2021, 0, 31, 12));\n\
                 d.setMonth(1);\n\
                 d.toISOString() + '|' + d.getDay() + '|' + new Date(NaN)",
            )
            .unwrap();
        assert_eq!(result, Value::from("2021-03-03T12:00:00.000Z|3|Invalid Date"));
    }

    #[test]
    fn invalid_date_iso_string_throws_range_error() {
        let mut vm = VmSession::new().unwrap();
        let result = vm
            .eval("try { new Date('nope').toISOString(); } catch (e) { e.name }")
            .unwrap();
        assert_eq!(result, Value::from("RangeError"));
    }
}
