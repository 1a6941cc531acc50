// Fire-decision logic for alerts.
//
// Everything here is pure: callers pass `now` explicitly and decide what to
// do with the result. Matching is done on local hour:minute (and calendar
// date for one-shot alerts), never on seconds.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use super::model::{Alert, Recurrence};
use crate::core::error::{AlertError, AlertResult};

/// Minimum gap between two fires of the same alert
pub const DEFAULT_DEBOUNCE_SECS: i64 = 120;

/// Outcome of evaluating one alert at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    Fire,
    NotDue,
    Disabled,
    Debounced,
}

/// Parse the alert's "HH:MM" time of day.
pub fn parse_time(alert: &Alert) -> AlertResult<NaiveTime> {
    let raw = alert.time.trim();
    if raw.is_empty() {
        return Err(AlertError::malformed(alert.id, "missing time"));
    }
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(truncate_to_minute)
        .map_err(|e| AlertError::malformed(alert.id, format!("unparseable time {:?}: {}", raw, e)))
}

fn parse_date(alert: &Alert, raw: &str) -> AlertResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| AlertError::malformed(alert.id, format!("unparseable date {:?}: {}", raw, e)))
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// The slot an alert targets: an optional calendar date plus hour:minute.
///
/// `None` for the date means "any day". Daily alerts always return `None`.
/// A one-shot alert with neither `date_time` nor `date` also returns `None`,
/// so it fires at the next matching time of day, whatever day that is.
pub fn fire_slot(alert: &Alert) -> AlertResult<(Option<NaiveDate>, NaiveTime)> {
    match alert.recurrence {
        Recurrence::Daily => Ok((None, parse_time(alert)?)),
        Recurrence::Once => {
            if let Some(date_time) = alert.date_time {
                return Ok((Some(date_time.date()), truncate_to_minute(date_time.time())));
            }
            match alert.date.as_deref() {
                Some(raw) if !raw.trim().is_empty() => {
                    Ok((Some(parse_date(alert, raw)?), parse_time(alert)?))
                }
                _ => {
                    log::debug!("One-shot alert {} has no date, matching on time only", alert.id);
                    Ok((None, parse_time(alert)?))
                }
            }
        }
    }
}

/// True when `now` falls inside the alert's target minute.
pub fn is_due(alert: &Alert, now: NaiveDateTime) -> AlertResult<bool> {
    let (date, time) = fire_slot(alert)?;
    let same_minute = now.hour() == time.hour() && now.minute() == time.minute();
    let same_day = date.map_or(true, |d| d == now.date());
    Ok(same_minute && same_day)
}

/// Evaluate an alert without mutating it.
pub fn evaluate_alert(alert: &Alert, now: NaiveDateTime, debounce: TimeDelta) -> AlertResult<FireDecision> {
    if !alert.enabled {
        return Ok(FireDecision::Disabled);
    }
    if !is_due(alert, now)? {
        return Ok(FireDecision::NotDue);
    }
    if let Some(last) = alert.last_triggered {
        if now.signed_duration_since(last) < debounce {
            return Ok(FireDecision::Debounced);
        }
    }
    Ok(FireDecision::Fire)
}

/// Evaluate and, on acceptance, consume the fire: stamps `last_triggered`
/// and disables one-shot alerts.
pub fn should_fire(alert: &mut Alert, now: NaiveDateTime, debounce: TimeDelta) -> AlertResult<bool> {
    match evaluate_alert(alert, now, debounce)? {
        FireDecision::Fire => {
            alert.last_triggered = Some(now);
            if alert.recurrence == Recurrence::Once {
                alert.enabled = false;
            }
            Ok(true)
        }
        FireDecision::Debounced => {
            log::debug!("Alert {} due but debounced", alert.id);
            Ok(false)
        }
        FireDecision::NotDue | FireDecision::Disabled => Ok(false),
    }
}

/// Start of the next target minute strictly after `after`, if there is one.
pub fn next_occurrence(alert: &Alert, after: NaiveDateTime) -> AlertResult<Option<NaiveDateTime>> {
    let (date, time) = fire_slot(alert)?;
    let next = match date {
        Some(day) => {
            let at = day.and_time(time);
            (at > after).then_some(at)
        }
        None => {
            let today = after.date().and_time(time);
            if today > after {
                Some(today)
            } else {
                after.date().checked_add_days(Days::new(1)).map(|d| d.and_time(time))
            }
        }
    };
    Ok(next)
}

/// True for a one-shot alert whose slot is entirely in the past. Such an
/// alert can never fire again.
pub fn is_expired(alert: &Alert, now: NaiveDateTime) -> AlertResult<bool> {
    Ok(next_occurrence(alert, now)?.is_none() && !is_due(alert, now)?)
}
