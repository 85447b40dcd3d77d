use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

const FALLBACK_HOUR: u32 = 9;
const FALLBACK_MINUTE: u32 = 0;

pub(crate) fn parse_hhmm(time_str: &str) -> Option<(u32, u32)> {
    let (hour_str, minute_str) = time_str.split_once(':')?;
    let hour: u32 = hour_str.parse().ok()?;
    let minute: u32 = minute_str.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Computes the next `HH:MM` fire instant in `tz_name`, falling back to UTC
/// for an unparseable timezone and `09:00` for an unparseable time, per the
/// digest scheduler's stated defaults.
#[must_use]
pub fn next_fire_time(now: DateTime<Utc>, time_str: &str, tz_name: &str) -> DateTime<Utc> {
    let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    let (hour, minute) = parse_hhmm(time_str).unwrap_or((FALLBACK_HOUR, FALLBACK_MINUTE));

    let now_local = now.with_timezone(&tz);
    let today = now_local.date_naive();
    let candidate_naive = today
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| today.and_hms_opt(FALLBACK_HOUR, FALLBACK_MINUTE, 0).expect("09:00 is always valid"));

    let mut candidate = resolve_local(&tz, candidate_naive, now_local.fixed_offset());
    if candidate <= now {
        let tomorrow_naive = (today + chrono::Duration::days(1))
            .and_hms_opt(hour, minute, 0)
            .expect("adding a day preserves a valid HH:MM");
        candidate = resolve_local(&tz, tomorrow_naive, now_local.fixed_offset());
    }
    candidate
}

fn resolve_local(tz: &Tz, naive: chrono::NaiveDateTime, fallback_offset: chrono::DateTime<chrono::FixedOffset>) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => fallback_offset.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_later_today_when_time_has_not_passed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let fire = next_fire_time(now, "09:00", "UTC");
        assert_eq!(fire, Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn rolls_to_tomorrow_when_time_already_passed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let fire = next_fire_time(now, "09:00", "UTC");
        assert_eq!(fire, Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn invalid_timezone_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let fire = next_fire_time(now, "09:00", "Not/A/Zone");
        assert_eq!(fire, Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn invalid_time_falls_back_to_0900() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let fire = next_fire_time(now, "nonsense", "UTC");
        assert_eq!(fire, Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
    }
}
