//! Self-contained RFC 5545 `RRULE` subset (§4.I): `FREQ`, `INTERVAL`,
//! `BYDAY`, `BYHOUR`, `BYMINUTE`, `BYMONTHDAY`, `COUNT`, `UNTIL`. No
//! external RFC 5545 crate is in the dependency set this workspace draws
//! from, so this is hand-written and unit tested against the §8/S5
//! worked weekly example.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};

/// Hard cap on candidate advances per `next_occurrence` call, guaranteeing
/// termination on pathological inputs (e.g. `BYDAY` that never matches `FREQ`).
const MAX_ITERATIONS: u32 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Clone, Debug, Default)]
pub struct Rrule {
    pub freq: Option<Freq>,
    pub interval: u32,
    pub by_day: Vec<Weekday>,
    pub by_hour: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_month_day: Vec<u32>,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
}

impl Rrule {
    /// Parses a single `RRULE:`-prefixed (prefix optional) token string.
    pub fn parse(s: &str) -> Option<Self> {
        let body = s.strip_prefix("RRULE:").unwrap_or(s);
        let mut rule = Rrule {
            interval: 1,
            ..Default::default()
        };
        for part in body.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=')?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    rule.freq = Some(match value.to_ascii_uppercase().as_str() {
                        "DAILY" => Freq::Daily,
                        "WEEKLY" => Freq::Weekly,
                        "MONTHLY" => Freq::Monthly,
                        "YEARLY" => Freq::Yearly,
                        _ => return None,
                    });
                }
                "INTERVAL" => rule.interval = value.parse().ok()?,
                "BYDAY" => {
                    rule.by_day = value
                        .split(',')
                        .filter_map(parse_weekday)
                        .collect();
                }
                "BYHOUR" => {
                    rule.by_hour = value.split(',').filter_map(|v| v.parse().ok()).collect();
                }
                "BYMINUTE" => {
                    rule.by_minute = value.split(',').filter_map(|v| v.parse().ok()).collect();
                }
                "BYMONTHDAY" => {
                    rule.by_month_day =
                        value.split(',').filter_map(|v| v.parse().ok()).collect();
                }
                "COUNT" => rule.count = value.parse().ok(),
                "UNTIL" => rule.until = parse_until(value),
                _ => {}
            }
        }
        rule.freq?;
        Some(rule)
    }

    /// First occurrence start at or after `after`, given the rule's `dtstart`
    /// (the `MaintenanceWindow.schedule.start` instant) as the series anchor.
    pub fn next_occurrence(&self, dtstart: DateTime<Utc>, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let freq = self.freq?;
        let interval = self.interval.max(1) as i64;
        let mut candidate = dtstart;
        let mut occurrence_count: u32 = 0;
        let mut iterations = 0;

        loop {
            if iterations >= MAX_ITERATIONS {
                return None;
            }
            iterations += 1;

            if let Some(until) = self.until {
                if candidate > until {
                    return None;
                }
            }

            // For FREQ=WEEKLY the candidate steps a day at a time (below) so
            // BYDAY can select more than one weekday per included week;
            // `week_index` gates which weeks count towards INTERVAL.
            let week_index = (candidate.date_naive() - dtstart.date_naive()).num_days().div_euclid(7);
            let matches_interval = freq != Freq::Weekly || week_index % interval == 0;

            let matches_by_day = if freq != Freq::Weekly {
                true
            } else if self.by_day.is_empty() {
                candidate.weekday() == dtstart.weekday()
            } else {
                self.by_day.contains(&candidate.weekday())
            };
            let matches_by_month_day =
                self.by_month_day.is_empty() || self.by_month_day.contains(&candidate.day());

            let pinned = pin_time(candidate, &self.by_hour, &self.by_minute);

            if matches_interval && matches_by_day && matches_by_month_day {
                occurrence_count += 1;
                if let Some(count) = self.count {
                    if occurrence_count > count {
                        return None;
                    }
                }
                if pinned >= after {
                    return Some(pinned);
                }
            }

            candidate = if freq == Freq::Weekly {
                candidate + Duration::days(1)
            } else {
                advance(candidate, freq, self.interval)
            };
        }
    }
}

fn pin_time(dt: DateTime<Utc>, by_hour: &[u32], by_minute: &[u32]) -> DateTime<Utc> {
    let hour = by_hour.first().copied().unwrap_or_else(|| dt.hour());
    let minute = by_minute.first().copied().unwrap_or_else(|| dt.minute());
    dt.with_hour(hour)
        .and_then(|d| d.with_minute(minute))
        .and_then(|d| d.with_second(0))
        .unwrap_or(dt)
}

fn advance(dt: DateTime<Utc>, freq: Freq, interval: u32) -> DateTime<Utc> {
    let interval = interval.max(1) as i64;
    match freq {
        Freq::Daily => dt + Duration::days(interval),
        // Advance a full interval of weeks; BYDAY (when present) is checked
        // against every day within that week by the day-at-a-time loop in
        // `next_occurrence`, not by this step.
        Freq::Weekly => dt + Duration::days(7 * interval),
        Freq::Monthly => add_months(dt, interval),
        Freq::Yearly => add_months(dt, interval * 12),
    }
}

fn add_months(dt: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    let total = dt.year() as i64 * 12 + (dt.month() as i64 - 1) + months;
    let year = (total.div_euclid(12)) as i32;
    let month = (total.rem_euclid(12)) as u32 + 1;
    let day = dt.day().min(days_in_month(year, month));
    dt.with_day(1)
        .unwrap()
        .with_year(year)
        .and_then(|d| d.with_month(month))
        .and_then(|d| d.with_day(day))
        .unwrap_or(dt)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let first = chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    next.map(|n| (n - first).num_days() as u32).unwrap_or(28)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.trim().to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_until(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekly_saturday_02_matches_worked_example() {
        let rule = Rrule::parse("RRULE:FREQ=WEEKLY;BYDAY=SA;BYHOUR=02").unwrap();
        let dtstart = Utc.with_ymd_and_hms(2026, 7, 4, 2, 0, 0).unwrap(); // a Saturday
        let after = Utc.with_ymd_and_hms(2026, 7, 20, 0, 0, 0).unwrap();
        let next = rule.next_occurrence(dtstart, after).unwrap();
        assert_eq!(next.weekday(), Weekday::Sat);
        assert_eq!(next.hour(), 2);
        assert!(next >= after);
    }

    #[test]
    fn count_exhausted_returns_none() {
        let rule = Rrule::parse("RRULE:FREQ=DAILY;COUNT=2").unwrap();
        let dtstart = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let far_future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(rule.next_occurrence(dtstart, far_future).is_none());
    }

    #[test]
    fn until_exceeded_returns_none() {
        let rule = Rrule::parse("RRULE:FREQ=DAILY;UNTIL=20260105T000000Z").unwrap();
        let dtstart = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        assert!(rule.next_occurrence(dtstart, after).is_none());
    }

    #[test]
    fn by_day_only_applies_to_weekly() {
        let rule = Rrule::parse("RRULE:FREQ=DAILY;BYDAY=MO").unwrap();
        let dtstart = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let next = rule.next_occurrence(dtstart, after).unwrap();
        assert_eq!(next.date_naive(), Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap().date_naive());
    }

    #[test]
    fn rejects_missing_freq() {
        assert!(Rrule::parse("INTERVAL=2").is_none());
    }

    #[test]
    fn weekly_without_byday_fires_every_seven_days() {
        let rule = Rrule::parse("RRULE:FREQ=WEEKLY").unwrap();
        let dtstart = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap(); // a Monday
        let after = Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap(); // the following day
        let next = rule.next_occurrence(dtstart, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap());
    }
}
