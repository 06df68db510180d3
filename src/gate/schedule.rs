use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};

/// A recurring window during which the parent console cannot be opened
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimeLockWindow {
    /// Days this window starts on (lowercase: monday, tuesday, etc.); empty means every day
    #[serde(default)]
    pub days: Vec<String>,

    /// Start of the window, "HH:MM"
    #[serde(with = "hhmm")]
    pub start: NaiveTime,

    /// End of the window, "HH:MM"; earlier than `start` wraps past midnight
    #[serde(with = "hhmm")]
    pub end: NaiveTime,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl TimeLockWindow {
    /// Window covering every day of the week
    pub fn daily(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            days: Vec::new(),
            start,
            end,
            enabled: true,
        }
    }

    /// Window covering the given days only
    pub fn on_days(days: &[Weekday], start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            days: days.iter().map(|d| weekday_to_string(*d)).collect(),
            start,
            end,
            enabled: true,
        }
    }

    /// Whether the window wraps into the following day
    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    /// Whether the window starts on `weekday`
    fn starts_on(&self, weekday: Weekday) -> bool {
        self.days.is_empty()
            || self
                .days
                .iter()
                .any(|d| parse_weekday(d) == Some(weekday))
    }

    /// Check if a wall-clock instant falls within this window
    ///
    /// Half-open: the start minute is inside, the end minute is not. The
    /// after-midnight part of a wrapping window belongs to the day it started.
    pub fn contains(&self, now: &NaiveDateTime) -> bool {
        if !self.enabled || self.start == self.end {
            return false;
        }

        let time = now.time();
        let weekday = now.weekday();

        if self.wraps_midnight() {
            (time >= self.start && self.starts_on(weekday))
                || (time < self.end && self.starts_on(weekday.pred()))
        } else {
            time >= self.start && time < self.end && self.starts_on(weekday)
        }
    }

    /// Instant at which the occurrence containing `now` ends
    fn occurrence_end(&self, now: &NaiveDateTime) -> NaiveDateTime {
        let date = now.date();
        if self.wraps_midnight() && now.time() >= self.start {
            (date + Duration::days(1)).and_time(self.end)
        } else {
            date.and_time(self.end)
        }
    }
}

/// The full set of configured time locks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeLockSchedule {
    windows: Vec<TimeLockWindow>,
}

impl TimeLockSchedule {
    pub fn new(windows: Vec<TimeLockWindow>) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> &[TimeLockWindow] {
        &self.windows
    }

    /// No windows configured: switching is never time-locked
    pub fn is_unrestricted(&self) -> bool {
        self.windows.iter().all(|w| !w.enabled)
    }

    /// Check if `now` falls inside at least one enabled window
    pub fn is_locked(&self, now: &NaiveDateTime) -> bool {
        self.windows.iter().any(|w| w.contains(now))
    }

    /// Wall-clock time until `now` is outside every window, or `None` when not locked
    ///
    /// Back-to-back windows are chained, so a lock from 21:00-06:00 followed by
    /// 06:00-07:00 reports the unlock at 07:00.
    pub fn time_until_unlock(&self, now: &NaiveDateTime) -> Option<std::time::Duration> {
        let end = self.unlock_wall_time(now)?;
        Some(super::clock::to_std(end - *now))
    }

    /// Elapsed time until an instant in `now`'s zone is outside every window
    ///
    /// Differs from `time_until_unlock` when a daylight-saving change falls
    /// before the unlock.
    pub fn time_until_unlock_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<std::time::Duration> {
        let local_now = now.naive_local();
        let end = self.unlock_wall_time(&local_now)?;

        let remaining = match now.timezone().from_local_datetime(&end).earliest() {
            Some(end) => end - now.clone(),
            // Unlock time skipped by a spring-forward gap
            None => end - local_now,
        };
        Some(super::clock::to_std(remaining))
    }

    /// Wall-clock instant at which the lock covering `now` ends
    fn unlock_wall_time(&self, now: &NaiveDateTime) -> Option<NaiveDateTime> {
        if !self.is_locked(now) {
            return None;
        }

        let mut cursor = *now;
        // Each hop moves past at least one window occurrence; a week of hops
        // per window covers any schedule that ever unlocks.
        let max_hops = self.windows.len() * 8 + 1;

        for _ in 0..max_hops {
            let next = self
                .windows
                .iter()
                .filter(|w| w.contains(&cursor))
                .map(|w| w.occurrence_end(&cursor))
                .max();

            match next {
                Some(end) => cursor = end,
                None => break,
            }
        }

        Some(cursor)
    }
}

/// Convert Weekday to lowercase string
pub fn weekday_to_string(weekday: Weekday) -> String {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
    .to_string()
}

/// Parse a lowercase or capitalized day name
pub fn parse_weekday(day: &str) -> Option<Weekday> {
    match day.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Validate a single window
pub fn validate_window(window: &TimeLockWindow) -> Result<()> {
    if window.start == window.end {
        anyhow::bail!(
            "Time lock window {} - {} is empty (start equals end)",
            window.start.format("%H:%M"),
            window.end.format("%H:%M")
        );
    }

    for day in &window.days {
        if parse_weekday(day).is_none() {
            anyhow::bail!("Invalid day name: {}", day);
        }
    }

    Ok(())
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, LocalResult, NaiveDate, Timelike};

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    // 2025-01-06 is a Monday
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn bedtime() -> TimeLockWindow {
        TimeLockWindow::daily(hm(21, 0), hm(6, 0))
    }

    #[test]
    fn test_wrapping_window_covers_both_sides_of_midnight() {
        let window = bedtime();
        assert!(window.contains(&at(6, 23, 30)));
        assert!(window.contains(&at(7, 3, 0)));
        assert!(!window.contains(&at(6, 12, 0)));
    }

    #[test]
    fn test_window_is_half_open() {
        let window = bedtime();
        assert!(window.contains(&at(6, 21, 0)));
        assert!(!window.contains(&at(7, 6, 0)));
        assert!(window.contains(&at(7, 5, 59)));
    }

    #[test]
    fn test_schedule_locked_at_quarter_to_midnight_not_at_ten() {
        let schedule = TimeLockSchedule::new(vec![bedtime()]);
        assert!(schedule.is_locked(&at(6, 23, 45)));
        assert!(!schedule.is_locked(&at(6, 10, 0)));
    }

    #[test]
    fn test_empty_schedule_never_locks() {
        let schedule = TimeLockSchedule::default();
        assert!(schedule.is_unrestricted());
        assert!(!schedule.is_locked(&at(6, 23, 45)));
        assert_eq!(schedule.time_until_unlock(&at(6, 23, 45)), None);
    }

    #[test]
    fn test_day_filter_applies_to_start_day() {
        // Friday night lock only; runs into Saturday morning
        let window = TimeLockWindow::on_days(&[Weekday::Fri], hm(22, 0), hm(7, 0));
        // 2025-01-10 is a Friday
        assert!(window.contains(&at(10, 23, 0)));
        assert!(window.contains(&at(11, 2, 0)));
        // Saturday night is not covered, nor Friday early morning
        assert!(!window.contains(&at(11, 23, 0)));
        assert!(!window.contains(&at(10, 2, 0)));
    }

    #[test]
    fn test_disabled_window_never_matches() {
        let mut window = bedtime();
        window.enabled = false;
        assert!(!window.contains(&at(6, 23, 0)));
        assert!(TimeLockSchedule::new(vec![window]).is_unrestricted());
    }

    #[test]
    fn test_time_until_unlock_for_wrapping_window() {
        let schedule = TimeLockSchedule::new(vec![bedtime()]);

        let remaining = schedule.time_until_unlock(&at(6, 23, 45)).unwrap();
        assert_eq!(remaining, std::time::Duration::from_secs(6 * 3600 + 15 * 60));

        let remaining = schedule.time_until_unlock(&at(7, 3, 0)).unwrap();
        assert_eq!(remaining, std::time::Duration::from_secs(3 * 3600));
    }

    /// Zone that springs forward from 01:00 to 02:00 on 2025-03-30
    #[derive(Debug, Clone, Copy)]
    struct SpringForward;

    fn winter() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn summer() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn switch_over() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 30)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap()
    }

    impl TimeZone for SpringForward {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            SpringForward
        }

        fn offset_from_local_date(&self, _local: &NaiveDate) -> LocalResult<FixedOffset> {
            LocalResult::Single(winter())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            if *local < switch_over() {
                LocalResult::Single(winter())
            } else if *local < switch_over() + Duration::hours(1) {
                LocalResult::None
            } else {
                LocalResult::Single(summer())
            }
        }

        fn offset_from_utc_date(&self, _utc: &NaiveDate) -> FixedOffset {
            winter()
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < switch_over() { winter() } else { summer() }
        }
    }

    #[test]
    fn test_time_until_unlock_across_spring_forward() {
        let schedule = TimeLockSchedule::new(vec![bedtime()]);
        let now = SpringForward
            .from_local_datetime(&switch_over().with_hour(0).unwrap())
            .single()
            .unwrap();

        // 00:00 to 06:00 on the wall clock is only five hours that night
        assert_eq!(
            schedule.time_until_unlock(&now.naive_local()),
            Some(std::time::Duration::from_secs(6 * 3600))
        );
        assert_eq!(
            schedule.time_until_unlock_at(&now),
            Some(std::time::Duration::from_secs(5 * 3600))
        );
    }

    #[test]
    fn test_time_until_unlock_at_matches_wall_clock_without_dst() {
        let schedule = TimeLockSchedule::new(vec![bedtime()]);
        let now = winter().from_local_datetime(&at(6, 23, 45)).single().unwrap();

        assert_eq!(
            schedule.time_until_unlock_at(&now),
            schedule.time_until_unlock(&at(6, 23, 45))
        );
    }

    #[test]
    fn test_time_until_unlock_chains_adjacent_windows() {
        let schedule = TimeLockSchedule::new(vec![
            bedtime(),
            TimeLockWindow::daily(hm(6, 0), hm(7, 30)),
        ]);

        let remaining = schedule.time_until_unlock(&at(6, 23, 0)).unwrap();
        assert_eq!(remaining, std::time::Duration::from_secs(8 * 3600 + 30 * 60));
    }

    #[test]
    fn test_overlapping_windows_use_latest_end() {
        let schedule = TimeLockSchedule::new(vec![
            TimeLockWindow::daily(hm(8, 0), hm(12, 0)),
            TimeLockWindow::daily(hm(9, 0), hm(15, 0)),
        ]);

        let remaining = schedule.time_until_unlock(&at(6, 9, 30)).unwrap();
        assert_eq!(remaining, std::time::Duration::from_secs(5 * 3600 + 30 * 60));
    }

    #[test]
    fn test_validate_window() {
        assert!(validate_window(&bedtime()).is_ok());
        assert!(validate_window(&TimeLockWindow::daily(hm(8, 0), hm(8, 0))).is_err());

        let mut window = bedtime();
        window.days = vec!["funday".to_string()];
        assert!(validate_window(&window).is_err());
    }

    #[test]
    fn test_window_yaml_format() {
        let yaml = "days: [saturday, Sunday]\nstart: \"21:30\"\nend: \"07:00\"\n";
        let window: TimeLockWindow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(window.start, hm(21, 30));
        assert_eq!(window.end, hm(7, 0));
        assert!(window.enabled);
        assert!(window.starts_on(Weekday::Sun));

        let out = serde_yaml::to_string(&window).unwrap();
        let reparsed: TimeLockWindow = serde_yaml::from_str(&out).unwrap();
        assert_eq!(reparsed, window);
    }

    #[test]
    fn test_weekday_round_trip() {
        for day in [Weekday::Mon, Weekday::Thu, Weekday::Sun] {
            assert_eq!(parse_weekday(&weekday_to_string(day)), Some(day));
        }
        assert_eq!(parse_weekday("Friday"), Some(Weekday::Fri));
        assert_eq!(parse_weekday("fri"), None);
    }
}
