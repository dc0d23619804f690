use chrono::{Duration, NaiveDateTime, NaiveTime, TimeZone};

/// Local-time interval in which the inverter is expected to be off, e.g. 18:00 to 07:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl NightWindow {
    /// `None` unless both hours are below 24.
    pub fn new(start_hour: u32, end_hour: u32) -> Option<Self> {
        Some(NightWindow {
            start: NaiveTime::from_hms_opt(start_hour, 0, 0)?,
            end: NaiveTime::from_hms_opt(end_hour, 0, 0)?,
        })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            /* wraps midnight */
            time >= self.start || time < self.end
        }
    }

    /// First end-of-window boundary strictly after `now`.
    pub fn next_end(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.end);
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// When to resume polling if `now` falls inside the window.
    pub fn wake_time(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.contains(now.time()) {
            Some(self.next_end(now))
        } else {
            None
        }
    }
}

/// Elapsed time between two wall-clock times of `tz`, so a DST change in between is counted.
/// `None` when either falls into a skipped hour or `wake` is not after `now`.
pub fn real_duration<Tz: TimeZone>(
    tz: &Tz,
    now: NaiveDateTime,
    wake: NaiveDateTime,
) -> Option<std::time::Duration> {
    let now = tz.from_local_datetime(&now).earliest()?;
    let wake = tz.from_local_datetime(&wake).earliest()?;
    (wake - now).to_std().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn evening_wakes_next_morning() {
        let window = NightWindow::new(18, 7).unwrap();
        assert_eq!(window.wake_time(at(1, 19, 0)), Some(at(2, 7, 0)));
        assert_eq!(window.wake_time(at(1, 18, 0)), Some(at(2, 7, 0)));
        assert_eq!(window.wake_time(at(1, 23, 59)), Some(at(2, 7, 0)));
    }

    #[test]
    fn early_morning_wakes_same_day() {
        let window = NightWindow::new(18, 7).unwrap();
        assert_eq!(window.wake_time(at(2, 3, 30)), Some(at(2, 7, 0)));
        assert_eq!(window.wake_time(at(2, 0, 0)), Some(at(2, 7, 0)));
    }

    #[test]
    fn daytime_is_outside() {
        let window = NightWindow::new(18, 7).unwrap();
        assert_eq!(window.wake_time(at(1, 14, 0)), None);
        assert_eq!(window.wake_time(at(1, 7, 0)), None);
        assert_eq!(window.wake_time(at(1, 17, 59)), None);
    }

    #[test]
    fn window_within_one_day() {
        let window = NightWindow::new(1, 5).unwrap();
        assert!(window.contains(at(1, 2, 0).time()));
        assert!(!window.contains(at(1, 23, 0).time()));
        assert_eq!(window.wake_time(at(1, 4, 0)), Some(at(1, 5, 0)));
    }

    #[test]
    fn dst_changes_sleep_length() {
        use chrono::Utc;
        use chrono_tz::Europe::Berlin;

        let window = NightWindow::new(18, 7).unwrap();
        let hours = |now: NaiveDateTime| {
            let wake = window.wake_time(now).unwrap();
            real_duration(&Berlin, now, wake).unwrap().as_secs() / 3600
        };

        let autumn = NaiveDate::from_ymd_opt(2024, 10, 26)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap();
        assert_eq!(hours(autumn), 13);

        let spring = NaiveDate::from_ymd_opt(2024, 3, 30)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap();
        assert_eq!(hours(spring), 11);

        assert_eq!(
            real_duration(&Utc, autumn, window.wake_time(autumn).unwrap()),
            Some(std::time::Duration::from_secs(12 * 3600))
        );
    }

    #[test]
    fn skipped_hour_has_no_duration() {
        use chrono_tz::Europe::Berlin;

        let gap = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert_eq!(real_duration(&Berlin, gap, at(1, 7, 0)), None);
    }

    #[test]
    fn rejects_invalid_hours() {
        assert!(NightWindow::new(24, 7).is_none());
        assert!(NightWindow::new(18, 25).is_none());
    }
}
