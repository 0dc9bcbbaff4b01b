//! Daily regeneration scheduler
//!
//! Sleeps until the next configured local wall-clock time, regenerates that
//! day's predictions, and repeats.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use stopcast_common::time::today;

use crate::jobs;
use crate::AppState;

/// First occurrence of `at` strictly after `now`
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let candidate = now.date().and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

pub struct DailyScheduler {
    state: AppState,
    run_at: NaiveTime,
}

impl DailyScheduler {
    pub fn new(state: AppState, run_at: NaiveTime) -> Self {
        Self { state, run_at }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        info!(run_at = %self.run_at.format("%H:%M"), "Daily prediction scheduler started");

        loop {
            let now = Local::now().naive_local();
            let next = next_run_after(now, self.run_at);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next.format("%Y-%m-%d %H:%M"), "Next scheduled prediction run");

            tokio::time::sleep(wait).await;

            let date = today();
            if let Err(e) = jobs::regenerate_for_date(&self.state, date).await {
                error!(error = %e, "Scheduled prediction run failed");
            }

            let window = Duration::from_secs(self.state.config.sms.window_secs);
            self.state.rate_limiter.prune(window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn six() -> NaiveTime {
        NaiveTime::from_hms_opt(6, 0, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        assert_eq!(next_run_after(at(2024, 3, 4, 5, 30), six()), at(2024, 3, 4, 6, 0));
    }

    #[test]
    fn test_next_run_tomorrow_when_passed() {
        assert_eq!(next_run_after(at(2024, 3, 4, 7, 0), six()), at(2024, 3, 5, 6, 0));
    }

    #[test]
    fn test_next_run_at_exact_time_moves_a_day() {
        assert_eq!(next_run_after(at(2024, 3, 4, 6, 0), six()), at(2024, 3, 5, 6, 0));
    }

    #[test]
    fn test_next_run_crosses_month_and_year() {
        assert_eq!(next_run_after(at(2024, 12, 31, 23, 0), six()), at(2025, 1, 1, 6, 0));
    }
}
