//! Cron-style scheduling for managed processes (§4.8, GLOSSARY "Schedule").
//!
//! Each scheduled process gets a [`cron::Schedule`] evaluated in its
//! configured timezone. The manager's run loop asks [`Scheduler::due`] on a
//! tick and starts whatever comes back, respecting `skipIfRunning`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::process_config::ScheduleConfig;

struct Entry {
    schedule: Schedule,
    timezone: Tz,
    last_fired: Option<DateTime<Utc>>,
}

/// Tracks next-fire state for every process with a `schedule` (§4.8).
#[derive(Default)]
pub struct Scheduler {
    entries: HashMap<String, Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the schedule for `id` (called on startup and
    /// after a reload that changes `processes.yaml`, §4.2).
    pub fn set_schedule(&mut self, id: &str, config: &ScheduleConfig) -> anyhow::Result<()> {
        // cron crate expects a leading seconds field; processes.yaml uses
        // standard 5-field expressions, so prepend "0 " when needed.
        let expr = if config.cron.split_whitespace().count() == 5 {
            format!("0 {}", config.cron)
        } else {
            config.cron.clone()
        };
        let schedule = Schedule::from_str(&expr)?;
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown timezone: {}", config.timezone))?;
        self.entries.insert(
            id.to_string(),
            Entry {
                schedule,
                timezone,
                last_fired: None,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Returns the ids whose schedule has a fire time in `(last_fired, now]`
    /// that hasn't been acted on yet, marking them as fired.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut fired = Vec::new();
        for (id, entry) in self.entries.iter_mut() {
            let now_in_tz = now.with_timezone(&entry.timezone);
            let window_start = entry
                .last_fired
                .map(|t| t.with_timezone(&entry.timezone))
                .unwrap_or(now_in_tz);

            let next_due = entry
                .schedule
                .after(&window_start)
                .take_while(|t| *t <= now_in_tz)
                .last();

            if let Some(fire_time) = next_due {
                entry.last_fired = Some(fire_time.with_timezone(&Utc));
                fired.push(id.clone());
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(cron: &str) -> ScheduleConfig {
        ScheduleConfig {
            cron: cron.to_string(),
            timezone: "UTC".to_string(),
            skip_if_running: true,
            max_duration_secs: None,
            auto_stop: false,
        }
    }

    #[test]
    fn every_minute_schedule_fires_once_per_check() {
        let mut scheduler = Scheduler::new();
        scheduler.set_schedule("job", &config("* * * * *")).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        assert_eq!(scheduler.due(t1), vec!["job".to_string()]);
        // Re-checking the same instant with no time elapsed should not refire.
        assert!(scheduler.due(t1).is_empty());
    }

    #[test]
    fn accepts_five_field_cron_expressions() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.set_schedule("job", &config("0 */6 * * *")).is_ok());
    }
}
