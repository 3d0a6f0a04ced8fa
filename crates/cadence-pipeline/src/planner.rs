//! Publish-time planning.
//!
//! Candidate timestamps come from per-platform time-of-day slots scored
//! by typical engagement. Generation walks each calendar day in range,
//! materializes every slot, and drops candidates that are in the past,
//! inside the quiet-hours window, or on an excluded weekday. There is no
//! randomness anywhere: identical inputs always produce identical
//! schedules.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};

use cadence_core::{Error, Platform, Result};

/// One time-of-day posting slot with its engagement score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub hour: u32,
    pub minute: u32,
    /// Relative engagement score in [0, 1]; higher is better.
    pub score: f64,
}

/// Quiet hours: a daily window during which nothing may be scheduled.
///
/// Supports overnight wraparound: `start > end` means the window spans
/// midnight (e.g. 22:00–07:00 blocks late evening and early morning).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Whether a time of day falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            // Overnight wraparound
            time >= self.start || time < self.end
        }
    }
}

/// Planner configuration per brand.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Daily no-post window.
    pub quiet_hours: QuietHours,
    /// Weekdays on which nothing is scheduled.
    pub excluded_days: Vec<Weekday>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            quiet_hours: QuietHours {
                start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            },
            excluded_days: Vec::new(),
        }
    }
}

/// Publish-time planning service.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Time-of-day slots for a platform, best engagement first.
    pub fn optimal_times(&self, platform: Platform) -> Vec<Slot> {
        let mut slots = match platform {
            Platform::Instagram | Platform::InstagramReel => vec![
                Slot { hour: 11, minute: 0, score: 0.82 },
                Slot { hour: 14, minute: 30, score: 0.74 },
                Slot { hour: 19, minute: 0, score: 0.91 },
            ],
            Platform::Facebook => vec![
                Slot { hour: 9, minute: 0, score: 0.77 },
                Slot { hour: 13, minute: 0, score: 0.85 },
                Slot { hour: 20, minute: 0, score: 0.69 },
            ],
            Platform::Tiktok => vec![
                Slot { hour: 12, minute: 0, score: 0.71 },
                Slot { hour: 17, minute: 30, score: 0.88 },
                Slot { hour: 21, minute: 0, score: 0.93 },
            ],
        };
        slots.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        slots
    }

    /// All valid future publish times between `start` and `end`, ascending.
    ///
    /// Candidates in the past (relative to `now`), inside quiet hours, or
    /// on an excluded weekday are dropped. Single pass, O(days × slots).
    pub fn generate_schedule(
        &self,
        platform: Platform,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let mut slots = self.optimal_times(platform);
        // Candidates are built in chronological order per day
        slots.sort_by_key(|s| (s.hour, s.minute));

        let mut schedule = Vec::new();
        let mut day = start.date_naive();
        let last_day = end.date_naive();

        while day <= last_day {
            if !self.config.excluded_days.contains(&day.weekday()) {
                for slot in &slots {
                    let Some(time) = NaiveTime::from_hms_opt(slot.hour, slot.minute, 0) else {
                        continue;
                    };
                    if self.config.quiet_hours.contains(time) {
                        continue;
                    }
                    let candidate = day.and_time(time).and_utc();
                    if candidate <= now || candidate < start || candidate > end {
                        continue;
                    }
                    schedule.push(candidate);
                }
            }
            day += ChronoDuration::days(1);
        }

        schedule
    }

    /// Spread `count` publish times evenly across the available slots.
    ///
    /// The filtered slot list is divided into `count` buckets by integer
    /// stride and one representative is taken per bucket, so output is
    /// stable for identical inputs.
    pub fn distribute(
        &self,
        platform: Platform,
        count: usize,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let available = self.generate_schedule(platform, now, start, end);
        if available.len() < count {
            return Err(Error::Validation(format!(
                "need {count} publish slots but only {} are available in range",
                available.len()
            )));
        }

        let stride = available.len() / count;
        let picked = (0..count).map(|i| available[i * stride]).collect();
        Ok(picked)
    }
}
