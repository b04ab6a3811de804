//! Time-of-day charging policy
//!
//! The scheduler is a state machine over time, not over events: the active
//! phase is re-derived every tick from absolute wall-clock time against
//! three boundaries fixed at startup (sunrise, peak-hour start, sunset), so
//! a mid-run restart lands in the correct phase automatically.

use crate::config::{LocationConfig, ScheduleConfig};
use crate::error::{HeliosError, Result};
use crate::sun;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

/// Daily charging policy phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPhase {
    /// Before sunrise: grid charging up to the SOC ceiling
    PreSunrise,

    /// Sunrise to peak hour: solar preferred, grid fallback
    OffPeak,

    /// Peak hour to sunset: solar only, never draw from the grid
    Peak,

    /// Past sunset: stop the charger and exit
    Done,
}

impl PolicyPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyPhase::PreSunrise => "pre_sunrise",
            PolicyPhase::OffPeak => "off_peak",
            PolicyPhase::Peak => "peak",
            PolicyPhase::Done => "done",
        }
    }
}

/// The day's phase boundaries in the configured timezone
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub sunrise: DateTime<Tz>,
    pub peak_start: DateTime<Tz>,
    pub sunset: DateTime<Tz>,
}

impl DaySchedule {
    /// Build a schedule from explicit boundaries
    pub fn new(sunrise: DateTime<Tz>, peak_start: DateTime<Tz>, sunset: DateTime<Tz>) -> Self {
        Self {
            sunrise,
            peak_start,
            sunset,
        }
    }

    /// Compute the schedule for one calendar date.
    ///
    /// Sunrise and sunset come from the configured coordinates; the peak
    /// boundary always comes from config; a configured stop time replaces
    /// the astronomical sunset.
    pub fn compute(
        schedule: &ScheduleConfig,
        location: &LocationConfig,
        date: NaiveDate,
    ) -> Result<Self> {
        let tz: Tz = schedule
            .timezone
            .parse()
            .map_err(|_| HeliosError::validation("schedule.timezone", "Unknown IANA timezone"))?;

        let times = sun::sun_times(location.latitude, location.longitude, date).ok_or_else(|| {
            HeliosError::config(format!(
                "No sunrise/sunset at latitude {} on {}",
                location.latitude, date
            ))
        })?;

        let peak_start = local_instant(tz, date, schedule.peak_start_time()?)?;
        let sunset = match schedule.stop_time_override()? {
            Some(t) => local_instant(tz, date, t)?,
            None => times.sunset.with_timezone(&tz),
        };

        Ok(Self::new(times.sunrise.with_timezone(&tz), peak_start, sunset))
    }

    /// Derive the phase for an absolute instant
    pub fn phase_at(&self, t: DateTime<Tz>) -> PolicyPhase {
        if t >= self.sunset {
            PolicyPhase::Done
        } else if t < self.sunrise {
            PolicyPhase::PreSunrise
        } else if t < self.peak_start {
            PolicyPhase::OffPeak
        } else {
            PolicyPhase::Peak
        }
    }
}

fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| {
            HeliosError::validation("schedule", &format!("Ambiguous local time {} {}", date, time))
        })
}
