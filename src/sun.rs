//! Sunrise and sunset computation
//!
//! Standard solar-position approximation (sunrise equation) over the
//! Gregorian calendar. Accuracy is a couple of minutes, which is plenty for
//! scheduling charging phases.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Mean obliquity of the ecliptic, degrees
const OBLIQUITY_DEG: f64 = 23.4397;

/// Sun altitude defining rise/set: geometric horizon corrected for
/// atmospheric refraction and the solar disc radius, degrees
const SUN_ALTITUDE_DEG: f64 = -0.833;

/// Julian day of the Unix epoch
const JD_UNIX_EPOCH: f64 = 2_440_587.5;

/// Julian day of the J2000 epoch (2000-01-01 12:00 UTC)
const JD_J2000: f64 = 2_451_545.0;

/// Sun event instants for one calendar date
#[derive(Debug, Clone, Copy)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Compute sunrise and sunset for the given coordinates and date.
///
/// Returns `None` during polar day or polar night, when the sun never
/// crosses the horizon.
pub fn sun_times(latitude: f64, longitude: f64, date: NaiveDate) -> Option<SunTimes> {
    // 12:00 UTC of the requested date, as a Julian day
    let jd_noon = f64::from(date.num_days_from_ce()) + 1_721_424.5 + 0.5;
    let days_since_j2000 = jd_noon - JD_J2000;

    // Mean solar time at the observer's meridian (east longitudes transit earlier)
    let mean_solar = days_since_j2000 - longitude / 360.0;

    // Solar mean anomaly and equation of the center
    let anomaly_deg = (357.5291 + 0.985_600_28 * mean_solar).rem_euclid(360.0);
    let anomaly = anomaly_deg.to_radians();
    let center_deg =
        1.9148 * anomaly.sin() + 0.0200 * (2.0 * anomaly).sin() + 0.0003 * (3.0 * anomaly).sin();

    // Ecliptic longitude of the sun
    let ecliptic_deg = (anomaly_deg + center_deg + 180.0 + 102.9372).rem_euclid(360.0);
    let ecliptic = ecliptic_deg.to_radians();

    // Solar transit, corrected for the equation of time
    let transit =
        JD_J2000 + mean_solar + 0.0053 * anomaly.sin() - 0.0069 * (2.0 * ecliptic).sin();

    let declination = (ecliptic.sin() * OBLIQUITY_DEG.to_radians().sin()).asin();
    let lat = latitude.to_radians();
    let cos_hour_angle = (SUN_ALTITUDE_DEG.to_radians().sin() - lat.sin() * declination.sin())
        / (lat.cos() * declination.cos());
    if !(-1.0..=1.0).contains(&cos_hour_angle) {
        return None;
    }
    let hour_angle_deg = cos_hour_angle.acos().to_degrees();

    Some(SunTimes {
        sunrise: julian_to_datetime(transit - hour_angle_deg / 360.0)?,
        sunset: julian_to_datetime(transit + hour_angle_deg / 360.0)?,
    })
}

fn julian_to_datetime(jd: f64) -> Option<DateTime<Utc>> {
    let unix_secs = (jd - JD_UNIX_EPOCH) * 86_400.0;
    DateTime::from_timestamp(unix_secs as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const LAT: f64 = 37.32;
    const LON: f64 = -122.03;

    fn day_length_hours(times: &SunTimes) -> f64 {
        (times.sunset - times.sunrise).num_seconds() as f64 / 3600.0
    }

    #[test]
    fn summer_day_is_long_at_mid_latitude() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let times = sun_times(LAT, LON, date).unwrap();
        assert!(times.sunrise < times.sunset);
        let hours = day_length_hours(&times);
        assert!((14.0..15.5).contains(&hours), "day length {hours}");
    }

    #[test]
    fn winter_day_is_short_at_mid_latitude() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 21).unwrap();
        let times = sun_times(LAT, LON, date).unwrap();
        let hours = day_length_hours(&times);
        assert!((9.0..10.5).contains(&hours), "day length {hours}");
    }

    #[test]
    fn equator_day_is_near_twelve_hours() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let times = sun_times(0.0, 0.0, date).unwrap();
        let hours = day_length_hours(&times);
        assert!((11.5..12.7).contains(&hours), "day length {hours}");
    }

    #[test]
    fn summer_sunrise_lands_in_the_expected_utc_hour() {
        // Cupertino sunrise on the June solstice is about 05:47 PDT (12:47 UTC)
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let times = sun_times(LAT, LON, date).unwrap();
        assert!((12..=13).contains(&times.sunrise.hour()), "{}", times.sunrise);
    }

    #[test]
    fn polar_day_has_no_events() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        assert!(sun_times(80.0, 0.0, date).is_none());
        let date = NaiveDate::from_ymd_opt(2025, 12, 21).unwrap();
        assert!(sun_times(80.0, 0.0, date).is_none());
    }
}
