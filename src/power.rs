//! Power budget calculation
//!
//! Converts a raw power sample from the home installation into the excess
//! power available for vehicle charging.

use chrono::{DateTime, Utc};

/// One instantaneous reading from the home power telemetry source.
///
/// All values are signed watts. `battery_w > 0` means the home battery is
/// discharging into the house (vendor convention). Samples are produced
/// fresh for each budget calculation and never cached across ticks.
#[derive(Debug, Clone, Copy)]
pub struct PowerSample {
    pub solar_w: i32,
    pub home_w: i32,
    pub battery_w: i32,
    pub sampled_at: DateTime<Utc>,
}

impl PowerSample {
    /// An all-zero sample, used while the telemetry device is unreachable
    pub fn zero() -> Self {
        Self {
            solar_w: 0,
            home_w: 0,
            battery_w: 0,
            sampled_at: Utc::now(),
        }
    }

    /// Whether the home battery is currently discharging into the house
    pub fn battery_discharging(&self) -> bool {
        self.battery_w > 0
    }
}

/// Excess power available for charging, in watts (may be negative).
///
/// The charger's own draw is added back: while charging, the home load
/// already includes the EV, so without the add-back the act of charging
/// would suppress the excess signal and the controller would oscillate off
/// as soon as it turned on.
pub fn available_power(sample: &PowerSample, currently_drawing_w: i32) -> i32 {
    sample.solar_w - sample.home_w - sample.battery_w.abs() + currently_drawing_w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(solar_w: i32, home_w: i32, battery_w: i32) -> PowerSample {
        PowerSample {
            solar_w,
            home_w,
            battery_w,
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn excess_is_solar_minus_home_minus_battery_flow() {
        assert_eq!(available_power(&sample(3000, 500, 0), 0), 2500);
        assert_eq!(available_power(&sample(3000, 500, 400), 0), 2100);
        // Battery flow magnitude counts in both directions
        assert_eq!(available_power(&sample(3000, 500, -400), 0), 2100);
    }

    #[test]
    fn own_draw_is_added_back() {
        // Charging at 10 A on a 240 V circuit: the 2400 W shows up in home
        // load but must not count against the excess signal.
        assert_eq!(available_power(&sample(3000, 2900, 0), 2400), 2500);
    }

    #[test]
    fn excess_may_be_negative() {
        assert!(available_power(&sample(200, 1800, 0), 0) < 0);
    }

    #[test]
    fn zero_sample_yields_only_own_draw() {
        assert_eq!(available_power(&PowerSample::zero(), 1440), 1440);
        assert!(!PowerSample::zero().battery_discharging());
    }
}
