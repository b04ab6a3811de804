//! Charging decision engine
//!
//! Combines the power budget, the protection guard, and the SOC target into
//! the next charger command. This is the only place charger state is
//! mutated; every accepted transition records itself with the guard in the
//! same step as the actuator write.

use crate::config::ChargingConfig;
use crate::error::Result;
use crate::evse::ChargerState;
use crate::logging::get_logger;
use crate::power::{self, PowerSample};
use crate::powerwall::PowerSource;
use crate::protection::ProtectionGuard;
use crate::telemetry::TelemetryCache;
use std::time::Duration;

/// Margin over the minimum-rate power that excess must clear before solar
/// charging is worth starting
const EXCESS_MARGIN: f64 = 1.05;

/// Strategy requested by the policy scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeMode {
    /// Charge from excess solar only
    Solar,

    /// Charge from the grid up to the SOC ceiling
    Grid,
}

/// Outcome of one decision tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeDecision {
    /// Desired state already in effect
    NoOp,

    /// Relay switched on at the given rate
    TurnedOn(u32),

    /// Rate adjusted while already on
    RateChanged(u32),

    /// Relay switched off
    TurnedOff,

    /// Transition blocked; charger held in a safe state
    Held(&'static str),
}

enum Desired {
    On(u32),
    Off,
}

/// Charge rate controller
pub struct ChargeController {
    cfg: ChargingConfig,
    cache: TelemetryCache,
    power: Box<dyn PowerSource>,
    guard: ProtectionGuard,
    last_sample: Option<PowerSample>,
    logger: crate::logging::StructuredLogger,
}

impl ChargeController {
    /// Create a controller over the given collaborators
    pub fn new(cfg: ChargingConfig, cache: TelemetryCache, power: Box<dyn PowerSource>) -> Self {
        let guard = ProtectionGuard::new(Duration::from_secs(cfg.protection_interval_secs));
        Self {
            cfg,
            cache,
            power,
            guard,
            last_sample: None,
            logger: get_logger("controller"),
        }
    }

    /// Minimum excess power worth starting a charge for, watts
    pub fn min_excess_w(&self) -> i32 {
        min_excess_w(&self.cfg)
    }

    /// Decide and apply the next charger command for the given mode.
    ///
    /// Charger status is refreshed first (cache TTL respected); a vehicle
    /// that is not physically connected short-circuits to `NoOp`.
    pub async fn decide(&mut self, mode: ChargeMode) -> Result<ChargeDecision> {
        let state = self.cache.charger_status(false).await?;
        if !state.connected {
            self.logger.debug("EV charger is not plugged in");
            return Ok(ChargeDecision::NoOp);
        }

        let desired = match mode {
            ChargeMode::Solar => self.solar_target(&state).await?,
            ChargeMode::Grid => self.grid_target().await?,
        };
        self.apply(&state, desired).await
    }

    /// Power sample used by the most recent solar decision, if any
    pub fn last_sample(&self) -> Option<&PowerSample> {
        self.last_sample.as_ref()
    }

    /// Whether the cached charger state says the relay is on
    pub fn charger_is_on(&self) -> bool {
        self.cache.cached_charger().is_some_and(|s| s.on)
    }

    /// Forward a one-time SOC collaborator re-login after an auth failure
    pub async fn relogin_soc(&mut self) -> Result<()> {
        self.cache.relogin_soc().await
    }

    /// Whether the power telemetry device currently answers
    pub async fn power_reachable(&mut self) -> bool {
        self.power.is_reachable().await
    }

    /// Shutdown path: force the relay off regardless of the guard
    pub async fn force_off(&mut self) -> Result<()> {
        self.cache.apply_command(false, 0).await?;
        self.guard.record_change();
        self.logger.info("Charger forced off");
        Ok(())
    }

    async fn solar_target(&mut self, state: &ChargerState) -> Result<Desired> {
        let sample = match self.power.get_power_sample().await {
            Ok(sample) => sample,
            Err(e) if e.is_unreachable() => {
                self.logger
                    .warn(&format!("Power telemetry unreachable, assuming zero: {}", e));
                PowerSample::zero()
            }
            Err(e) => return Err(e),
        };
        self.last_sample = Some(sample);

        let excess = power::available_power(&sample, state.draw_watts(self.cfg.voltage));
        if excess > self.min_excess_w() {
            Ok(Desired::On(self.rate_for_excess(excess)))
        } else {
            self.logger.info(&format!(
                "Excess power is not enough: {}w, min: {}w",
                excess,
                self.min_excess_w()
            ));
            Ok(Desired::Off)
        }
    }

    async fn grid_target(&mut self) -> Result<Desired> {
        let soc = self.cache.vehicle_soc(false).await?;
        if soc.percent < self.cfg.soc_ceiling as f32 {
            Ok(Desired::On(self.cfg.max_rate))
        } else {
            self.logger.debug(&format!(
                "Vehicle SOC {:.1}% at or above ceiling {}%",
                soc.percent, self.cfg.soc_ceiling
            ));
            Ok(Desired::Off)
        }
    }

    fn rate_for_excess(&self, excess: i32) -> u32 {
        rate_for_excess(&self.cfg, excess)
    }

    async fn apply(&mut self, current: &ChargerState, desired: Desired) -> Result<ChargeDecision> {
        match desired {
            Desired::On(rate) => {
                if current.on && current.rate_amps == rate {
                    return Ok(ChargeDecision::NoOp);
                }
                if self.guard.is_blocked() {
                    self.logger.info(&format!(
                        "Charger protection: wait {}s before relay change",
                        self.guard.remaining_wait().as_secs()
                    ));
                    return Ok(ChargeDecision::Held("protection"));
                }

                let was_on = current.on;
                self.cache.apply_command(true, rate).await?;
                self.guard.record_change();
                if was_on {
                    self.logger.info(&format!("Charging rate changed to {}A", rate));
                    Ok(ChargeDecision::RateChanged(rate))
                } else {
                    self.logger.info(&format!("Charging started at {}A", rate));
                    Ok(ChargeDecision::TurnedOn(rate))
                }
            }
            Desired::Off => {
                if !current.on {
                    return Ok(ChargeDecision::NoOp);
                }
                if self.guard.is_blocked() {
                    // Stopping now would itself be a disallowed transition;
                    // degrade to a hold at the minimum safe rate instead.
                    if current.rate_amps > self.cfg.min_rate {
                        self.logger.info(&format!(
                            "Charger protection: wait {}s, lowering to {}A",
                            self.guard.remaining_wait().as_secs(),
                            self.cfg.min_rate
                        ));
                        self.cache.apply_command(true, self.cfg.min_rate).await?;
                    }
                    return Ok(ChargeDecision::Held("protection"));
                }

                self.cache.apply_command(false, 0).await?;
                self.guard.record_change();
                self.logger.info("Charging stopped");
                Ok(ChargeDecision::TurnedOff)
            }
        }
    }
}

fn min_excess_w(cfg: &ChargingConfig) -> i32 {
    (f64::from(cfg.min_rate * cfg.voltage) * EXCESS_MARGIN) as i32
}

fn rate_for_excess(cfg: &ChargingConfig, excess: i32) -> u32 {
    let raw = f64::from(excess) * cfg.ratio / f64::from(cfg.voltage);
    raw.clamp(f64::from(cfg.min_rate), f64::from(cfg.max_rate)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_excess_uses_lowest_rate_with_margin() {
        // 6 A * 240 V * 1.05
        assert_eq!(min_excess_w(&ChargingConfig::default()), 1512);
    }

    #[test]
    fn rate_is_clamped_and_truncated() {
        let cfg = ChargingConfig::default();
        assert_eq!(rate_for_excess(&cfg, 2500), 10); // 10.2 A truncated
        assert_eq!(rate_for_excess(&cfg, 1000), 6); // below minimum clamps up
        assert_eq!(rate_for_excess(&cfg, 20_000), 40); // above maximum clamps down
    }

    #[test]
    fn rate_tracks_excess_within_limits() {
        let cfg = ChargingConfig::default();
        // 24 A * 240 V / 0.98 of excess maps back to 24 A
        let excess = (24.0 * 240.0 / cfg.ratio).ceil() as i32;
        assert_eq!(rate_for_excess(&cfg, excess), 24);
    }
}
