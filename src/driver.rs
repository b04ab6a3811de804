//! Main control loop
//!
//! Drives the whole system: derives the policy phase for the current tick,
//! invokes the scheduled strategy, sleeps, and shuts down in order. A tick
//! failure is logged and becomes "no decision this tick"; only the loop's
//! own scheduling logic can abort the run.

use crate::config::Config;
use crate::controller::{ChargeController, ChargeDecision, ChargeMode};
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use crate::scheduler::{DaySchedule, PolicyPhase};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::time::Duration;

/// Top-level driver owning the controller and the day's schedule
pub struct HeliosDriver {
    config: Config,
    controller: ChargeController,
    schedule: DaySchedule,
    timezone: Tz,
    logger: crate::logging::StructuredLogger,
}

impl HeliosDriver {
    /// Create a driver; computes the day's phase boundaries once
    pub fn new(config: Config, controller: ChargeController) -> Result<Self> {
        let timezone: Tz = config
            .schedule
            .timezone
            .parse()
            .map_err(|_| HeliosError::validation("schedule.timezone", "Unknown IANA timezone"))?;
        let today = Utc::now().with_timezone(&timezone).date_naive();
        let schedule = DaySchedule::compute(&config.schedule, &config.location, today)?;

        let logger = get_logger("driver");
        logger.info(&format!(
            "Today: sunrise {}, peak {}, stop {}",
            schedule.sunrise.format("%H:%M:%S"),
            schedule.peak_start.format("%H:%M:%S"),
            schedule.sunset.format("%H:%M:%S")
        ));

        Ok(Self {
            config,
            controller,
            schedule,
            timezone,
            logger,
        })
    }

    fn now_local(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }

    /// Run until the stop boundary (or Ctrl-C), then force the charger off
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting charging control loop");
        if !self.controller.power_reachable().await {
            self.logger
                .warn("Power telemetry not reachable at startup, treating as zero until it answers");
        }
        let poll = Duration::from_secs(self.config.poll_interval_secs);

        loop {
            let phase = self.schedule.phase_at(self.now_local());
            if phase == PolicyPhase::Done {
                self.logger.info("Stop boundary reached, stop running");
                break;
            }

            if let Err(e) = self.tick(phase).await {
                self.logger
                    .error(&format!("Tick failed in {} phase: {}", phase.as_str(), e));
                self.recover(&e).await;
            }

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = tokio::signal::ctrl_c() => {
                    self.logger.info("Interrupt received, shutting down");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// One polling tick: dispatch the strategy selected by the phase
    async fn tick(&mut self, phase: PolicyPhase) -> Result<()> {
        let decision = match phase {
            // Grid-charge while solar is unavailable, up to the SOC ceiling
            PolicyPhase::PreSunrise => self.controller.decide(ChargeMode::Grid).await?,

            PolicyPhase::OffPeak => self.off_peak_tick().await?,

            // Utility peak pricing: never draw from the grid
            PolicyPhase::Peak => self.controller.decide(ChargeMode::Solar).await?,

            PolicyPhase::Done => ChargeDecision::NoOp,
        };

        self.logger.debug(&format!(
            "Phase {}: decision {:?}",
            phase.as_str(),
            decision
        ));
        Ok(())
    }

    /// Off-peak hybrid: prefer solar; when the solar decision leaves the
    /// charger off and the home battery is not discharging, use surplus grid
    /// capacity this tick instead.
    async fn off_peak_tick(&mut self) -> Result<ChargeDecision> {
        let solar = self.controller.decide(ChargeMode::Solar).await?;

        let left_off = match solar {
            ChargeDecision::TurnedOff => true,
            ChargeDecision::NoOp | ChargeDecision::Held(_) => !self.controller.charger_is_on(),
            _ => false,
        };
        let battery_idle = self
            .controller
            .last_sample()
            .is_some_and(|s| !s.battery_discharging());

        if left_off && battery_idle {
            self.logger.debug("Solar decision left charger off, trying grid top-off");
            return self.controller.decide(ChargeMode::Grid).await;
        }
        Ok(solar)
    }

    /// Per-tick failure recovery; never aborts the loop
    async fn recover(&mut self, err: &HeliosError) {
        if err.is_auth() {
            self.logger.info("Re-authenticating SOC collaborator");
            if let Err(e) = self.controller.relogin_soc().await {
                self.logger.error(&format!("Re-login failed: {}", e));
            }
        }
    }

    /// Last action of every run: leave the relay in a safe OFF state
    async fn shutdown(&mut self) {
        if let Err(e) = self.controller.force_off().await {
            self.logger
                .error(&format!("Failed to force charger off at shutdown: {}", e));
        }
        self.logger.info("Shutdown complete");
    }
}
