//! Telemetry cache
//!
//! Wraps the charger and vehicle SOC collaborators with time-to-live caching
//! so external call rates stay within vendor limits. On a failed refresh the
//! stale cache is kept and the error is propagated: a stale reading is
//! better than a blocked loop.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::evse::{ChargerClient, ChargerState};
use crate::logging::get_logger;
use crate::vehicle::{SocClient, VehicleSoc};
use std::time::{Duration, Instant};

/// TTL-cached view over the charger and vehicle SOC sources
pub struct TelemetryCache {
    charger: Box<dyn ChargerClient>,
    soc: Box<dyn SocClient>,
    charger_ttl: Duration,
    soc_refresh: Duration,
    charger_cache: Option<(ChargerState, Instant)>,
    soc_cache: Option<(VehicleSoc, Instant)>,
    logger: crate::logging::StructuredLogger,
}

impl TelemetryCache {
    /// Create a cache over the given collaborators
    pub fn new(charger: Box<dyn ChargerClient>, soc: Box<dyn SocClient>, config: &CacheConfig) -> Self {
        Self {
            charger,
            soc,
            charger_ttl: Duration::from_secs(config.charger_ttl_secs),
            soc_refresh: Duration::from_secs(config.soc_refresh_secs),
            charger_cache: None,
            soc_cache: None,
            logger: get_logger("telemetry"),
        }
    }

    /// Charger status, refreshed from the vendor when the cached value is
    /// older than the TTL or `force` is set
    pub async fn charger_status(&mut self, force: bool) -> Result<ChargerState> {
        if !force
            && let Some((state, at)) = &self.charger_cache
            && at.elapsed() < self.charger_ttl
        {
            return Ok(*state);
        }

        let mut state = self.charger.get_status().await?;
        Self::correct_standby(&mut state);
        self.charger_cache = Some((state, Instant::now()));
        Ok(state)
    }

    /// Vehicle SOC, refreshed only when older than the configured refresh
    /// interval (vendor rate limits) or `force` is set
    pub async fn vehicle_soc(&mut self, force: bool) -> Result<VehicleSoc> {
        if !force
            && let Some((soc, at)) = &self.soc_cache
            && at.elapsed() < self.soc_refresh
        {
            return Ok(*soc);
        }

        let soc = self.soc.get_soc().await?;
        self.soc_cache = Some((soc, Instant::now()));
        Ok(soc)
    }

    /// Actuator write, routed through the cache so the post-write state
    /// replaces the cached reading immediately
    pub async fn apply_command(&mut self, on: bool, rate_amps: u32) -> Result<ChargerState> {
        let mut state = self.charger.set_status(on, rate_amps).await?;
        Self::correct_standby(&mut state);
        self.charger_cache = Some((state, Instant::now()));
        Ok(state)
    }

    /// Last cached charger state, if any (no external call)
    pub fn cached_charger(&self) -> Option<&ChargerState> {
        self.charger_cache.as_ref().map(|(state, _)| state)
    }

    /// One-time re-login of the SOC collaborator after an auth failure
    pub async fn relogin_soc(&mut self) -> Result<()> {
        self.soc.relogin().await
    }

    /// A charger reporting standby while connected cannot be delivering
    /// current, whatever the last command said.
    fn correct_standby(state: &mut ChargerState) {
        if state.standby && state.connected && state.on {
            state.on = false;
            state.rate_amps = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn standby_correction_forces_off() {
        let mut state = ChargerState {
            connected: true,
            on: true,
            rate_amps: 16,
            standby: true,
            updated_at: Utc::now(),
        };
        TelemetryCache::correct_standby(&mut state);
        assert!(!state.on);
        assert_eq!(state.rate_amps, 0);
        // Connected flag is the vendor's own claim and stays
        assert!(state.connected);
    }

    #[test]
    fn standby_correction_ignores_disconnected() {
        let mut state = ChargerState {
            connected: false,
            on: true,
            rate_amps: 16,
            standby: true,
            updated_at: Utc::now(),
        };
        TelemetryCache::correct_standby(&mut state);
        assert!(state.on);
    }
}
