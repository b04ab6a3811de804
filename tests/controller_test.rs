//! Contract-level tests for the charging decision engine.

use chrono::Utc;
use helios::config::{CacheConfig, ChargingConfig};
use helios::controller::{ChargeController, ChargeDecision, ChargeMode};
use helios::error::{HeliosError, Result};
use helios::evse::{ChargerClient, ChargerState};
use helios::power::PowerSample;
use helios::powerwall::PowerSource;
use helios::telemetry::TelemetryCache;
use helios::vehicle::{SocClient, SocOrigin, VehicleSoc};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct ChargerLog {
    reads: usize,
    writes: Vec<(bool, u32)>,
}

struct MockCharger {
    state: Arc<Mutex<ChargerState>>,
    log: Arc<Mutex<ChargerLog>>,
}

#[async_trait::async_trait]
impl ChargerClient for MockCharger {
    async fn get_status(&mut self) -> Result<ChargerState> {
        self.log.lock().unwrap().reads += 1;
        Ok(*self.state.lock().unwrap())
    }

    async fn set_status(&mut self, on: bool, rate_amps: u32) -> Result<ChargerState> {
        self.log.lock().unwrap().writes.push((on, rate_amps));
        let mut state = self.state.lock().unwrap();
        state.on = on;
        state.rate_amps = if on { rate_amps } else { 0 };
        state.updated_at = Utc::now();
        Ok(*state)
    }
}

struct MockPower {
    sample: Arc<Mutex<PowerSample>>,
    unreachable: Arc<Mutex<bool>>,
    calls: Arc<Mutex<usize>>,
}

#[async_trait::async_trait]
impl PowerSource for MockPower {
    async fn get_power_sample(&mut self) -> Result<PowerSample> {
        *self.calls.lock().unwrap() += 1;
        if *self.unreachable.lock().unwrap() {
            return Err(HeliosError::unreachable("mock gateway offline"));
        }
        Ok(*self.sample.lock().unwrap())
    }

    async fn is_reachable(&mut self) -> bool {
        !*self.unreachable.lock().unwrap()
    }
}

struct MockSoc {
    percent: Arc<Mutex<f32>>,
    fail_auth: Arc<Mutex<bool>>,
    relogins: Arc<Mutex<usize>>,
}

#[async_trait::async_trait]
impl SocClient for MockSoc {
    fn origin(&self) -> SocOrigin {
        SocOrigin::Primary
    }

    async fn list_vehicles(&mut self) -> Result<Vec<String>> {
        Ok(vec!["mock-vehicle".to_string()])
    }

    async fn get_soc(&mut self) -> Result<VehicleSoc> {
        if *self.fail_auth.lock().unwrap() {
            return Err(HeliosError::auth("mock session expired"));
        }
        Ok(VehicleSoc {
            percent: *self.percent.lock().unwrap(),
            updated_at: Utc::now(),
            origin: SocOrigin::Primary,
        })
    }

    async fn relogin(&mut self) -> Result<()> {
        *self.relogins.lock().unwrap() += 1;
        *self.fail_auth.lock().unwrap() = false;
        Ok(())
    }
}

fn charger_state(connected: bool, on: bool, rate_amps: u32) -> ChargerState {
    ChargerState {
        connected,
        on,
        rate_amps,
        standby: false,
        updated_at: Utc::now(),
    }
}

fn power_sample(solar_w: i32, home_w: i32, battery_w: i32) -> PowerSample {
    PowerSample {
        solar_w,
        home_w,
        battery_w,
        sampled_at: Utc::now(),
    }
}

struct Rig {
    controller: ChargeController,
    charger_state: Arc<Mutex<ChargerState>>,
    charger_log: Arc<Mutex<ChargerLog>>,
    sample: Arc<Mutex<PowerSample>>,
    power_unreachable: Arc<Mutex<bool>>,
    power_calls: Arc<Mutex<usize>>,
    soc_percent: Arc<Mutex<f32>>,
    soc_fail_auth: Arc<Mutex<bool>>,
    soc_relogins: Arc<Mutex<usize>>,
}

fn rig(initial: ChargerState, sample: PowerSample, soc_percent: f32) -> Rig {
    let charger_state = Arc::new(Mutex::new(initial));
    let charger_log = Arc::new(Mutex::new(ChargerLog::default()));
    let sample = Arc::new(Mutex::new(sample));
    let power_unreachable = Arc::new(Mutex::new(false));
    let power_calls = Arc::new(Mutex::new(0));
    let soc_percent = Arc::new(Mutex::new(soc_percent));
    let soc_fail_auth = Arc::new(Mutex::new(false));
    let soc_relogins = Arc::new(Mutex::new(0));

    let charger = MockCharger {
        state: charger_state.clone(),
        log: charger_log.clone(),
    };
    let power = MockPower {
        sample: sample.clone(),
        unreachable: power_unreachable.clone(),
        calls: power_calls.clone(),
    };
    let soc = MockSoc {
        percent: soc_percent.clone(),
        fail_auth: soc_fail_auth.clone(),
        relogins: soc_relogins.clone(),
    };

    // SOC refresh interval zero so tests can move the mock SOC between ticks
    let cache_cfg = CacheConfig {
        soc_refresh_secs: 0,
        ..CacheConfig::default()
    };
    let cache = TelemetryCache::new(Box::new(charger), Box::new(soc), &cache_cfg);
    let controller = ChargeController::new(ChargingConfig::default(), cache, Box::new(power));

    Rig {
        controller,
        charger_state,
        charger_log,
        sample,
        power_unreachable,
        power_calls,
        soc_percent,
        soc_fail_auth,
        soc_relogins,
    }
}

#[tokio::test]
async fn solar_excess_turns_charger_on_at_computed_rate() {
    // Scenario: 3000 W solar, 500 W home, idle battery -> 2500 W excess,
    // clamp(2500 * 0.98 / 240, 6, 40) = 10 A
    let mut r = rig(charger_state(true, false, 0), power_sample(3000, 500, 0), 50.0);

    let decision = r.controller.decide(ChargeMode::Solar).await.unwrap();
    assert_eq!(decision, ChargeDecision::TurnedOn(10));
    assert_eq!(r.charger_log.lock().unwrap().writes, vec![(true, 10)]);
    assert!(r.charger_state.lock().unwrap().on);
}

#[tokio::test]
async fn insufficient_excess_never_starts_charging() {
    // 2012 - 500 = 1512 W excess, exactly the threshold: not enough
    let mut r = rig(charger_state(true, false, 0), power_sample(2012, 500, 0), 50.0);
    let decision = r.controller.decide(ChargeMode::Solar).await.unwrap();
    assert_eq!(decision, ChargeDecision::NoOp);
    assert!(r.charger_log.lock().unwrap().writes.is_empty());

    // One watt above the threshold starts at the minimum rate
    *r.sample.lock().unwrap() = power_sample(2013, 500, 0);
    let decision = r.controller.decide(ChargeMode::Solar).await.unwrap();
    assert_eq!(decision, ChargeDecision::TurnedOn(6));
}

#[tokio::test]
async fn battery_flow_counts_against_excess_in_both_directions() {
    // |battery| = 1200 W leaves 1300 W excess, below threshold
    let mut r = rig(charger_state(true, false, 0), power_sample(3000, 500, 1200), 50.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::NoOp
    );

    *r.sample.lock().unwrap() = power_sample(3000, 500, -1200);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::NoOp
    );
}

#[tokio::test]
async fn identical_inputs_are_a_noop_the_second_time() {
    let mut r = rig(charger_state(true, false, 0), power_sample(3000, 500, 0), 50.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::TurnedOn(10)
    );

    // The home load now includes the charger's own 2400 W draw; the budget
    // adds it back, so the computed rate is unchanged.
    *r.sample.lock().unwrap() = power_sample(3000, 2900, 0);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::NoOp
    );
    assert_eq!(r.charger_log.lock().unwrap().writes.len(), 1);
}

#[tokio::test]
async fn same_computed_rate_is_a_noop() {
    // Scenario: charger already on at 10 A and the decision computes 10 A again
    let mut r = rig(charger_state(true, true, 10), power_sample(3000, 2900, 0), 50.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::NoOp
    );
    assert!(r.charger_log.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn disconnected_vehicle_short_circuits() {
    let mut r = rig(charger_state(false, false, 0), power_sample(9000, 500, 0), 10.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::NoOp
    );
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::NoOp
    );
    // No power sample is taken for a disconnected vehicle
    assert_eq!(*r.power_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn grid_mode_charges_below_ceiling_at_max_rate() {
    let mut r = rig(charger_state(true, false, 0), power_sample(0, 500, 0), 30.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::TurnedOn(40)
    );
}

#[tokio::test]
async fn grid_mode_stops_at_or_above_ceiling() {
    // Scenario: SOC 70 % with a 60 % ceiling
    let mut r = rig(charger_state(true, true, 40), power_sample(0, 500, 0), 70.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::TurnedOff
    );
    assert!(!r.charger_state.lock().unwrap().on);

    // Already off: nothing to do
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::NoOp
    );
}

#[tokio::test]
async fn blocked_turn_on_is_held_and_relay_stays_off() {
    // Scenario: an accepted stop starts the protection window, then solar
    // returns while the guard is still blocking
    let mut r = rig(charger_state(true, true, 10), power_sample(0, 2400, 0), 50.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::TurnedOff
    );

    *r.sample.lock().unwrap() = power_sample(5000, 2600, 0);
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::Held("protection")
    );
    assert!(!r.charger_state.lock().unwrap().on);
    // Only the accepted stop ever reached the actuator
    assert_eq!(r.charger_log.lock().unwrap().writes, vec![(false, 0)]);
}

#[tokio::test]
async fn blocked_stop_degrades_to_minimum_rate_hold() {
    // An accepted start opens the protection window at 40 A
    let mut r = rig(charger_state(true, false, 0), power_sample(0, 500, 0), 30.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::TurnedOn(40)
    );

    // SOC reaches the ceiling while the guard still blocks: hold at 6 A
    *r.soc_percent.lock().unwrap() = 70.0;
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::Held("protection")
    );
    {
        let state = r.charger_state.lock().unwrap();
        assert!(state.on);
        assert_eq!(state.rate_amps, 6);
    }

    // Already at the minimum: held again with no further write
    let writes_before = r.charger_log.lock().unwrap().writes.len();
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::Held("protection")
    );
    assert_eq!(r.charger_log.lock().unwrap().writes.len(), writes_before);
}

#[tokio::test]
async fn unreachable_power_telemetry_reads_as_zero() {
    let mut r = rig(charger_state(true, false, 0), power_sample(3000, 500, 0), 50.0);
    *r.power_unreachable.lock().unwrap() = true;

    // Zero solar, zero battery: nothing to charge from, but no tick failure
    assert_eq!(
        r.controller.decide(ChargeMode::Solar).await.unwrap(),
        ChargeDecision::NoOp
    );
    assert!(r.charger_log.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn auth_failure_propagates_and_relogin_recovers() {
    let mut r = rig(charger_state(true, false, 0), power_sample(0, 500, 0), 30.0);
    *r.soc_fail_auth.lock().unwrap() = true;

    let err = r.controller.decide(ChargeMode::Grid).await.unwrap_err();
    assert!(err.is_auth());

    r.controller.relogin_soc().await.unwrap();
    assert_eq!(*r.soc_relogins.lock().unwrap(), 1);
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::TurnedOn(40)
    );
}

#[tokio::test]
async fn force_off_ignores_the_protection_window() {
    let mut r = rig(charger_state(true, false, 0), power_sample(0, 500, 0), 30.0);
    assert_eq!(
        r.controller.decide(ChargeMode::Grid).await.unwrap(),
        ChargeDecision::TurnedOn(40)
    );

    // Guard is blocking, but shutdown must still leave the relay off
    r.controller.force_off().await.unwrap();
    assert!(!r.charger_state.lock().unwrap().on);
}

#[tokio::test]
async fn last_sample_reflects_the_solar_tick() {
    let mut r = rig(charger_state(true, false, 0), power_sample(3000, 500, 200), 50.0);
    assert!(r.controller.last_sample().is_none());
    r.controller.decide(ChargeMode::Solar).await.unwrap();
    let sample = r.controller.last_sample().unwrap();
    assert_eq!(sample.battery_w, 200);
    assert!(sample.battery_discharging());
}
