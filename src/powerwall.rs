//! Powerwall gateway integration
//!
//! Reads instantaneous solar/home/battery power from the local Tesla
//! Powerwall gateway. The gateway serves a self-signed certificate and
//! cookie-authenticated sessions; both are handled here.

use crate::config::PowerwallConfig;
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use crate::power::PowerSample;
use chrono::Utc;
use serde::Deserialize;

const HTTP_TIMEOUT_SECS: u64 = 10;

/// Abstract home power telemetry source consumed by the core.
///
/// `get_power_sample` fails with an `Unreachable` error when the device
/// cannot be contacted; the caller treats that as a zero sample until the
/// device is reachable again.
#[async_trait::async_trait]
pub trait PowerSource: Send + Sync {
    async fn get_power_sample(&mut self) -> Result<PowerSample>;
    async fn is_reachable(&mut self) -> bool;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct Aggregates {
    solar: Meter,
    load: Meter,
    battery: Meter,
}

#[derive(Debug, Deserialize)]
struct Meter {
    instant_power: f64,
}

/// Client for the local Powerwall gateway
pub struct PowerwallClient {
    http: reqwest::Client,
    base: String,
    user: String,
    password: String,
    auth_token: Option<String>,
    logger: crate::logging::StructuredLogger,
}

impl PowerwallClient {
    pub fn new(config: &PowerwallConfig) -> Result<Self> {
        // The gateway only speaks TLS with a self-signed certificate
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base: format!("https://{}", config.host),
            user: config.user.clone(),
            password: config.password.clone(),
            auth_token: None,
            logger: get_logger("powerwall"),
        })
    }

    async fn ensure_login(&mut self) -> Result<()> {
        if self.auth_token.is_some() {
            return Ok(());
        }

        let resp = self
            .http
            .post(format!("{}/api/login/Basic", self.base))
            .json(&serde_json::json!({
                "username": "customer",
                "password": self.password,
                "email": self.user,
                "clean_session": true,
            }))
            .send()
            .await
            .map_err(unreachable_on_transport)?;

        if !resp.status().is_success() {
            return Err(HeliosError::auth(format!(
                "Powerwall login failed: {}",
                resp.status()
            )));
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| HeliosError::auth(format!("Malformed login response: {}", e)))?;
        self.auth_token = Some(login.token);
        self.logger.info("Connected to Powerwall gateway");
        Ok(())
    }

    async fn request_aggregates(&mut self) -> Result<reqwest::Response> {
        let token = self.auth_token.clone().unwrap_or_default();
        self.http
            .get(format!("{}/api/meters/aggregates", self.base))
            .header("Cookie", format!("AuthCookie={}", token))
            .send()
            .await
            .map_err(unreachable_on_transport)
    }

    async fn fetch_aggregates(&mut self) -> Result<Aggregates> {
        self.ensure_login().await?;
        let mut resp = self.request_aggregates().await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            // Session cookie aged out; the gateway hands out a fresh one on
            // the next login. One retry only.
            self.auth_token = None;
            self.ensure_login().await?;
            resp = self.request_aggregates().await?;
        }

        if !resp.status().is_success() {
            return Err(HeliosError::api(format!(
                "Powerwall aggregates failed: {}",
                resp.status()
            )));
        }

        resp.json::<Aggregates>()
            .await
            .map_err(|e| HeliosError::api(format!("Malformed aggregates response: {}", e)))
    }
}

#[async_trait::async_trait]
impl PowerSource for PowerwallClient {
    async fn get_power_sample(&mut self) -> Result<PowerSample> {
        let agg = self.fetch_aggregates().await?;
        let sample = PowerSample {
            solar_w: agg.solar.instant_power.round() as i32,
            home_w: agg.load.instant_power.round() as i32,
            battery_w: agg.battery.instant_power.round() as i32,
            sampled_at: Utc::now(),
        };
        self.logger.debug(&format!(
            "Power sample: solar={}w home={}w battery={}w",
            sample.solar_w, sample.home_w, sample.battery_w
        ));
        Ok(sample)
    }

    async fn is_reachable(&mut self) -> bool {
        self.http
            .get(format!("{}/api/status", self.base))
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }
}

fn unreachable_on_transport(err: reqwest::Error) -> HeliosError {
    if err.is_connect() || err.is_timeout() {
        HeliosError::unreachable(err.to_string())
    } else {
        HeliosError::network(err.to_string())
    }
}
