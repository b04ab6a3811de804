//! EVSE vendor integration
//!
//! Talks to the Emporia cloud API for charger status reads and relay/rate
//! writes. Authentication runs against a cached token set persisted through
//! [`TokenStore`]; an expired session is re-established from the configured
//! account credentials without involving the caller.

use crate::config::EvseConfig;
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use crate::persistence::TokenStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

const API_BASE: &str = "https://api.emporiaenergy.com";
const HTTP_TIMEOUT_SECS: u64 = 15;

/// Observed charger state.
///
/// `rate_amps` is only meaningful while `on`. The Protection Guard owns the
/// authoritative last-change timestamp; `updated_at` is the observation time.
#[derive(Debug, Clone, Copy)]
pub struct ChargerState {
    pub connected: bool,
    pub on: bool,
    pub rate_amps: u32,
    pub standby: bool,
    pub updated_at: DateTime<Utc>,
}

impl ChargerState {
    /// Power the charger itself is drawing at the given circuit voltage
    pub fn draw_watts(&self, voltage: u32) -> i32 {
        if self.on {
            (self.rate_amps * voltage) as i32
        } else {
            0
        }
    }
}

/// Abstract charger source/actuator consumed by the core.
///
/// Writes are single-request, all-or-nothing; the returned state is the
/// vendor's post-write view.
#[async_trait::async_trait]
pub trait ChargerClient: Send + Sync {
    async fn get_status(&mut self) -> Result<ChargerState>;
    async fn set_status(&mut self, on: bool, rate_amps: u32) -> Result<ChargerState>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EmporiaTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Authenticated session against the Emporia cloud API, shared by the EVSE
/// client and the fallback vehicle SOC client.
pub(crate) struct EmporiaSession {
    http: reqwest::Client,
    user: String,
    password: String,
    store: TokenStore,
    tokens: Option<EmporiaTokens>,
    logger: crate::logging::StructuredLogger,
}

impl EmporiaSession {
    pub fn new(config: &EvseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            user: config.user.clone(),
            password: config.password.clone(),
            store: TokenStore::new(config.token_file.clone()),
            tokens: None,
            logger: get_logger("emporia"),
        })
    }

    async fn ensure_login(&mut self) -> Result<()> {
        if self.tokens.is_some() {
            return Ok(());
        }

        // A cached token set skips the password login entirely; an unreadable
        // cache is discarded and replaced.
        match self.store.load::<EmporiaTokens>() {
            Ok(Some(tokens)) => {
                self.tokens = Some(tokens);
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                self.logger
                    .warn(&format!("Discarding unreadable token cache: {}", e));
                self.store.clear()?;
            }
        }

        self.password_login().await
    }

    async fn password_login(&mut self) -> Result<()> {
        let resp = self
            .http
            .post(format!("{API_BASE}/customer/login"))
            .json(&serde_json::json!({
                "username": self.user,
                "password": self.password,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(HeliosError::auth(format!(
                "EVSE vendor login failed: {}",
                resp.status()
            )));
        }

        let tokens: EmporiaTokens = resp
            .json()
            .await
            .map_err(|e| HeliosError::auth(format!("Malformed login response: {}", e)))?;
        self.store.save(&tokens)?;
        self.tokens = Some(tokens);
        self.logger.info("Logged into EVSE vendor API");
        Ok(())
    }

    /// Drop the current session and log in again from credentials
    pub async fn relogin(&mut self) -> Result<()> {
        self.tokens = None;
        self.store.clear()?;
        self.password_login().await
    }

    fn bearer(&self) -> String {
        self.tokens
            .as_ref()
            .map(|t| t.id_token.clone())
            .unwrap_or_default()
    }

    pub async fn get_json<T: DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        self.ensure_login().await?;
        let mut resp = self
            .http
            .get(format!("{API_BASE}{path}"))
            .header("authtoken", self.bearer())
            .send()
            .await?;

        // One silent re-login on an expired session; a second rejection is
        // surfaced to the caller.
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.relogin().await?;
            resp = self
                .http
                .get(format!("{API_BASE}{path}"))
                .header("authtoken", self.bearer())
                .send()
                .await?;
        }

        if !resp.status().is_success() {
            return Err(HeliosError::api(format!(
                "EVSE vendor GET {} failed: {}",
                path,
                resp.status()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| HeliosError::Serialization {
                message: e.to_string(),
            })
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &mut self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.ensure_login().await?;
        let mut resp = self
            .http
            .put(format!("{API_BASE}{path}"))
            .header("authtoken", self.bearer())
            .json(body)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.relogin().await?;
            resp = self
                .http
                .put(format!("{API_BASE}{path}"))
                .header("authtoken", self.bearer())
                .json(body)
                .send()
                .await?;
        }

        if !resp.status().is_success() {
            return Err(HeliosError::api(format!(
                "EVSE vendor PUT {} failed: {}",
                path,
                resp.status()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| HeliosError::Serialization {
                message: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceEntry {
    ev_charger: Option<EvChargerPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvChargerPayload {
    device_gid: u64,
    charger_on: bool,
    charging_rate: u32,
    max_charging_rate: u32,
    icon: String,
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvChargerUpdate {
    device_gid: u64,
    charger_on: bool,
    charging_rate: u32,
    max_charging_rate: u32,
}

impl EvChargerPayload {
    fn into_state(self) -> ChargerState {
        ChargerState {
            connected: self.icon == "CarConnected",
            on: self.charger_on,
            rate_amps: self.charging_rate,
            standby: self.status.eq_ignore_ascii_case("standby"),
            updated_at: Utc::now(),
        }
    }
}

/// EVSE client for the first (only) charger on the Emporia account
pub struct EmporiaEvse {
    session: EmporiaSession,
    max_rate: u32,
    charger_gid: Option<u64>,
    logger: crate::logging::StructuredLogger,
}

impl EmporiaEvse {
    pub fn new(config: &EvseConfig, max_rate: u32) -> Result<Self> {
        Ok(Self {
            session: EmporiaSession::new(config)?,
            max_rate,
            charger_gid: None,
            logger: get_logger("evse"),
        })
    }

    async fn find_charger(&mut self) -> Result<EvChargerPayload> {
        let devices: DevicesResponse = self
            .session
            .get_json("/customers/devices")
            .await
            .map_err(device_on_decode)?;

        let charger = devices
            .devices
            .into_iter()
            .filter_map(|d| d.ev_charger)
            .find(|c| self.charger_gid.is_none_or(|want| want == c.device_gid));

        match charger {
            Some(payload) => {
                if self.charger_gid.is_none() {
                    self.logger.info(&format!(
                        "Using EV charger {} (vendor max {}A)",
                        payload.device_gid, payload.max_charging_rate
                    ));
                }
                self.charger_gid = Some(payload.device_gid);
                Ok(payload)
            }
            None => Err(HeliosError::device("No EV charger on the vendor account")),
        }
    }
}

#[async_trait::async_trait]
impl ChargerClient for EmporiaEvse {
    async fn get_status(&mut self) -> Result<ChargerState> {
        Ok(self.find_charger().await?.into_state())
    }

    async fn set_status(&mut self, on: bool, rate_amps: u32) -> Result<ChargerState> {
        let gid = match self.charger_gid {
            Some(gid) => gid,
            None => {
                self.find_charger().await?;
                self.charger_gid
                    .ok_or_else(|| HeliosError::device("No EV charger on the vendor account"))?
            }
        };

        let update = EvChargerUpdate {
            device_gid: gid,
            charger_on: on,
            charging_rate: rate_amps,
            max_charging_rate: self.max_rate,
        };
        let payload: EvChargerPayload = self
            .session
            .put_json("/devices/evcharger", &update)
            .await
            .map_err(device_on_decode)?;
        Ok(payload.into_state())
    }
}

/// A payload the vendor could not serialize correctly is a device fault,
/// not a generic API hiccup
fn device_on_decode(err: HeliosError) -> HeliosError {
    match err {
        HeliosError::Serialization { message } => HeliosError::device(message),
        other => other,
    }
}
