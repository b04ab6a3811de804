//! Vehicle SOC integrations
//!
//! Two alternative state-of-charge sources exist: the dedicated FordConnect
//! vehicle telemetry API (primary) and the charger vendor's vehicle endpoint
//! (secondary). Whichever is configured is authoritative for the run.

use crate::config::{EvseConfig, FordConnectConfig};
use crate::error::{HeliosError, Result};
use crate::evse::EmporiaSession;
use crate::logging::get_logger;
use crate::persistence::TokenStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const FORD_OAUTH_URL: &str = "https://dah2vb2cprod.b2clogin.com/914d88b1-3523-4bf6-9be4-1b96b4f6f919/oauth2/v2.0/token?p=B2C_1A_signup_signin_common";
const FORD_API_BASE: &str = "https://api.mps.ford.com/api/fordconnect/v3";
const FORD_APPLICATION_ID: &str = "AFDC085B-377A-4351-B23E-5E1D35FB3700";
const HTTP_TIMEOUT_SECS: u64 = 15;

/// Which SOC source produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocOrigin {
    Primary,
    Secondary,
}

/// Vehicle state of charge
#[derive(Debug, Clone, Copy)]
pub struct VehicleSoc {
    /// Battery percentage in [0, 100]
    pub percent: f32,
    pub updated_at: DateTime<Utc>,
    pub origin: SocOrigin,
}

/// Abstract SOC source consumed by the core.
///
/// Token refresh is internal; an expired session surfaces as an `Auth`
/// error, which entitles the caller to exactly one `relogin` retry.
#[async_trait::async_trait]
pub trait SocClient: Send + Sync {
    fn origin(&self) -> SocOrigin;
    async fn list_vehicles(&mut self) -> Result<Vec<String>>;
    async fn get_soc(&mut self) -> Result<VehicleSoc>;
    async fn relogin(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FordTokens {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct FordVehiclesResponse {
    vehicles: Vec<FordVehicleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FordVehicleEntry {
    vehicle_id: String,
}

#[derive(Debug, Deserialize)]
struct FordVehicleInfoResponse {
    vehicle: FordVehicleInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FordVehicleInfo {
    vehicle_details: FordVehicleDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FordVehicleDetails {
    battery_charge_level: FordBatteryLevel,
}

#[derive(Debug, Deserialize)]
struct FordBatteryLevel {
    value: f32,
}

/// FordConnect client (primary SOC source)
pub struct FordConnectClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token_seed: String,
    vehicle_id: Option<String>,
    tokens: Option<FordTokens>,
    store: TokenStore,
    logger: crate::logging::StructuredLogger,
}

impl FordConnectClient {
    pub fn new(config: &FordConnectConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token_seed: config.refresh_token.clone(),
            vehicle_id: (!config.vehicle_id.is_empty()).then(|| config.vehicle_id.clone()),
            tokens: None,
            store: TokenStore::new(config.token_file.clone()),
            logger: get_logger("fordconnect"),
        })
    }

    async fn ensure_tokens(&mut self) -> Result<()> {
        if self.tokens.is_some() {
            return Ok(());
        }

        if let Ok(Some(tokens)) = self.store.load::<FordTokens>() {
            self.tokens = Some(tokens);
            return Ok(());
        }

        // Refresh-token grant; the seed token was obtained out of band
        let resp = self
            .http
            .post(FORD_OAUTH_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token_seed.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(HeliosError::auth(format!(
                "FordConnect token refresh failed: {}",
                resp.status()
            )));
        }

        let tokens: FordTokens = resp
            .json()
            .await
            .map_err(|e| HeliosError::auth(format!("Malformed token response: {}", e)))?;
        self.store.save(&tokens)?;
        self.tokens = Some(tokens);
        self.logger.info("FordConnect session established");
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        self.ensure_tokens().await?;
        let access = self
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .unwrap_or_default();
        let resp = self
            .http
            .get(format!("{FORD_API_BASE}{path}"))
            .header("Application-Id", FORD_APPLICATION_ID)
            .bearer_auth(access)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            // The cached access token is dead; the caller decides whether to
            // spend its one re-login on us.
            return Err(HeliosError::auth(format!(
                "FordConnect session expired ({})",
                resp.status()
            )));
        }

        if !resp.status().is_success() {
            return Err(HeliosError::api(format!(
                "FordConnect GET {} failed: {}",
                path,
                resp.status()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| HeliosError::api(format!("Malformed FordConnect response: {}", e)))
    }

    async fn resolve_vehicle(&mut self) -> Result<String> {
        if let Some(id) = &self.vehicle_id {
            return Ok(id.clone());
        }
        let ids = self.list_vehicles().await?;
        let first = ids
            .into_iter()
            .next()
            .ok_or_else(|| HeliosError::api("No vehicles on the FordConnect account"))?;
        self.logger.info(&format!("Using vehicle {}", first));
        self.vehicle_id = Some(first.clone());
        Ok(first)
    }
}

#[async_trait::async_trait]
impl SocClient for FordConnectClient {
    fn origin(&self) -> SocOrigin {
        SocOrigin::Primary
    }

    async fn list_vehicles(&mut self) -> Result<Vec<String>> {
        let resp: FordVehiclesResponse = self.get_json("/vehicles").await?;
        Ok(resp.vehicles.into_iter().map(|v| v.vehicle_id).collect())
    }

    async fn get_soc(&mut self) -> Result<VehicleSoc> {
        let id = self.resolve_vehicle().await?;
        let info: FordVehicleInfoResponse = self.get_json(&format!("/vehicles/{}", id)).await?;
        Ok(VehicleSoc {
            percent: info
                .vehicle
                .vehicle_details
                .battery_charge_level
                .value
                .clamp(0.0, 100.0),
            updated_at: Utc::now(),
            origin: SocOrigin::Primary,
        })
    }

    async fn relogin(&mut self) -> Result<()> {
        self.tokens = None;
        self.store.clear()?;
        self.ensure_tokens().await
    }
}

#[derive(Debug, Deserialize)]
struct EmporiaVehiclesResponse {
    vehicles: Vec<EmporiaVehicleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmporiaVehicleEntry {
    vehicle_gid: u64,
    battery_level: f32,
}

/// Charger vendor's vehicle endpoint (secondary SOC source)
pub struct EmporiaVehicleClient {
    session: EmporiaSession,
}

impl EmporiaVehicleClient {
    pub fn new(config: &EvseConfig) -> Result<Self> {
        Ok(Self {
            session: EmporiaSession::new(config)?,
        })
    }
}

#[async_trait::async_trait]
impl SocClient for EmporiaVehicleClient {
    fn origin(&self) -> SocOrigin {
        SocOrigin::Secondary
    }

    async fn list_vehicles(&mut self) -> Result<Vec<String>> {
        let resp: EmporiaVehiclesResponse = self.session.get_json("/customers/vehicles").await?;
        Ok(resp
            .vehicles
            .into_iter()
            .map(|v| v.vehicle_gid.to_string())
            .collect())
    }

    async fn get_soc(&mut self) -> Result<VehicleSoc> {
        let resp: EmporiaVehiclesResponse = self.session.get_json("/customers/vehicles").await?;
        let vehicle = resp
            .vehicles
            .into_iter()
            .next()
            .ok_or_else(|| HeliosError::api("No vehicles on the vendor account"))?;
        Ok(VehicleSoc {
            percent: vehicle.battery_level.clamp(0.0, 100.0),
            updated_at: Utc::now(),
            origin: SocOrigin::Secondary,
        })
    }

    async fn relogin(&mut self) -> Result<()> {
        self.session.relogin().await
    }
}
