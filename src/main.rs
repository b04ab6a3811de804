use anyhow::Result;
use helios::config::{Config, SocSourceKind};
use helios::controller::ChargeController;
use helios::driver::HeliosDriver;
use helios::error::HeliosError;
use helios::evse::EmporiaEvse;
use helios::powerwall::PowerwallClient;
use helios::telemetry::TelemetryCache;
use helios::vehicle::{EmporiaVehicleClient, FordConnectClient, SocClient};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    helios::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Helios charging controller starting up");

    let charger = EmporiaEvse::new(&config.evse, config.charging.max_rate)
        .map_err(|e| anyhow::anyhow!("Failed to create EVSE client: {}", e))?;

    let soc: Box<dyn SocClient> = match config.vehicle.source {
        SocSourceKind::Primary => {
            let ford_cfg = config.vehicle.fordconnect.as_ref().ok_or_else(|| {
                anyhow::anyhow!("vehicle.fordconnect is required for the primary SOC source")
            })?;
            Box::new(FordConnectClient::new(ford_cfg)?)
        }
        SocSourceKind::Secondary => Box::new(EmporiaVehicleClient::new(&config.evse)?),
    };

    let power = PowerwallClient::new(&config.powerwall)
        .map_err(|e| anyhow::anyhow!("Failed to create Powerwall client: {}", e))?;

    let cache = TelemetryCache::new(Box::new(charger), soc, &config.cache);
    let controller = ChargeController::new(config.charging.clone(), cache, Box::new(power));

    let mut driver = HeliosDriver::new(config, controller)
        .map_err(|e: HeliosError| anyhow::anyhow!("Failed to create driver: {}", e))?;

    match driver.run().await {
        Ok(()) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
