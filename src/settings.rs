use crate::api::{self, Error, API_URL};
use crate::balancer::BalancerSettings;
use crate::model::{self, DeviceSpec};
use crate::night::NightWindow;
use crate::plug::{HttpPlug, PlugClient, PlugProtocol, TapoCredentials, TapoPlug};
use config::Config;
use serde::Deserialize;
use std::time::Duration;

pub const ENV_PREFIX: &str = "BALANCER";
/// Environment variable naming the settings file (without extension)
pub const CONFIG_FILE_VAR: &str = "BALANCER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "balancer";

fn default_interval() -> u64 {
    10
}

fn default_device_timeout() -> u64 {
    5
}

fn default_serve_metrics() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NightWindowSettings {
    pub start_hour: u32,
    pub end_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub serial_number: String,
    pub max_limit_watt: f64,
    #[serde(default)]
    pub base_load_watt: f64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_device_timeout")]
    pub device_timeout_secs: u64,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub night_window: Option<NightWindowSettings>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub plug: Option<PlugProtocol>,
    #[serde(default)]
    pub tapo: Option<TapoCredentials>,
    #[serde(default = "default_serve_metrics")]
    pub serve_metrics: bool,
}

fn config_err(e: config::ConfigError) -> Error {
    Error::ConfigError(e.to_string())
}

/// Settings file (optional) overlaid with `BALANCER_*` environment variables.
pub fn read_settings() -> Result<Settings, Error> {
    let file = std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());

    let mut settings = Config::default();
    settings
        .set_default("api_url", API_URL)
        .map_err(config_err)?
        .merge(config::File::with_name(&file).required(false))
        .map_err(config_err)?
        .merge(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .map_err(config_err)?;

    from_config(settings)
}

pub fn from_config(config: Config) -> Result<Settings, Error> {
    let settings: Settings = config.try_into().map_err(config_err)?;
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn validate(&self) -> Result<(), Error> {
        if !(self.max_limit_watt >= 0.0) {
            return Err(Error::ConfigError(
                "max_limit_watt must not be negative".to_owned(),
            ));
        }
        if !(self.base_load_watt >= 0.0) {
            return Err(Error::ConfigError(
                "base_load_watt must not be negative".to_owned(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(Error::ConfigError("interval_secs must be positive".to_owned()));
        }
        if let Some(window) = &self.night_window {
            if NightWindow::new(window.start_hour, window.end_hour).is_none() {
                return Err(Error::ConfigError(format!(
                    "night_window hours must be below 24, got {}..{}",
                    window.start_hour, window.end_hour
                )));
            }
        }
        match (&self.plug, &self.tapo) {
            (Some(_), Some(_)) => Err(Error::ConfigError(
                "plug and tapo sections are mutually exclusive".to_owned(),
            )),
            (None, None) if !self.devices.is_empty() => Err(Error::ConfigError(
                "plug or tapo section is required when devices are configured".to_owned(),
            )),
            (Some(plug), None) if !(plug.unit_divisor > 0.0) => Err(Error::ConfigError(
                "plug.unit_divisor must be positive".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    pub fn api(&self) -> model::Api {
        api::api(
            self.api_url.to_owned(),
            self.api_key.to_owned(),
            self.secret_key.to_owned(),
        )
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn plug_protocol(&self) -> PlugProtocol {
        self.plug.clone().unwrap_or_default()
    }

    /// Tapo plugs when a `tapo` section is present, HTTP plugs otherwise.
    pub fn plug_client(&self) -> Result<PlugClient, Error> {
        match &self.tapo {
            Some(credentials) => Ok(PlugClient::Tapo(TapoPlug::new(credentials))),
            None => HttpPlug::new(self.plug_protocol()).map(PlugClient::Http),
        }
    }

    /// Configured devices, numbered in configuration order.
    pub fn device_specs(&self) -> Vec<DeviceSpec> {
        self.devices
            .iter()
            .enumerate()
            .map(|(id, device)| DeviceSpec {
                id,
                ..device.clone()
            })
            .collect()
    }

    pub fn balancer_settings(&self) -> BalancerSettings {
        BalancerSettings {
            serial_number: self.serial_number.to_owned(),
            max_limit_watt: self.max_limit_watt,
            base_load_watt: self.base_load_watt,
            interval: Duration::from_secs(self.interval_secs),
            device_timeout: Duration::from_secs(self.device_timeout_secs),
            night_window: self
                .night_window
                .as_ref()
                .and_then(|window| NightWindow::new(window.start_hour, window.end_hour)),
        }
    }
}
