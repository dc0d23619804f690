use crate::api::Error;
use crate::metrics;
use crate::model::{DeviceSpec, PowerReading, Watts};
use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(5);
pub const MILLIWATTS_PER_WATT: f64 = 1000.0;

#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Current draw of `device` in native units.
    async fn current_power(&self, device: &DeviceSpec) -> Result<f64, Error>;

    fn native_units_per_watt(&self) -> f64 {
        MILLIWATTS_PER_WATT
    }
}

/// Read one device, never failing: timeout or error yields `watts: 0, ok: false`.
pub async fn read_power<C: DeviceClient + ?Sized>(
    client: &C,
    device: &DeviceSpec,
    timeout: Duration,
) -> PowerReading {
    let result = match tokio::time::timeout(timeout, client.current_power(device)).await {
        Ok(result) => result,
        Err(_) => Err(Error::DeviceTimeout(format!(
            "{} did not answer within {:?}",
            device.address, timeout
        ))),
    };
    let timestamp = Local::now().naive_local();

    match result {
        Ok(native) => {
            let watts = native / client.native_units_per_watt();
            log::debug!("Device {} is consuming {} W", device.name, watts);
            metrics::device_power(&device.name, watts);
            PowerReading {
                device_id: device.id,
                watts,
                timestamp,
                ok: true,
            }
        }
        Err(e) => {
            log::warn!(
                "Error getting data from device {} ({}): {}",
                device.name,
                device.address,
                e
            );
            metrics::device_poll_failed(&device.name);
            metrics::device_power(&device.name, 0.0);
            PowerReading {
                device_id: device.id,
                watts: 0.0,
                timestamp,
                ok: false,
            }
        }
    }
}

fn default_unit_divisor() -> f64 {
    MILLIWATTS_PER_WATT
}

/// Where an HTTP plug publishes its reading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlugProtocol {
    /// Request path appended to the device address, e.g. `/rpc/Switch.GetStatus?id=0`
    pub path: String,
    /// JSON pointer to the reading, e.g. `/apower`
    pub power_pointer: String,
    #[serde(default = "default_unit_divisor")]
    pub unit_divisor: f64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for PlugProtocol {
    fn default() -> Self {
        PlugProtocol {
            path: "/".to_owned(),
            power_pointer: "/current_power".to_owned(),
            unit_divisor: MILLIWATTS_PER_WATT,
            username: None,
            password: None,
        }
    }
}

/// Plug answering a plain HTTP GET with a JSON document.
#[derive(Debug)]
pub struct HttpPlug {
    protocol: PlugProtocol,
    client: reqwest::Client,
}

impl HttpPlug {
    pub fn new(protocol: PlugProtocol) -> Result<Self, Error> {
        let client = reqwest::ClientBuilder::new()
            .build()
            .or(Err(Error::InternalError))?;

        Ok(HttpPlug { protocol, client })
    }

    fn url(&self, device: &DeviceSpec) -> String {
        if device.address.starts_with("http://") || device.address.starts_with("https://") {
            format!("{}{}", device.address, self.protocol.path)
        } else {
            format!("http://{}{}", device.address, self.protocol.path)
        }
    }
}

#[async_trait]
impl DeviceClient for HttpPlug {
    async fn current_power(&self, device: &DeviceSpec) -> Result<f64, Error> {
        let mut request = self.client.get(self.url(device));
        if let Some(username) = &self.protocol.username {
            request = request.basic_auth(username, self.protocol.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::DeviceError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DeviceError(format!(
                "{} responded {}",
                device.address, status
            )));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| Error::DeviceError(format!("Error reading device response: {}", e)))?;

        log::trace!("device: {}, response: {}", device.address, value);

        value
            .pointer(&self.protocol.power_pointer)
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                Error::DeviceError(format!(
                    "No reading at {} in {}",
                    self.protocol.power_pointer, value
                ))
            })
    }

    fn native_units_per_watt(&self) -> f64 {
        self.protocol.unit_divisor
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TapoCredentials {
    pub username: String,
    pub password: String,
}

/// Tapo P110/P115 energy-monitoring plug, read in milliwatts.
#[derive(Clone)]
pub struct TapoPlug {
    client: tapo::ApiClient,
}

impl TapoPlug {
    pub fn new(credentials: &TapoCredentials) -> Self {
        TapoPlug {
            client: tapo::ApiClient::new(
                credentials.username.to_owned(),
                credentials.password.to_owned(),
            ),
        }
    }
}

#[async_trait]
impl DeviceClient for TapoPlug {
    async fn current_power(&self, device: &DeviceSpec) -> Result<f64, Error> {
        /* every poll opens a fresh session; plugs drop idle ones */
        let handler = self
            .client
            .clone()
            .p110(device.address.to_owned())
            .await
            .map_err(|e| {
                Error::DeviceError(format!("Login to {} failed: {}", device.address, e))
            })?;

        let usage = handler
            .get_energy_usage()
            .await
            .map_err(|e| Error::DeviceError(format!("Error reading energy usage: {}", e)))?;

        log::trace!(
            "device: {}, current_power: {}",
            device.address,
            usage.current_power
        );
        Ok(usage.current_power as f64)
    }
}

/// Plug client chosen by configuration.
pub enum PlugClient {
    Http(HttpPlug),
    Tapo(TapoPlug),
}

#[async_trait]
impl DeviceClient for PlugClient {
    async fn current_power(&self, device: &DeviceSpec) -> Result<f64, Error> {
        match self {
            PlugClient::Http(plug) => plug.current_power(device).await,
            PlugClient::Tapo(plug) => plug.current_power(device).await,
        }
    }

    fn native_units_per_watt(&self) -> f64 {
        match self {
            PlugClient::Http(plug) => plug.native_units_per_watt(),
            PlugClient::Tapo(plug) => plug.native_units_per_watt(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Copy)]
    pub enum Behaviour {
        /// Reading in milliwatts
        Milliwatts(f64),
        Fail,
        Hang,
    }

    /// Plug client answering from a table keyed by device address.
    #[derive(Debug, Default)]
    pub struct FakePlugs {
        pub devices: HashMap<String, Behaviour>,
    }

    impl FakePlugs {
        pub fn with(mut self, address: &str, behaviour: Behaviour) -> Self {
            self.devices.insert(address.to_owned(), behaviour);
            self
        }
    }

    #[async_trait]
    impl DeviceClient for FakePlugs {
        async fn current_power(&self, device: &DeviceSpec) -> Result<f64, Error> {
            match self.devices.get(&device.address) {
                Some(Behaviour::Milliwatts(mw)) => Ok(*mw),
                Some(Behaviour::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(0.0)
                }
                Some(Behaviour::Fail) | None => {
                    Err(Error::DeviceError("login failed".to_owned()))
                }
            }
        }
    }

    pub fn spec(id: usize, address: &str) -> DeviceSpec {
        DeviceSpec {
            id,
            address: address.to_owned(),
            name: format!("plug-{}", id),
        }
    }
}

#[cfg(test)]
mod test {
    use super::fake::{spec, Behaviour, FakePlugs};
    use super::*;
    use mockito::Server;
    use serde_json::json;

    #[tokio::test]
    async fn converts_milliwatts() {
        let plugs = FakePlugs::default().with("10.0.0.2", Behaviour::Milliwatts(120_500.0));
        let reading = read_power(&plugs, &spec(3, "10.0.0.2"), DEVICE_TIMEOUT).await;

        assert!(reading.ok);
        assert_eq!(reading.device_id, 3);
        assert_eq!(reading.watts, 120.5);
    }

    #[tokio::test]
    async fn failure_reads_zero() {
        let plugs = FakePlugs::default().with("10.0.0.2", Behaviour::Fail);
        let reading = read_power(&plugs, &spec(0, "10.0.0.2"), DEVICE_TIMEOUT).await;

        assert!(!reading.ok);
        assert_eq!(reading.watts, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reads_zero() {
        let plugs = FakePlugs::default().with("10.0.0.2", Behaviour::Hang);
        let started = tokio::time::Instant::now();
        let reading = read_power(&plugs, &spec(0, "10.0.0.2"), DEVICE_TIMEOUT).await;

        assert!(!reading.ok);
        assert_eq!(reading.watts, 0.0);
        assert!(started.elapsed() >= DEVICE_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    fn http_device(server: &mockito::ServerGuard) -> DeviceSpec {
        DeviceSpec {
            id: 0,
            address: server.host_with_port(),
            name: "kettle".to_owned(),
        }
    }

    #[tokio::test]
    async fn http_plug_reads_pointer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/energy")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .with_body(json!({"result": {"current_power": 300_200}}).to_string())
            .create_async()
            .await;

        let plug = HttpPlug::new(PlugProtocol {
            path: "/energy".to_owned(),
            power_pointer: "/result/current_power".to_owned(),
            username: Some("user".to_owned()),
            password: Some("pass".to_owned()),
            ..PlugProtocol::default()
        })
        .unwrap();

        let reading = read_power(&plug, &http_device(&server), DEVICE_TIMEOUT).await;
        assert!(reading.ok);
        assert_eq!(reading.watts, 300.2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_plug_in_watts() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/status")
            .with_status(200)
            .with_body(json!({"apower": 42.5}).to_string())
            .create_async()
            .await;

        let plug = HttpPlug::new(PlugProtocol {
            path: "/status".to_owned(),
            power_pointer: "/apower".to_owned(),
            unit_divisor: 1.0,
            ..PlugProtocol::default()
        })
        .unwrap();

        let reading = read_power(&plug, &http_device(&server), DEVICE_TIMEOUT).await;
        assert_eq!(reading.watts, 42.5);
    }

    #[tokio::test]
    async fn http_plug_missing_reading() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/status")
            .with_status(200)
            .with_body(json!({"error_code": -1501}).to_string())
            .create_async()
            .await;

        let plug = HttpPlug::new(PlugProtocol {
            path: "/status".to_owned(),
            ..PlugProtocol::default()
        })
        .unwrap();

        let device = http_device(&server);
        assert!(matches!(
            plug.current_power(&device).await,
            Err(Error::DeviceError(_))
        ));
        assert!(!read_power(&plug, &device, DEVICE_TIMEOUT).await.ok);
    }

    #[tokio::test]
    async fn tapo_unreachable_is_device_error() {
        let plug = TapoPlug::new(&TapoCredentials {
            username: "user@example.com".to_owned(),
            password: "secret".to_owned(),
        });
        let device = spec(0, "127.0.0.1:1");

        assert!(matches!(
            plug.current_power(&device).await,
            Err(Error::DeviceError(_))
        ));
        let reading = read_power(&PlugClient::Tapo(plug), &device, DEVICE_TIMEOUT).await;
        assert!(!reading.ok);
        assert_eq!(reading.watts, 0.0);
    }

    #[tokio::test]
    async fn plug_client_dispatches_units() {
        let http = HttpPlug::new(PlugProtocol {
            unit_divisor: 1.0,
            ..PlugProtocol::default()
        })
        .unwrap();
        assert_eq!(PlugClient::Http(http).native_units_per_watt(), 1.0);

        let tapo = TapoPlug::new(&TapoCredentials {
            username: "u".to_owned(),
            password: "p".to_owned(),
        });
        assert_eq!(
            PlugClient::Tapo(tapo).native_units_per_watt(),
            MILLIWATTS_PER_WATT
        );
    }

    #[tokio::test]
    async fn http_plug_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/status")
            .with_status(401)
            .create_async()
            .await;

        let plug = HttpPlug::new(PlugProtocol {
            path: "/status".to_owned(),
            ..PlugProtocol::default()
        })
        .unwrap();

        let reading = read_power(&plug, &http_device(&server), DEVICE_TIMEOUT).await;
        assert!(!reading.ok);
        assert_eq!(reading.watts, 0.0);
    }
}
