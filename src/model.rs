use chrono::NaiveDateTime;
use serde::Deserialize;

pub type Watts = f64;

/// Smart plug measuring one load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceSpec {
    /// Position in the configured device list
    #[serde(skip)]
    pub id: usize,
    #[serde(alias = "ip")]
    pub address: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerReading {
    pub device_id: usize,
    pub watts: Watts,
    pub timestamp: NaiveDateTime,
    /// false when the reading was absorbed to 0 after a failure
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateTarget {
    pub total_watts: Watts,
    pub clamped: bool,
}

/// The only state carried from one tick to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    /// Last setpoint confirmed by a successful write; whole watts, as setpoints are floored
    pub last_commanded_watts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDeviceStatus {
    pub serial_number: String,
    pub online: bool,
}

/// Credentials and location of the power-control API.
#[derive(Debug, Clone)]
pub struct Api {
    pub api_url: String,
    pub access_key: String,
    pub secret_key: String,
}
