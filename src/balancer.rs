use crate::aggregate::aggregate;
use crate::api::{PowerApi, PERMANENT_WATTS_QUOTA, SET_PERMANENT_WATTS};
use crate::metrics;
use crate::model::{AggregateTarget, ControlState, DeviceSpec, Watts};
use crate::night::{self, NightWindow};
use crate::plug::DeviceClient;
use chrono::{Local, NaiveDateTime};
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;

pub const TICK_INTERVAL: Duration = Duration::from_secs(10);
pub const DECIWATTS_PER_WATT: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct BalancerSettings {
    pub serial_number: String,
    pub max_limit_watt: Watts,
    pub base_load_watt: Watts,
    pub interval: Duration,
    pub device_timeout: Duration,
    /// `None` disables night quiescence
    pub night_window: Option<NightWindow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Inverter offline, unlisted or its status unavailable
    Offline { night_wake: Option<NaiveDateTime> },
    QuotaUnavailable,
    Unchanged { watts: u32 },
    Written { watts: u32 },
    WriteFailed { watts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub target: AggregateTarget,
    pub outcome: TickOutcome,
    /// How long to wait before the next tick
    pub sleep: Duration,
}

/// Whole watts to command for `target`, within `[0, max_limit]`.
pub fn setpoint_watts(target: Watts, max_limit: Watts) -> u32 {
    target.max(0.0).min(max_limit.max(0.0)).floor() as u32
}

/// Server setpoint in whole watts from its deciwatt quota value.
pub fn server_watts(deciwatts: f64) -> i64 {
    (deciwatts / DECIWATTS_PER_WATT).round() as i64
}

pub struct Balancer<A, C> {
    api: A,
    client: C,
    devices: Vec<DeviceSpec>,
    settings: BalancerSettings,
    state: ControlState,
}

impl<A: PowerApi, C: DeviceClient> Balancer<A, C> {
    pub fn new(api: A, client: C, devices: Vec<DeviceSpec>, settings: BalancerSettings) -> Self {
        Balancer {
            api,
            client,
            devices,
            settings,
            state: ControlState::default(),
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub async fn tick(&mut self, now: NaiveDateTime) -> TickReport {
        let target = aggregate(
            &self.client,
            &self.devices,
            self.settings.base_load_watt,
            self.settings.max_limit_watt,
            self.settings.device_timeout,
        )
        .await;
        metrics::target(target.total_watts);

        let outcome = self.apply(target.total_watts, now).await;
        let sleep = match &outcome {
            TickOutcome::Offline {
                night_wake: Some(wake),
            } => night::real_duration(&Local, now, *wake)
                .or_else(|| (*wake - now).to_std().ok())
                .unwrap_or(self.settings.interval),
            _ => self.settings.interval,
        };

        TickReport {
            target,
            outcome,
            sleep,
        }
    }

    async fn apply(&mut self, target: Watts, now: NaiveDateTime) -> TickOutcome {
        let serial_number = self.settings.serial_number.as_str();
        log::info!("Requesting {} W for device {}", target, serial_number);

        let online = match self.api.list_devices(serial_number).await {
            Ok(Some(status)) => status.online,
            Ok(None) => {
                log::warn!("Device {} is not listed on this account", serial_number);
                false
            }
            Err(e) => {
                log::warn!("Unable to check status of {}: {}", serial_number, e);
                false
            }
        };

        if !online {
            let night_wake = self
                .settings
                .night_window
                .and_then(|window| window.wake_time(now));
            match night_wake {
                Some(wake) => log::info!(
                    "Device {} is offline during the night window, sleeping until {}",
                    serial_number,
                    wake
                ),
                None => log::info!(
                    "Device {} is offline. Operation cancelled",
                    serial_number
                ),
            }
            return TickOutcome::Offline { night_wake };
        }

        let current = match self
            .api
            .read_quota(serial_number, &[PERMANENT_WATTS_QUOTA])
            .await
        {
            Ok(quotas) => match quotas.get(PERMANENT_WATTS_QUOTA) {
                Some(raw) => server_watts(*raw),
                None => {
                    log::warn!("No {} in quota response", PERMANENT_WATTS_QUOTA);
                    return TickOutcome::QuotaUnavailable;
                }
            },
            Err(e) => {
                log::warn!("Unable to read quota of {}: {}", serial_number, e);
                return TickOutcome::QuotaUnavailable;
            }
        };
        log::info!("Current power on the server: {} W", current);
        metrics::server_setpoint(current as f64);

        let watts = setpoint_watts(target, self.settings.max_limit_watt);
        if i64::from(watts) == current {
            log::info!("Power value has not changed, sending is not required");
            return TickOutcome::Unchanged { watts };
        }

        let params = json!({ "permanentWatts": u64::from(watts) * 10 });
        match self
            .api
            .write_quota(serial_number, SET_PERMANENT_WATTS, params)
            .await
        {
            Ok(()) => {
                log::info!("Successfully set new value: {} W", watts);
                self.state.last_commanded_watts = watts;
                metrics::setpoint_written(f64::from(watts));
                TickOutcome::Written { watts }
            }
            Err(e) => {
                log::error!("Error setting new power value {} W: {}", watts, e);
                TickOutcome::WriteFailed { watts }
            }
        }
    }

    /// Tick until `shutdown` turns true or its sender goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "Balancing {} across {} devices",
            self.settings.serial_number,
            self.devices.len()
        );

        loop {
            let stopped = *shutdown.borrow();
            if stopped {
                break;
            }

            let report = self.tick(Local::now().naive_local()).await;
            log::debug!("{:?}, next tick in {:?}", report.outcome, report.sleep);

            let stop = tokio::select! {
                _ = tokio::time::sleep(report.sleep) => false,
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            };
            if stop {
                break;
            }
        }

        log::info!("Balancer for {} stopped", self.settings.serial_number);
    }
}
