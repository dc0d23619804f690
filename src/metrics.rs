use crate::api::Error;
use crate::model::Watts;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, TextEncoder};

lazy_static! {
    static ref TARGET_WATTS_GAUGE: Gauge = register_gauge!(
        "balancer_target_watts",
        "aggregated load including base load, clamped to the limit (in W)"
    )
    .unwrap();
    static ref SERVER_SETPOINT_GAUGE: Gauge = register_gauge!(
        "balancer_server_setpoint_watts",
        "permanent output reported by the cloud API (in W)"
    )
    .unwrap();
    static ref COMMANDED_SETPOINT_GAUGE: Gauge = register_gauge!(
        "balancer_commanded_setpoint_watts",
        "last permanent output successfully written (in W)"
    )
    .unwrap();
    static ref DEVICE_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("device_power_watts", "power drawn by a monitored load (in W)",),
        &["device"],
    )
    .unwrap();
    static ref SETPOINT_WRITES_COUNTER: IntCounter = register_int_counter!(
        "balancer_setpoint_writes_total",
        "successful permanent output writes"
    )
    .unwrap();
    static ref DEVICE_POLL_FAILURES_COUNTER: IntCounterVec = register_int_counter_vec!(
        opts!(
            "device_poll_failures_total",
            "device polls absorbed to 0 W after a timeout or error",
        ),
        &["device"],
    )
    .unwrap();
}

pub fn target(watts: Watts) {
    TARGET_WATTS_GAUGE.set(watts);
}

pub fn server_setpoint(watts: Watts) {
    SERVER_SETPOINT_GAUGE.set(watts);
}

pub fn setpoint_written(watts: Watts) {
    COMMANDED_SETPOINT_GAUGE.set(watts);
    SETPOINT_WRITES_COUNTER.inc();
}

pub fn device_power(device: &str, watts: Watts) {
    DEVICE_POWER_GAUGE.with_label_values(&[device]).set(watts);
}

pub fn device_poll_failed(device: &str) {
    DEVICE_POLL_FAILURES_COUNTER
        .with_label_values(&[device])
        .inc();
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(Error::FormatError))?;
    String::from_utf8(buffer).or(Err(Error::FormatError))
}

#[cfg(test)]
mod test {
    #[test]
    fn exposes_device_power() {
        super::device_power("metrics-test-plug", 12.5);
        super::device_poll_failed("metrics-test-plug");

        let text = super::read().unwrap();
        assert!(text.contains("device_power_watts{device=\"metrics-test-plug\"} 12.5"));
        assert!(text.contains("device_poll_failures_total{device=\"metrics-test-plug\"}"));
    }
}
