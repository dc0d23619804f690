use crate::model::{AggregateTarget, DeviceSpec, PowerReading, Watts};
use crate::plug::{read_power, DeviceClient};
use futures_util::future::join_all;
use std::time::Duration;

/// Poll every device concurrently; the slowest device bounds the whole poll.
pub async fn poll_all<C: DeviceClient + ?Sized>(
    client: &C,
    devices: &[DeviceSpec],
    timeout: Duration,
) -> Vec<PowerReading> {
    join_all(
        devices
            .iter()
            .map(|device| read_power(client, device, timeout)),
    )
    .await
}

/// `min(base_load + sum, max_limit)`. No lower clamp here.
pub fn sum_readings(readings: &[PowerReading], base_load: Watts, max_limit: Watts) -> AggregateTarget {
    let total = base_load + readings.iter().map(|reading| reading.watts).sum::<Watts>();

    if total > max_limit {
        AggregateTarget {
            total_watts: max_limit,
            clamped: true,
        }
    } else {
        AggregateTarget {
            total_watts: total,
            clamped: false,
        }
    }
}

pub async fn aggregate<C: DeviceClient + ?Sized>(
    client: &C,
    devices: &[DeviceSpec],
    base_load: Watts,
    max_limit: Watts,
    timeout: Duration,
) -> AggregateTarget {
    let readings = poll_all(client, devices, timeout).await;
    let failed = readings.iter().filter(|reading| !reading.ok).count();
    if failed > 0 {
        log::info!("{} of {} devices read as 0 W", failed, readings.len());
    }

    let target = sum_readings(&readings, base_load, max_limit);
    if target.clamped {
        log::info!("Total load clamped to {} W", max_limit);
    }
    target
}
