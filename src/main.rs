#[macro_use]
extern crate rocket;

use powerstream_balancer::api::{EcoflowApi, Error};
use powerstream_balancer::balancer::Balancer;
use powerstream_balancer::metrics;
use powerstream_balancer::settings;
use tokio::sync::watch;

#[get("/metrics")]
async fn metrics_route() -> Result<String, Error> {
    metrics::read()
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Unable to listen for shutdown signal: {}", e);
    }
}

#[rocket::main]
async fn main() {
    env_logger::init();

    let settings = settings::read_settings().expect("Configuration error");
    let api = EcoflowApi::new(settings.api(), settings.http_timeout())
        .expect("Unable to build API client");
    let plug = settings.plug_client().expect("Unable to build plug client");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let balancer = Balancer::new(
        api,
        plug,
        settings.device_specs(),
        settings.balancer_settings(),
    );
    let control_loop = tokio::spawn(balancer.run(shutdown_rx));

    if settings.serve_metrics {
        /* rocket returns once it has handled Ctrl-C */
        if let Err(e) = rocket::build()
            .mount("/", routes![metrics_route])
            .launch()
            .await
        {
            log::error!("Metrics server failed: {}", e);
            wait_for_ctrl_c().await;
        }
    } else {
        wait_for_ctrl_c().await;
    }

    log::info!("Shutting down");
    if shutdown_tx.send(true).is_err() {
        log::warn!("Control loop already stopped");
    }
    if let Err(e) = control_loop.await {
        log::error!("Control loop failed: {}", e);
    }
}
