#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;

pub mod aggregate;
pub mod api;
pub mod balancer;
pub mod metrics;
pub mod model;
pub mod night;
pub mod plug;
pub mod settings;

pub use api::Error;
