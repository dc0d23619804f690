pub mod endpoint;
pub mod error;
pub mod response;
pub mod sign;

use crate::model;
use async_trait::async_trait;
pub use error::Error;
use reqwest::{Method, Response};
use response::device_list::GetDeviceList;
use response::quota::GetQuota;
use response::Envelope;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sign::SignedHeaders;

use std::collections::HashMap;
use std::time::Duration;

pub const API_URL: &str = "https://api.ecoflow.com";

/// Quota holding the permanent output of the inverter, in deciwatts.
pub const PERMANENT_WATTS_QUOTA: &str = "20_1.permanentWatts";
pub const SET_PERMANENT_WATTS: &str = "WN511_SET_PERMANENT_WATTS_PACK";

/// Remote power-control API as seen by the control loop.
#[async_trait]
pub trait PowerApi: Send + Sync {
    /// Status of `serial_number`; `Ok(None)` when the account does not list it.
    async fn list_devices(
        &self,
        serial_number: &str,
    ) -> Result<Option<model::RemoteDeviceStatus>, Error>;

    async fn read_quota(
        &self,
        serial_number: &str,
        quotas: &[&str],
    ) -> Result<HashMap<String, f64>, Error>;

    /// Succeeds only on HTTP 200. Never retried here.
    async fn write_quota(
        &self,
        serial_number: &str,
        cmd_code: &str,
        params: Value,
    ) -> Result<(), Error>;
}

pub fn api(api_url: String, access_key: String, secret_key: String) -> model::Api {
    model::Api {
        api_url,
        access_key,
        secret_key,
    }
}

/// Map transport failure to Error
fn map_api_err(error: reqwest::Error) -> Error {
    match error.status() {
        Some(status) => Error::HttpStatus(status.as_u16(), error.to_string()),
        None => Error::ApiError(error.to_string()),
    }
}

/// Read body of `response`. Anything but 200 is an error carrying the body for diagnostics.
async fn map_response_status(response: Response) -> Result<String, Error> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::ApiError(format!("Error reading API response: {}", e)))?;

    if status == http::StatusCode::OK {
        Ok(text)
    } else {
        Err(Error::HttpStatus(status.as_u16(), text))
    }
}

fn decode<T: DeserializeOwned>(text: String) -> Result<T, Error> {
    match serde_json::from_str::<T>(&text) {
        Ok(value) => Ok(value),
        Err(e) => Err(Error::InvalidResponse(text, e.to_string())),
    }
}

/* A 200 reply may still carry an error code, e.g. a rejected signature */
fn check_envelope(text: &str) -> Result<(), Error> {
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) if !envelope.is_success() => Err(Error::ApiError(format!(
            "Error {}: {}",
            envelope.code.unwrap_or_default(),
            envelope
                .message
                .unwrap_or_else(|| "(no error message received)".to_string())
        ))),
        _ => Ok(()),
    }
}

/// Signed client of the power-control API. Every call signs afresh; nothing is cached.
#[derive(Debug)]
pub struct EcoflowApi {
    api: model::Api,
    client: reqwest::Client,
}

impl EcoflowApi {
    pub fn new(api: model::Api, timeout: Option<Duration>) -> Result<Self, Error> {
        let mut builder = reqwest::ClientBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().or(Err(Error::InternalError))?;

        Ok(EcoflowApi { api, client })
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &endpoint::Endpoint,
        params: Value,
    ) -> Result<String, Error> {
        let url = format!("{}{}", self.api.api_url, endpoint);
        let headers = SignedHeaders::new(&self.api.access_key, &self.api.secret_key, Some(&params))?;

        /* GET carries its parameters in the query string, signed the same way as a body */
        let request = if method == Method::GET {
            self.client.get(url).query(&sign::flatten(&params))
        } else {
            self.client.request(method.clone(), url).json(&params)
        }
        .header(sign::ACCESS_KEY, headers.access_key)
        .header(sign::NONCE, headers.nonce)
        .header(sign::TIMESTAMP, headers.timestamp)
        .header(sign::SIGN, headers.sign);

        let result = match request.send().await {
            Ok(response) => map_response_status(response).await,
            Err(e) => Err(map_api_err(e)),
        };

        match &result {
            Ok(text) => log::trace!(
                "{} {}, params: {}, response_text: {}",
                method,
                endpoint,
                params,
                text
            ),
            Err(e) => log::warn!("{} {} failed: {}", method, endpoint, e),
        }

        result
    }
}

#[async_trait]
impl PowerApi for EcoflowApi {
    async fn list_devices(
        &self,
        serial_number: &str,
    ) -> Result<Option<model::RemoteDeviceStatus>, Error> {
        let params = json!({ "sn": serial_number });
        let text = self
            .request(Method::GET, endpoint::DEVICE_LIST, params)
            .await?;

        check_envelope(&text)?;

        let list = decode::<GetDeviceList>(text)?;
        match list.data {
            Some(_) => Ok(list
                .find(serial_number)
                .map(|device| model::RemoteDeviceStatus {
                    serial_number: device.sn.to_owned(),
                    online: device.online == 1,
                })),
            None => Err(Error::UnexpectedApiResponse),
        }
    }

    async fn read_quota(
        &self,
        serial_number: &str,
        quotas: &[&str],
    ) -> Result<HashMap<String, f64>, Error> {
        let params = json!({ "sn": serial_number, "params": { "quotas": quotas } });
        let text = self
            .request(Method::POST, endpoint::DEVICE_QUOTA, params)
            .await?;

        check_envelope(&text)?;

        decode::<GetQuota>(text).map(|response| response.numeric())
    }

    async fn write_quota(
        &self,
        serial_number: &str,
        cmd_code: &str,
        params: Value,
    ) -> Result<(), Error> {
        let params = json!({ "sn": serial_number, "cmdCode": cmd_code, "params": params });
        let text = self
            .request(Method::PUT, endpoint::DEVICE_QUOTA, params)
            .await?;

        if let Ok(envelope) = serde_json::from_str::<Envelope>(&text) {
            if !envelope.is_success() {
                log::warn!(
                    "{} accepted with code {:?}: {}",
                    cmd_code,
                    envelope.code,
                    envelope.message.unwrap_or_default()
                );
            }
        }

        Ok(())
    }
}
