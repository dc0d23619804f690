use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::fmt;
use std::io::Cursor;

#[derive(Debug, Clone)]
pub enum Error {
    /// Transport level failure (connection refused, TLS, timeout of the HTTP client)
    ApiError(String),
    /// Non-200 reply; carries status code and response body
    HttpStatus(u16, String),
    UnexpectedApiResponse,
    /// Body which could not be decoded, with the decoder's complaint
    InvalidResponse(String, String),
    DeviceError(String),
    DeviceTimeout(String),
    ConfigError(String),
    FormatError,
    InternalError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ApiError(s) => write!(f, "API request failed: {}", s),
            Error::HttpStatus(code, body) => write!(f, "API responded {}: {}", code, body),
            Error::UnexpectedApiResponse => write!(f, "unexpected API response"),
            Error::InvalidResponse(body, e) => write!(f, "invalid response ({}): {}", e, body),
            Error::DeviceError(s) => write!(f, "device error: {}", s),
            Error::DeviceTimeout(s) => write!(f, "device timed out: {}", s),
            Error::ConfigError(s) => write!(f, "configuration error: {}", s),
            Error::FormatError => write!(f, "format error"),
            Error::InternalError => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for Error {}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let error = format!(
            "<html><body><h3>Internal error</h3><code>{}</code></body></html>",
            self
        );
        Response::build()
            .status(Status::InternalServerError)
            .sized_body(error.len(), Cursor::new(error))
            .header(ContentType::new("text", "html"))
            .ok()
    }
}
