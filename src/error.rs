use std::io;

use hmac::digest::InvalidLength;

pub type Result<T> = std::result::Result<T, Error>;

/// Server-reported failure parsed from an `<Error>` document.
///
/// Every field is the server's text verbatim, or empty when the element was
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub resource: String,
    pub request_id: String,
    pub host_id: String,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{code}: {message} (resource: {resource}, request id: {request_id}, host id: {host_id})",
            code = self.code,
            message = self.message,
            resource = self.resource,
            request_id = self.request_id,
            host_id = self.host_id,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The signing setup is unusable. Never worth retrying.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Reading a payload, executing a request or decoding a response failed.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// The storage service answered with an `<Error>` document.
    #[error("S3 Error: {0}")]
    Protocol(ErrorResponse),
}

impl Error {
    /// Server error code, for protocol errors only.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Protocol(response) => Some(response.code.as_str()),
            _ => None,
        }
    }
}

impl From<InvalidLength> for Error {
    fn from(e: InvalidLength) -> Self {
        Self::Config(format!("HMAC-SHA256 provider rejected key: {}", e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::Other, e))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl From<ErrorResponse> for Error {
    fn from(response: ErrorResponse) -> Self {
        Self::Protocol(response)
    }
}
