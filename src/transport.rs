use std::io::Read;

use reqwest::Request;
use tracing::debug;

use crate::error::Result;

/// Executes an already signed request and hands back the response body.
///
/// Error statuses are not failures here: S3 reports them in the body, and the
/// caller inspects the parsed document.
pub trait Transport: Send + Sync {
    fn execute(&self, request: Request) -> Result<Box<dyn Read + Send>>;
}

/// Blocking transport over a caller-configured `reqwest` client.
///
/// Timeouts, TLS and connection pooling are whatever the client was built
/// with. Only method, URL and headers are forwarded; listing pages are
/// bodiless GETs.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    #[inline]
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: Request) -> Result<Box<dyn Read + Send>> {
        let mut blocking =
            reqwest::blocking::Request::new(request.method().clone(), request.url().clone());
        *blocking.headers_mut() = request.headers().clone();

        let response = self.client.execute(blocking)?;
        debug!(
            status = %response.status(),
            url = %response.url(),
            "received response"
        );
        Ok(Box::new(response))
    }
}
