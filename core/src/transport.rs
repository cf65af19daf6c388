//! Blocking HTTP transport.
//!
//! # Design
//! `Transport` is the only seam where the dispatcher touches the network.
//! Implementations must hand back every received response as data, whatever
//! its status, and reserve `Err` for exchanges that produced no response at
//! all. `UreqTransport` is the production implementation; tests substitute
//! their own.

use std::time::Duration;

use crate::error::DispatchError;
use crate::http::{HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, DispatchError>;
}

/// `ureq` agent with status-as-error disabled, redirects not followed and a
/// global timeout. A 3xx comes back as the response itself.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, DispatchError> {
        let mut builder = self.agent.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send(&request.body[..]).map_err(map_ureq_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // A truncated 2xx body cannot be trusted as a payload; an error body
        // is diagnostics only, so keep whatever could be read.
        let body = match response.body_mut().read_to_vec() {
            Ok(body) => body,
            Err(e) if response.status().is_success() => return Err(map_ureq_error(e)),
            Err(e) => {
                tracing::debug!(status, error = %e, "could not read error response body");
                Vec::new()
            }
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_ureq_error(err: ureq::Error) -> DispatchError {
    match err {
        ureq::Error::Timeout(_) => DispatchError::Timeout,
        ureq::Error::StatusCode(status) => DispatchError::Status { status },
        other => DispatchError::Transport(other.to_string()),
    }
}
