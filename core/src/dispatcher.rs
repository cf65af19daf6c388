//! Pre-encode dispatch interceptor.
//!
//! # Design
//! `Dispatcher::write_packet` is called by the host pipeline once per
//! outgoing command, before encoding. It summarizes the packet, asks the
//! decision service over one blocking POST whether the command may proceed,
//! and answers with a `Directive`.
//!
//! The dispatcher keeps no per-call state. The response body travels from
//! `dispatch` to the packet write as a local value inside `DispatchOutcome`,
//! so concurrent calls on the same dispatcher never see each other's bytes.
//!
//! Every failure past construction (transport, status, field write) is
//! logged and folded into `Directive::Stop`; nothing is raised to the host.
//! `build_request`, `dispatch` and `interpret` are public so a host that
//! performs its own I/O can drive the same logic step by step.

use uuid::Uuid;

use crate::config::{DispatcherConfig, MutationPolicy};
use crate::endpoint::Endpoint;
use crate::error::{ConfigError, DispatchError};
use crate::http::{
    is_octet_stream, HttpRequest, HttpResponse, CONTENT_TYPE_JSON, REQUEST_ID_HEADER,
};
use crate::packet::{FieldValue, Packet};
use crate::summary::CommandSummary;
use crate::transport::{Transport, UreqTransport};

/// Upper bound on characters of a response body copied into a log line.
const PREVIEW_CHARS: usize = 1024;

/// What the host pipeline should do with the packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive<P> {
    /// Encode and send the packet, which may carry injected response bytes.
    Continue(P),
    /// Drop the packet without encoding it.
    Stop,
}

impl<P> Directive<P> {
    pub fn is_continue(&self) -> bool {
        matches!(self, Directive::Continue(_))
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Directive::Stop)
    }

    pub fn into_packet(self) -> Option<P> {
        match self {
            Directive::Continue(packet) => Some(packet),
            Directive::Stop => None,
        }
    }
}

/// Result of one round trip with the decision service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 2xx response. `body` is the raw payload, possibly empty.
    Accepted {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },
    /// Non-2xx response. `body` is kept for diagnostics only.
    Rejected {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },
    /// No response was received.
    Failed(DispatchError),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchOutcome::Accepted { status, .. } | DispatchOutcome::Rejected { status, .. } => {
                Some(*status)
            }
            DispatchOutcome::Failed(_) => None,
        }
    }

    /// Response bytes, or `None` when no response was received.
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            DispatchOutcome::Accepted { body, .. } | DispatchOutcome::Rejected { body, .. } => {
                Some(body)
            }
            DispatchOutcome::Failed(_) => None,
        }
    }

    /// Why the dispatch did not succeed.
    pub fn error(&self) -> Option<DispatchError> {
        match self {
            DispatchOutcome::Accepted { .. } => None,
            DispatchOutcome::Rejected { status, .. } => Some(DispatchError::Status { status: *status }),
            DispatchOutcome::Failed(e) => Some(e.clone()),
        }
    }
}

/// Gatekeeper for outgoing command packets.
pub struct Dispatcher<T = UreqTransport> {
    endpoint: Endpoint,
    config: DispatcherConfig,
    transport: T,
}

impl Dispatcher<UreqTransport> {
    /// Build a dispatcher that talks HTTP through `ureq`.
    pub fn new(config: DispatcherConfig) -> Result<Self, ConfigError> {
        let transport = UreqTransport::new(config.timeout());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn with_transport(config: DispatcherConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let endpoint = Endpoint::parse(&config.rest_endpoint)?;
        if let Some(arg) = &config.test_arg {
            tracing::info!(test_arg = %arg, "dispatcher configured with test argument");
        }
        Ok(Self {
            endpoint,
            config,
            transport,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Passed through for the host's protocol layer; unused here.
    pub fn allow_empty_data(&self) -> Option<bool> {
        self.config.allow_empty_data
    }

    pub fn summarize<P: Packet + ?Sized>(&self, packet: &P) -> CommandSummary {
        CommandSummary::from_packet(
            packet,
            self.config.keycloak_identity.as_deref(),
            &self.config.stream_id_field,
            &self.config.function_code_field,
        )
    }

    /// True when `function_code` is the configured no-op sentinel.
    pub fn is_noop(&self, function_code: Option<&FieldValue>) -> bool {
        function_code.is_some_and(|fc| fc.is_integer(self.config.noop_function_code))
    }

    pub fn build_request(&self, summary: &CommandSummary) -> Result<HttpRequest, DispatchError> {
        let body = summary
            .to_json()
            .map_err(|e| DispatchError::Unexpected(format!("failed to serialize summary: {e}")))?;
        Ok(HttpRequest {
            url: self.endpoint.as_str().to_string(),
            headers: vec![
                ("content-type".to_string(), CONTENT_TYPE_JSON.to_string()),
                (REQUEST_ID_HEADER.to_string(), Uuid::new_v4().to_string()),
            ],
            body,
        })
    }

    /// Classify a received response and log it.
    pub fn interpret(&self, response: HttpResponse) -> DispatchOutcome {
        let accepted = response.is_success();
        let content_type = response.content_type().map(str::to_string);
        let status = response.status;
        let body = response.body;

        if accepted {
            if is_octet_stream(content_type.as_deref()) {
                tracing::info!(status, bytes = body.len(), "decision service accepted command");
            } else {
                tracing::info!(
                    status,
                    content_type = content_type.as_deref().unwrap_or(""),
                    body = %preview(&body),
                    "decision service accepted command"
                );
            }
            DispatchOutcome::Accepted {
                status,
                content_type,
                body,
            }
        } else {
            tracing::error!(
                status,
                endpoint = %self.endpoint,
                body = %preview(&body),
                "decision service rejected command"
            );
            DispatchOutcome::Rejected {
                status,
                content_type,
                body,
            }
        }
    }

    /// POST `summary` to the decision service and interpret the answer.
    pub fn dispatch(&self, summary: &CommandSummary) -> DispatchOutcome {
        let request = match self.build_request(summary) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "could not build dispatch request");
                return DispatchOutcome::Failed(e);
            }
        };

        let span = tracing::info_span!(
            "dispatch",
            request_id = request.header(REQUEST_ID_HEADER).unwrap_or_default()
        );
        let _guard = span.enter();

        tracing::info!(
            json = %String::from_utf8_lossy(&request.body),
            url = %request.url,
            "posting command summary"
        );

        match self.transport.send(&request) {
            Ok(response) => self.interpret(response),
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "dispatch failed");
                DispatchOutcome::Failed(e)
            }
        }
    }

    /// Gate one packet. Never panics or errors; every failure is `Stop`.
    pub fn write_packet<P: Packet>(&self, mut packet: P) -> Directive<P> {
        tracing::info!(
            target_name = packet.target_name(),
            packet_name = packet.packet_name(),
            "write_packet called"
        );

        let summary = self.summarize(&packet);

        if self.is_noop(summary.function_code.as_ref()) {
            tracing::info!(
                packet_name = packet.packet_name(),
                "NOOP command; passing without dispatch"
            );
            return Directive::Continue(packet);
        }

        let body = match self.dispatch(&summary) {
            DispatchOutcome::Accepted { body, .. } => body,
            DispatchOutcome::Rejected { .. } | DispatchOutcome::Failed(_) => {
                tracing::warn!(
                    target_name = %summary.target,
                    packet_name = %summary.packet_name,
                    "gate denied or errored; stopping pipeline"
                );
                return Directive::Stop;
            }
        };

        if self.config.inject_response {
            let field = self.config.response_field.as_str();
            tracing::info!(field, bytes = body.len(), "writing response into packet");
            if let Err(e) = packet.write_field(field, &body) {
                match self.config.on_mutation_failure {
                    MutationPolicy::Stop => {
                        tracing::error!(field, error = %e, "failed to set response field; stopping pipeline");
                        return Directive::Stop;
                    }
                    MutationPolicy::PassThrough => {
                        tracing::warn!(field, error = %e, "failed to set response field; continuing unmodified");
                    }
                }
            }
        }

        tracing::info!(
            target_name = %summary.target,
            packet_name = %summary.packet_name,
            "command cleared"
        );
        Directive::Continue(packet)
    }
}

/// Human-readable rendering of a response body for logs.
fn preview(body: &[u8]) -> String {
    if body.is_empty() {
        return "<empty>".to_string();
    }
    match std::str::from_utf8(body) {
        Ok(text) => text.chars().take(PREVIEW_CHARS).collect(),
        Err(_) => format!("<{} bytes>", body.len()),
    }
}
