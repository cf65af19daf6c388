//! Pre-encode command gate.
//!
//! # Overview
//! A host command pipeline hands each outgoing packet to
//! `Dispatcher::write_packet` before encoding it. The dispatcher summarizes
//! the packet as JSON, POSTs the summary to an external decision service,
//! and returns `Directive::Continue(packet)` or `Directive::Stop`. On
//! success the service's raw response bytes can be written into a binary
//! field of the packet.
//!
//! # Design
//! - `Endpoint` normalizes the configured URL once; it never changes after.
//! - `Packet` is the narrow capability the dispatcher needs from the host's
//!   packet type. Missing fields read as `None`.
//! - `Transport` isolates the network. `UreqTransport` is the blocking
//!   default; `build_request` / `interpret` also let a host do its own I/O.
//! - No state survives between calls, so one `Dispatcher` can serve
//!   concurrent callers.

pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod packet;
pub mod summary;
pub mod transport;

pub use config::{DispatcherConfig, MutationPolicy};
pub use dispatcher::{Directive, DispatchOutcome, Dispatcher};
pub use endpoint::{normalize_endpoint, Endpoint};
pub use error::{ConfigError, DispatchError, FieldWriteError};
pub use http::{HttpRequest, HttpResponse};
pub use packet::{CommandPacket, FieldKind, FieldValue, Packet};
pub use summary::{CommandSummary, UNKNOWN_IDENTITY};
pub use transport::{Transport, UreqTransport};
