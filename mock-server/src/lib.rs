use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Target of redirect replies. Answers any GET with 200 and records the hit.
pub const MOVED_PATH: &str = "/moved";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandSummary {
    pub keycloak_id: String,
    pub target: String,
    pub packet_name: String,
    pub stream_id: serde_json::Value,
    pub function_code: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Received {
    pub id: Uuid,
    pub request_id: Option<String>,
    pub summary: CommandSummary,
}

/// How the mock answers one summary.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
    /// Sent as the `Location` header.
    pub location: Option<String>,
}

impl Reply {
    /// 200 with a binary body.
    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: OCTET_STREAM.to_string(),
            body: body.into(),
            delay: None,
            location: None,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: body.as_bytes().to_vec(),
            delay: None,
            location: None,
        }
    }

    /// Empty 3xx pointing at `location`.
    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::text(status, "")
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for Reply {
    fn default() -> Self {
        Self::bytes(vec![0x01, 0x02, 0x03, 0x04])
    }
}

/// Default reply plus per-packet-name overrides.
#[derive(Clone, Debug, Default)]
pub struct ReplyPlan {
    pub default: Reply,
    pub by_packet: HashMap<String, Reply>,
}

impl ReplyPlan {
    pub fn new(default: Reply) -> Self {
        Self {
            default,
            by_packet: HashMap::new(),
        }
    }

    pub fn with_packet(mut self, packet_name: impl Into<String>, reply: Reply) -> Self {
        self.by_packet.insert(packet_name.into(), reply);
        self
    }

    fn reply_for(&self, packet_name: &str) -> Reply {
        self.by_packet
            .get(packet_name)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[derive(Clone, Default)]
pub struct DecisionState {
    plan: Arc<RwLock<ReplyPlan>>,
    received: Arc<RwLock<Vec<Received>>>,
    moved_hits: Arc<RwLock<usize>>,
}

impl DecisionState {
    pub fn new(plan: ReplyPlan) -> Self {
        Self {
            plan: Arc::new(RwLock::new(plan)),
            received: Arc::default(),
            moved_hits: Arc::default(),
        }
    }

    pub async fn set_plan(&self, plan: ReplyPlan) {
        *self.plan.write().await = plan;
    }

    pub async fn received(&self) -> Vec<Received> {
        self.received.read().await.clone()
    }

    /// Requests that arrived at `MOVED_PATH`.
    pub async fn moved_hits(&self) -> usize {
        *self.moved_hits.read().await
    }
}

pub fn app(state: DecisionState) -> Router {
    Router::new()
        .route("/gate", post(gate))
        .route("/received", get(list_received))
        .route(MOVED_PATH, get(moved))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: DecisionState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn gate(
    State(state): State<DecisionState>,
    headers: HeaderMap,
    Json(summary): Json<CommandSummary>,
) -> Response {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let reply = state.plan.read().await.reply_for(&summary.packet_name);

    tracing::info!(
        target_name = %summary.target,
        packet_name = %summary.packet_name,
        status = reply.status,
        bytes = reply.body.len(),
        "decision"
    );

    state.received.write().await.push(Received {
        id: Uuid::new_v4(),
        request_id,
        summary,
    });

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response =
        (status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response();
    if let Some(location) = reply.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

async fn moved(State(state): State<DecisionState>) -> Response {
    *state.moved_hits.write().await += 1;
    tracing::warn!("request followed a redirect");
    (StatusCode::OK, [(header::CONTENT_TYPE, OCTET_STREAM)], b"MOVED".to_vec()).into_response()
}

async fn list_received(State(state): State<DecisionState>) -> Json<Vec<Received>> {
    Json(state.received().await)
}
