use mock_server::{DecisionState, Reply, ReplyPlan};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());

    // DENY_PACKETS=FIRE,ABORT answers those packet names with 403.
    let mut plan = ReplyPlan::default();
    if let Ok(deny) = std::env::var("DENY_PACKETS") {
        for name in deny.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            plan = plan.with_packet(name, Reply::text(403, "denied by policy"));
        }
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "decision service listening");
    mock_server::run(listener, DecisionState::new(plan)).await
}
