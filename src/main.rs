use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use node_fog::aggregator::handlers::{handle_delete_flow, handle_poll_result, handle_submit_result};
use node_fog::aggregator::service::ResultAggregator;
use node_fog::config::NodeConfig;
use node_fog::dispatcher::engine::DispatchEngine;
use node_fog::dispatcher::handlers::handle_submit_flow;
use node_fog::engine::builtin::register_builtin_actions;
use node_fog::engine::handlers::handle_assign_task;
use node_fog::engine::registry::ActionRegistry;
use node_fog::engine::worker::Worker;
use node_fog::manager::failover::FailoverProtocol;
use node_fog::manager::handlers::{handle_heartbeat, handle_probe};
use node_fog::membership::scoring::DefaultScoring;
use node_fog::node::FogNode;
use node_fog::system::DefaultProbe;
use node_fog::transport::HttpTransport;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_args(std::env::args().skip(1))?;

    // RUST_LOG wins over the `debug=` switch
    let default_filter = match config.debug {
        Some(mode) => format!("info,{}", mode.filter_directive()),
        None => "info".to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let seeds = config.load_peers()?;
    let policy = config.load_module_policy()?;

    tracing::info!("Starting node on {}", config.local_addr());
    if seeds.is_empty() {
        tracing::info!("No peers configured, starting as founder");
    } else {
        tracing::info!("Peers to probe: {:?}", seeds.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    }

    // 1. Node context:
    let node = FogNode::new(
        config.clone(),
        seeds,
        Arc::new(HttpTransport::new()),
        Arc::new(DefaultScoring),
        Arc::new(DefaultProbe {
            on_battery: config.battery,
        }),
    );

    // 2. Components:
    let dispatcher = DispatchEngine::new(node.clone());
    let aggregator = ResultAggregator::new(node.clone(), dispatcher.clone());
    let failover = FailoverProtocol::new(node.clone(), dispatcher.clone());

    let actions = ActionRegistry::new();
    register_builtin_actions(&actions);
    tracing::info!("Action modules available: {}", actions.list_actions().join(", "));
    let worker = Worker::new(node.clone(), actions, policy)?;

    // 3. HTTP Router:
    let app = Router::new()
        .route("/jobs", post(handle_submit_flow))
        .route(
            "/result/:id",
            get(handle_poll_result)
                .post(handle_submit_result)
                .delete(handle_delete_flow),
        )
        .route("/engine", post(handle_assign_task))
        .route("/manager/:is_candidate", get(handle_probe))
        .route("/manager", post(handle_heartbeat))
        .layer(Extension(dispatcher))
        .layer(Extension(aggregator))
        .layer(Extension(failover.clone()))
        .layer(Extension(worker));

    // 4. Bind before discovery so probes from peers can already be answered:
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!("HTTP server listening on {}", config.local_addr());

    // 5. Spawn discovery + heartbeat:
    tokio::spawn(async move {
        failover.start().await;
    });

    tracing::info!("Press Ctrl+C to shutdown");
    axum::serve(listener, app).await?;

    Ok(())
}
