use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use chat_cluster::chat::ChatNode;
use chat_cluster::chat::handlers::*;
use chat_cluster::cluster::Cluster;
use chat_cluster::cluster::handlers::handle_cluster_message;
use chat_cluster::cluster::protocol::ENDPOINT_CLUSTER;
use chat_cluster::cluster::transport::HttpTransport;
use chat_cluster::config::{Bootstrap, NodeConfig};
use chat_cluster::membership::service::MembershipService;
use chat_cluster::membership::types::MembershipEvent;
use chat_cluster::messaging::MessageHub;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--node <id>] [--http <addr:port>] [--seed <addr:port>]...",
            args[0]
        );
        eprintln!("       [--bootstrap <dir>] [--history <n>] [--forward-timeout-ms <ms>]");
        eprintln!("       [--session-timeout-secs <s>] [--verbose]");
        eprintln!("Example: {} --node A --bind 127.0.0.1:5000", args[0]);
        eprintln!(
            "Example: {} --node B --bind 127.0.0.1:5001 --seed 127.0.0.1:5000",
            args[0]
        );

        std::process::exit(1);
    }

    let config = NodeConfig::from_args(&args)?;

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("Starting node {} on {}", config.node_id, config.bind_addr);
    if !config.seeds.is_empty() {
        tracing::info!("Seed nodes: {:?}", config.seeds);
    } else {
        tracing::info!("Starting as seed node (founder)");
    }

    // 1. Membership (UDP gossip):
    let membership = MembershipService::new(
        config.node_id.clone(),
        config.bind_addr,
        Some(config.http_addr),
        config.seeds.clone(),
    )
    .await?;

    // 2. Cluster plumbing:
    let hub = MessageHub::new();
    let cluster = Cluster::new(
        config.node_id.clone(),
        HttpTransport::new(membership.clone()),
        hub.clone(),
        config.forward_timeout,
    );

    // 3. Chat services:
    let bootstrap = Bootstrap::load(&config.bootstrap_dir, &config.node_id)?;
    let node = ChatNode::start(cluster.clone(), &bootstrap, config.history_size)?;

    // 4. HTTP Router:
    let app = Router::new()
        .route("/handshake", post(handle_handshake))
        .route("/subscribe/:session", post(handle_subscribe))
        .route("/unsubscribe/:session", post(handle_unsubscribe))
        .route("/publish/:session", post(handle_publish))
        .route("/poll/:session", get(handle_poll))
        .route("/disconnect/:session", post(handle_disconnect))
        .route(ENDPOINT_CLUSTER, post(handle_cluster_message))
        .layer(Extension(node.clone()))
        .layer(Extension(cluster.clone()));

    // 5. Spawn membership service:
    let mut events = membership.subscribe();
    let service_clone = membership.clone();
    tokio::spawn(async move {
        service_clone.start().await;
    });

    // 6. Spawn topology listener:
    let topology_cluster = cluster.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(MembershipEvent::Joined(node)) => {
                    tracing::info!("Node {} joined", node.id);
                    topology_cluster.rejoin(&node.id);
                }
                Ok(MembershipEvent::Failed(node_id)) => {
                    tracing::warn!("Node {} failed", node_id);
                    topology_cluster.forget_node(&node_id);
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} membership event(s)", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 7. Spawn session reaper:
    let reaper_hub = hub.clone();
    let session_timeout = config.session_timeout;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));

        loop {
            interval.tick().await;
            let expired = reaper_hub.reap_idle(session_timeout);
            if expired > 0 {
                tracing::info!("Expired {} idle session(s)", expired);
            }
        }
    });

    // 8. Spawn stats reporter:
    let stats_service = membership.clone();
    let stats_node = node.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let alive = stats_service.get_alive_members();
            tracing::info!(
                "Cluster stats: {} alive nodes, {} rooms, {} local sessions, {} users",
                alive.len(),
                stats_node.rooms().rooms().len(),
                stats_node.cluster().hub().session_count(),
                stats_node.user_count().count()
            );
            for node in alive {
                tracing::info!(
                    "  - {} gossip={} http={} (inc={})",
                    node.id,
                    node.gossip_addr,
                    node.http_addr,
                    node.incarnation
                );
            }
        }
    });

    // 9. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    node.stop();
    Ok(())
}
