use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use pulse_relay::auth::token::TokenManager;
use pulse_relay::config::ServerConfig;
use pulse_relay::core::dedup::{DedupCache, DedupStore, MemoryDedupStore, RedisDedupStore};
use pulse_relay::core::event_handler::EventRouter;
use pulse_relay::core::fanout::Notifier;
use pulse_relay::core::rate_limit::{
    MemoryRateLimitStore, RateLimitStore, RateLimiter, RedisRateLimitStore,
};
use pulse_relay::core::registry::ConnectionRegistry;
use pulse_relay::core::server::RealtimeServer;
use pulse_relay::handlers::websocket::relay_routes;
use pulse_relay::storage::memory::{
    InMemoryMessageStore, InMemoryNotificationStore, InMemoryUserDirectory, LogPushSink,
};

#[tokio::main]
async fn main() {
    // Load .env before logging init so RUST_LOG from the file applies
    let dotenv_result = dotenvy::dotenv();
    env_logger::init();
    match dotenv_result {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("No .env file loaded: {}", e),
    }

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    // Backend selection happens once, here; handlers never branch on it
    let (rate_store, dedup_store) = build_stores(&config).await;

    let users = Arc::new(InMemoryUserDirectory::new());
    let registry = Arc::new(ConnectionRegistry::new(users));
    registry.clone().start_sweeper(config.profile_sweep_interval);

    let rate_limiter = Arc::new(RateLimiter::new(rate_store));
    let dedup = Arc::new(DedupCache::new(dedup_store));
    let messages = Arc::new(InMemoryMessageStore::new());
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let notifier = Notifier::new(registry.clone(), notifications, Arc::new(LogPushSink::new()));

    let server = Arc::new(RealtimeServer::new(
        registry,
        rate_limiter,
        dedup,
        messages,
        notifier,
    ));
    let router = Arc::new(EventRouter::new(server.clone()));
    let tokens = Arc::new(TokenManager::new(&config.jwt_secret));

    let routes = relay_routes(tokens, server, router);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Pulse Relay on {}", addr);
    warp::serve(routes).run(addr).await;
}

/// Select the rate-limit/dedup backends at startup. A missing or
/// unreachable shared backend degrades to the process-local stores with
/// a warning, never a crash.
async fn build_stores(config: &ServerConfig) -> (Arc<dyn RateLimitStore>, Arc<dyn DedupStore>) {
    if let Some(url) = &config.redis_url {
        match connect_redis(url).await {
            Ok(conn) => {
                info!("Using shared Redis backend for rate limiting and dedup");
                return (
                    Arc::new(RedisRateLimitStore::new(conn.clone())),
                    Arc::new(RedisDedupStore::new(conn)),
                );
            }
            Err(e) => {
                warn!(
                    "Shared backend unavailable ({}); falling back to process-local stores",
                    e
                );
            }
        }
    } else {
        warn!("PULSE_REDIS_URL not set; using process-local rate-limit and dedup stores");
    }

    let rate_store = Arc::new(MemoryRateLimitStore::new());
    rate_store.clone().start_sweeper(config.store_sweep_interval);
    let dedup_store = Arc::new(MemoryDedupStore::new());
    dedup_store.clone().start_sweeper(config.store_sweep_interval);
    (rate_store, dedup_store)
}

async fn connect_redis(url: &str) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
    let client = redis::Client::open(url)?;
    client.get_multiplexed_tokio_connection().await
}
