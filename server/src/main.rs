//! `gateway-server`: the thin axum binary wiring the library crates to the
//! four HTTP contracts in §6. It exists only so the endpoints are reachable
//! and testable end-to-end; TLS termination, connection pool tuning, and
//! graceful shutdown drains stay out of scope.
//!
//! Logging setup mirrors a `RUST_LOG`-env-with-`"info"`-fallback chain, a
//! server binary writing straight to stdout rather than redirecting to a
//! log file.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use gateway_config::GatewayConfig;
use gateway_credentials::{CredentialPool, DurableCredentials};
use gateway_dispatch::Dispatcher;
use gateway_sigstore::SignatureStore;
use gateway_types::{Credential, CredentialKind};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use gateway_server::routes;
use gateway_server::state::AppState;
use gateway_server::upstream::{build_http_client, ReqwestUpstreamClient, TokenResolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = GatewayConfig::from_env();
    tracing::info!(
        sigcache_max_entries = config.sigcache_max_entries,
        sigcache_db_path = %config.sigcache_db_path,
        "gateway starting"
    );

    let mut store = SignatureStore::open(Path::new(&config.sigcache_db_path), config.sigcache_max_entries)?;
    for (client_kind, ttl) in &config.sigcache_ttl_overrides {
        store.set_ttl_override(*client_kind, *ttl);
    }
    let store = Arc::new(store);

    let (credentials, tokens) = load_credential_pool(&config)?;

    let http = build_http_client(config.upstream_idle_timeout);
    let upstream_client = Arc::new(ReqwestUpstreamClient::new(http, TokenResolver::new(tokens)));

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), credentials.clone(), upstream_client));

    let state = AppState {
        dispatcher,
        store,
        credentials,
        admin_password: config.admin_password.clone(),
        request_timeout: config.request_timeout,
    };

    let app = routes::build_router(state);

    let addr: SocketAddr = std::env::var("GATEWAY_BIND_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry().with(fmt::layer()).with(env_filter).init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining connections");
}

/// Seeds the Credential Pool from `GATEWAY_CREDENTIALS`
/// (`id:kind=token,id2:kind2=token2`), merging with whatever the durable
/// tier already persisted (§4.E `open`). Returns the pool plus the
/// credential-id → bearer-token map the real upstream client needs — the
/// pool itself only tracks cooldown bookkeeping, never secrets.
fn load_credential_pool(config: &GatewayConfig) -> anyhow::Result<(CredentialPool, HashMap<String, String>)> {
    let mut seeds = Vec::new();
    let mut tokens = HashMap::new();

    if let Ok(raw) = std::env::var("GATEWAY_CREDENTIALS") {
        for entry in raw.split(',').filter(|s| !s.trim().is_empty()) {
            let Some((id_kind, token)) = entry.split_once('=') else {
                tracing::warn!(entry, "malformed GATEWAY_CREDENTIALS entry, expected id:kind=token");
                continue;
            };
            let (id, kind) = id_kind.split_once(':').unwrap_or((id_kind, "antigravity"));
            let kind = match kind {
                "geminicli" => CredentialKind::Geminicli,
                _ => CredentialKind::Antigravity,
            };
            seeds.push(Credential::new(id, kind));
            tokens.insert(id.to_string(), token.to_string());
        }
    }

    let durable = DurableCredentials::open(Path::new(&config.sigcache_db_path))?;
    let pool = CredentialPool::open(seeds, config.credential_max_backoff_level, durable)?;
    Ok((pool, tokens))
}
