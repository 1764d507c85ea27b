use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use conflict_search::auth::JwtVerifier;
use conflict_search::config::Config;
use conflict_search::search::orchestrator;
use conflict_search::search::query_builder::QueryBuilder;
use conflict_search::server::{self, AppState};
use conflict_search::solr::SolrClient;
use conflict_search::store::Store;

fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let store = Store::open(&config.database_path).context("failed to open staging store")?;

    let engine = SolrClient::new(
        config.solr_leader_url.clone(),
        config.solr_follower_url.clone(),
        Duration::from_secs(config.solr_timeout_secs),
    )
    .context("failed to build Solr client")?;

    let query_builder = QueryBuilder::new(orchestrator::identifier_fields(), orchestrator::PARENT_DISCRIMINATOR_FIELD);

    // Shared-secret HS256 verification, suitable for a single-realm
    // deployment; a richer OIDC/JWKS client can implement
    // `TokenVerifier` and be swapped in here without touching the
    // handlers.
    let shared_secret = std::env::var("JWT_SHARED_SECRET").unwrap_or_default();
    let issuer = std::env::var("JWT_ISSUER").unwrap_or_default();
    let verifier = Arc::new(JwtVerifier::new(&shared_secret, issuer, &config));

    let state = AppState {
        store,
        engine: Arc::new(engine),
        query_builder: Arc::new(query_builder),
        config: Arc::new(config.clone()),
        verifier,
    };

    let addr: SocketAddr = config.bind_addr.parse().context("invalid BIND_ADDR")?;
    tracing::info!(%addr, "starting conflict-search server");

    server::run(addr, state).await
}
