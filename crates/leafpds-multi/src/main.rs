use std::sync::Arc;

use leafpds_blob_fs::FsBlobStore;
use leafpds_core::EventStore;
use leafpds_core::config::PdsConfig;
use leafpds_core::traits::{BlobRefStore, OAuthStore};
use leafpds_server::oauth_runtime::{load_or_generate_signing_key, OAuthRuntime};
use leafpds_server::{AppState, build_router};
use leafpds_storage_sqlite::{
    SqliteAccountStore, SqliteBlobRefStore, SqliteEventStore, SqliteOAuthStore, SqliteRepoStore,
};

/// Entry point for the many-accounts deployment. Unlike `leafpds-single`,
/// which provisions or loads exactly one account, this binary places no
/// restriction on account count — `routes/server.rs`'s `createAccount` only
/// enforces the single-account cap when `config.mode == PdsMode::Single` —
/// and `routes/well_known.rs` resolves `/.well-known/atproto-did` by looking
/// up the requesting `Host` against the account table rather than returning
/// a single fixed DID. Storage wiring is otherwise identical to
/// `leafpds-single`: the same SQLite-backed stores and filesystem blob
/// store, since both binaries share the sqlite+fs storage adapters.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().pretty().init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/multi.toml".to_string());
    let config = PdsConfig::load(&config_path)?;

    if !matches!(config.mode, leafpds_core::config::PdsMode::Multi) {
        anyhow::bail!("leafpds-multi requires mode = \"Multi\" in {config_path}");
    }

    std::fs::create_dir_all("data")?;

    let account_store = SqliteAccountStore::connect(&config.database.url).await?;
    let repo_store = SqliteRepoStore::connect(&config.database.url).await?;
    let event_store = SqliteEventStore::connect(&config.database.url).await?;
    let blob_ref_store = SqliteBlobRefStore::connect(&config.database.url).await?;
    let oauth_store = SqliteOAuthStore::connect(&config.database.url).await?;
    let oauth_signing_key =
        load_or_generate_signing_key("data/oauth_signing_key.enc", &config.key_encryption_secret)?;

    let blobs_path = config.blobs.path.as_deref().unwrap_or("data/blobs");
    let blob_store = FsBlobStore::new(blobs_path)?;

    let addr = format!("0.0.0.0:{}", config.port);

    let tls_config = config.tls.clone();
    let public_url = config.public_url.clone();

    let max_seq = event_store.get_max_seq().await?;
    let sequencer = leafpds_server::Sequencer::new(max_seq + 1, 1024);
    let relay_notifier = None;

    let event_store: Arc<dyn EventStore> = Arc::new(event_store);

    let state = AppState {
        account_store: Arc::new(account_store),
        repo_store: Arc::new(repo_store),
        blob_store: Arc::new(blob_store),
        config: Arc::new(config),
        sequencer: Some(sequencer),
        relay_notifier,
        event_store: Some(event_store),
        blob_ref_store: Arc::new(blob_ref_store) as Arc<dyn BlobRefStore>,
        oauth_store: Arc::new(oauth_store) as Arc<dyn OAuthStore>,
        oauth_runtime: Arc::new(OAuthRuntime::new(oauth_signing_key)),
    };

    let router = build_router(state);

    if let Some(tls_config) = tls_config {
        use futures::StreamExt;
        use rustls_acme::{AcmeConfig, caches::DirCache};

        std::fs::create_dir_all(&tls_config.cert_cache)?;

        let mut acme_state = AcmeConfig::new(tls_config.domains)
            .contact([format!("mailto:{}", tls_config.contact_email)])
            .cache(DirCache::new(tls_config.cert_cache))
            .directory_lets_encrypt(tls_config.production)
            .state();
        let acceptor = acme_state.axum_acceptor(acme_state.default_rustls_config());
        tokio::spawn(async move {
            loop {
                acme_state.next().await;
            }
        });

        tokio::spawn(http_redirect_server(public_url));

        tracing::info!("leafpds-multi starting HTTPS on {}", addr);
        let sock_addr: std::net::SocketAddr = addr.parse()?;
        axum_server::bind(sock_addr)
            .acceptor(acceptor)
            .serve(router.into_make_service())
            .await?;
    } else {
        tracing::info!("leafpds-multi starting on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;
    }

    Ok(())
}

async fn http_redirect_server(public_url: String) {
    let app = axum::Router::new().fallback(move |req: axum::extract::Request| {
        let base = public_url.clone();
        async move {
            let target = format!("{}{}", base, req.uri());
            axum::response::Redirect::permanent(&target)
        }
    });
    let Ok(listener) = tokio::net::TcpListener::bind("0.0.0.0:80").await else {
        tracing::warn!("Could not bind port 80 for HTTP redirect");
        return;
    };
    tracing::info!("HTTP redirect listening on 0.0.0.0:80");
    let _ = axum::serve(listener, app).await;
}
