//! Tokenization Vault binary: serves the public HTTP surface and the
//! internal gRPC surface concurrently, sharing one `TokenizationService`.

use key_broker::{KeyBrokerClient, KeyBrokerConfig};
use rust_common::{CacheClient, CircuitBreaker, LoggingClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vault_service::config::Config;
use vault_service::grpc::VaultServiceImpl;
use vault_service::http::{router, AppState};
use vault_service::keys::KeyManager;
use vault_service::middleware::LocalAuthBackend;
use vault_service::service::{AuditLogger, TokenizationService};
use vault_service::storage::{CachedVaultStore, IdempotencyStore, RateLimiter, VaultStore};
use vault_service::vault_proto::vault_service_server::VaultServiceServer;

fn to_boxed_err(err: impl std::error::Error + Send + Sync + 'static) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(err)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = FmtSubscriber::builder().with_max_level(Level::INFO).json().try_init();

    info!("Starting Tokenization Vault");

    let config = Config::from_env()?;
    let http_addr: SocketAddr = format!("{}:{}", config.host, config.http_port).parse()?;
    let grpc_addr: SocketAddr = format!("{}:{}", config.host, config.grpc_port).parse()?;

    let cache_client = Arc::new(
        CacheClient::new(config.cache.clone()).await.expect("Failed to create cache client"),
    );
    let logging_client = Arc::new(
        LoggingClient::new(config.logging.clone()).await.expect("Failed to create logging client"),
    );

    info!(
        cache_namespace = %cache_client.namespace(),
        logging_service = %logging_client.service_id(),
        "Platform clients initialized"
    );

    let broker = Arc::new(KeyBrokerClient::new(
        KeyBrokerConfig::new(config.key_broker_endpoint.clone(), String::new())
            .with_timeout(config.circuit_breaker.timeout),
    )?);
    let key_circuit_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let keys = Arc::new(KeyManager::new(
        broker,
        key_circuit_breaker,
        config.production_mode,
        config.dek_rotation_max_age_days,
        config.dek_rotation_max_records,
    ));

    let store: Arc<dyn VaultStore> = Arc::new(CachedVaultStore::new(cache_client.clone()));
    let audit = Arc::new(AuditLogger::new(logging_client.clone()));
    let service = Arc::new(TokenizationService::new(
        keys,
        store,
        audit,
        config.token_environment,
        config.skip_luhn_validation,
    ));

    let rate_limiter = Arc::new(RateLimiter::new(
        cache_client.clone(),
        config.rate_limit_per_second,
        config.rate_limit_per_hour,
    ));
    let idempotency = Arc::new(IdempotencyStore::new(cache_client, config.idempotency_ttl));

    let state = Arc::new(AppState {
        service: service.clone(),
        auth_backend: Arc::new(LocalAuthBackend),
        rate_limiter,
        idempotency,
        internal_service_secret: config.internal_service_secret.clone(),
        internal_service_allowlist: config.internal_service_allowlist.clone(),
    });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        });
    }

    let mut http_shutdown = shutdown_tx.subscribe();
    let http_server = async move {
        let listener = tokio::net::TcpListener::bind(http_addr).await.map_err(to_boxed_err)?;
        info!("HTTP surface listening on {}", http_addr);
        axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                http_shutdown.recv().await.ok();
            })
            .await
            .map_err(to_boxed_err)
    };

    let mut grpc_shutdown = shutdown_tx.subscribe();
    let grpc_server = async move {
        info!("gRPC surface listening on {}", grpc_addr);
        Server::builder()
            .add_service(VaultServiceServer::new(VaultServiceImpl::new(service)))
            .serve_with_shutdown(grpc_addr, async move {
                grpc_shutdown.recv().await.ok();
            })
            .await
            .map_err(to_boxed_err)
    };

    tokio::try_join!(http_server, grpc_server)?;

    info!("Tokenization Vault shutdown complete");
    Ok(())
}
