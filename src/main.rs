use rust_creditos_api::{
    audit::AuditPublisher,
    config::Config,
    db::Database,
    handlers::{self, AppState},
    kafka_rest::KafkaRestTransport,
    repository::PgCreditoRepository,
    services::CreditoService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Builds the audit publisher, disabled when no bus URL is configured.
fn build_auditoria(config: &Config) -> AuditPublisher {
    let Some(bus_url) = config.audit_bus_url.clone() else {
        tracing::warn!("AUDIT_BUS_URL não configurada; auditoria desabilitada");
        return AuditPublisher::disabled(&config.audit_topic);
    };

    match KafkaRestTransport::new(
        bus_url.clone(),
        config.audit_producer_retries,
        Duration::from_millis(config.audit_request_timeout_ms),
    ) {
        Ok(transport) => {
            let (publisher, _worker) = AuditPublisher::spawn(
                Arc::new(transport),
                config.audit_topic.clone(),
                config.audit_queue_capacity,
            );
            tracing::info!(
                "✓ Auditoria configurada: {} (tópico {})",
                bus_url,
                config.audit_topic
            );
            publisher
        }
        Err(e) => {
            tracing::error!("Failed to initialize audit transport: {}", e);
            AuditPublisher::disabled(&config.audit_topic)
        }
    }
}

/// Main entry point for the application.
///
/// Initializes tracing, configuration, the database pool and the audit
/// publisher, then serves the credit API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_creditos_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let repository = Arc::new(PgCreditoRepository::new(db.pool.clone()));
    let auditoria = build_auditoria(&config);
    tracing::info!("{}", auditoria.status());

    let app_state = Arc::new(AppState {
        service: CreditoService::new(repository),
        auditoria,
        config: config.clone(),
    });

    let app = handlers::router(app_state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
