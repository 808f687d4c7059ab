use serde::Deserialize;

/// Default Kafka topic receiving one audit event per credit query.
pub const DEFAULT_AUDIT_TOPIC: &str = "consulta-credito";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub app_name: String,
    pub app_version: String,
    /// Base URL of the Kafka REST proxy. Audit publishing is disabled when absent.
    pub audit_bus_url: Option<String>,
    pub audit_topic: String,
    pub audit_producer_retries: u32,
    pub audit_request_timeout_ms: u64,
    pub audit_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            app_name: std::env::var("APP_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "api-consulta-creditos".to_string()),
            app_version: std::env::var("APP_VERSION")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            audit_bus_url: std::env::var("AUDIT_BUS_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| -> anyhow::Result<String> {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("AUDIT_BUS_URL must start with http:// or https://");
                    }
                    url::Url::parse(&url)
                        .map_err(|e| anyhow::anyhow!("AUDIT_BUS_URL is not a valid URL: {}", e))?;
                    Ok(url.trim_end_matches('/').to_string())
                })
                .transpose()?,
            audit_topic: std::env::var("AUDIT_TOPIC")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AUDIT_TOPIC.to_string()),
            audit_producer_retries: std::env::var("AUDIT_PRODUCER_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("AUDIT_PRODUCER_RETRIES must be a non-negative number"))?,
            audit_request_timeout_ms: std::env::var("AUDIT_REQUEST_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("AUDIT_REQUEST_TIMEOUT_MS must be a number"))?,
            audit_queue_capacity: std::env::var("AUDIT_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("AUDIT_QUEUE_CAPACITY must be a number"))
                .and_then(|capacity: usize| {
                    if capacity == 0 {
                        anyhow::bail!("AUDIT_QUEUE_CAPACITY must be greater than zero");
                    }
                    Ok(capacity)
                })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            config.database_url.chars().take(20).collect::<String>()
        );
        match config.audit_bus_url {
            Some(ref bus) => tracing::info!(
                "Audit bus configured: {} (topic: {})",
                bus,
                config.audit_topic
            ),
            None => tracing::warn!("AUDIT_BUS_URL not set, audit events will be dropped"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
