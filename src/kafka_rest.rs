use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::audit::{DeliveryReport, EventTransport};
use crate::errors::AppError;

const CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Audit transport backed by a Kafka REST proxy.
///
/// Each event is produced as a single keyed record with
/// `POST {base_url}/topics/{topic}`.
#[derive(Clone)]
pub struct KafkaRestTransport {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
    backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<RecordOffset>,
}

#[derive(Debug, Deserialize)]
struct RecordOffset {
    partition: Option<i32>,
    offset: Option<i64>,
    error_code: Option<i64>,
    error: Option<String>,
}

/// Outcome of one produce attempt. Only `Retry` is worth another try.
enum Attempt {
    Delivered(DeliveryReport),
    Retry(AppError),
    Fatal(AppError),
}

impl KafkaRestTransport {
    /// Creates a new `KafkaRestTransport`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - REST proxy address, without trailing slash.
    /// * `retries` - Extra attempts after the first failed one.
    /// * `timeout` - Per-request timeout.
    pub fn new(base_url: String, retries: u32, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create audit bus client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
            backoff: Duration::from_millis(200),
        })
    }

    /// Overrides the pause between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn attempt(&self, url: &str, body: &serde_json::Value) -> Attempt {
        let response = match self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry(AppError::ExternalApiError(format!(
                    "Audit bus request failed: {}",
                    e
                )))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let err =
                AppError::ExternalApiError(format!("Audit bus returned {}: {}", status, error_text));
            return if status.is_server_error() {
                Attempt::Retry(err)
            } else {
                Attempt::Fatal(err)
            };
        }

        let parsed: ProduceResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                return Attempt::Fatal(AppError::ExternalApiError(format!(
                    "Failed to parse audit bus response: {}",
                    e
                )))
            }
        };

        match parsed.offsets.into_iter().next() {
            Some(RecordOffset {
                error_code: Some(code),
                error,
                ..
            }) => {
                let err = AppError::ExternalApiError(format!(
                    "Audit bus rejected record ({}): {}",
                    code,
                    error.unwrap_or_default()
                ));
                // Proxy record codes carry the HTTP class in their leading digits.
                if (500..600).contains(&(code / 100)) {
                    Attempt::Retry(err)
                } else {
                    Attempt::Fatal(err)
                }
            }
            Some(RecordOffset {
                partition: Some(partition),
                offset: Some(offset),
                ..
            }) => Attempt::Delivered(DeliveryReport { partition, offset }),
            _ => Attempt::Fatal(AppError::ExternalApiError(
                "Audit bus response carried no offset".to_string(),
            )),
        }
    }
}

#[async_trait]
impl EventTransport for KafkaRestTransport {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<DeliveryReport, AppError> {
        let url = format!("{}/topics/{}", self.base_url, topic);
        let body = json!({ "records": [{ "key": key, "value": payload }] });

        let mut tentativa = 0;
        loop {
            match self.attempt(&url, &body).await {
                Attempt::Delivered(report) => return Ok(report),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retry(e) if tentativa >= self.retries => return Err(e),
                Attempt::Retry(e) => {
                    tentativa += 1;
                    tracing::warn!(
                        "Tentativa {} de envio ao barramento falhou, repetindo: {}",
                        tentativa,
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}
