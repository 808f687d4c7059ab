//! Audit trail for credit queries.
//!
//! Every query served under `/api/creditos` produces one
//! [`ConsultaCreditoEvent`]. The [`AuditPublisher`] hands events to a
//! background worker that owns the [`EventTransport`] and every delivery
//! result; publishing never blocks or fails the request that triggered it.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::AppError;

/// Kind of credit query being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoConsulta {
    ConsultaPorNfse,
    ConsultaPorNumeroCredito,
    ListarTodos,
    ConsultaPorTipo,
    ConsultaRecentes,
    VerificarExistencia,
}

impl TipoConsulta {
    pub fn descricao(&self) -> &'static str {
        match self {
            TipoConsulta::ConsultaPorNfse => "Consulta por número da NFS-e",
            TipoConsulta::ConsultaPorNumeroCredito => "Consulta por número do crédito",
            TipoConsulta::ListarTodos => "Listagem de todos os créditos",
            TipoConsulta::ConsultaPorTipo => "Consulta por tipo de crédito",
            TipoConsulta::ConsultaRecentes => "Consulta de créditos recentes",
            TipoConsulta::VerificarExistencia => "Verificação de existência de crédito",
        }
    }
}

impl fmt::Display for TipoConsulta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descricao())
    }
}

/// One audited credit query, as published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultaCreditoEvent {
    pub event_id: String,
    #[serde(with = "crate::models::formato_data_hora")]
    pub timestamp: NaiveDateTime,
    pub tipo_consulta: TipoConsulta,
    pub parametro_consulta: String,
    pub quantidade_resultados: Option<i64>,
    pub endereco_ip: Option<String>,
    pub user_agent: Option<String>,
    pub tempo_execucao_ms: i64,
    pub sucesso: bool,
    pub mensagem_erro: Option<String>,
    pub informacoes_adicionais: Option<String>,
}

impl ConsultaCreditoEvent {
    pub fn sucesso(
        tipo_consulta: TipoConsulta,
        parametro: impl Into<String>,
        quantidade_resultados: Option<i64>,
        tempo_execucao_ms: i64,
        endereco_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Local::now().naive_local(),
            tipo_consulta,
            parametro_consulta: parametro.into(),
            quantidade_resultados,
            endereco_ip,
            user_agent,
            tempo_execucao_ms,
            sucesso: true,
            mensagem_erro: None,
            informacoes_adicionais: None,
        }
    }

    pub fn erro(
        tipo_consulta: TipoConsulta,
        parametro: impl Into<String>,
        mensagem_erro: impl Into<String>,
        tempo_execucao_ms: i64,
        endereco_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Local::now().naive_local(),
            tipo_consulta,
            parametro_consulta: parametro.into(),
            quantidade_resultados: Some(0),
            endereco_ip,
            user_agent,
            tempo_execucao_ms,
            sucesso: false,
            mensagem_erro: Some(mensagem_erro.into()),
            informacoes_adicionais: None,
        }
    }
}

/// Where the bus stored a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub partition: i32,
    pub offset: i64,
}

/// Publish sink for audit events.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Sends one keyed record to `topic`.
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<DeliveryReport, AppError>;
}

/// Fire-and-forget publisher of audit events.
///
/// Cloning is cheap; all clones feed the same background worker.
#[derive(Clone)]
pub struct AuditPublisher {
    sender: Option<mpsc::Sender<ConsultaCreditoEvent>>,
    topic: String,
}

impl AuditPublisher {
    /// Starts the delivery worker and returns the publisher feeding it.
    ///
    /// The worker stops once every publisher clone is dropped and the
    /// queue is drained.
    pub fn spawn(
        transport: Arc<dyn EventTransport>,
        topic: impl Into<String>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let topic = topic.into();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, transport, topic.clone()));

        (
            Self {
                sender: Some(sender),
                topic,
            },
            worker,
        )
    }

    /// A publisher with no transport. Events are dropped.
    pub fn disabled(topic: impl Into<String>) -> Self {
        Self {
            sender: None,
            topic: topic.into(),
        }
    }

    /// Queues an event for delivery, keyed by its event id.
    ///
    /// Never fails: a full or closed queue is logged and the event dropped.
    pub fn publish(&self, evento: ConsultaCreditoEvent) {
        tracing::debug!(
            "Publicando evento de auditoria: {:?} - {}",
            evento.tipo_consulta,
            evento.parametro_consulta
        );

        let Some(sender) = &self.sender else {
            tracing::debug!(
                "Auditoria desabilitada, evento {} descartado",
                evento.event_id
            );
            return;
        };

        match sender.try_send(evento) {
            Ok(()) => {}
            Err(TrySendError::Full(evento)) => tracing::error!(
                "Fila de auditoria cheia, evento {} descartado",
                evento.event_id
            ),
            Err(TrySendError::Closed(evento)) => tracing::error!(
                "Worker de auditoria encerrado, evento {} descartado",
                evento.event_id
            ),
        }
    }

    pub fn publish_sucesso(
        &self,
        tipo_consulta: TipoConsulta,
        parametro: impl Into<String>,
        quantidade_resultados: Option<i64>,
        tempo_execucao_ms: i64,
        endereco_ip: Option<String>,
        user_agent: Option<String>,
    ) {
        self.publish(ConsultaCreditoEvent::sucesso(
            tipo_consulta,
            parametro,
            quantidade_resultados,
            tempo_execucao_ms,
            endereco_ip,
            user_agent,
        ));
    }

    pub fn publish_falha(
        &self,
        tipo_consulta: TipoConsulta,
        parametro: impl Into<String>,
        mensagem_erro: impl Into<String>,
        tempo_execucao_ms: i64,
        endereco_ip: Option<String>,
        user_agent: Option<String>,
    ) {
        self.publish(ConsultaCreditoEvent::erro(
            tipo_consulta,
            parametro,
            mensagem_erro,
            tempo_execucao_ms,
            endereco_ip,
            user_agent,
        ));
    }

    /// Liveness stub: healthy iff a transport was wired in. Does not probe the bus.
    pub fn is_healthy(&self) -> bool {
        self.sender.is_some()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn status(&self) -> String {
        format!(
            "AuditoriaService - Tópico: {}, Healthy: {}",
            self.topic,
            self.is_healthy()
        )
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<ConsultaCreditoEvent>,
    transport: Arc<dyn EventTransport>,
    topic: String,
) {
    while let Some(evento) = receiver.recv().await {
        let payload = match serde_json::to_value(&evento) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    "Erro inesperado ao serializar evento de auditoria {}: {}",
                    evento.event_id,
                    e
                );
                continue;
            }
        };

        match transport.send(&topic, &evento.event_id, payload).await {
            Ok(report) => tracing::debug!(
                "Evento de auditoria publicado com sucesso: {} - Partição: {} - Offset: {}",
                evento.event_id,
                report.partition,
                report.offset
            ),
            Err(e) => tracing::error!(
                "Erro ao publicar evento de auditoria: {} - Erro: {}",
                evento.event_id,
                e
            ),
        }
    }
    tracing::info!("Worker de auditoria encerrado (tópico {})", topic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Gravador {
        enviados: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    #[async_trait]
    impl EventTransport for Gravador {
        async fn send(
            &self,
            topic: &str,
            key: &str,
            payload: serde_json::Value,
        ) -> Result<DeliveryReport, AppError> {
            let mut enviados = self.enviados.lock().unwrap();
            enviados.push((topic.to_string(), key.to_string(), payload));
            Ok(DeliveryReport {
                partition: 0,
                offset: enviados.len() as i64 - 1,
            })
        }
    }

    #[test]
    fn test_event_wire_format() {
        let evento = ConsultaCreditoEvent::sucesso(
            TipoConsulta::ConsultaRecentes,
            "limite=10",
            None,
            12,
            Some("10.0.0.1".to_string()),
            None,
        );
        let json = serde_json::to_value(&evento).unwrap();

        assert_eq!(json["tipoConsulta"], "CONSULTA_RECENTES");
        assert_eq!(json["parametroConsulta"], "limite=10");
        assert_eq!(json["tempoExecucaoMs"], 12);
        assert_eq!(json["sucesso"], true);
        assert!(json["mensagemErro"].is_null());
        assert!(json["quantidadeResultados"].is_null());
        assert!(json["informacoesAdicionais"].is_null());
        assert_eq!(json["timestamp"].as_str().unwrap().len(), 19);
        assert!(Uuid::parse_str(json["eventId"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_error_event_carries_message() {
        let evento = ConsultaCreditoEvent::erro(
            TipoConsulta::ConsultaPorNfse,
            "999999",
            "Nenhum crédito encontrado para a NFS-e: 999999",
            3,
            None,
            Some("curl/8.0".to_string()),
        );

        assert!(!evento.sucesso);
        assert_eq!(evento.quantidade_resultados, Some(0));
        assert_eq!(
            evento.mensagem_erro.as_deref(),
            Some("Nenhum crédito encontrado para a NFS-e: 999999")
        );
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = ConsultaCreditoEvent::sucesso(TipoConsulta::ListarTodos, "N/A", None, 0, None, None);
        let b = ConsultaCreditoEvent::sucesso(TipoConsulta::ListarTodos, "N/A", None, 0, None, None);
        assert_ne!(a.event_id, b.event_id);
    }

    #[tokio::test]
    async fn test_worker_sends_keyed_by_event_id() {
        let gravador = Arc::new(Gravador::default());
        let (publisher, worker) = AuditPublisher::spawn(gravador.clone(), "consulta-credito", 8);

        publisher.publish_sucesso(
            TipoConsulta::ConsultaPorNumeroCredito,
            "123456",
            Some(1),
            5,
            None,
            None,
        );
        drop(publisher);
        worker.await.unwrap();

        let enviados = gravador.enviados.lock().unwrap();
        assert_eq!(enviados.len(), 1);
        let (topic, key, payload) = &enviados[0];
        assert_eq!(topic, "consulta-credito");
        assert_eq!(payload["eventId"].as_str().unwrap(), key);
        assert_eq!(payload["tipoConsulta"], "CONSULTA_POR_NUMERO_CREDITO");
    }

    #[test]
    fn test_disabled_publisher_is_unhealthy_and_drops() {
        let publisher = AuditPublisher::disabled("consulta-credito");

        publisher.publish_falha(TipoConsulta::ListarTodos, "N/A", "HTTP 500", 1, None, None);
        assert!(!publisher.is_healthy());
        assert_eq!(
            publisher.status(),
            "AuditoriaService - Tópico: consulta-credito, Healthy: false"
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_panicking() {
        let gravador = Arc::new(Gravador::default());
        let (publisher, worker) = AuditPublisher::spawn(gravador.clone(), "t", 1);

        // The worker may not have drained yet; extra events are dropped, never surfaced.
        for _ in 0..50 {
            publisher.publish_sucesso(TipoConsulta::ListarTodos, "N/A", None, 0, None, None);
        }
        assert!(publisher.is_healthy());
        drop(publisher);
        worker.await.unwrap();

        let enviados = gravador.enviados.lock().unwrap().len();
        assert!((1..=50).contains(&enviados));
    }
}
