/// Integration tests with a mocked audit bus
/// Tests the publish workflow end to end without a real Kafka REST proxy
use rust_creditos_api::audit::{AuditPublisher, TipoConsulta};
use rust_creditos_api::kafka_rest::KafkaRestTransport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_transport(server: &MockServer) -> KafkaRestTransport {
    KafkaRestTransport::new(server.uri(), 2, Duration::from_secs(5))
        .unwrap()
        .with_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn test_published_event_reaches_topic() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/topics/consulta-credito"))
        .and(header("content-type", "application/vnd.kafka.json.v2+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offsets": [{ "partition": 0, "offset": 7 }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (publisher, worker) = AuditPublisher::spawn(
        Arc::new(create_transport(&mock_server)),
        "consulta-credito",
        8,
    );
    publisher.publish_sucesso(
        TipoConsulta::ConsultaPorNfse,
        "7891011",
        Some(2),
        15,
        Some("203.0.113.7".to_string()),
        Some("curl/8.0".to_string()),
    );
    drop(publisher);
    worker.await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let record = &body["records"][0];
    assert_eq!(record["key"], record["value"]["eventId"]);
    assert_eq!(record["value"]["tipoConsulta"], "CONSULTA_POR_NFSE");
    assert_eq!(record["value"]["parametroConsulta"], "7891011");
    assert_eq!(record["value"]["quantidadeResultados"], 2);
    assert_eq!(record["value"]["enderecoIp"], "203.0.113.7");
    assert_eq!(record["value"]["sucesso"], true);
}

#[tokio::test]
async fn test_unavailable_bus_is_retried_then_dropped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let (publisher, worker) = AuditPublisher::spawn(
        Arc::new(create_transport(&mock_server)),
        "consulta-credito",
        8,
    );
    publisher.publish_falha(
        TipoConsulta::ConsultaPorNumeroCredito,
        "999999",
        "Crédito não encontrado com o número: 999999",
        3,
        None,
        None,
    );
    drop(publisher);

    // The worker logs the failure and keeps going; nothing is surfaced.
    worker.await.unwrap();
}

#[tokio::test]
async fn test_events_are_delivered_in_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offsets": [{ "partition": 0, "offset": 1 }]
        })))
        .mount(&mock_server)
        .await;

    let (publisher, worker) = AuditPublisher::spawn(
        Arc::new(create_transport(&mock_server)),
        "consulta-credito",
        8,
    );
    for parametro in ["1", "2", "3"] {
        publisher.publish_sucesso(TipoConsulta::ConsultaPorTipo, parametro, Some(0), 1, None, None);
    }
    drop(publisher);
    worker.await.unwrap();

    let parametros: Vec<String> = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["records"][0]["value"]["parametroConsulta"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(parametros, vec!["1", "2", "3"]);
}
