/// Query service tests against the in-memory store
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use rust_creditos_api::errors::AppError;
use rust_creditos_api::models::Credito;
use rust_creditos_api::repository::InMemoryCreditoRepository;
use rust_creditos_api::services::CreditoService;
use std::str::FromStr;
use std::sync::Arc;

fn dec(valor: &str) -> BigDecimal {
    BigDecimal::from_str(valor).unwrap()
}

fn credito(numero: &str, nfse: &str, data: (i32, u32, u32), tipo: &str, simples: bool) -> Credito {
    let created_at = NaiveDateTime::parse_from_str("2024-03-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    Credito {
        id: numero.parse().unwrap_or(0),
        numero_credito: numero.to_string(),
        numero_nfse: nfse.to_string(),
        data_constituicao: NaiveDate::from_ymd_opt(data.0, data.1, data.2).unwrap(),
        valor_issqn: dec("1500.75"),
        tipo_credito: tipo.to_string(),
        simples_nacional: simples,
        aliquota: dec("5.00"),
        valor_faturado: dec("30000.00"),
        valor_deducao: dec("5000.00"),
        base_calculo: dec("25000.00"),
        created_at,
        updated_at: created_at,
    }
}

fn fixture() -> (CreditoService, InMemoryCreditoRepository) {
    let repo = InMemoryCreditoRepository::with_creditos(vec![
        credito("123456", "7891011", (2024, 2, 25), "ISSQN", true),
        credito("789012", "7891011", (2024, 2, 26), "ISSQN", false),
        credito("654321", "1122334", (2024, 1, 15), "Outros", true),
    ]);
    (CreditoService::new(Arc::new(repo.clone())), repo)
}

#[tokio::test]
async fn test_document_lookup_is_newest_first() {
    let (service, _) = fixture();

    let creditos = service.buscar_creditos_por_nfse("7891011").await.unwrap();

    let numeros: Vec<&str> = creditos.iter().map(|c| c.numero_credito.as_str()).collect();
    assert_eq!(numeros, vec!["789012", "123456"]);
    assert!(creditos
        .windows(2)
        .all(|par| par[0].data_constituicao >= par[1].data_constituicao));
}

#[tokio::test]
async fn test_document_lookup_miss_is_not_found() {
    let (service, _) = fixture();

    let err = service.buscar_creditos_por_nfse("999999").await.unwrap_err();

    assert!(matches!(
        err,
        AppError::NotFound(msg) if msg == "Nenhum crédito encontrado para a NFS-e: 999999"
    ));
}

#[tokio::test]
async fn test_blank_document_is_rejected_before_store() {
    let (service, repo) = fixture();

    let err = service.buscar_creditos_por_nfse("   ").await.unwrap_err();

    assert!(matches!(
        err,
        AppError::InvalidArgument(msg) if msg == "Número da NFS-e não pode ser vazio ou nulo"
    ));
    assert_eq!(repo.consultas(), 0);
}

#[tokio::test]
async fn test_credit_number_lookup_renders_sim() {
    let (service, _) = fixture();

    let credito = service.buscar_credito_por_numero("123456").await.unwrap();

    assert_eq!(credito.numero_nfse, "7891011");
    assert_eq!(credito.simples_nacional, "Sim");
    assert_eq!(credito.valor_issqn, dec("1500.75"));
}

#[tokio::test]
async fn test_credit_number_miss_is_not_found() {
    let (service, _) = fixture();

    let err = service.buscar_credito_por_numero("999999").await.unwrap_err();

    assert!(matches!(
        err,
        AppError::NotFound(msg) if msg == "Crédito não encontrado com o número: 999999"
    ));
}

#[tokio::test]
async fn test_list_all_returns_every_record() {
    let (service, _) = fixture();

    assert_eq!(service.listar_todos_creditos().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_type_lookup_miss_is_empty_not_error() {
    let (service, _) = fixture();

    assert!(service
        .buscar_creditos_por_tipo("INEXISTENTE")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(service.buscar_creditos_por_tipo("Outros").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_type_lookup_blank_is_rejected() {
    let (service, _) = fixture();

    assert!(matches!(
        service.buscar_creditos_por_tipo("").await,
        Err(AppError::InvalidArgument(msg)) if msg == "Tipo do crédito não pode ser vazio ou nulo"
    ));
}

#[tokio::test]
async fn test_exists_blank_answers_false_without_query() {
    let (service, repo) = fixture();

    assert!(!service.existe_credito_por_numero("").await.unwrap());
    assert!(!service.existe_credito_por_numero("  ").await.unwrap());
    assert_eq!(repo.consultas(), 0);

    assert!(service.existe_credito_por_numero("123456").await.unwrap());
    assert!(!service.existe_credito_por_numero("999999").await.unwrap());
    assert_eq!(repo.consultas(), 2);
}

#[tokio::test]
async fn test_recent_limit_bounds() {
    let (service, repo) = fixture();

    for limite in [0, -1, 1001] {
        assert!(matches!(
            service.buscar_ultimos_creditos_constituidos(limite).await,
            Err(AppError::InvalidArgument(_))
        ));
    }
    assert_eq!(repo.consultas(), 0);

    assert_eq!(
        service
            .buscar_ultimos_creditos_constituidos(1000)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_recent_is_truncated_and_ordered() {
    let (service, _) = fixture();

    let creditos = service.buscar_ultimos_creditos_constituidos(2).await.unwrap();

    let numeros: Vec<&str> = creditos.iter().map(|c| c.numero_credito.as_str()).collect();
    assert_eq!(numeros, vec!["789012", "123456"]);
}

#[tokio::test]
async fn test_statistics_per_type() {
    let (service, _) = fixture();

    let estatisticas = service.estatisticas_por_tipo().await.unwrap();

    let issqn = estatisticas
        .iter()
        .find(|e| e.tipo_credito == "ISSQN")
        .unwrap();
    assert_eq!(issqn.quantidade, 2);
    assert_eq!(issqn.valor_total_issqn, dec("3001.50"));
}

#[tokio::test]
async fn test_inconsistent_values_listing() {
    let mut inconsistente = credito("111111", "5555555", (2024, 1, 1), "ISSQN", false);
    inconsistente.base_calculo = dec("1.00");
    let repo = InMemoryCreditoRepository::with_creditos(vec![
        credito("123456", "7891011", (2024, 2, 25), "ISSQN", true),
        inconsistente,
    ]);
    let service = CreditoService::new(Arc::new(repo));

    let creditos = service.creditos_com_valores_inconsistentes().await.unwrap();

    assert_eq!(creditos.len(), 1);
    assert_eq!(creditos[0].numero_credito, "111111");
}
