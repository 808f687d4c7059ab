use crate::audit::AuditPublisher;
use crate::config::Config;
use crate::errors::{ApiError, AppError, ValidationError};
use crate::extract::{Caminho, Consulta};
use crate::interceptor::{auditoria_middleware, QuantidadeResultados};
use crate::models::{formato_data_hora, CreditoResponse, RecentesParams};
use crate::services::{CreditoService, LIMITE_PADRAO};
use axum::{
    extract::{OriginalUri, State},
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Read-only credit lookups.
    pub service: CreditoService,
    /// Audit event publisher, also reported by the health probe.
    pub auditoria: AuditPublisher,
    /// Application configuration.
    pub config: Config,
}

type ListaCreditos = (Extension<QuantidadeResultados>, Json<Vec<CreditoResponse>>);

fn lista(creditos: Vec<CreditoResponse>) -> ListaCreditos {
    (Extension(QuantidadeResultados(creditos.len())), Json(creditos))
}

/// Rejects a blank path parameter before it reaches the service.
fn exigir_preenchido(campo: &str, valor: &str, mensagem: &str) -> Result<(), AppError> {
    if valor.trim().is_empty() {
        return Err(AppError::Validation(vec![ValidationError::new(
            campo, valor, mensagem,
        )]));
    }
    Ok(())
}

/// Parses `limite`, defaulting when absent or empty.
fn parse_limite(params: &RecentesParams) -> Result<i32, AppError> {
    match params.limite.as_deref().map(str::trim) {
        None | Some("") => Ok(LIMITE_PADRAO),
        Some(raw) => raw.parse().map_err(|_| {
            AppError::InvalidArgument("Parâmetro 'limite' deve ser do tipo int".to_string())
        }),
    }
}

/// GET /api/creditos/:numero_nfse
///
/// All credits backed by the given NFS-e, newest first. 404 when none.
pub async fn buscar_creditos_por_nfse(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Caminho(numero_nfse): Caminho<String>,
) -> Result<ListaCreditos, ApiError> {
    tracing::info!("GET /api/creditos/{}", numero_nfse);

    exigir_preenchido("numeroNfse", &numero_nfse, "Número da NFS-e é obrigatório")
        .map_err(|e| e.at(uri.path()))?;
    let creditos = state
        .service
        .buscar_creditos_por_nfse(&numero_nfse)
        .await
        .map_err(|e| e.at(uri.path()))?;

    Ok(lista(creditos))
}

/// GET /api/creditos/credito/:numero_credito
pub async fn buscar_credito_por_numero(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Caminho(numero_credito): Caminho<String>,
) -> Result<(Extension<QuantidadeResultados>, Json<CreditoResponse>), ApiError> {
    tracing::info!("GET /api/creditos/credito/{}", numero_credito);

    exigir_preenchido(
        "numeroCredito",
        &numero_credito,
        "Número do crédito é obrigatório",
    )
    .map_err(|e| e.at(uri.path()))?;
    let credito = state
        .service
        .buscar_credito_por_numero(&numero_credito)
        .await
        .map_err(|e| e.at(uri.path()))?;

    Ok((Extension(QuantidadeResultados(1)), Json(credito)))
}

/// GET /api/creditos
pub async fn listar_todos_creditos(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
) -> Result<ListaCreditos, ApiError> {
    tracing::info!("GET /api/creditos");

    let creditos = state
        .service
        .listar_todos_creditos()
        .await
        .map_err(|e| e.at(uri.path()))?;

    Ok(lista(creditos))
}

/// GET /api/creditos/tipo/:tipo
///
/// An unknown type answers `[]`.
pub async fn buscar_creditos_por_tipo(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Caminho(tipo): Caminho<String>,
) -> Result<ListaCreditos, ApiError> {
    tracing::info!("GET /api/creditos/tipo/{}", tipo);

    exigir_preenchido("tipo", &tipo, "Tipo do crédito é obrigatório")
        .map_err(|e| e.at(uri.path()))?;
    let creditos = state
        .service
        .buscar_creditos_por_tipo(&tipo)
        .await
        .map_err(|e| e.at(uri.path()))?;

    Ok(lista(creditos))
}

/// GET /api/creditos/recentes?limite=N
pub async fn buscar_creditos_recentes(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Consulta(params): Consulta<RecentesParams>,
) -> Result<ListaCreditos, ApiError> {
    tracing::info!("GET /api/creditos/recentes - params: {:?}", params);

    let limite = parse_limite(&params).map_err(|e| e.at(uri.path()))?;
    let creditos = state
        .service
        .buscar_ultimos_creditos_constituidos(limite)
        .await
        .map_err(|e| e.at(uri.path()))?;

    Ok(lista(creditos))
}

/// GET /api/creditos/credito/:numero_credito/existe
///
/// Answers a bare JSON boolean.
pub async fn verificar_existencia_credito(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Caminho(numero_credito): Caminho<String>,
) -> Result<Json<bool>, ApiError> {
    tracing::info!("GET /api/creditos/credito/{}/existe", numero_credito);

    exigir_preenchido(
        "numeroCredito",
        &numero_credito,
        "Número do crédito é obrigatório",
    )
    .map_err(|e| e.at(uri.path()))?;
    let existe = state
        .service
        .existe_credito_por_numero(&numero_credito)
        .await
        .map_err(|e| e.at(uri.path()))?;

    Ok(Json(existe))
}

/// Health check endpoint.
///
/// Always 200 while the process serves requests; the audit publisher's
/// liveness is reported alongside.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    tracing::debug!("Health check solicitado");
    let agora = chrono::Local::now().naive_local();

    (
        StatusCode::OK,
        Json(json!({
            "status": "UP",
            "timestamp": agora.format(formato_data_hora::FORMATO).to_string(),
            "application": state.config.app_name,
            "version": state.config.app_version,
            "auditoria": {
                "healthy": state.auditoria.is_healthy(),
                "status": state.auditoria.status(),
            }
        })),
    )
}

pub async fn info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    tracing::debug!("Informações da aplicação solicitadas");

    Json(json!({
        "application": {
            "name": state.config.app_name,
            "version": state.config.app_version,
            "description": "API RESTful para consulta de créditos constituídos"
        },
        "endpoints": {
            "creditos_por_nfse": "/api/creditos/{numeroNfse}",
            "credito_por_numero": "/api/creditos/credito/{numeroCredito}",
            "todos_creditos": "/api/creditos",
            "creditos_por_tipo": "/api/creditos/tipo/{tipo}",
            "creditos_recentes": "/api/creditos/recentes",
            "verificar_existencia": "/api/creditos/credito/{numeroCredito}/existe"
        }
    }))
}

pub async fn ping() -> &'static str {
    "pong"
}

/// Builds the full router. Only `/api/creditos` routes are audited.
pub fn router(state: Arc<AppState>) -> Router {
    let creditos = Router::new()
        .route("/api/creditos", get(listar_todos_creditos))
        .route("/api/creditos/recentes", get(buscar_creditos_recentes))
        .route("/api/creditos/:numero_nfse", get(buscar_creditos_por_nfse))
        .route("/api/creditos/tipo/:tipo", get(buscar_creditos_por_tipo))
        .route(
            "/api/creditos/credito/:numero_credito",
            get(buscar_credito_por_numero),
        )
        .route(
            "/api/creditos/credito/:numero_credito/existe",
            get(verificar_existencia_credito),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auditoria.clone(),
            auditoria_middleware,
        ));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/info", get(info))
        .route("/api/ping", get(ping))
        .merge(creditos)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limite() {
        let params = |v: Option<&str>| RecentesParams {
            limite: v.map(str::to_string),
        };

        assert_eq!(parse_limite(&params(None)).unwrap(), LIMITE_PADRAO);
        assert_eq!(parse_limite(&params(Some(""))).unwrap(), LIMITE_PADRAO);
        assert_eq!(parse_limite(&params(Some("5"))).unwrap(), 5);
        assert_eq!(parse_limite(&params(Some("-1"))).unwrap(), -1);
        assert!(matches!(
            parse_limite(&params(Some("abc"))),
            Err(AppError::InvalidArgument(msg)) if msg == "Parâmetro 'limite' deve ser do tipo int"
        ));
    }

    #[test]
    fn test_blank_path_parameter_is_field_violation() {
        let err = exigir_preenchido("tipo", "  ", "Tipo do crédito é obrigatório").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.audit_message(), "tipo: Tipo do crédito é obrigatório");
        assert!(exigir_preenchido("tipo", "ISSQN", "x").is_ok());
    }
}
