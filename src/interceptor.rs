//! Request interceptor that audits every credit query.
//!
//! Classification happens before the handler runs and is carried in a
//! per-request [`ConsultaContext`]; the outcome is published once the
//! response is ready.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use regex::Regex;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;

use crate::audit::{AuditPublisher, TipoConsulta};
use crate::errors::FalhaConsulta;
use crate::services::LIMITE_PADRAO;

const PREFIXO_CREDITOS: &str = "/api/creditos";

/// Number of results a successful query returned, attached to the response
/// by handlers that know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantidadeResultados(pub usize);

/// What the interceptor learned about a request before it was handled.
#[derive(Debug, Clone)]
pub struct ConsultaContext {
    pub inicio: Instant,
    pub tipo: TipoConsulta,
    pub parametro: String,
}

impl ConsultaContext {
    /// Classifies a request. `None` for paths outside `/api/creditos`.
    pub fn iniciar(path: &str, method: &Method, query: Option<&str>) -> Option<Self> {
        if !path.starts_with(PREFIXO_CREDITOS) {
            return None;
        }

        let tipo = identificar_tipo_consulta(path, method);
        let parametro = extrair_parametro_consulta(path, query);
        tracing::debug!(
            "Iniciando auditoria para consulta: {:?} - Parâmetro: {}",
            tipo,
            parametro
        );

        Some(Self {
            inicio: Instant::now(),
            tipo,
            parametro,
        })
    }

    pub fn tempo_execucao_ms(&self) -> i64 {
        i64::try_from(self.inicio.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

struct Padroes {
    nfse: Regex,
    numero_credito: Regex,
    tipo: Regex,
    existe: Regex,
}

fn padroes() -> &'static Padroes {
    static PADROES: OnceLock<Padroes> = OnceLock::new();
    PADROES.get_or_init(|| Padroes {
        nfse: Regex::new(r"^/api/creditos/\d+$").unwrap(),
        numero_credito: Regex::new(r"^/api/creditos/credito/[^/]+$").unwrap(),
        tipo: Regex::new(r"^/api/creditos/tipo/[^/]+$").unwrap(),
        existe: Regex::new(r"^/api/creditos/credito/[^/]+/existe$").unwrap(),
    })
}

/// Maps a request path to the kind of query it performs.
///
/// Unrecognized paths fall back to [`TipoConsulta::ListarTodos`].
pub fn identificar_tipo_consulta(path: &str, method: &Method) -> TipoConsulta {
    let p = padroes();
    if p.nfse.is_match(path) {
        TipoConsulta::ConsultaPorNfse
    } else if p.numero_credito.is_match(path) {
        TipoConsulta::ConsultaPorNumeroCredito
    } else if path == PREFIXO_CREDITOS && *method == Method::GET {
        TipoConsulta::ListarTodos
    } else if p.tipo.is_match(path) {
        TipoConsulta::ConsultaPorTipo
    } else if path == "/api/creditos/recentes" {
        TipoConsulta::ConsultaRecentes
    } else if p.existe.is_match(path) {
        TipoConsulta::VerificarExistencia
    } else {
        TipoConsulta::ListarTodos
    }
}

/// The value being looked up, as recorded on the audit event.
pub fn extrair_parametro_consulta(path: &str, query: Option<&str>) -> String {
    let p = padroes();
    let segmentos: Vec<&str> = path.split('/').collect();

    if p.nfse.is_match(path) || p.numero_credito.is_match(path) || p.tipo.is_match(path) {
        segmentos.last().copied().unwrap_or_default().to_string()
    } else if path == "/api/creditos/recentes" {
        let limite = query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "limite")
                .map(|(_, v)| v.into_owned())
        });
        format!(
            "limite={}",
            limite.unwrap_or_else(|| LIMITE_PADRAO.to_string())
        )
    } else if p.existe.is_match(path) {
        segmentos
            .iter()
            .rev()
            .nth(1)
            .copied()
            .unwrap_or_default()
            .to_string()
    } else {
        "N/A".to_string()
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer.
pub fn obter_endereco_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header_str("x-forwarded-for") {
        return forwarded.split(',').next().map(|ip| ip.trim().to_string());
    }
    if let Some(real_ip) = header_str("x-real-ip") {
        return Some(real_ip.to_string());
    }
    peer.map(|addr| addr.ip().to_string())
}

/// Audits the request: success for status < 400, failure otherwise.
pub async fn auditoria_middleware(
    State(auditoria): State<AuditPublisher>,
    req: Request,
    next: Next,
) -> Response {
    let contexto = ConsultaContext::iniciar(req.uri().path(), req.method(), req.uri().query());
    let Some(contexto) = contexto else {
        return next.run(req).await;
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let endereco_ip = obter_endereco_ip(req.headers(), peer);
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(req).await;
    let tempo_ms = contexto.tempo_execucao_ms();
    let status = response.status();

    if status.as_u16() >= 400 {
        let mensagem = response
            .extensions()
            .get::<FalhaConsulta>()
            .map(|FalhaConsulta(msg)| msg.clone())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        auditoria.publish_falha(
            contexto.tipo,
            contexto.parametro,
            mensagem,
            tempo_ms,
            endereco_ip,
            user_agent,
        );
    } else {
        let quantidade = response
            .extensions()
            .get::<QuantidadeResultados>()
            .map(|QuantidadeResultados(n)| i64::try_from(*n).unwrap_or(i64::MAX));
        auditoria.publish_sucesso(
            contexto.tipo,
            contexto.parametro,
            quantidade,
            tempo_ms,
            endereco_ip,
            user_agent,
        );
    }

    tracing::debug!(
        "Auditoria concluída para consulta: {:?} - Tempo: {}ms",
        contexto.tipo,
        tempo_ms
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use proptest::prelude::*;

    #[test]
    fn test_classifies_known_paths() {
        let get = Method::GET;
        assert_eq!(
            identificar_tipo_consulta("/api/creditos/7891011", &get),
            TipoConsulta::ConsultaPorNfse
        );
        assert_eq!(
            identificar_tipo_consulta("/api/creditos/credito/123456", &get),
            TipoConsulta::ConsultaPorNumeroCredito
        );
        assert_eq!(
            identificar_tipo_consulta("/api/creditos", &get),
            TipoConsulta::ListarTodos
        );
        assert_eq!(
            identificar_tipo_consulta("/api/creditos/tipo/ISSQN", &get),
            TipoConsulta::ConsultaPorTipo
        );
        assert_eq!(
            identificar_tipo_consulta("/api/creditos/recentes", &get),
            TipoConsulta::ConsultaRecentes
        );
        assert_eq!(
            identificar_tipo_consulta("/api/creditos/credito/123456/existe", &get),
            TipoConsulta::VerificarExistencia
        );
        assert_eq!(
            identificar_tipo_consulta("/api/creditos/abc", &get),
            TipoConsulta::ListarTodos
        );
    }

    #[test]
    fn test_extracts_parameters() {
        assert_eq!(extrair_parametro_consulta("/api/creditos/7891011", None), "7891011");
        assert_eq!(
            extrair_parametro_consulta("/api/creditos/credito/123456/existe", None),
            "123456"
        );
        assert_eq!(
            extrair_parametro_consulta("/api/creditos/recentes", Some("limite=5")),
            "limite=5"
        );
        assert_eq!(
            extrair_parametro_consulta("/api/creditos/recentes", None),
            "limite=10"
        );
        assert_eq!(extrair_parametro_consulta("/api/creditos", None), "N/A");
    }

    #[test]
    fn test_outside_prefix_is_not_audited() {
        assert!(ConsultaContext::iniciar("/api/health", &Method::GET, None).is_none());
    }

    #[test]
    fn test_ip_resolution_order() {
        let peer: SocketAddr = "192.168.0.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(
            obter_endereco_ip(&headers, Some(peer)).as_deref(),
            Some("192.168.0.9")
        );

        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(obter_endereco_ip(&headers, Some(peer)).as_deref(), Some("10.1.1.1"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(
            obter_endereco_ip(&headers, Some(peer)).as_deref(),
            Some("203.0.113.7")
        );
    }

    proptest! {
        #[test]
        fn nfse_digits_always_classify_as_nfse(numero in "[0-9]{1,15}") {
            let path = format!("/api/creditos/{}", numero);
            prop_assert_eq!(identificar_tipo_consulta(&path, &Method::GET), TipoConsulta::ConsultaPorNfse);
            prop_assert_eq!(extrair_parametro_consulta(&path, None), numero);
        }

        #[test]
        fn existe_parameter_is_second_to_last_segment(numero in "[A-Za-z0-9]{1,20}") {
            let path = format!("/api/creditos/credito/{}/existe", numero);
            prop_assert_eq!(identificar_tipo_consulta(&path, &Method::GET), TipoConsulta::VerificarExistencia);
            prop_assert_eq!(extrair_parametro_consulta(&path, None), numero);
        }
    }
}
