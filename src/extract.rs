//! Path and query extractors whose rejections use the JSON error envelope.

use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri, Path, Query},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::errors::{ApiError, AppError};

fn caminho_da_requisicao(parts: &Parts) -> String {
    parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string())
}

/// [`Path`] that rejects with a 400 envelope instead of plain text.
#[derive(Debug)]
pub struct Caminho<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Caminho<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(valor)) => Ok(Caminho(valor)),
            Err(rejection) => Err(AppError::InvalidArgument(rejection.body_text())
                .at(caminho_da_requisicao(parts))),
        }
    }
}

/// [`Query`] that rejects with a 400 envelope instead of plain text.
#[derive(Debug)]
pub struct Consulta<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Consulta<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(valor)) => Ok(Consulta(valor)),
            Err(rejection) => Err(AppError::InvalidArgument(rejection.body_text())
                .at(caminho_da_requisicao(parts))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecentesParams;
    use axum::http::Request;

    #[tokio::test]
    async fn test_duplicated_query_key_is_invalid_argument() {
        let (mut parts, _) = Request::builder()
            .uri("/api/creditos/recentes?limite=1&limite=2")
            .body(())
            .unwrap()
            .into_parts();

        let err = Consulta::<RecentesParams>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();

        assert!(matches!(err.error, AppError::InvalidArgument(_)));
        assert_eq!(err.path, "/api/creditos/recentes");
    }

    #[tokio::test]
    async fn test_well_formed_query_is_extracted() {
        let (mut parts, _) = Request::builder()
            .uri("/api/creditos/recentes?limite=5")
            .body(())
            .unwrap()
            .into_parts();

        let Consulta(params) = Consulta::<RecentesParams>::from_request_parts(&mut parts, &())
            .await
            .unwrap();

        assert_eq!(params.limite.as_deref(), Some("5"));
    }
}
