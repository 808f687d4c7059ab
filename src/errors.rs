use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message returned to clients for any unclassified failure.
pub const GENERIC_ERROR_MESSAGE: &str = "Erro interno do servidor. Tente novamente mais tarde.";

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Credit record or document absent.
    NotFound(String),
    /// Bad limit, blank required parameter or mistyped query parameter.
    InvalidArgument(String),
    /// Field-level constraint violations on path/query parameters.
    Validation(Vec<ValidationError>),
    /// Error interacting with an external API (the audit bus).
    ExternalApiError(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

/// A single rejected field inside an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field: String,
    pub rejected_value: serde_json::Value,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        rejected_value: impl Into<serde_json::Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            rejected_value: rejected_value.into(),
            message: message.into(),
        }
    }
}

/// Error envelope shared by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(with = "crate::models::formato_data_hora")]
    pub timestamp: NaiveDateTime,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub validation_errors: Option<Vec<ValidationError>>,
}

/// Failure message attached to an error response so the audit
/// interceptor can report what went wrong.
#[derive(Debug, Clone)]
pub struct FalhaConsulta(pub String);

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            AppError::Validation(errors) => write!(f, "Validation failed: {}", join_violations(errors)),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

fn join_violations(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    /// Strips `WithContext` wrappers down to the classified error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.root() {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to callers. Unclassified errors are redacted.
    pub fn public_message(&self) -> String {
        match self.root() {
            AppError::NotFound(msg) | AppError::InvalidArgument(msg) => msg.clone(),
            AppError::Validation(_) => "Erro de validação de constraints".to_string(),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    /// Message recorded on the audit event for a failed query.
    pub fn audit_message(&self) -> String {
        match self.root() {
            AppError::Validation(errors) => join_violations(errors),
            _ => self.public_message(),
        }
    }

    pub fn to_error_response(&self, path: &str) -> ErrorResponse {
        let error = match self.root() {
            AppError::NotFound(_) => "Not Found",
            AppError::InvalidArgument(_) => "Bad Request",
            AppError::Validation(_) => "Constraint Violation",
            _ => "Internal Server Error",
        };
        let validation_errors = match self.root() {
            AppError::Validation(errors) => Some(errors.clone()),
            _ => None,
        };

        ErrorResponse {
            timestamp: chrono::Local::now().naive_local(),
            status: self.status().as_u16(),
            error: error.to_string(),
            message: self.public_message(),
            path: path.to_string(),
            validation_errors,
        }
    }

    /// Binds the error to the request path it occurred on.
    pub fn at(self, path: impl Into<String>) -> ApiError {
        ApiError {
            error: self,
            path: path.into(),
        }
    }
}

/// An [`AppError`] paired with the path of the failing request.
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub path: String,
}

impl IntoResponse for ApiError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        match &self.error {
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
            }
            AppError::DatabaseError(e) => tracing::error!("Database error: {:?}", e),
            AppError::ExternalApiError(msg) => tracing::error!("External API error: {}", msg),
            AppError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
            AppError::NotFound(msg) => tracing::warn!("Crédito não encontrado: {}", msg),
            AppError::InvalidArgument(msg) => tracing::warn!("Argumento inválido: {}", msg),
            AppError::Validation(errors) => {
                tracing::warn!("Erro de constraint: {}", join_violations(errors))
            }
        }

        let status = self.error.status();
        let body = self.error.to_error_response(&self.path);
        let mut response = (status, Json(body)).into_response();
        response
            .extensions_mut()
            .insert(FalhaConsulta(self.error.audit_message()));
        response
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}
