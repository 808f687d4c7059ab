use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{to_response_list, CreditoResponse, EstatisticaTipo};
use crate::repository::CreditoRepository;

/// Default `limite` of the recent-credits lookup.
pub const LIMITE_PADRAO: i32 = 10;
/// Largest `limite` accepted by the recent-credits lookup.
pub const LIMITE_MAXIMO: i32 = 1000;

/// Read-only credit lookups.
///
/// Validation failures are raised before the store is touched.
#[derive(Clone)]
pub struct CreditoService {
    repository: Arc<dyn CreditoRepository>,
}

impl CreditoService {
    pub fn new(repository: Arc<dyn CreditoRepository>) -> Self {
        Self { repository }
    }

    /// All credits backed by an NFS-e, newest first.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank number, `NotFound` when nothing matches.
    pub async fn buscar_creditos_por_nfse(
        &self,
        numero_nfse: &str,
    ) -> Result<Vec<CreditoResponse>, AppError> {
        tracing::info!("Buscando créditos para NFS-e: {}", numero_nfse);
        validar_parametro_nao_vazio(numero_nfse, "Número da NFS-e")?;

        let creditos = self.repository.find_by_numero_nfse(numero_nfse).await?;
        if creditos.is_empty() {
            tracing::warn!("Nenhum crédito encontrado para NFS-e: {}", numero_nfse);
            return Err(AppError::NotFound(format!(
                "Nenhum crédito encontrado para a NFS-e: {}",
                numero_nfse
            )));
        }

        tracing::info!(
            "Encontrados {} crédito(s) para NFS-e: {}",
            creditos.len(),
            numero_nfse
        );
        Ok(to_response_list(&creditos))
    }

    /// Exactly one credit by its number.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank number, `NotFound` when absent.
    pub async fn buscar_credito_por_numero(
        &self,
        numero_credito: &str,
    ) -> Result<CreditoResponse, AppError> {
        tracing::info!("Buscando crédito por número: {}", numero_credito);
        validar_parametro_nao_vazio(numero_credito, "Número do crédito")?;

        let credito = self
            .repository
            .find_by_numero_credito(numero_credito)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Crédito não encontrado com número: {}", numero_credito);
                AppError::NotFound(format!(
                    "Crédito não encontrado com o número: {}",
                    numero_credito
                ))
            })?;

        tracing::info!(
            "Crédito encontrado: {} - NFS-e: {}",
            numero_credito,
            credito.numero_nfse
        );
        Ok(CreditoResponse::from(&credito))
    }

    pub async fn listar_todos_creditos(&self) -> Result<Vec<CreditoResponse>, AppError> {
        tracing::info!("Listando todos os créditos");
        let creditos = self.repository.find_all().await?;
        tracing::info!("Total de créditos encontrados: {}", creditos.len());
        Ok(to_response_list(&creditos))
    }

    /// Credits of one type. An empty result is a valid answer, not `NotFound`.
    pub async fn buscar_creditos_por_tipo(
        &self,
        tipo_credito: &str,
    ) -> Result<Vec<CreditoResponse>, AppError> {
        tracing::info!("Buscando créditos por tipo: {}", tipo_credito);
        validar_parametro_nao_vazio(tipo_credito, "Tipo do crédito")?;

        let creditos = self.repository.find_by_tipo_credito(tipo_credito).await?;
        tracing::info!(
            "Encontrados {} crédito(s) do tipo: {}",
            creditos.len(),
            tipo_credito
        );
        Ok(to_response_list(&creditos))
    }

    /// Presence check. Blank input answers `false` without a store query.
    pub async fn existe_credito_por_numero(&self, numero_credito: &str) -> Result<bool, AppError> {
        tracing::debug!("Verificando existência do crédito: {}", numero_credito);
        if numero_credito.trim().is_empty() {
            return Ok(false);
        }

        let existe = self
            .repository
            .exists_by_numero_credito(numero_credito)
            .await?;
        tracing::debug!(
            "Crédito {} {}",
            numero_credito,
            if existe { "existe" } else { "não existe" }
        );
        Ok(existe)
    }

    /// The `limite` most recently constituted credits.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `0 < limite <= 1000`.
    pub async fn buscar_ultimos_creditos_constituidos(
        &self,
        limite: i32,
    ) -> Result<Vec<CreditoResponse>, AppError> {
        tracing::info!("Buscando últimos {} créditos constituídos", limite);
        validar_limite(limite)?;

        let creditos = self.repository.find_recentes(i64::from(limite)).await?;
        tracing::info!("Encontrados {} crédito(s) recentes", creditos.len());
        Ok(to_response_list(&creditos))
    }

    pub async fn estatisticas_por_tipo(&self) -> Result<Vec<EstatisticaTipo>, AppError> {
        self.repository.estatisticas_por_tipo().await
    }

    pub async fn creditos_com_valores_inconsistentes(
        &self,
    ) -> Result<Vec<CreditoResponse>, AppError> {
        let creditos = self.repository.find_valores_inconsistentes().await?;
        Ok(to_response_list(&creditos))
    }
}

fn validar_parametro_nao_vazio(parametro: &str, nome_parametro: &str) -> Result<(), AppError> {
    if parametro.trim().is_empty() {
        let mensagem = format!("{} não pode ser vazio ou nulo", nome_parametro);
        tracing::warn!("Validação falhou: {}", mensagem);
        return Err(AppError::InvalidArgument(mensagem));
    }
    Ok(())
}

fn validar_limite(limite: i32) -> Result<(), AppError> {
    let mensagem = if limite <= 0 {
        "Limite deve ser maior que zero"
    } else if limite > LIMITE_MAXIMO {
        "Limite não pode ser maior que 1000"
    } else {
        return Ok(());
    };
    tracing::warn!("Validação falhou: {}", mensagem);
    Err(AppError::InvalidArgument(mensagem.to_string()))
}
