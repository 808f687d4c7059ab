//! Credit record store: the async repository contract plus its PostgreSQL
//! and in-memory implementations.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::errors::{AppError, ResultExt};
use crate::models::{Credito, EstatisticaTipo, NovoCredito};

/// DDL for the `credito` table and its lookup indexes.
pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_create_credito.sql");

const COLUNAS: &str = "id, numero_credito, numero_nfse, data_constituicao, valor_issqn, \
     tipo_credito, simples_nacional, aliquota, valor_faturado, valor_deducao, \
     base_calculo, created_at, updated_at";

/// Read access to credit records.
#[async_trait]
pub trait CreditoRepository: Send + Sync {
    /// All credits backed by one NFS-e, newest constitution date first.
    async fn find_by_numero_nfse(&self, numero_nfse: &str) -> Result<Vec<Credito>, AppError>;

    async fn find_by_numero_credito(
        &self,
        numero_credito: &str,
    ) -> Result<Option<Credito>, AppError>;

    async fn find_all(&self) -> Result<Vec<Credito>, AppError>;

    async fn find_by_tipo_credito(&self, tipo_credito: &str) -> Result<Vec<Credito>, AppError>;

    async fn exists_by_numero_credito(&self, numero_credito: &str) -> Result<bool, AppError>;

    /// Up to `limite` credits ordered by constitution date then creation
    /// timestamp, both descending.
    async fn find_recentes(&self, limite: i64) -> Result<Vec<Credito>, AppError>;

    /// Count and ISSQN total per credit type, most frequent type first.
    async fn estatisticas_por_tipo(&self) -> Result<Vec<EstatisticaTipo>, AppError>;

    /// Credits whose calculation base differs from billed minus deductions.
    async fn find_valores_inconsistentes(&self) -> Result<Vec<Credito>, AppError>;
}

/// PostgreSQL-backed credit repository.
#[derive(Clone)]
pub struct PgCreditoRepository {
    pool: PgPool,
}

impl PgCreditoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the table and indexes when missing.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("Failed to apply credito schema")?;
        Ok(())
    }

    /// Inserts a record unless its credit number is already taken.
    ///
    /// Returns `true` when a row was written.
    pub async fn insert_if_absent(&self, credito: &NovoCredito) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO credito (
                numero_credito, numero_nfse, data_constituicao, valor_issqn,
                tipo_credito, simples_nacional, aliquota, valor_faturado,
                valor_deducao, base_calculo
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (numero_credito) DO NOTHING
            "#,
        )
        .bind(&credito.numero_credito)
        .bind(&credito.numero_nfse)
        .bind(credito.data_constituicao)
        .bind(&credito.valor_issqn)
        .bind(&credito.tipo_credito)
        .bind(credito.simples_nacional)
        .bind(&credito.aliquota)
        .bind(&credito.valor_faturado)
        .bind(&credito.valor_deducao)
        .bind(&credito.base_calculo)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert credito {}", credito.numero_credito))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CreditoRepository for PgCreditoRepository {
    async fn find_by_numero_nfse(&self, numero_nfse: &str) -> Result<Vec<Credito>, AppError> {
        sqlx::query_as::<_, Credito>(&format!(
            "SELECT {} FROM credito WHERE numero_nfse = $1 ORDER BY data_constituicao DESC",
            COLUNAS
        ))
        .bind(numero_nfse)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch creditos for NFS-e {}", numero_nfse))
    }

    async fn find_by_numero_credito(
        &self,
        numero_credito: &str,
    ) -> Result<Option<Credito>, AppError> {
        sqlx::query_as::<_, Credito>(&format!(
            "SELECT {} FROM credito WHERE numero_credito = $1",
            COLUNAS
        ))
        .bind(numero_credito)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch credito {}", numero_credito))
    }

    async fn find_all(&self) -> Result<Vec<Credito>, AppError> {
        sqlx::query_as::<_, Credito>(&format!("SELECT {} FROM credito ORDER BY id", COLUNAS))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list creditos")
    }

    async fn find_by_tipo_credito(&self, tipo_credito: &str) -> Result<Vec<Credito>, AppError> {
        sqlx::query_as::<_, Credito>(&format!(
            "SELECT {} FROM credito WHERE tipo_credito = $1 ORDER BY id",
            COLUNAS
        ))
        .bind(tipo_credito)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch creditos of type {}", tipo_credito))
    }

    async fn exists_by_numero_credito(&self, numero_credito: &str) -> Result<bool, AppError> {
        let (existe,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM credito WHERE numero_credito = $1)")
                .bind(numero_credito)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("Failed to check credito {}", numero_credito))?;
        Ok(existe)
    }

    async fn find_recentes(&self, limite: i64) -> Result<Vec<Credito>, AppError> {
        sqlx::query_as::<_, Credito>(&format!(
            "SELECT {} FROM credito ORDER BY data_constituicao DESC, created_at DESC LIMIT $1",
            COLUNAS
        ))
        .bind(limite)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent creditos")
    }

    async fn estatisticas_por_tipo(&self) -> Result<Vec<EstatisticaTipo>, AppError> {
        sqlx::query_as::<_, EstatisticaTipo>(
            r#"
            SELECT tipo_credito,
                   COUNT(*) AS quantidade,
                   COALESCE(SUM(valor_issqn), 0) AS valor_total_issqn
            FROM credito
            GROUP BY tipo_credito
            ORDER BY COUNT(*) DESC, tipo_credito
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate creditos by type")
    }

    async fn find_valores_inconsistentes(&self) -> Result<Vec<Credito>, AppError> {
        sqlx::query_as::<_, Credito>(&format!(
            "SELECT {} FROM credito \
             WHERE base_calculo <> (valor_faturado - valor_deducao) \
             ORDER BY data_constituicao DESC",
            COLUNAS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch inconsistent creditos")
    }
}

/// Thread-safe in-memory credit repository for tests and local runs.
///
/// Counts every query it serves so callers can assert that a lookup
/// never reached the store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCreditoRepository {
    creditos: Arc<RwLock<Vec<Credito>>>,
    consultas: Arc<AtomicUsize>,
}

impl InMemoryCreditoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_creditos(creditos: Vec<Credito>) -> Self {
        Self {
            creditos: Arc::new(RwLock::new(creditos)),
            consultas: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Adds a record, assigning the next surrogate id and current timestamps.
    ///
    /// Returns `false` when the credit number is already present.
    pub fn insert(&self, novo: NovoCredito) -> Result<bool, AppError> {
        let mut creditos = self
            .creditos
            .write()
            .map_err(|e| AppError::InternalError(format!("Credito store poisoned: {}", e)))?;
        if creditos.iter().any(|c| c.numero_credito == novo.numero_credito) {
            return Ok(false);
        }

        let id = creditos.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let agora = chrono::Local::now().naive_local();
        creditos.push(Credito {
            id,
            numero_credito: novo.numero_credito,
            numero_nfse: novo.numero_nfse,
            data_constituicao: novo.data_constituicao,
            valor_issqn: novo.valor_issqn,
            tipo_credito: novo.tipo_credito,
            simples_nacional: novo.simples_nacional,
            aliquota: novo.aliquota,
            valor_faturado: novo.valor_faturado,
            valor_deducao: novo.valor_deducao,
            base_calculo: novo.base_calculo,
            created_at: agora,
            updated_at: agora,
        });
        Ok(true)
    }

    /// Number of queries served so far.
    pub fn consultas(&self) -> usize {
        self.consultas.load(Ordering::SeqCst)
    }

    fn filtrar<F>(&self, filtro: F) -> Result<Vec<Credito>, AppError>
    where
        F: Fn(&Credito) -> bool,
    {
        self.consultas.fetch_add(1, Ordering::SeqCst);
        let creditos = self
            .creditos
            .read()
            .map_err(|e| AppError::InternalError(format!("Credito store poisoned: {}", e)))?;
        Ok(creditos.iter().filter(|&c| filtro(c)).cloned().collect())
    }
}

#[async_trait]
impl CreditoRepository for InMemoryCreditoRepository {
    async fn find_by_numero_nfse(&self, numero_nfse: &str) -> Result<Vec<Credito>, AppError> {
        let mut creditos = self.filtrar(|c| c.numero_nfse == numero_nfse)?;
        creditos.sort_by(|a, b| b.data_constituicao.cmp(&a.data_constituicao));
        Ok(creditos)
    }

    async fn find_by_numero_credito(
        &self,
        numero_credito: &str,
    ) -> Result<Option<Credito>, AppError> {
        Ok(self
            .filtrar(|c| c.numero_credito == numero_credito)?
            .into_iter()
            .next())
    }

    async fn find_all(&self) -> Result<Vec<Credito>, AppError> {
        self.filtrar(|_| true)
    }

    async fn find_by_tipo_credito(&self, tipo_credito: &str) -> Result<Vec<Credito>, AppError> {
        self.filtrar(|c| c.tipo_credito == tipo_credito)
    }

    async fn exists_by_numero_credito(&self, numero_credito: &str) -> Result<bool, AppError> {
        Ok(!self
            .filtrar(|c| c.numero_credito == numero_credito)?
            .is_empty())
    }

    async fn find_recentes(&self, limite: i64) -> Result<Vec<Credito>, AppError> {
        let mut creditos = self.filtrar(|_| true)?;
        creditos.sort_by(|a, b| {
            b.data_constituicao
                .cmp(&a.data_constituicao)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        creditos.truncate(usize::try_from(limite.max(0)).unwrap_or(usize::MAX));
        Ok(creditos)
    }

    async fn estatisticas_por_tipo(&self) -> Result<Vec<EstatisticaTipo>, AppError> {
        let mut estatisticas: Vec<EstatisticaTipo> = Vec::new();
        for credito in self.filtrar(|_| true)? {
            match estatisticas
                .iter_mut()
                .find(|e| e.tipo_credito == credito.tipo_credito)
            {
                Some(estatistica) => {
                    estatistica.quantidade += 1;
                    estatistica.valor_total_issqn += &credito.valor_issqn;
                }
                None => estatisticas.push(EstatisticaTipo {
                    tipo_credito: credito.tipo_credito.clone(),
                    quantidade: 1,
                    valor_total_issqn: credito.valor_issqn.clone(),
                }),
            }
        }
        estatisticas.sort_by(|a, b| {
            b.quantidade
                .cmp(&a.quantidade)
                .then_with(|| a.tipo_credito.cmp(&b.tipo_credito))
        });
        Ok(estatisticas)
    }

    async fn find_valores_inconsistentes(&self) -> Result<Vec<Credito>, AppError> {
        let mut creditos = self.filtrar(|c| !c.valores_consistentes())?;
        creditos.sort_by(|a, b| b.data_constituicao.cmp(&a.data_constituicao));
        Ok(creditos)
    }
}
