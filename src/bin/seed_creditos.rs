//! Loads credit records from a JSON file into the `credito` table.
//!
//! Usage: `seed-creditos [path]` (defaults to `data/creditos.json`).

use rust_creditos_api::{
    config::Config,
    db::Database,
    models::{CreditoResponse, NovoCredito},
    repository::PgCreditoRepository,
    services::CreditoService,
};
use std::sync::Arc;

const ARQUIVO_PADRAO: &str = "data/creditos.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let caminho = std::env::args()
        .nth(1)
        .unwrap_or_else(|| ARQUIVO_PADRAO.to_string());
    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    let repository = PgCreditoRepository::new(db.pool.clone());

    repository.ensure_schema().await?;
    tracing::info!("Schema da tabela credito verificado");

    let conteudo = tokio::fs::read_to_string(&caminho)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", caminho, e))?;
    let registros: Vec<CreditoResponse> = serde_json::from_str(&conteudo)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", caminho, e))?;
    tracing::info!("{} registro(s) lidos de {}", registros.len(), caminho);

    let hoje = chrono::Local::now().date_naive();
    let (mut inseridos, mut duplicados, mut rejeitados) = (0, 0, 0);

    for registro in registros {
        let novo = NovoCredito::from(registro);
        let erros = novo.validate(hoje);
        if !erros.is_empty() {
            for erro in &erros {
                tracing::error!(
                    "Crédito {} rejeitado - {}: {}",
                    novo.numero_credito,
                    erro.field,
                    erro.message
                );
            }
            rejeitados += 1;
            continue;
        }

        if !novo.valores_consistentes() {
            tracing::warn!(
                "Crédito {} com base de cálculo inconsistente: {} != {} - {}",
                novo.numero_credito,
                novo.base_calculo,
                novo.valor_faturado,
                novo.valor_deducao
            );
        }

        if repository.insert_if_absent(&novo).await? {
            inseridos += 1;
        } else {
            tracing::info!("Crédito {} já existe, ignorado", novo.numero_credito);
            duplicados += 1;
        }
    }

    tracing::info!(
        "Carga concluída: {} inserido(s), {} duplicado(s), {} rejeitado(s)",
        inseridos,
        duplicados,
        rejeitados
    );

    let service = CreditoService::new(Arc::new(repository));
    for estatistica in service.estatisticas_por_tipo().await? {
        tracing::info!(
            "Tipo {}: {} crédito(s), ISSQN total {}",
            estatistica.tipo_credito,
            estatistica.quantidade,
            estatistica.valor_total_issqn
        );
    }
    let inconsistentes = service.creditos_com_valores_inconsistentes().await?;
    if !inconsistentes.is_empty() {
        tracing::warn!(
            "{} crédito(s) armazenados com valores inconsistentes: {:?}",
            inconsistentes.len(),
            inconsistentes
                .iter()
                .map(|c| c.numero_credito.as_str())
                .collect::<Vec<_>>()
        );
    }

    Ok(())
}
