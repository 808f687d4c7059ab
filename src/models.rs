use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::ValidationError;

/// Maximum length of the textual keys and the credit type.
pub const TAMANHO_MAXIMO_TEXTO: usize = 50;

// ============ Database Models ============

/// A constituted credit, one row of the `credito` table.
///
/// Equality and hashing use the credit number (the business key), never
/// the surrogate id.
#[derive(Debug, Clone, FromRow)]
pub struct Credito {
    /// Store-assigned surrogate key. Never exposed to clients.
    pub id: i64,
    /// Unique credit number.
    pub numero_credito: String,
    /// NFS-e number. One document can back several credits.
    pub numero_nfse: String,
    /// Constitution date. Never in the future.
    pub data_constituicao: NaiveDate,
    /// ISSQN amount.
    pub valor_issqn: BigDecimal,
    /// Free-form credit category, e.g. "ISSQN".
    pub tipo_credito: String,
    /// Simples Nacional opt-in.
    pub simples_nacional: bool,
    /// Tax rate in percent.
    pub aliquota: BigDecimal,
    pub valor_faturado: BigDecimal,
    pub valor_deducao: BigDecimal,
    /// Expected to equal `valor_faturado - valor_deducao`; not enforced by the store.
    pub base_calculo: BigDecimal,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PartialEq for Credito {
    fn eq(&self, other: &Self) -> bool {
        self.numero_credito == other.numero_credito
    }
}

impl Eq for Credito {}

impl std::hash::Hash for Credito {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.numero_credito.hash(state);
    }
}

impl Credito {
    pub fn is_issqn(&self) -> bool {
        self.tipo_credito.eq_ignore_ascii_case("ISSQN")
    }

    /// Billed amount minus deductions.
    pub fn valor_liquido(&self) -> BigDecimal {
        &self.valor_faturado - &self.valor_deducao
    }

    pub fn valores_consistentes(&self) -> bool {
        self.base_calculo == self.valor_liquido()
    }
}

/// Aggregate of the credits sharing one type.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstatisticaTipo {
    pub tipo_credito: String,
    pub quantidade: i64,
    #[serde(with = "bigdecimal::serde::json_num")]
    pub valor_total_issqn: BigDecimal,
}

/// A credit record about to be written by the seeding tool.
#[derive(Debug, Clone, PartialEq)]
pub struct NovoCredito {
    pub numero_credito: String,
    pub numero_nfse: String,
    pub data_constituicao: NaiveDate,
    pub valor_issqn: BigDecimal,
    pub tipo_credito: String,
    pub simples_nacional: bool,
    pub aliquota: BigDecimal,
    pub valor_faturado: BigDecimal,
    pub valor_deducao: BigDecimal,
    pub base_calculo: BigDecimal,
}

impl NovoCredito {
    /// Checks every field constraint of a credit record.
    ///
    /// `hoje` is the reference date for the "not in the future" rule.
    /// Returns all violations found, empty when the record is valid.
    pub fn validate(&self, hoje: NaiveDate) -> Vec<ValidationError> {
        let mut erros = Vec::new();

        validar_texto(
            &mut erros,
            "numeroCredito",
            &self.numero_credito,
            "Número do crédito",
        );
        validar_texto(&mut erros, "numeroNfse", &self.numero_nfse, "Número da NFS-e");
        validar_texto(&mut erros, "tipoCredito", &self.tipo_credito, "Tipo do crédito");

        if self.data_constituicao > hoje {
            erros.push(ValidationError::new(
                "dataConstituicao",
                self.data_constituicao.to_string(),
                "Data de constituição não pode ser futura",
            ));
        }

        validar_positivo(&mut erros, "valorIssqn", &self.valor_issqn, "Valor do ISSQN");
        validar_digitos(&mut erros, "valorIssqn", &self.valor_issqn, 13, "Valor do ISSQN");

        validar_positivo(&mut erros, "aliquota", &self.aliquota, "Alíquota");
        if self.aliquota > BigDecimal::from(100) {
            erros.push(ValidationError::new(
                "aliquota",
                self.aliquota.to_string(),
                "Alíquota não pode ser superior a 100%",
            ));
        }
        validar_digitos(&mut erros, "aliquota", &self.aliquota, 3, "Alíquota");

        validar_positivo(&mut erros, "valorFaturado", &self.valor_faturado, "Valor faturado");
        validar_digitos(&mut erros, "valorFaturado", &self.valor_faturado, 13, "Valor faturado");

        if self.valor_deducao < BigDecimal::from(0) {
            erros.push(ValidationError::new(
                "valorDeducao",
                self.valor_deducao.to_string(),
                "Valor de dedução não pode ser negativo",
            ));
        }
        validar_digitos(&mut erros, "valorDeducao", &self.valor_deducao, 13, "Valor de dedução");

        validar_positivo(&mut erros, "baseCalculo", &self.base_calculo, "Base de cálculo");
        validar_digitos(&mut erros, "baseCalculo", &self.base_calculo, 13, "Base de cálculo");

        erros
    }

    pub fn valores_consistentes(&self) -> bool {
        self.base_calculo == &self.valor_faturado - &self.valor_deducao
    }
}

fn validar_texto(erros: &mut Vec<ValidationError>, campo: &str, valor: &str, nome: &str) {
    if valor.trim().is_empty() {
        erros.push(ValidationError::new(
            campo,
            valor,
            format!("{} é obrigatório", nome),
        ));
    } else if valor.chars().count() > TAMANHO_MAXIMO_TEXTO {
        erros.push(ValidationError::new(
            campo,
            valor,
            format!(
                "{} deve ter no máximo {} caracteres",
                nome, TAMANHO_MAXIMO_TEXTO
            ),
        ));
    }
}

fn validar_positivo(erros: &mut Vec<ValidationError>, campo: &str, valor: &BigDecimal, nome: &str) {
    if *valor <= BigDecimal::from(0) {
        erros.push(ValidationError::new(
            campo,
            valor.to_string(),
            format!("{} deve ser positivo", nome),
        ));
    }
}

/// Rejects values with more than `max_inteiros` integer digits or more
/// than two fractional digits. Trailing fractional zeros do not count.
fn validar_digitos(
    erros: &mut Vec<ValidationError>,
    campo: &str,
    valor: &BigDecimal,
    max_inteiros: i64,
    nome: &str,
) {
    let (mantissa, escala) = valor.normalized().as_bigint_and_exponent();
    let digitos = mantissa.magnitude().to_string().len() as i64;
    let inteiros = (digitos - escala).max(0);
    let fracionarios = escala.max(0);

    if inteiros > max_inteiros || fracionarios > 2 {
        erros.push(ValidationError::new(
            campo,
            valor.to_string(),
            format!(
                "{} deve ter no máximo {} dígitos inteiros e 2 decimais",
                nome, max_inteiros
            ),
        ));
    }
}

// ============ API Models ============

/// Outward representation of a credit record.
///
/// Amounts go out as JSON numbers carrying their stored scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditoResponse {
    pub numero_credito: String,
    pub numero_nfse: String,
    pub data_constituicao: NaiveDate,
    #[serde(with = "bigdecimal::serde::json_num")]
    pub valor_issqn: BigDecimal,
    pub tipo_credito: String,
    /// "Sim" or "Não".
    pub simples_nacional: String,
    #[serde(with = "bigdecimal::serde::json_num")]
    pub aliquota: BigDecimal,
    #[serde(with = "bigdecimal::serde::json_num")]
    pub valor_faturado: BigDecimal,
    #[serde(with = "bigdecimal::serde::json_num")]
    pub valor_deducao: BigDecimal,
    #[serde(with = "bigdecimal::serde::json_num")]
    pub base_calculo: BigDecimal,
}

pub const SIMPLES_NACIONAL_SIM: &str = "Sim";
pub const SIMPLES_NACIONAL_NAO: &str = "Não";

/// Renders the Simples Nacional flag. Absent counts as "Não".
pub fn formatar_simples_nacional(simples_nacional: Option<bool>) -> &'static str {
    if simples_nacional == Some(true) {
        SIMPLES_NACIONAL_SIM
    } else {
        SIMPLES_NACIONAL_NAO
    }
}

/// Parses the rendered flag back. Only a case-insensitive "sim" is true.
pub fn parse_simples_nacional(simples_nacional: Option<&str>) -> bool {
    simples_nacional
        .map(|s| s.trim().eq_ignore_ascii_case(SIMPLES_NACIONAL_SIM))
        .unwrap_or(false)
}

impl From<&Credito> for CreditoResponse {
    fn from(credito: &Credito) -> Self {
        Self {
            numero_credito: credito.numero_credito.clone(),
            numero_nfse: credito.numero_nfse.clone(),
            data_constituicao: credito.data_constituicao,
            valor_issqn: credito.valor_issqn.clone(),
            tipo_credito: credito.tipo_credito.clone(),
            simples_nacional: formatar_simples_nacional(Some(credito.simples_nacional)).to_string(),
            aliquota: credito.aliquota.clone(),
            valor_faturado: credito.valor_faturado.clone(),
            valor_deducao: credito.valor_deducao.clone(),
            base_calculo: credito.base_calculo.clone(),
        }
    }
}

impl From<CreditoResponse> for NovoCredito {
    fn from(response: CreditoResponse) -> Self {
        Self {
            simples_nacional: parse_simples_nacional(Some(&response.simples_nacional)),
            numero_credito: response.numero_credito,
            numero_nfse: response.numero_nfse,
            data_constituicao: response.data_constituicao,
            valor_issqn: response.valor_issqn,
            tipo_credito: response.tipo_credito,
            aliquota: response.aliquota,
            valor_faturado: response.valor_faturado,
            valor_deducao: response.valor_deducao,
            base_calculo: response.base_calculo,
        }
    }
}

pub fn to_response_list(creditos: &[Credito]) -> Vec<CreditoResponse> {
    creditos.iter().map(CreditoResponse::from).collect()
}

/// Query string of `GET /api/creditos/recentes`. Parsed by hand so a
/// mistyped value maps onto the API's own error envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentesParams {
    pub limite: Option<String>,
}

/// `yyyy-MM-ddTHH:mm:ss` timestamps used on the wire.
pub mod formato_data_hora {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMATO: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S>(valor: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&valor.format(FORMATO).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMATO).map_err(serde::de::Error::custom)
    }
}
