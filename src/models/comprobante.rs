use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use std::collections::BTreeMap;

/// 税种代码
pub const TAX_ISR: &str = "001";
pub const TAX_VAT: &str = "002";
pub const TAX_EXCISE: &str = "003";

/// 发票主体 (Emisor / Receptor)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Party {
    pub rfc: String,
    pub name: Option<String>,
    /// 开票方为 RegimenFiscal, 收票方为 UsoCFDI
    pub usage_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptLine {
    pub product_key: Option<String>,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit: Option<String>,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
}

/// 按税种代码汇总的税额
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxTotals {
    pub transferred: BTreeMap<String, BigDecimal>,
    pub withheld: BTreeMap<String, BigDecimal>,
}

impl TaxTotals {
    pub fn transferred_of(&self, tax_code: &str) -> BigDecimal {
        self.transferred.get(tax_code).cloned().unwrap_or_else(BigDecimal::zero)
    }

    pub fn withheld_of(&self, tax_code: &str) -> BigDecimal {
        self.withheld.get(tax_code).cloned().unwrap_or_else(BigDecimal::zero)
    }

    pub fn is_empty(&self) -> bool {
        self.transferred.is_empty() && self.withheld.is_empty()
    }
}

/// 关联的 CFDI (CfdiRelacionados)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedCfdi {
    pub relation_type: String,
    pub uuid: String,
}

/// 由 XML 解码出的完整 CFDI 文档
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComprobanteModel {
    pub version: Option<String>,
    pub series: Option<String>,
    pub folio: Option<String>,
    pub date: Option<String>,
    pub subtotal: Option<BigDecimal>,
    pub total: Option<BigDecimal>,
    pub currency: Option<String>,
    pub document_type: Option<String>,
    pub issuer: Party,
    pub receiver: Party,
    pub concepts: Vec<ConceptLine>,
    pub taxes: TaxTotals,
    pub stamp_uuid: Option<String>,
    pub stamped_at: Option<String>,
    pub related: Vec<RelatedCfdi>,
    pub has_carta_porte: bool,
}

impl ComprobanteModel {
    /// TipoRelacion 01 = 信用票据 (nota de crédito)
    pub fn credit_note_count(&self) -> usize {
        self.related.iter().filter(|r| r.relation_type == "01").count()
    }
}
