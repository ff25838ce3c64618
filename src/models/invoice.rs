use crate::models::status::CanonicalStatus;
use crate::service::normalizer;
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 记录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// 主数据源 (结构化 JSON)
    Structured,
    /// 备用数据源 (PAC 原始 CFDI XML)
    RawXml,
}

/// 发票明细 (Concepto)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub product_key: Option<String>,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit: Option<String>,
    pub unit_price: BigDecimal,
    pub amount: BigDecimal,
}

/// 发票关联信息 (按UUID刷新, 不持久化)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRelations {
    pub ticket_count: u32,
    pub line_item_count: u32,
    pub has_bill_of_lading: bool,
    pub credit_note_count: u32,
}

/// 一张 CFDI 发票
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub uuid: String,
    pub issuer_rfc: String,
    pub issuer_name: Option<String>,
    pub receiver_rfc: String,
    pub receiver_name: Option<String>,
    pub cfdi_use: Option<String>,
    pub series: Option<String>,
    pub folio: Option<String>,
    pub issue_date: Option<NaiveDateTime>,
    pub amount: BigDecimal,
    pub subtotal: Option<BigDecimal>,
    pub total_vat: BigDecimal,
    pub total_excise: BigDecimal,
    pub concepts: Vec<Concept>,
    pub invoicing_status_raw: String,
    pub sat_status_raw: String,
    pub cancel_allowed: bool,
    pub cancel_block_reason: Option<String>,
    pub relations: Option<InvoiceRelations>,
    pub source: RecordSource,
}

impl InvoiceRecord {
    /// 仅含标识的空记录, 由边界适配器填充
    pub fn empty(uuid: impl Into<String>, source: RecordSource) -> Self {
        Self {
            uuid: uuid.into(),
            issuer_rfc: String::new(),
            issuer_name: None,
            receiver_rfc: String::new(),
            receiver_name: None,
            cfdi_use: None,
            series: None,
            folio: None,
            issue_date: None,
            amount: BigDecimal::zero(),
            subtotal: None,
            total_vat: BigDecimal::zero(),
            total_excise: BigDecimal::zero(),
            concepts: Vec::new(),
            invoicing_status_raw: String::new(),
            sat_status_raw: String::new(),
            cancel_allowed: false,
            cancel_block_reason: None,
            relations: None,
            source,
        }
    }

    /// 每次调用都从原始字段重新推导
    pub fn canonical_status(&self) -> CanonicalStatus {
        normalizer::normalize_with_fallback(&self.invoicing_status_raw, &self.sat_status_raw)
    }

    pub fn mark_cancellation_in_progress(&mut self) {
        self.invoicing_status_raw = code_of(CanonicalStatus::CancellationInProgress);
        self.cancel_allowed = false;
        self.cancel_block_reason = Some("Cancelación en proceso ante el SAT".to_string());
    }

    pub fn mark_cancelled_at_authority(&mut self) {
        self.invoicing_status_raw = code_of(CanonicalStatus::CancelledAtAuthority);
        self.sat_status_raw = "Cancelado".to_string();
        self.cancel_allowed = false;
        self.cancel_block_reason = Some("La factura ya fue cancelada".to_string());
    }

    /// PAC 拒绝了取消: 展示状态不变, 重新允许取消
    pub fn restore_cancel_allowed(&mut self) {
        self.cancel_allowed = true;
        self.cancel_block_reason = None;
    }
}

fn code_of(status: CanonicalStatus) -> String {
    status.code().unwrap_or_default().to_string()
}
