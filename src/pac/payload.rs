//! 边界适配器: 各数据源的原始载荷只在这里读取一次字段名,
//! 之后统一使用 `InvoiceRecord`。

use crate::error::RetrievalError;
use crate::models::comprobante::{TAX_EXCISE, TAX_VAT};
use crate::models::{ComprobanteModel, Concept, InvoiceRecord, InvoiceRelations, RecordSource};
use crate::service::normalizer;
use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

const UUID_KEYS: &[&str] = &["uuid", "folioFiscal", "uuidFactura"];
const ISSUER_RFC_KEYS: &[&str] = &["rfcEmisor", "emisorRfc"];
const ISSUER_NAME_KEYS: &[&str] = &["nombreEmisor", "razonSocialEmisor"];
const RECEIVER_RFC_KEYS: &[&str] = &["rfcReceptor", "receptorRfc"];
const RECEIVER_NAME_KEYS: &[&str] = &["nombreReceptor", "razonSocialReceptor"];
const CFDI_USE_KEYS: &[&str] = &["usoCfdi"];
const SERIES_KEYS: &[&str] = &["serie", "series"];
const FOLIO_KEYS: &[&str] = &["folio"];
const DATE_KEYS: &[&str] = &["fechaEmision", "fecha", "fechaFactura"];
const TOTAL_KEYS: &[&str] = &["total", "importeTotal", "importe", "monto"];
const SUBTOTAL_KEYS: &[&str] = &["subtotal"];
const VAT_KEYS: &[&str] = &["totalIva", "iva", "impuestoIva"];
const EXCISE_KEYS: &[&str] = &["totalIeps", "ieps"];
const INVOICING_STATUS_KEYS: &[&str] =
    &["estatusFacturacion", "statusFacturacion", "estatus", "status", "estado"];
const SAT_STATUS_KEYS: &[&str] = &["estatusSat", "statusSat", "estadoSat"];
const CANCEL_FLAG_KEYS: &[&str] =
    &["permiteCancelar", "permiteCancelacion", "cancelable", "puedeCancelar"];
const BLOCK_REASON_KEYS: &[&str] = &["motivoNoCancelable", "motivoBloqueo", "mensajeCancelacion"];
const TICKET_KEYS: &[&str] = &["numTickets", "totalTickets", "tickets"];
const CONCEPT_KEYS: &[&str] = &["conceptos", "partidas"];
const CONCEPT_COUNT_KEYS: &[&str] = &["numConceptos", "totalConceptos"];
const CARTA_PORTE_KEYS: &[&str] = &["cartaPorte", "tieneCartaPorte"];
const CREDIT_NOTE_KEYS: &[&str] = &["notasCredito", "numNotasCredito"];
const ENVELOPE_KEYS: [&str; 1] = ["datosFactura"];
const SUCCESS_KEYS: &[&str] = &["exitoso", "success"];

/// 忽略大小写/下划线的字段查找: `rfcEmisor`, `RFC_EMISOR`, `rfc_emisor` 视为同一字段
struct Fields<'a> {
    by_key: HashMap<String, &'a Value>,
}

impl<'a> Fields<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        let mut by_key = HashMap::with_capacity(map.len());
        for (key, value) in map {
            by_key.entry(fold_key(key)).or_insert(value);
        }
        Self { by_key }
    }

    fn get(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .filter_map(|name| self.by_key.get(&fold_key(name)).copied())
            .find(|v| !v.is_null())
    }

    fn text(&self, names: &[&str]) -> Option<String> {
        self.get(names).and_then(value_text)
    }

    fn amount(&self, names: &[&str]) -> Option<BigDecimal> {
        self.get(names).and_then(value_amount)
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_amount(value: &Value) -> Option<BigDecimal> {
    let text = value_text(value)?;
    let cleaned: String = text.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    BigDecimal::from_str(&cleaned).ok()
}

fn value_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_uppercase().as_str(),
            "TRUE" | "1" | "S" | "SI" | "SÍ" | "Y" | "YES"
        ),
        _ => false,
    }
}

fn value_count(value: &Value) -> Option<u32> {
    match value {
        Value::Array(items) => u32::try_from(items.len()).ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// 解析 CFDI 常见的日期格式
pub fn parse_cfdi_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// 主数据源信封是否表示成功 (缺少 exitoso 字段视为成功)
pub fn envelope_succeeded(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => Fields::new(map).get(SUCCESS_KEYS).map(value_flag).unwrap_or(true),
        None => false,
    }
}

/// 取出 `datosFactura`; 没有信封时, 对象本身像发票记录才返回
pub fn unwrap_invoice_payload(value: &Value) -> Option<&Value> {
    let map = value.as_object()?;
    let f = Fields::new(map);
    match f.by_key.get(&fold_key(ENVELOPE_KEYS[0])) {
        Some(inner) if inner.is_object() => Some(*inner),
        Some(_) => None,
        None if f.get(UUID_KEYS).is_some() || f.get(ISSUER_RFC_KEYS).is_some() => Some(value),
        None => None,
    }
}

/// 结构化记录 -> InvoiceRecord
pub fn map_structured(value: &Value, fallback_uuid: &str) -> Result<InvoiceRecord, RetrievalError> {
    let map = value
        .as_object()
        .ok_or_else(|| RetrievalError::Parse("invoice payload is not a JSON object".to_string()))?;
    let f = Fields::new(map);

    let uuid = f
        .text(UUID_KEYS)
        .unwrap_or_else(|| fallback_uuid.trim().to_string());
    if uuid.is_empty() {
        return Err(RetrievalError::Parse("invoice payload has no uuid".to_string()));
    }

    let mut record = InvoiceRecord::empty(uuid, RecordSource::Structured);
    record.issuer_rfc = f.text(ISSUER_RFC_KEYS).unwrap_or_default();
    record.issuer_name = f.text(ISSUER_NAME_KEYS);
    record.receiver_rfc = f.text(RECEIVER_RFC_KEYS).unwrap_or_default();
    record.receiver_name = f.text(RECEIVER_NAME_KEYS);
    record.cfdi_use = f.text(CFDI_USE_KEYS);
    record.series = f.text(SERIES_KEYS);
    record.folio = f.text(FOLIO_KEYS);
    record.issue_date = f.text(DATE_KEYS).and_then(|d| parse_cfdi_datetime(&d));
    record.amount = f.amount(TOTAL_KEYS).unwrap_or_else(BigDecimal::zero);
    record.subtotal = f.amount(SUBTOTAL_KEYS);
    record.total_vat = f.amount(VAT_KEYS).unwrap_or_else(BigDecimal::zero);
    record.total_excise = f.amount(EXCISE_KEYS).unwrap_or_else(BigDecimal::zero);
    record.invoicing_status_raw = f.text(INVOICING_STATUS_KEYS).unwrap_or_default();
    record.sat_status_raw = f.text(SAT_STATUS_KEYS).unwrap_or_default();

    if let Some(Value::Array(items)) = f.get(CONCEPT_KEYS) {
        record.concepts = items
            .iter()
            .filter_map(Value::as_object)
            .map(|item| map_concept(&Fields::new(item)))
            .collect();
    }

    let local_flag = f.get(CANCEL_FLAG_KEYS).map(value_flag).unwrap_or(false);
    record.cancel_allowed = normalizer::is_cancelable(
        &record.invoicing_status_raw,
        &record.sat_status_raw,
        local_flag,
    );
    if !record.cancel_allowed {
        let reason = f
            .text(BLOCK_REASON_KEYS)
            .unwrap_or_else(|| blocked_by_status(&record));
        record.cancel_block_reason = Some(reason);
    }

    record.relations = Some(InvoiceRelations {
        ticket_count: f.get(TICKET_KEYS).and_then(value_count).unwrap_or(0),
        line_item_count: f
            .get(CONCEPT_COUNT_KEYS)
            .and_then(value_count)
            .unwrap_or_else(|| saturating_count(record.concepts.len())),
        has_bill_of_lading: f.get(CARTA_PORTE_KEYS).map(value_flag).unwrap_or(false),
        credit_note_count: f.get(CREDIT_NOTE_KEYS).and_then(value_count).unwrap_or(0),
    });

    Ok(record)
}

fn map_concept(f: &Fields<'_>) -> Concept {
    Concept {
        product_key: f.text(&["claveProdServ"]),
        description: f.text(&["descripcion", "concepto"]).unwrap_or_default(),
        quantity: f.amount(&["cantidad"]).unwrap_or_else(BigDecimal::zero),
        unit: f.text(&["unidad", "claveUnidad"]),
        unit_price: f.amount(&["valorUnitario", "precioUnitario"]).unwrap_or_else(BigDecimal::zero),
        amount: f.amount(&["importe"]).unwrap_or_else(BigDecimal::zero),
    }
}

fn blocked_by_status(record: &InvoiceRecord) -> String {
    format!("Estatus no permite cancelar: {}", record.canonical_status())
}

/// PAC 原始 XML -> InvoiceRecord
///
/// XML 中没有业务状态, 原始状态字段留空, 因此不允许直接取消。
pub fn map_comprobante(model: ComprobanteModel, requested_uuid: &str) -> InvoiceRecord {
    let uuid = model
        .stamp_uuid
        .clone()
        .unwrap_or_else(|| requested_uuid.trim().to_string());
    let mut record = InvoiceRecord::empty(uuid, RecordSource::RawXml);

    record.relations = Some(InvoiceRelations {
        ticket_count: 0,
        line_item_count: saturating_count(model.concepts.len()),
        has_bill_of_lading: model.has_carta_porte,
        credit_note_count: saturating_count(model.credit_note_count()),
    });
    record.total_vat = model.taxes.transferred_of(TAX_VAT);
    record.total_excise = model.taxes.transferred_of(TAX_EXCISE);
    record.issuer_rfc = model.issuer.rfc;
    record.issuer_name = model.issuer.name;
    record.receiver_rfc = model.receiver.rfc;
    record.receiver_name = model.receiver.name;
    record.cfdi_use = model.receiver.usage_code;
    record.series = model.series;
    record.folio = model.folio;
    record.issue_date = model.date.as_deref().and_then(parse_cfdi_datetime);
    record.amount = model.total.unwrap_or_else(BigDecimal::zero);
    record.subtotal = model.subtotal;
    record.concepts = model
        .concepts
        .into_iter()
        .map(|line| Concept {
            product_key: line.product_key,
            description: line.description,
            quantity: line.quantity,
            unit: line.unit,
            unit_price: line.unit_price,
            amount: line.amount,
        })
        .collect();
    record.cancel_allowed = false;
    record.cancel_block_reason = Some("Documento recuperado del PAC sin estatus".to_string());
    record
}
