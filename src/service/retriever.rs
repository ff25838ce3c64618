use crate::error::{PacError, RetrievalError};
use crate::models::{InvoiceRecord, InvoiceRelations};
use crate::pac::{decode_comprobante, format_fiscal_uuid, payload, InvoiceQuery, PacGateway, RawDocument};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// 发票文档检索: 主数据源 (结构化) 失败时回退到 PAC 原始 XML
pub struct InvoiceRetriever {
    gateway: Arc<dyn PacGateway>,
    /// UUID -> 关联信息, 每次检索时刷新
    relations: DashMap<String, InvoiceRelations>,
    batch_concurrency: usize,
}

/// 解析路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Xml,
    Unknown,
}

impl InvoiceRetriever {
    pub fn new(gateway: Arc<dyn PacGateway>, batch_concurrency: usize) -> Self {
        Self {
            gateway,
            relations: DashMap::new(),
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    pub async fn fetch_invoice(&self, uuid: &str) -> Result<InvoiceRecord, RetrievalError> {
        let record = match self.fetch_primary(uuid).await {
            Some(record) => record,
            None => {
                tracing::info!("[Retriever] {}: 主数据源不可用, 回退到 PAC XML", uuid);
                self.fetch_secondary(uuid).await?
            }
        };

        if let Some(relations) = &record.relations {
            self.relations
                .insert(format_fiscal_uuid(uuid), relations.clone());
        }
        Ok(record)
    }

    /// 批量检索, 结果顺序不保证与输入一致
    pub async fn fetch_many(
        &self,
        uuids: &[String],
    ) -> Vec<(String, Result<InvoiceRecord, RetrievalError>)> {
        stream::iter(uuids.iter().cloned())
            .map(|uuid| async move {
                let result = self.fetch_invoice(&uuid).await;
                (uuid, result)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await
    }

    /// 关联信息, 缓存未命中时重新检索
    pub async fn relations(&self, uuid: &str) -> Result<InvoiceRelations, RetrievalError> {
        if let Some(cached) = self.relations.get(&format_fiscal_uuid(uuid)) {
            return Ok(cached.value().clone());
        }
        let record = self.fetch_invoice(uuid).await?;
        Ok(record.relations.unwrap_or_default())
    }

    /// 列表查询 (`/consulta-facturas/buscar`)
    pub async fn search(&self, query: &InvoiceQuery) -> Result<Vec<InvoiceRecord>, RetrievalError> {
        let response = self
            .gateway
            .search_invoices(query)
            .await
            .map_err(connectivity)?;

        if !response.exitoso {
            let message = response
                .mensaje
                .unwrap_or_else(|| "La consulta no devolvió resultados".to_string());
            tracing::warn!("[Retriever] 查询失败 uuid={:?}: {}", query.uuid, message);
            return Err(RetrievalError::Unavailable { uuid: query.uuid.clone() });
        }

        let mut records = Vec::with_capacity(response.facturas.len());
        for (idx, raw) in response.facturas.iter().enumerate() {
            match payload::map_structured(raw, "") {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("[Retriever] 跳过第 {} 条记录: {}", idx, e),
            }
        }
        tracing::info!("[Retriever] 查询返回 {} 张发票", records.len());
        Ok(records)
    }

    async fn fetch_primary(&self, uuid: &str) -> Option<InvoiceRecord> {
        let doc = match self.gateway.fetch_structured(uuid).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("[Retriever] {}: 主数据源请求失败: {}", uuid, e);
                return None;
            }
        };
        if !doc.is_success() {
            tracing::warn!("[Retriever] {}: 主数据源返回 HTTP {}", uuid, doc.status);
            return None;
        }

        let value: Value = match serde_json::from_str(&doc.body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("[Retriever] {}: 主数据源响应不是 JSON: {}", uuid, e);
                return None;
            }
        };
        if !payload::envelope_succeeded(&value) {
            return None;
        }
        let inner = payload::unwrap_invoice_payload(&value)?;
        match payload::map_structured(inner, uuid) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("[Retriever] {}: 主数据源记录无法映射: {}", uuid, e);
                None
            }
        }
    }

    async fn fetch_secondary(&self, uuid: &str) -> Result<InvoiceRecord, RetrievalError> {
        let doc = self.gateway.fetch_raw_xml(uuid).await.map_err(connectivity)?;
        if !doc.is_success() {
            tracing::warn!("[Retriever] {}: PAC 返回 HTTP {}", uuid, doc.status);
            return Err(RetrievalError::Unavailable { uuid: uuid.to_string() });
        }
        parse_document(&doc, uuid)
    }
}

fn classify(doc: &RawDocument) -> BodyKind {
    let is_json_type = doc
        .content_type
        .as_deref()
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);
    let body = doc.body.trim_start_matches('\u{feff}').trim_start();
    if is_json_type || body.starts_with('{') {
        BodyKind::Json
    } else if body.starts_with('<') {
        BodyKind::Xml
    } else {
        BodyKind::Unknown
    }
}

/// 按内容选择解析路径
fn parse_document(doc: &RawDocument, uuid: &str) -> Result<InvoiceRecord, RetrievalError> {
    match classify(doc) {
        BodyKind::Xml => decode_xml(doc.body.trim_start_matches('\u{feff}').trim_start(), uuid),
        BodyKind::Json => {
            let value: Value = serde_json::from_str(&doc.body)
                .map_err(|e| RetrievalError::Parse(e.to_string()))?;
            // 部分 PAC 以 JSON 包裹 XML 字符串返回
            if let Some(xml) = embedded_xml(&value) {
                return decode_xml(xml, uuid);
            }
            match payload::unwrap_invoice_payload(&value) {
                Some(inner) => payload::map_structured(inner, uuid),
                None => Err(RetrievalError::Unavailable { uuid: uuid.to_string() }),
            }
        }
        BodyKind::Unknown => Err(RetrievalError::Unavailable { uuid: uuid.to_string() }),
    }
}

fn embedded_xml(value: &Value) -> Option<&str> {
    let map = value.as_object()?;
    ["xml", "XML", "contenido", "cfdi"]
        .iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim_start)
        .find(|s| s.starts_with('<'))
}

fn decode_xml(xml: &str, uuid: &str) -> Result<InvoiceRecord, RetrievalError> {
    let model = decode_comprobante(xml)?;
    Ok(payload::map_comprobante(model, uuid))
}

fn connectivity(err: PacError) -> RetrievalError {
    RetrievalError::Connectivity(err.to_string())
}
