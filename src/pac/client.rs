use crate::config::BackendConfig;
use crate::error::PacError;
use crate::pac::format_fiscal_uuid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// 列表查询条件 (`/consulta-facturas/buscar`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceQuery {
    pub uuid: String,
    #[serde(rename = "perfilUsuario")]
    pub profile: String,
}

/// 列表查询响应, `facturas` 保持原始 JSON, 由边界适配器统一映射
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default, alias = "success")]
    pub exitoso: bool,
    #[serde(default, alias = "message")]
    pub mensaje: Option<String>,
    #[serde(default)]
    pub facturas: Vec<Value>,
}

/// 取消请求体 (`/consulta-facturas/cancelar`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelRequestBody {
    pub uuid: String,
    pub motivo: String,
    pub usuario: String,
    #[serde(rename = "perfilUsuario")]
    pub perfil_usuario: String,
    #[serde(rename = "uuidSustituto", skip_serializing_if = "Option::is_none")]
    pub uuid_sustituto: Option<String>,
}

/// 后台应答 `{exitoso, mensaje}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendAck {
    #[serde(default, alias = "success")]
    pub exitoso: bool,
    #[serde(default, alias = "message")]
    pub mensaje: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolutionResponse {
    #[serde(default, alias = "estatus", alias = "STATUS")]
    status: Option<String>,
}

/// 未解析的响应体, 由检索器按内容选择解析路径
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawDocument {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 发票后台与 PAC 的网络边界
#[async_trait]
pub trait PacGateway: Send + Sync {
    async fn search_invoices(&self, query: &InvoiceQuery) -> Result<SearchResponse, PacError>;

    async fn submit_cancellation(&self, body: &CancelRequestBody) -> Result<BackendAck, PacError>;

    /// `None` 表示 PAC 尚无结果
    async fn query_resolution(&self, uuid: &str) -> Result<Option<String>, PacError>;

    async fn fetch_structured(&self, uuid: &str) -> Result<RawDocument, PacError>;

    async fn fetch_raw_xml(&self, uuid: &str) -> Result<RawDocument, PacError>;
}

/// 基于 reqwest 的网关实现
pub struct HttpPacClient {
    client: reqwest::Client,
    api_base: String,
    pac_base: String,
}

impl HttpPacClient {
    pub fn new(config: &BackendConfig) -> Result<Self, PacError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            pac_base: config.pac_base.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get_raw(&self, url: String) -> Result<RawDocument, PacError> {
        let resp = self.client.get(&url).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;
        tracing::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(RawDocument { status, content_type, body })
    }
}

#[async_trait]
impl PacGateway for HttpPacClient {
    async fn search_invoices(&self, query: &InvoiceQuery) -> Result<SearchResponse, PacError> {
        let endpoint = self.api_url("/consulta-facturas/buscar");
        let resp = self.client.post(&endpoint).json(query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        // 后台在业务失败时也可能返回 4xx + {exitoso:false, mensaje}
        match serde_json::from_str::<SearchResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(PacError::Status {
                endpoint,
                status: status.as_u16(),
            }),
            Err(e) => Err(PacError::Decode {
                endpoint,
                reason: e.to_string(),
            }),
        }
    }

    async fn submit_cancellation(&self, body: &CancelRequestBody) -> Result<BackendAck, PacError> {
        let endpoint = self.api_url("/consulta-facturas/cancelar");
        let resp = self.client.post(&endpoint).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        match serde_json::from_str::<BackendAck>(&text) {
            Ok(ack) => Ok(ack),
            Err(_) if !status.is_success() => Err(PacError::Status {
                endpoint,
                status: status.as_u16(),
            }),
            Err(e) => Err(PacError::Decode {
                endpoint,
                reason: e.to_string(),
            }),
        }
    }

    async fn query_resolution(&self, uuid: &str) -> Result<Option<String>, PacError> {
        let endpoint = self.api_url(&format!("/pac/status/{}", uuid));
        let raw = self.get_raw(endpoint.clone()).await?;
        if !raw.is_success() {
            return Err(PacError::Status {
                endpoint,
                status: raw.status,
            });
        }
        if raw.body.trim().is_empty() {
            return Ok(None);
        }
        let parsed: ResolutionResponse =
            serde_json::from_str(&raw.body).map_err(|e| PacError::Decode {
                endpoint,
                reason: e.to_string(),
            })?;
        Ok(parsed.status)
    }

    async fn fetch_structured(&self, uuid: &str) -> Result<RawDocument, PacError> {
        self.get_raw(self.api_url(&format!("/factura/timbrado/status/{}", uuid)))
            .await
    }

    async fn fetch_raw_xml(&self, uuid: &str) -> Result<RawDocument, PacError> {
        let url = format!("{}/descargar-xml/{}", self.pac_base, format_fiscal_uuid(uuid));
        self.get_raw(url).await
    }
}
