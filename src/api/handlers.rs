use crate::error::{CancellationError, RetrievalError};
use crate::models::{
    CancellationCommand, CancellationOutcome, CancellationRequest, CanonicalStatus, InvoiceRecord,
};
use crate::pac::InvoiceQuery;
use crate::service::InvoiceConsole;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

/// 列表行: 记录 + 推导出的规范状态
#[derive(Debug, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub record: InvoiceRecord,
    pub canonical_status: CanonicalStatus,
}

impl From<InvoiceRecord> for InvoiceView {
    fn from(record: InvoiceRecord) -> Self {
        let canonical_status = record.canonical_status();
        Self {
            record,
            canonical_status,
        }
    }
}

/// 查询响应体
#[derive(Debug, Serialize)]
pub struct SearchResponseBody {
    pub success: bool,
    pub message: String,
    pub invoices: Vec<InvoiceView>,
}

/// 单张发票响应体
#[derive(Debug, Serialize)]
pub struct InvoiceResponseBody {
    pub success: bool,
    pub message: String,
    pub invoice: Option<InvoiceView>,
}

/// 取消响应体
#[derive(Debug, Serialize)]
pub struct CancelResponseBody {
    pub success: bool,
    pub message: String,
    pub outcome: Option<CancellationOutcome>,
}

#[derive(Debug, Serialize)]
pub struct CancellationStateBody {
    pub success: bool,
    pub request: Option<CancellationRequest>,
    pub polling: bool,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 发票列表查询
pub async fn search_invoices(
    State(console): State<Arc<InvoiceConsole>>,
    Json(query): Json<InvoiceQuery>,
) -> Response {
    match console.search(query).await {
        Ok(records) => {
            let response = SearchResponseBody {
                success: true,
                message: format!("{} facturas encontradas", records.len()),
                invoices: records.into_iter().map(InvoiceView::from).collect(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let response = SearchResponseBody {
                success: false,
                message: e.to_string(),
                invoices: Vec::new(),
            };
            (retrieval_status(&e), Json(response)).into_response()
        }
    }
}

/// 当前内存列表
pub async fn list_invoices(State(console): State<Arc<InvoiceConsole>>) -> Response {
    let invoices: Vec<InvoiceView> = console.invoices().into_iter().map(InvoiceView::from).collect();
    let response = SearchResponseBody {
        success: true,
        message: format!("{} facturas", invoices.len()),
        invoices,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// 单张发票检索 (主数据源 / PAC XML)
pub async fn fetch_invoice(
    State(console): State<Arc<InvoiceConsole>>,
    Path(uuid): Path<String>,
) -> Response {
    match console.fetch_invoice(&uuid).await {
        Ok(record) => {
            let response = InvoiceResponseBody {
                success: true,
                message: "OK".to_string(),
                invoice: Some(record.into()),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let response = InvoiceResponseBody {
                success: false,
                message: e.to_string(),
                invoice: None,
            };
            (retrieval_status(&e), Json(response)).into_response()
        }
    }
}

/// 提交取消
pub async fn cancel_invoice(
    State(console): State<Arc<InvoiceConsole>>,
    Json(command): Json<CancellationCommand>,
) -> Response {
    match console.cancel(command).await {
        Ok(outcome) => {
            let message = match outcome {
                CancellationOutcome::ImmediatelyCancelled => "Factura cancelada",
                CancellationOutcome::PendingResolution => "Cancelación en proceso",
            };
            let response = CancelResponseBody {
                success: true,
                message: message.to_string(),
                outcome: Some(outcome),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let status = match &e {
                CancellationError::Validation(_) => StatusCode::BAD_REQUEST,
                CancellationError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CancellationError::AlreadyPending(_) => StatusCode::CONFLICT,
                CancellationError::Connectivity(_) => StatusCode::BAD_GATEWAY,
            };
            let response = CancelResponseBody {
                success: false,
                message: e.to_string(),
                outcome: None,
            };
            (status, Json(response)).into_response()
        }
    }
}

/// 取消请求状态
pub async fn cancellation_state(
    State(console): State<Arc<InvoiceConsole>>,
    Path(uuid): Path<String>,
) -> Response {
    let request = console.cancellation(&uuid);
    let response = CancellationStateBody {
        success: request.is_some(),
        polling: console.is_polling(&uuid),
        request,
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn retrieval_status(err: &RetrievalError) -> StatusCode {
    match err {
        RetrievalError::Unavailable { .. } => StatusCode::NOT_FOUND,
        RetrievalError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RetrievalError::Connectivity(_) => StatusCode::BAD_GATEWAY,
    }
}
