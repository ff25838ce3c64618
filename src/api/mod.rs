pub mod handlers;

pub use handlers::*;

use crate::service::InvoiceConsole;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// 控制台 API 路由
pub fn router(console: Arc<InvoiceConsole>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/facturas", get(list_invoices))
        .route("/api/facturas/buscar", post(search_invoices))
        .route("/api/facturas/cancelar", post(cancel_invoice))
        .route("/api/facturas/:uuid", get(fetch_invoice))
        .route("/api/cancelaciones/:uuid", get(cancellation_state))
        .with_state(console)
}
