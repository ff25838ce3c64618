use crate::error::CancellationError;
use crate::models::{
    CancellationCommand, CancellationOutcome, CancellationRequest, LifecycleState, MotiveCode,
    ResolutionStatus,
};
use crate::pac::{CancelRequestBody, PacGateway};
use crate::service::ledger::CancellationLedger;
use crate::service::normalizer;
use crate::service::poller::ResolutionPoller;
use crate::service::retriever::InvoiceRetriever;
use crate::service::store::InvoiceStore;
use std::sync::Arc;

/// 取消提交: 本地校验 -> 提交后台 -> 立即查询一次 PAC -> 必要时交给轮询器
pub struct CancellationSubmitter {
    gateway: Arc<dyn PacGateway>,
    retriever: Arc<InvoiceRetriever>,
    store: InvoiceStore,
    ledger: Arc<CancellationLedger>,
    poller: ResolutionPoller,
}

impl CancellationSubmitter {
    pub fn new(
        gateway: Arc<dyn PacGateway>,
        retriever: Arc<InvoiceRetriever>,
        store: InvoiceStore,
        ledger: Arc<CancellationLedger>,
        poller: ResolutionPoller,
    ) -> Self {
        Self {
            gateway,
            retriever,
            store,
            ledger,
            poller,
        }
    }

    pub async fn submit(
        &self,
        command: CancellationCommand,
    ) -> Result<CancellationOutcome, CancellationError> {
        let request = validate(command)?;
        let uuid = request.invoice_uuid.clone();
        let body = CancelRequestBody {
            uuid: uuid.clone(),
            motivo: request.motive.as_str().to_string(),
            usuario: request.requested_by.clone(),
            perfil_usuario: request.profile.clone(),
            uuid_sustituto: request.substitute_uuid.clone(),
        };

        self.ledger.begin(request)?;
        tracing::info!("[Cancel] {}: 提交取消, 原因 {}", uuid, body.motivo);

        let ack = match self.gateway.submit_cancellation(&body).await {
            Ok(ack) => ack,
            Err(e) => {
                self.ledger.discard(&uuid);
                tracing::error!("[Cancel] {}: 提交失败: {}", uuid, e);
                return Err(CancellationError::Connectivity(e.to_string()));
            }
        };
        if !ack.exitoso {
            self.ledger.discard(&uuid);
            let message = ack
                .mensaje
                .unwrap_or_else(|| "No fue posible cancelar la factura".to_string());
            tracing::warn!("[Cancel] {}: 后台拒绝: {}", uuid, message);
            return Err(CancellationError::Rejected(message));
        }

        // 立即查询一次, 必须先于轮询器启动
        let resolution = match self.gateway.query_resolution(&uuid).await {
            Ok(raw) => normalizer::classify_resolution(raw.as_deref()),
            Err(e) => {
                tracing::warn!("[Cancel] {}: 即时查询失败, 交给轮询器: {}", uuid, e);
                ResolutionStatus::Pending
            }
        };

        // 即时查询之后再补齐列表, 检索耗时不影响即时结果
        self.ensure_in_store(&uuid).await;

        if resolution == ResolutionStatus::Cancelled {
            self.store.update(&uuid, |r| r.mark_cancelled_at_authority());
            self.ledger.transition(&uuid, LifecycleState::ResolvedCancelled);
            tracing::info!("[Cancel] {}: PAC 即时确认已取消", uuid);
            return Ok(CancellationOutcome::ImmediatelyCancelled);
        }

        self.ledger.transition(&uuid, LifecycleState::AwaitingResolution);
        self.store.update(&uuid, |r| r.mark_cancellation_in_progress());
        self.poller.start(&uuid);
        Ok(CancellationOutcome::PendingResolution)
    }

    /// 发票不在列表中时先检索一次, 让状态变更有落点
    async fn ensure_in_store(&self, uuid: &str) {
        if self.store.contains(uuid) {
            return;
        }
        match self.retriever.fetch_invoice(uuid).await {
            Ok(record) => self.store.upsert(record),
            Err(e) => tracing::warn!("[Cancel] {}: 无法检索发票, 仅跟踪取消请求: {}", uuid, e),
        }
    }
}

/// 网络调用前的本地校验
pub fn validate(command: CancellationCommand) -> Result<CancellationRequest, CancellationError> {
    let motive = command
        .motive
        .as_deref()
        .and_then(MotiveCode::parse)
        .ok_or_else(|| CancellationError::Validation("motive required".to_string()))?;

    let substitute = command
        .substitute_uuid
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let substitute = if motive.requires_substitute() {
        match substitute {
            Some(s) => Some(s),
            None => {
                return Err(CancellationError::Validation(
                    "motive 01 requires substitute uuid".to_string(),
                ))
            }
        }
    } else {
        // 非 01 原因不携带替代 UUID
        None
    };

    let uuid = command.uuid.trim().to_string();
    if uuid.is_empty() {
        return Err(CancellationError::Validation("uuid required".to_string()));
    }

    Ok(CancellationRequest::draft(
        uuid,
        motive,
        substitute,
        command.requesting_user,
        command.profile,
    ))
}
