use crate::error::CancellationError;
use crate::models::{CancellationRequest, LifecycleState};
use crate::pac::format_fiscal_uuid;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;

/// 取消请求台账: 每个 UUID 同时最多一个进行中的请求
#[derive(Default)]
pub struct CancellationLedger {
    requests: DashMap<String, CancellationRequest>,
}

impl CancellationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个请求并置为 Submitted; 已有进行中的请求时拒绝
    pub fn begin(&self, mut request: CancellationRequest) -> Result<(), CancellationError> {
        let key = format_fiscal_uuid(&request.invoice_uuid);
        request.lifecycle_state = LifecycleState::Submitted;
        request.submitted_at = Some(Utc::now());

        match self.requests.entry(key) {
            Entry::Occupied(existing) if existing.get().lifecycle_state.is_active() => {
                Err(CancellationError::AlreadyPending(request.invoice_uuid))
            }
            Entry::Occupied(mut existing) => {
                existing.insert(request);
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    pub fn transition(&self, uuid: &str, state: LifecycleState) {
        if let Some(mut request) = self.requests.get_mut(&format_fiscal_uuid(uuid)) {
            tracing::debug!(
                "[Ledger] {}: {:?} -> {:?}",
                request.invoice_uuid, request.lifecycle_state, state
            );
            request.lifecycle_state = state;
        }
    }

    /// 记录一次轮询
    pub fn record_poll(&self, uuid: &str) {
        if let Some(mut request) = self.requests.get_mut(&format_fiscal_uuid(uuid)) {
            request.last_polled_at = Some(Utc::now());
            request.poll_attempts += 1;
        }
    }

    /// 提交失败时撤销登记
    pub fn discard(&self, uuid: &str) {
        self.requests.remove(&format_fiscal_uuid(uuid));
    }

    pub fn get(&self, uuid: &str) -> Option<CancellationRequest> {
        self.requests
            .get(&format_fiscal_uuid(uuid))
            .map(|r| r.value().clone())
    }

    pub fn is_active(&self, uuid: &str) -> bool {
        self.get(uuid)
            .map(|r| r.lifecycle_state.is_active())
            .unwrap_or(false)
    }

    /// 进行中请求的 UUID (已规范化)
    pub fn active_keys(&self) -> HashSet<String> {
        self.requests
            .iter()
            .filter(|r| r.lifecycle_state.is_active())
            .map(|r| r.key().clone())
            .collect()
    }

    /// 清理已结束的请求, 返回清理数量
    pub fn purge_terminal(&self) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, r| !r.lifecycle_state.is_terminal());
        before - self.requests.len()
    }
}
