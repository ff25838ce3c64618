use crate::config::PollingConfig;
use crate::models::{LifecycleState, ResolutionStatus};
use crate::pac::{format_fiscal_uuid, PacGateway};
use crate::service::ledger::CancellationLedger;
use crate::service::normalizer;
use crate::service::scheduler::{LoopBudget, LoopExit, Scheduler};
use crate::service::store::InvoiceStore;
use dashmap::DashMap;
use futures::FutureExt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct ActiveLoop {
    generation: u64,
    token: CancellationToken,
}

/// 取消结果轮询器: 每个 UUID 同时只有一个循环
#[derive(Clone)]
pub struct ResolutionPoller {
    gateway: Arc<dyn PacGateway>,
    store: InvoiceStore,
    ledger: Arc<CancellationLedger>,
    scheduler: Scheduler,
    settings: PollingConfig,
    loops: Arc<DashMap<String, ActiveLoop>>,
    generation: Arc<AtomicU64>,
}

impl ResolutionPoller {
    pub fn new(
        gateway: Arc<dyn PacGateway>,
        store: InvoiceStore,
        ledger: Arc<CancellationLedger>,
        scheduler: Scheduler,
        settings: PollingConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            ledger,
            scheduler,
            settings,
            loops: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 启动轮询; 同一 UUID 已有循环时先取消旧循环
    pub fn start(&self, uuid: &str) {
        let key = format_fiscal_uuid(uuid);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let tick = {
            let poller = self.clone();
            let uuid = uuid.to_string();
            move |attempt: u32| {
                let poller = poller.clone();
                let uuid = uuid.clone();
                async move { poller.poll_once(&uuid, attempt).await }.boxed()
            }
        };
        let on_exit = {
            let loops = self.loops.clone();
            let ledger = self.ledger.clone();
            let key = key.clone();
            let uuid = uuid.to_string();
            move |exit: LoopExit| {
                loops.remove_if(&key, |_, active| active.generation == generation);
                match exit {
                    LoopExit::Expired => {
                        // 超时不提示用户, 发票继续显示为"取消中"
                        ledger.transition(&uuid, LifecycleState::Expired);
                        tracing::warn!("[Poller] {}: 轮询超时, 停止自动跟踪", uuid);
                    }
                    LoopExit::Cancelled => {
                        tracing::debug!("[Poller] {}: 循环被替换或取消", uuid);
                    }
                    LoopExit::Finished => {
                        tracing::debug!("[Poller] {}: 循环结束", uuid);
                    }
                }
            }
        };

        // 先登记新循环再启动, 旧循环的 on_exit 按 generation 判断不会误删
        let budget = LoopBudget {
            interval: self.settings.interval(),
            budget: self.settings.budget(),
            max_ticks: self.settings.max_attempts,
        };
        let token = CancellationToken::new();
        if let Some(previous) = self.loops.insert(
            key,
            ActiveLoop {
                generation,
                token: token.clone(),
            },
        ) {
            tracing::info!("[Poller] {}: 取消已有的轮询循环", uuid);
            previous.token.cancel();
        }
        self.scheduler.schedule_with_token(budget, token, tick, on_exit);

        tracing::info!(
            "[Poller] {}: 开始轮询 (间隔 {:?}, 上限 {:?} / {} 次)",
            uuid, budget.interval, budget.budget, budget.max_ticks
        );
    }

    /// 取消某个 UUID 的轮询
    pub fn stop(&self, uuid: &str) -> bool {
        match self.loops.remove(&format_fiscal_uuid(uuid)) {
            Some((_, active)) => {
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, uuid: &str) -> bool {
        self.loops.contains_key(&format_fiscal_uuid(uuid))
    }

    pub fn active_count(&self) -> usize {
        self.loops.len()
    }

    async fn poll_once(&self, uuid: &str, attempt: u32) -> ControlFlow<()> {
        self.ledger.record_poll(uuid);
        let raw = match self.gateway.query_resolution(uuid).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("[Poller] {}: 第 {} 次查询失败: {}", uuid, attempt, e);
                return ControlFlow::Continue(());
            }
        };

        match normalizer::classify_resolution(raw.as_deref()) {
            ResolutionStatus::Pending => {
                tracing::debug!("[Poller] {}: 第 {} 次查询, 仍在处理中", uuid, attempt);
                ControlFlow::Continue(())
            }
            ResolutionStatus::Cancelled => {
                self.store.update(uuid, |r| r.mark_cancelled_at_authority());
                self.ledger.transition(uuid, LifecycleState::ResolvedCancelled);
                tracing::info!("[Poller] {}: PAC 确认已取消 (第 {} 次)", uuid, attempt);
                ControlFlow::Break(())
            }
            ResolutionStatus::Rejected(label) => {
                self.store.update(uuid, |r| r.restore_cancel_allowed());
                self.ledger.transition(uuid, LifecycleState::ResolvedRejected);
                tracing::info!("[Poller] {}: PAC 未取消 ({}), 恢复可取消", uuid, label);
                ControlFlow::Break(())
            }
        }
    }
}
